//! Network Layer
//!
//! Everything between a local mutation and a peer's `apply_change`:
//! the wire envelope, delivery strategies, the per-participant manager and
//! an in-process harness. Actual sockets are the transport's business.

pub mod protocol;
pub mod synchronizer;
pub mod manager;
pub mod local;

pub use protocol::{StateUpdate, SyncPolicy};
pub use synchronizer::{
    BlockingSynchronizer, QueuedSynchronizer, ReadOnlySynchronizer, SyncConfig, SyncMode,
    Synchronizer, Transport,
};
pub use manager::{Component, StateManager};
pub use local::LocalMultiplayer;
