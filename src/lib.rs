//! # Replica State
//!
//! Operation-log replication of component state across the participants
//! of a multiplayer session.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       REPLICA STATE                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Transport-free primitives                 │
//! │  ├── key.rs      - ComponentId and StateKey                  │
//! │  ├── codec.rs    - NetworkValue and pluggable codecs         │
//! │  ├── change.rs   - StateChange taxonomy and op-categories    │
//! │  └── hash.rs     - State digests for convergence checks      │
//! │                                                              │
//! │  state/          - Replicated fields                         │
//! │  ├── property.rs - Two-phase Property<T>                     │
//! │  ├── list.rs     - ReplicatedList<T>                         │
//! │  ├── map.rs      - ReplicatedMap<K, V>                       │
//! │  ├── set.rs      - ReplicatedSet<T>                          │
//! │  └── holder.rs   - Per-component registry + pending buffer   │
//! │                                                              │
//! │  network/        - Delivery                                  │
//! │  ├── protocol.rs - StateUpdate envelope, SyncPolicy          │
//! │  ├── synchronizer.rs - Blocking / queued / read-only         │
//! │  ├── manager.rs  - StateManager and Component                │
//! │  └── local.rs    - In-process full-mesh harness              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Data flow
//!
//! local mutation → field applies it to itself → `StateManager::send_update`
//! → `Synchronizer::send` → transport → peer `StateManager::receive_update`
//! → `StateHolder::apply_change` → field `apply_change` (or pending buffer).
//!
//! ## Example
//!
//! ```
//! use replica_state::{Component, LocalMultiplayer};
//!
//! let session = LocalMultiplayer::new(2);
//! let a = Component::new("player", &session.managers()[0]).unwrap();
//! let b = Component::new("player", &session.managers()[1]).unwrap();
//!
//! let mana_a = a.property("mana", 3);
//! let mana_b = b.property("mana", 3);
//! mana_a.set(1000).unwrap();
//! assert_eq!(mana_b.get().unwrap(), 1000);
//! ```
//!
//! The core assumes the transport delivers each sender's updates in order.
//! There is no conflict resolution and no authority model: concurrent
//! writers see whatever order the transport produces.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod error;
pub mod network;
pub mod state;

// Re-export commonly used types
pub use crate::core::{
    BincodeCodec, Codec, CodecError, ComponentId, JsonCodec, NetworkValue, OpCategory,
    StateChange, StateDigest, StateKey,
};
pub use error::ReplicaError;
pub use network::{
    BlockingSynchronizer, Component, LocalMultiplayer, QueuedSynchronizer, ReadOnlySynchronizer,
    StateManager, StateUpdate, SyncConfig, SyncMode, SyncPolicy, Synchronizer, Transport,
};
pub use state::{
    FieldLink, Property, Replicable, ReplicatedList, ReplicatedMap, ReplicatedSet,
    ReplicatedState, StateHolder,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
