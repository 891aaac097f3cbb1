//! Core replication primitives.
//!
//! Identity, codecs, the change taxonomy and state digests. Nothing in
//! this module knows about fields, holders or transports.

pub mod key;
pub mod codec;
pub mod change;
pub mod hash;

// Re-export core types
pub use key::{ComponentId, StateKey};
pub use codec::{Codec, CodecError, JsonCodec, BincodeCodec, NetworkValue};
pub use change::{StateChange, OpCategory, ChangeShape};
pub use hash::{StateHasher, StateDigest};
