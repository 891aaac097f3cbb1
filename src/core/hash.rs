//! State Digests
//!
//! Deterministic SHA-256 digests of replicated state, used to check that
//! participants converged without comparing every field by hand.
//!
//! Digests are computed over encoded snapshots in sorted key order, so two
//! participants holding structurally equal state produce the same digest
//! provided they use the same codecs.

use sha2::{Digest, Sha256};

use super::codec::NetworkValue;

/// Digest output (256 bits / 32 bytes).
pub type StateDigest = [u8; 32];

/// Incremental hasher for replicated state.
///
/// Order of updates is significant.
pub struct StateHasher {
    hasher: Sha256,
}

impl StateHasher {
    /// Create a new hasher with a domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Hasher for a single component's fields.
    pub fn for_component() -> Self {
        Self::new(b"REPLICA_COMPONENT_V1")
    }

    /// Hasher for a whole participant.
    pub fn for_participant() -> Self {
        Self::new(b"REPLICA_PARTICIPANT_V1")
    }

    /// Update with a u64 value (little-endian).
    #[inline]
    pub fn update_u64(&mut self, value: u64) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with a length-prefixed string.
    #[inline]
    pub fn update_str(&mut self, value: &str) {
        self.update_u64(value.len() as u64);
        self.hasher.update(value.as_bytes());
    }

    /// Update with an encoded payload.
    #[inline]
    pub fn update_value(&mut self, value: &NetworkValue) {
        self.update_str(value.as_str());
    }

    /// Update with a nested digest.
    #[inline]
    pub fn update_digest(&mut self, digest: &StateDigest) {
        self.hasher.update(digest);
    }

    /// Finalize and return the digest.
    pub fn finalize(self) -> StateDigest {
        self.hasher.finalize().into()
    }
}
