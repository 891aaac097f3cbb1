//! Replication errors.
//!
//! Only fatal conditions are errors. Recoverable ones (an update for a
//! component this participant does not have, a change of the wrong
//! op-category) are logged and dropped where they occur.

use thiserror::Error;

use crate::core::{CodecError, ComponentId, StateKey};

/// Errors surfaced by the replication core.
#[derive(Debug, Error)]
pub enum ReplicaError {
    /// A component with this id is already registered.
    #[error("component '{0}' was registered twice; component ids must be unique")]
    DuplicateComponent(ComponentId),

    /// A field with this key is already registered.
    #[error("field '{0}' was registered twice")]
    DuplicateProperty(StateKey),

    /// A field tried to register before its component.
    #[error("component '{component}' was not registered before its field '{property}'")]
    UnknownComponent {
        /// Missing component.
        component: ComponentId,
        /// Field that tried to register.
        property: String,
    },

    /// A collection change arrived for a field that never registered.
    #[error("{change} arrived for unregistered collection '{key}'")]
    UnregisteredCollection {
        /// Target field.
        key: StateKey,
        /// Variant name.
        change: &'static str,
    },

    /// A list index was out of range.
    #[error("index {index} out of bounds for list of length {len}")]
    IndexOutOfBounds {
        /// Requested index.
        index: usize,
        /// List length at the time.
        len: usize,
    },

    /// Encoding or decoding a payload failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The transport reported a failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The outgoing queue is full.
    #[error("outgoing queue is full")]
    QueueFull,

    /// The outgoing queue was shut down.
    #[error("outgoing queue is closed")]
    QueueClosed,

    /// Queued delivery was requested outside a tokio runtime.
    #[error("queued synchronization requires a tokio runtime")]
    NoRuntime,

    /// This participant only mirrors remote state.
    #[error("state is read-only on this participant")]
    MutationNotAllowed,
}
