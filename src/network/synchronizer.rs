//! Synchronizers
//!
//! A synchronizer decides *when* outgoing changes reach the transport:
//!
//! - [`BlockingSynchronizer`] calls the transport on the caller's thread and
//!   returns once it is done. Send order equals apply order.
//! - [`QueuedSynchronizer`] pushes batches onto a bounded queue drained by
//!   one background worker, so the caller never waits for delivery.
//! - [`ReadOnlySynchronizer`] refuses every send.
//!
//! No strategy retries a failed delivery.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::ReplicaError;
use crate::network::protocol::StateUpdate;

/// Delivers one batch of updates to the other participants.
pub type Transport = Arc<dyn Fn(Vec<StateUpdate>) -> Result<(), ReplicaError> + Send + Sync>;

/// Delivery strategy used by a [`StateManager`](super::StateManager).
pub trait Synchronizer: Send + Sync {
    /// Hand a batch of updates to the transport.
    fn send(&self, batch: Vec<StateUpdate>) -> Result<(), ReplicaError>;

    /// Strategy of this synchronizer.
    fn mode(&self) -> SyncMode;
}

/// Available delivery strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Deliver on the caller's thread.
    Synchronous,
    /// Deliver from a background worker.
    Queued,
    /// Refuse local changes.
    ReadOnly,
}

impl SyncMode {
    /// Parse `sync`, `async` or `read_only`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sync" | "synchronous" => Some(SyncMode::Synchronous),
            "async" | "queued" => Some(SyncMode::Queued),
            "read_only" | "readonly" => Some(SyncMode::ReadOnly),
            _ => None,
        }
    }
}

/// Synchronizer configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Participant name, used in logs.
    pub name: String,
    /// Delivery strategy.
    pub mode: SyncMode,
    /// Maximum batches waiting in the queue (queued mode only).
    pub queue_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            name: "participant".to_string(),
            mode: SyncMode::Synchronous,
            queue_capacity: 256,
        }
    }
}

impl SyncConfig {
    /// Create config from environment variables.
    ///
    /// Reads `REPLICA_NAME`, `REPLICA_SYNC_MODE` and
    /// `REPLICA_QUEUE_CAPACITY`; anything missing or unparsable keeps its
    /// default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            name: std::env::var("REPLICA_NAME").unwrap_or(defaults.name),
            mode: std::env::var("REPLICA_SYNC_MODE")
                .ok()
                .and_then(|v| SyncMode::parse(&v))
                .unwrap_or(defaults.mode),
            queue_capacity: std::env::var("REPLICA_QUEUE_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.queue_capacity),
        }
    }

    /// Build the configured synchronizer around `transport`.
    ///
    /// Queued mode must be called from inside a tokio runtime.
    pub fn build(&self, transport: Transport) -> Result<Arc<dyn Synchronizer>, ReplicaError> {
        let synchronizer: Arc<dyn Synchronizer> = match self.mode {
            SyncMode::Synchronous => Arc::new(BlockingSynchronizer::with_transport(transport)),
            SyncMode::Queued => Arc::new(QueuedSynchronizer::with_transport(
                transport,
                self.queue_capacity,
            )?),
            SyncMode::ReadOnly => Arc::new(ReadOnlySynchronizer),
        };
        Ok(synchronizer)
    }
}

/// Delivers each batch before returning.
pub struct BlockingSynchronizer {
    transport: Transport,
}

impl BlockingSynchronizer {
    /// Wrap a transport function.
    pub fn new<F>(transport: F) -> Self
    where
        F: Fn(Vec<StateUpdate>) -> Result<(), ReplicaError> + Send + Sync + 'static,
    {
        Self::with_transport(Arc::new(transport))
    }

    /// Wrap a shared transport.
    pub fn with_transport(transport: Transport) -> Self {
        Self { transport }
    }
}

impl Synchronizer for BlockingSynchronizer {
    fn send(&self, batch: Vec<StateUpdate>) -> Result<(), ReplicaError> {
        (self.transport)(batch)
    }

    fn mode(&self) -> SyncMode {
        SyncMode::Synchronous
    }
}

/// Delivers batches from a background worker, in the order they were sent.
///
/// The queue is bounded. A full queue fails the send with
/// [`ReplicaError::QueueFull`] instead of blocking.
pub struct QueuedSynchronizer {
    sender: Mutex<Option<mpsc::Sender<Vec<StateUpdate>>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl QueuedSynchronizer {
    /// Start a worker for a transport function.
    pub fn new<F>(transport: F, capacity: usize) -> Result<Self, ReplicaError>
    where
        F: Fn(Vec<StateUpdate>) -> Result<(), ReplicaError> + Send + Sync + 'static,
    {
        Self::with_transport(Arc::new(transport), capacity)
    }

    /// Start a worker for a shared transport on the current tokio runtime.
    pub fn with_transport(transport: Transport, capacity: usize) -> Result<Self, ReplicaError> {
        let runtime = Handle::try_current().map_err(|_| ReplicaError::NoRuntime)?;
        let (tx, mut rx) = mpsc::channel::<Vec<StateUpdate>>(capacity.max(1));

        // One worker, one delivery at a time: batches arrive in send order.
        let worker = runtime.spawn(async move {
            while let Some(batch) = rx.recv().await {
                let size = batch.len();
                let transport = transport.clone();
                match tokio::task::spawn_blocking(move || transport(batch)).await {
                    Ok(Ok(())) => debug!("Delivered batch of {} updates", size),
                    Ok(Err(e)) => error!("Failed to deliver batch of {} updates: {}", size, e),
                    Err(e) => error!("Delivery task failed: {}", e),
                }
            }
            debug!("Outgoing queue closed");
        });

        Ok(Self {
            sender: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Close the queue, then wait until every accepted batch is delivered.
    ///
    /// Later sends fail with [`ReplicaError::QueueClosed`].
    pub async fn shutdown(&self) {
        drop(self.sender.lock().take());
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!("Queue worker failed: {}", e);
            }
        }
    }
}

impl Synchronizer for QueuedSynchronizer {
    fn send(&self, batch: Vec<StateUpdate>) -> Result<(), ReplicaError> {
        match self.sender.lock().as_ref() {
            Some(tx) => tx.try_send(batch).map_err(|e| match e {
                TrySendError::Full(_) => ReplicaError::QueueFull,
                TrySendError::Closed(_) => ReplicaError::QueueClosed,
            }),
            None => Err(ReplicaError::QueueClosed),
        }
    }

    fn mode(&self) -> SyncMode {
        SyncMode::Queued
    }
}

/// Refuses every send: the participant only mirrors remote state.
///
/// Fields check for this strategy before mutating, so a refused shared
/// change never touches local state. Private fields stay writable.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOnlySynchronizer;

impl Synchronizer for ReadOnlySynchronizer {
    fn send(&self, batch: Vec<StateUpdate>) -> Result<(), ReplicaError> {
        if let Some(update) = batch.first() {
            warn!("Refusing {} for '{}' on read-only participant", update.change.name(), update.key);
        }
        Err(ReplicaError::MutationNotAllowed)
    }

    fn mode(&self) -> SyncMode {
        SyncMode::ReadOnly
    }
}
