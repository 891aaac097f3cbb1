//! Replica State Demo
//!
//! Runs a two-participant local session, then mirrors a component to a
//! second participant through the synchronizer chosen by `REPLICA_*`
//! environment variables.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use replica_state::{
    Component, LocalMultiplayer, QueuedSynchronizer, ReadOnlySynchronizer, ReplicaError,
    StateManager, StateUpdate, SyncConfig, SyncMode, Synchronizer, Transport, VERSION,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    info!("Replica State v{}", VERSION);

    demo_local_session()?;

    let config = SyncConfig::from_env();
    info!("Configured participant '{}' in {:?} mode", config.name, config.mode);
    demo_configured_sync(config).await?;

    Ok(())
}

/// Two participants sharing a property and a list.
fn demo_local_session() -> anyhow::Result<()> {
    info!("=== Local session ===");

    let session = LocalMultiplayer::new(2);
    let first = Component::new("inventory", &session.managers()[0])?;
    let second = Component::new("inventory", &session.managers()[1])?;

    let mana_1 = first.property("mana", 3);
    let mana_2 = second.property("mana", 3);
    mana_1.set(1000)?;
    info!("Participant 2 reads mana = {}", mana_2.get()?);

    let items_1 = first.list::<String>("items", Vec::new())?;
    let items_2 = second.list::<String>("items", Vec::new())?;
    items_1.add_all(["Sword", "Shield", "Potion"].map(String::from))?;
    items_2.set(1, "Large Shield".to_string())?;
    items_1.remove(&"Potion".to_string())?;
    items_2.remove_at(0)?;

    info!("Participant 1 items: {:?}", items_1.to_vec());
    info!("Participant 2 items: {:?}", items_2.to_vec());

    let digests = session.digests()?;
    for (index, digest) in digests.iter().enumerate() {
        info!("Participant {} digest: {}", index + 1, hex::encode(digest));
    }
    info!("Converged: {}", session.converged()?);

    Ok(())
}

/// Mirror a component to a second participant via the configured strategy.
async fn demo_configured_sync(config: SyncConfig) -> anyhow::Result<()> {
    info!("=== {:?} synchronizer ===", config.mode);

    let mirror = StateManager::new("mirror", ReadOnlySynchronizer);
    let peer = mirror.clone();
    let transport: Transport = Arc::new(move |batch: Vec<StateUpdate>| -> Result<(), ReplicaError> {
        for update in batch {
            info!("Wire: {}", update.to_json()?);
            peer.receive(update)?;
        }
        Ok(())
    });

    let queued = match config.mode {
        SyncMode::Queued => Some(Arc::new(QueuedSynchronizer::with_transport(
            transport.clone(),
            config.queue_capacity,
        )?)),
        _ => None,
    };
    let synchronizer: Arc<dyn Synchronizer> = match &queued {
        Some(queued) => queued.clone(),
        None => config.build(transport)?,
    };
    let origin = StateManager::with_synchronizer(config.name.clone(), synchronizer);

    let source = Component::new("scoreboard", &origin)?;
    let copy = Component::new("scoreboard", &mirror)?;
    let scores = source.map::<String, u32>("scores", Default::default())?;
    let mirrored = copy.map::<String, u32>("scores", Default::default())?;

    for (player, score) in [("alice", 12), ("bob", 7), ("alice", 15)] {
        if let Err(e) = scores.put(player.to_string(), score) {
            warn!("Update for {} not delivered: {}", player, e);
        }
    }

    if let Some(queued) = queued {
        queued.shutdown().await;
    }

    info!("Source scores: {:?}", scores.to_map());
    info!("Mirrored scores: {:?}", mirrored.to_map());

    Ok(())
}
