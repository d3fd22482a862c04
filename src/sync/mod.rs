use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::health::HealthTracker;
use crate::mailbox;
use crate::prelude::*;
use crate::registry::PatternRegistry;
use crate::store::Store;

pub mod apply;
pub mod fetch;
pub mod gardener;
pub mod pull;

/// Pause between pipeline incarnations after a crash.
const RESTART_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Node-to-client socket of the local node.
    pub socket_path: std::path::PathBuf,
    pub network_magic: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub input_management: InputManagement,

    /// Longest rollback the chain can produce, in slots. Defaults to the
    /// mainnet security window (3k/f).
    #[serde(default = "default_stability_window")]
    pub stability_window: u64,

    #[serde(default = "default_prune_throttle")]
    pub prune_throttle_delay_secs: u64,
}

fn default_stability_window() -> u64 {
    129_600
}

fn default_prune_throttle() -> u64 {
    60
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            input_management: InputManagement::default(),
            stability_window: default_stability_window(),
            prune_throttle_delay_secs: default_prune_throttle(),
        }
    }
}

/// Runs the pipeline (chain-sync client, consumer, gardener) under a
/// supervisor: a crashed task tears down its siblings and the whole thing
/// restarts from the last persisted checkpoint. Mailbox contents are
/// dropped on restart; chain-sync re-delivers from the checkpoint.
pub async fn run(
    upstream: UpstreamConfig,
    config: SyncConfig,
    store: Store,
    registry: PatternRegistry,
    health: HealthTracker,
    commands: pull::CommandChannel,
    cancel: CancellationToken,
) -> Result<(), Error> {
    loop {
        let (sender, receiver) = mailbox::mailbox();

        let client = pull::ChainSync::new(
            &upstream,
            store.clone(),
            sender,
            health.clone(),
            commands.clone(),
        );
        let consumer = apply::Consumer::new(
            &config,
            store.clone(),
            registry.clone(),
            health.clone(),
            receiver,
        );
        let gardener = gardener::Gardener::new(&config, store.clone());

        let mut client_task = tokio::spawn(client.run());
        let mut consumer_task = tokio::spawn(consumer.run());
        let mut gardener_task = tokio::spawn(gardener.run(cancel.clone()));

        let failure = tokio::select! {
            _ = cancel.cancelled() => {
                client_task.abort();
                consumer_task.abort();
                gardener_task.abort();
                return Ok(());
            }
            ended = &mut client_task => ended,
            ended = &mut consumer_task => ended,
            ended = &mut gardener_task => ended,
        };

        client_task.abort();
        consumer_task.abort();
        gardener_task.abort();

        match failure {
            Ok(Err(err @ Error::IntersectionNotFound(_))) => {
                error!(%err, "cannot continue without an intersection");
                return Err(err);
            }
            Ok(Err(err)) => {
                warn!(%err, "pipeline task crashed, restarting from last checkpoint");
            }
            Ok(Ok(())) => {
                warn!("pipeline task finished unexpectedly, restarting");
            }
            Err(join) => {
                if join.is_cancelled() {
                    return Ok(());
                }
                warn!(%join, "pipeline task panicked, restarting from last checkpoint");
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(RESTART_DELAY) => {}
        }
    }
}
