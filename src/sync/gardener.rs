use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::prelude::*;
use crate::store::{self, Store};

use super::SyncConfig;

/// Periodic eventual-deletion pass: spent inputs buried beyond the
/// stability window (only when spends are removed at all) and binary data
/// nothing references anymore. Shares the single writer with the
/// consumer, so the store serializes the two.
pub struct Gardener {
    store: Store,
    input_management: InputManagement,
    stability_window: u64,
    throttle: Duration,
}

impl Gardener {
    pub fn new(config: &SyncConfig, store: Store) -> Self {
        Self {
            store,
            input_management: config.input_management,
            stability_window: config.stability_window,
            throttle: Duration::from_secs(config.prune_throttle_delay_secs),
        }
    }

    pub async fn run(self, cancel: CancellationToken) -> Result<(), Error> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.throttle) => {}
            }

            let (pruned_inputs, pruned_binary_data) = self.store.with_writer(|db| {
                let inputs = match self.input_management {
                    InputManagement::RemoveSpentInputs => {
                        store::prune_inputs(db, self.stability_window)?
                    }
                    InputManagement::MarkSpentInputs => 0,
                };

                let binary_data = store::prune_binary_data(db)?;

                Ok((inputs, binary_data))
            })?;

            info!(pruned_inputs, pruned_binary_data, "pruning pass finished");
        }
    }
}
