use pallas::ledger::traverse::MultiEraBlock;
use tracing::{debug, info};

use crate::health::HealthTracker;
use crate::mailbox::{Drained, MailboxReceiver, RollbackAck};
use crate::matching::{match_block, BlockMatch};
use crate::prelude::*;
use crate::registry::PatternRegistry;
use crate::store::{self, Store, StoreError};

use super::SyncConfig;

/// Single task draining the mailbox and applying its messages to the
/// store, one transaction per drained unit. Store failures are not
/// recovered here: the error reaches the supervisor, which tears the
/// pipeline down and restarts from the last persisted checkpoint.
pub struct Consumer {
    store: Store,
    registry: PatternRegistry,
    health: HealthTracker,
    mailbox: MailboxReceiver,
    input_management: InputManagement,
    stability_window: u64,
}

impl Consumer {
    pub fn new(
        config: &SyncConfig,
        store: Store,
        registry: PatternRegistry,
        health: HealthTracker,
        mailbox: MailboxReceiver,
    ) -> Self {
        Self {
            store,
            registry,
            health,
            mailbox,
            input_management: config.input_management,
            stability_window: config.stability_window,
        }
    }

    pub async fn run(mut self) -> Result<(), Error> {
        loop {
            match self.mailbox.drain().await {
                Ok(Drained::Forward(items)) => self.on_roll_forward(items)?,
                Ok(Drained::Backward(tip, point, ack)) => {
                    self.on_roll_backward(tip, point, ack)?
                }
                Err(_) => return Err(Error::message("mailbox closed")),
            }
        }
    }

    fn on_roll_forward(&self, items: Vec<(Tip, RawBlock)>) -> Result<(), Error> {
        let patterns = self.registry.snapshot();

        let mut batch: Vec<(Tip, ChainPoint, BlockMatch)> = Vec::with_capacity(items.len());
        for (tip, raw) in &items {
            let block = MultiEraBlock::decode(&raw.body).map_err(Error::parse)?;
            let point = ChainPoint::Specific(raw.slot, raw.hash);
            let matched = match_block(&patterns, &block, &point)?;
            batch.push((*tip, point, matched));
        }

        let Some((last_tip, last_point)) = batch.last().map(|(tip, point, _)| (*tip, *point))
        else {
            return Ok(());
        };

        self.store.with_writer(|db| {
            for (tip, point, matched) in &batch {
                store::insert_checkpoints(db, [*point])?;
                store::insert_inputs(db, matched.produced.iter().cloned())?;
                self.record_spends(db, tip, point, &matched.spent)?;
                store::insert_binary_data(
                    db,
                    matched.datums.iter().map(|(hash, bytes)| (hash, bytes.as_slice())),
                )?;
                store::insert_scripts(
                    db,
                    matched.scripts.iter().map(|(hash, script)| (hash, script)),
                )?;
            }
            Ok(())
        })?;

        debug!(
            blocks = batch.len(),
            slot = last_point.slot(),
            "roll forward applied"
        );

        self.health.set_checkpoint(last_tip, Some(last_point));

        Ok(())
    }

    fn record_spends(
        &self,
        db: &rusqlite::Connection,
        tip: &Tip,
        point: &ChainPoint,
        refs: &[OutputReference],
    ) -> Result<(), StoreError> {
        match self.input_management {
            InputManagement::MarkSpentInputs => {
                store::mark_inputs_spent(db, point, refs)?;
            }
            InputManagement::RemoveSpentInputs => {
                // deleting is irreversible, so only do it once the spend
                // sits deeper than the longest possible rollback
                if distance_to_tip(tip, point.slot()) > self.stability_window {
                    store::delete_inputs_by_reference(db, refs)?;
                } else {
                    store::mark_inputs_spent(db, point, refs)?;
                }
            }
        }

        Ok(())
    }

    fn on_roll_backward(
        &self,
        tip: Tip,
        point: ChainPoint,
        ack: Option<RollbackAck>,
    ) -> Result<(), Error> {
        let checkpoint = self.store.with_writer(|db| {
            store::rollback_to(db, point.slot())?;
            store::most_recent_checkpoint(db)
        })?;

        info!(slot = point.slot(), "rolled back");

        self.health.set_checkpoint(tip, checkpoint);

        if let Some(ack) = ack {
            let _ = ack.send(checkpoint);
        }

        Ok(())
    }
}
