use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::model::{BlockSlot, ChainPoint, InputManagement, Tip};

/// Condition of the connection with the upstream producer.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize, Default,
)]
pub enum ConnectionStatus {
    #[serde(rename = "connected")]
    Connected,
    #[serde(rename = "disconnected")]
    #[default]
    Disconnected,
}

/// An overview of the server & connection status. When
/// `most_recent_checkpoint` and `most_recent_node_tip` are equal, the
/// index is fully synchronized.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub connection_status: ConnectionStatus,
    pub most_recent_checkpoint: Option<BlockSlot>,
    pub most_recent_node_tip: Option<BlockSlot>,
    pub configuration: HealthConfiguration,
    pub version: String,
}

#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthConfiguration {
    pub input_management: InputManagement,
}

macro_rules! string_or_nan {
    ($value:expr) => {
        match $value {
            Some(inner) => inner.to_string(),
            None => "NaN".to_string(),
        }
    };
}

impl Health {
    pub fn to_prometheus(&self) -> String {
        let connected = match self.connection_status {
            ConnectionStatus::Connected => "1.0",
            ConnectionStatus::Disconnected => "0.0",
        };
        let checkpoint = string_or_nan!(self.most_recent_checkpoint);
        let node_tip = string_or_nan!(self.most_recent_node_tip);

        format!(
            "# TYPE farol_connection_status gauge\n\
            farol_connection_status {connected}\n\n\
            # TYPE farol_most_recent_checkpoint counter\n\
            farol_most_recent_checkpoint {checkpoint}\n\n\
            # TYPE farol_most_recent_node_tip counter\n\
            farol_most_recent_node_tip {node_tip}\n",
        )
    }
}

#[derive(Default)]
struct HealthState {
    connected: bool,
    most_recent_checkpoint: Option<ChainPoint>,
    most_recent_node_tip: Option<Tip>,
}

/// Single shared cell updated by the chain-sync client and the consumer;
/// readers observe the last published value.
#[derive(Clone, Default)]
pub struct HealthTracker {
    state: Arc<RwLock<HealthState>>,
    input_management: InputManagement,
}

impl HealthTracker {
    pub fn new(input_management: InputManagement) -> Self {
        Self {
            state: Arc::new(RwLock::new(HealthState::default())),
            input_management,
        }
    }

    pub fn set_connected(&self, connected: bool) {
        let mut guard = self.state.write().expect("health cell poisoned");
        guard.connected = connected;
    }

    /// Seeds the checkpoint from the store before the pipeline starts,
    /// so early readers see where a previous run left off.
    pub fn prime(&self, checkpoint: Option<ChainPoint>) {
        let mut guard = self.state.write().expect("health cell poisoned");
        guard.most_recent_checkpoint = checkpoint;
    }

    /// Published by the consumer after every applied transaction.
    pub fn set_checkpoint(&self, tip: Tip, checkpoint: Option<ChainPoint>) {
        let mut guard = self.state.write().expect("health cell poisoned");
        guard.most_recent_node_tip = Some(tip);
        guard.most_recent_checkpoint = checkpoint;
    }

    pub fn set_node_tip(&self, tip: Tip) {
        let mut guard = self.state.write().expect("health cell poisoned");
        guard.most_recent_node_tip = Some(tip);
    }

    pub fn most_recent_checkpoint(&self) -> Option<ChainPoint> {
        let guard = self.state.read().expect("health cell poisoned");
        guard.most_recent_checkpoint
    }

    pub fn most_recent_node_tip(&self) -> Option<Tip> {
        let guard = self.state.read().expect("health cell poisoned");
        guard.most_recent_node_tip
    }

    pub fn snapshot(&self) -> Health {
        let guard = self.state.read().expect("health cell poisoned");

        Health {
            connection_status: if guard.connected {
                ConnectionStatus::Connected
            } else {
                ConnectionStatus::Disconnected
            },
            most_recent_checkpoint: guard.most_recent_checkpoint.as_ref().map(ChainPoint::slot),
            most_recent_node_tip: guard.most_recent_node_tip.as_ref().map(ChainPoint::slot),
            configuration: HealthConfiguration {
                input_management: self.input_management,
            },
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pallas::crypto::hash::Hash;

    #[test]
    fn snapshot_reflects_latest_publication() {
        let tracker = HealthTracker::new(InputManagement::MarkSpentInputs);

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.connection_status, ConnectionStatus::Disconnected);
        assert_eq!(snapshot.most_recent_checkpoint, None);

        let tip = ChainPoint::Specific(42, Hash::new([1u8; 32]));
        let checkpoint = ChainPoint::Specific(40, Hash::new([2u8; 32]));

        tracker.set_connected(true);
        tracker.set_checkpoint(tip, Some(checkpoint));

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.connection_status, ConnectionStatus::Connected);
        assert_eq!(snapshot.most_recent_checkpoint, Some(40));
        assert_eq!(snapshot.most_recent_node_tip, Some(42));
    }

    #[test]
    fn prometheus_rendering_uses_nan_for_missing() {
        let tracker = HealthTracker::new(InputManagement::RemoveSpentInputs);
        let text = tracker.snapshot().to_prometheus();

        assert!(text.contains("farol_connection_status 0.0"));
        assert!(text.contains("farol_most_recent_checkpoint NaN"));
    }
}
