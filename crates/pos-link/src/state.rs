//! Coordinator state snapshots

use serde::{Deserialize, Serialize};

use crate::channel::ChannelMeta;

/// Unique identifier for a channel opened by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub u32);

impl ChannelId {
    /// Get the raw id value
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

/// Where the single transaction slot currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransactionPhase {
    /// Nothing outstanding
    #[default]
    Idle,
    /// Command accepted, line being written
    AwaitingSend,
    /// Line written, response window running
    AwaitingResponse,
}

/// Whether a simulated terminal is attached
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatorStatus {
    pub running: bool,
    /// Virtual port name while running
    pub transport_identifier: Option<String>,
}

/// Snapshot returned by a status query
#[derive(Debug, Clone)]
pub struct CoordinatorStatus {
    pub phase: TransactionPhase,
    /// Active channel, if any
    pub channel: Option<ChannelMeta>,
    pub health_check_pending: bool,
    pub simulator: SimulatorStatus,
}

impl CoordinatorStatus {
    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }
}
