//! Unified event stream for the coordinator
//!
//! Lifecycle changes, wire traffic and settled outcomes are all published
//! on one broadcast channel. Publishing never blocks the coordinator;
//! slow subscribers lag and skip events instead.

use std::time::SystemTime;

use crate::channel::ChannelMeta;
use crate::outcome::{HealthOutcome, TransactionOutcome};
use crate::router::Route;
use crate::state::{ChannelId, TransactionPhase};

/// Unified event enum for all coordinator activity
#[derive(Debug, Clone)]
pub enum TerminalEvent {
    // -------------------------------------------------------------------------
    // Channel lifecycle events
    // -------------------------------------------------------------------------
    /// A channel became the active one
    ChannelOpened { meta: ChannelMeta },

    /// The active channel was closed
    ChannelClosed { channel: ChannelId, reason: String },

    // -------------------------------------------------------------------------
    // Traffic events
    // -------------------------------------------------------------------------
    /// Command written to the terminal (host -> terminal)
    CommandSent {
        channel: ChannelId,
        data: Vec<u8>,
        timestamp: SystemTime,
    },

    /// Line received from the terminal (terminal -> host)
    LineReceived {
        channel: ChannelId,
        data: Vec<u8>,
        timestamp: SystemTime,
    },

    /// Line dropped without affecting any request
    LineDiscarded {
        channel: ChannelId,
        data: Vec<u8>,
        reason: String,
    },

    // -------------------------------------------------------------------------
    // Transaction events
    // -------------------------------------------------------------------------
    /// The transaction slot moved to a new phase
    PhaseChanged {
        from: TransactionPhase,
        to: TransactionPhase,
    },

    /// A transaction resolved (success or failure)
    TransactionSettled {
        route: Route,
        outcome: TransactionOutcome,
    },

    /// A health check resolved
    HealthChecked { outcome: HealthOutcome },

    /// An error occurred outside any request
    Error { source: String, message: String },
}

impl TerminalEvent {
    /// Check if this is a traffic event (for traffic monitor filtering)
    pub fn is_traffic(&self) -> bool {
        matches!(
            self,
            TerminalEvent::CommandSent { .. }
                | TerminalEvent::LineReceived { .. }
                | TerminalEvent::LineDiscarded { .. }
        )
    }

    /// Check if this is a channel lifecycle event
    pub fn is_channel_lifecycle(&self) -> bool {
        matches!(
            self,
            TerminalEvent::ChannelOpened { .. } | TerminalEvent::ChannelClosed { .. }
        )
    }

    /// Get the channel id if this event is associated with a specific channel
    pub fn channel_id(&self) -> Option<ChannelId> {
        match self {
            TerminalEvent::ChannelOpened { meta } => Some(meta.id),
            TerminalEvent::ChannelClosed { channel, .. }
            | TerminalEvent::CommandSent { channel, .. }
            | TerminalEvent::LineReceived { channel, .. }
            | TerminalEvent::LineDiscarded { channel, .. } => Some(*channel),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelKind;

    #[test]
    fn test_traffic_event_classification() {
        let sent = TerminalEvent::CommandSent {
            channel: ChannelId(1),
            data: b"TEST\r\n".to_vec(),
            timestamp: SystemTime::now(),
        };
        assert!(sent.is_traffic());
        assert!(!sent.is_channel_lifecycle());

        let opened = TerminalEvent::ChannelOpened {
            meta: ChannelMeta {
                id: ChannelId(4),
                kind: ChannelKind::Serial,
                port_name: "/dev/ttyUSB0".into(),
                baud_rate: Some(9600),
            },
        };
        assert!(!opened.is_traffic());
        assert!(opened.is_channel_lifecycle());
        assert_eq!(opened.channel_id(), Some(ChannelId(4)));
    }

    #[test]
    fn test_phase_event_has_no_channel() {
        let event = TerminalEvent::PhaseChanged {
            from: TransactionPhase::Idle,
            to: TransactionPhase::AwaitingSend,
        };
        assert_eq!(event.channel_id(), None);
    }
}
