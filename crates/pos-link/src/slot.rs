//! The single in-flight request slot
//!
//! A [`Slot`] holds at most one pending request together with the oneshot
//! sender its caller is waiting on and the instant its response window
//! closes. Settling the slot removes the deadline along with the request,
//! so a timer from one request can never fire against the next one.
//!
//! Everything here is synchronous; the coordinator drives it from its
//! actor loop.

use std::time::Duration;

use pos_protocol::TerminalCommand;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use crate::error::LinkError;
use crate::outcome::{FailureOutcome, HealthOutcome, TransactionOutcome};
use crate::router::Route;

/// Identifier of one request occupying a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(pub u64);

/// A request that has just left the slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settled {
    pub id: SlotId,
    pub route: Route,
    /// Time from install to settle
    pub elapsed: Duration,
}

/// A request waiting for its response
#[derive(Debug)]
pub struct Pending<T> {
    pub id: SlotId,
    pub command: TerminalCommand,
    pub route: Route,
    pub created_at: Instant,
    pub deadline: Instant,
    reply: oneshot::Sender<T>,
}

/// Single-occupancy request slot
#[derive(Debug)]
pub struct Slot<T> {
    pending: Option<Pending<T>>,
    next_id: u64,
}

/// Slot for payment transactions
pub type TransactionSlot = Slot<TransactionOutcome>;

/// Slot for health checks
pub type HealthSlot = Slot<HealthOutcome>;

impl<T: FailureOutcome> Slot<T> {
    pub fn new() -> Self {
        Self {
            pending: None,
            next_id: 1,
        }
    }

    pub fn is_occupied(&self) -> bool {
        self.pending.is_some()
    }

    /// When the current response window closes
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.deadline)
    }

    /// Occupy the slot
    ///
    /// If the slot is already occupied the caller is answered with
    /// `BUSY` immediately and the outstanding request is left alone.
    pub fn install(
        &mut self,
        command: TerminalCommand,
        route: Route,
        reply: oneshot::Sender<T>,
        now: Instant,
        deadline: Instant,
    ) -> Result<SlotId, LinkError> {
        if self.pending.is_some() {
            let _ = reply.send(T::from_error(&LinkError::Busy));
            return Err(LinkError::Busy);
        }

        let id = SlotId(self.next_id);
        self.next_id += 1;
        self.pending = Some(Pending {
            id,
            command,
            route,
            created_at: now,
            deadline,
            reply,
        });
        Ok(id)
    }

    /// Whether the pending request's window has closed at `now`
    pub fn is_expired(&self, now: Instant) -> bool {
        self.deadline().is_some_and(|deadline| deadline <= now)
    }

    /// Resolve the pending request with `outcome`
    ///
    /// Returns `None` if the slot was already empty (a late event for a
    /// request that has already settled); the outcome is dropped.
    pub fn settle(&mut self, outcome: T) -> Option<Settled> {
        let pending = self.pending.take()?;
        if pending.reply.send(outcome).is_err() {
            debug!("Caller for request {} went away before it settled", pending.id.0);
        }
        Some(Settled {
            id: pending.id,
            route: pending.route,
            elapsed: pending.created_at.elapsed(),
        })
    }

    /// Fail the pending request with a link error
    pub fn fail(&mut self, err: &LinkError) -> Option<Settled> {
        self.settle(T::from_error(err))
    }
}

impl<T: FailureOutcome> Default for Slot<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pos_protocol::TransactionRequest;
    use proptest::prelude::*;

    fn sale() -> TerminalCommand {
        TerminalCommand::Transaction(TransactionRequest::sale(5000).unwrap())
    }

    #[test]
    fn test_second_install_is_busy() {
        let mut slot = TransactionSlot::new();
        let now = Instant::now();
        let (tx1, mut rx1) = oneshot::channel();
        let (tx2, mut rx2) = oneshot::channel();

        slot.install(sale(), Route::Serial, tx1, now, now + Duration::from_secs(30))
            .unwrap();
        let err = slot
            .install(sale(), Route::Serial, tx2, now, now + Duration::from_secs(30))
            .unwrap_err();
        assert_eq!(err, LinkError::Busy);

        let busy = rx2.try_recv().unwrap();
        assert_eq!(busy.error_code(), Some("BUSY"));
        assert!(rx1.try_recv().is_err());
        assert!(slot.is_occupied());
    }

    #[test]
    fn test_expire_respects_deadline() {
        let mut slot = HealthSlot::new();
        let now = Instant::now();
        let (tx, mut rx) = oneshot::channel();
        slot.install(
            TerminalCommand::HealthCheck,
            Route::Serial,
            tx,
            now,
            now + Duration::from_secs(5),
        )
        .unwrap();

        assert!(!slot.is_expired(now + Duration::from_millis(4999)));
        assert!(slot.is_expired(now + Duration::from_secs(5)));
        let settled = slot.fail(&LinkError::Timeout).unwrap();
        assert_eq!(settled.route, Route::Serial);
        assert!(!rx.try_recv().unwrap().success);
        assert_eq!(slot.deadline(), None);
    }

    #[test]
    fn test_late_settle_is_noop() {
        let mut slot = TransactionSlot::new();
        let now = Instant::now();
        let (tx, mut rx) = oneshot::channel();
        slot.install(sale(), Route::Simulator, tx, now, now).unwrap();

        assert!(slot.is_expired(now));
        assert!(slot.fail(&LinkError::Timeout).is_some());
        let late = TransactionOutcome {
            success: true,
            ..TransactionOutcome::failed(&LinkError::Timeout)
        };
        assert_eq!(slot.settle(late), None);
        assert_eq!(rx.try_recv().unwrap().error_code(), Some("TIMEOUT"));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Install,
        Respond,
        Advance(u64),
        Cancel,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Install),
            Just(Op::Respond),
            (0u64..40_000).prop_map(Op::Advance),
            Just(Op::Cancel),
        ]
    }

    proptest! {
        #[test]
        fn at_most_one_pending_and_first_writer_wins(ops in proptest::collection::vec(op(), 1..64)) {
            let mut slot = TransactionSlot::new();
            let start = Instant::now();
            let mut now = start;
            let window = Duration::from_secs(30);
            let mut receivers = Vec::new();
            let mut accepted = 0usize;
            let mut settled = 0usize;

            for op in ops {
                match op {
                    Op::Install => {
                        let (tx, rx) = oneshot::channel();
                        let was_occupied = slot.is_occupied();
                        let result = slot.install(sale(), Route::Serial, tx, now, now + window);
                        prop_assert_eq!(result.is_err(), was_occupied);
                        if result.is_ok() {
                            accepted += 1;
                        }
                        receivers.push(rx);
                    }
                    Op::Respond => {
                        let outcome = TransactionOutcome::failed(&LinkError::Declined {
                            code: "DECLINED".into(),
                            message: "no".into(),
                        });
                        if slot.settle(outcome).is_some() {
                            settled += 1;
                        }
                    }
                    Op::Advance(ms) => {
                        now += Duration::from_millis(ms);
                        if slot.is_expired(now) && slot.fail(&LinkError::Timeout).is_some() {
                            settled += 1;
                        }
                    }
                    Op::Cancel => {
                        if slot.fail(&LinkError::Cancelled("test".into())).is_some() {
                            settled += 1;
                        }
                    }
                }
                // At most one request is ever outstanding.
                prop_assert_eq!(accepted - settled, usize::from(slot.is_occupied()));
            }

            // Every settled or rejected caller got exactly one answer.
            let answered = receivers
                .iter_mut()
                .map(|rx| rx.try_recv().is_ok())
                .filter(|&ok| ok)
                .count();
            prop_assert_eq!(answered, receivers.len() - usize::from(slot.is_occupied()));
        }
    }
}
