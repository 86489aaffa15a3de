//! One-shot waiters for hub acknowledgements.
//!
//! Acks carry no correlation id on the wire, so waiters of one kind form a
//! FIFO: every ack or rejection resolves the oldest pending waiter.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, oneshot};
use tracing::trace;

/// How a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AckOutcome {
    Accepted,
    Rejected,
    TimedOut,
    /// The connection went away before an answer arrived.
    Dropped,
}

impl AckOutcome {
    pub(crate) fn is_accepted(self) -> bool {
        self == Self::Accepted
    }
}

#[derive(Debug)]
struct Waiter {
    id: u64,
    label: String,
    tx: oneshot::Sender<bool>,
}

/// Pending waiters of one kind.
#[derive(Debug, Default)]
pub(crate) struct Waiters {
    next_id: AtomicU64,
    pending: Mutex<VecDeque<Waiter>>,
}

/// Handle to one pending waiter.
#[derive(Debug)]
pub(crate) struct Ticket {
    id: u64,
    rx: oneshot::Receiver<bool>,
}

impl Waiters {
    /// Queues a waiter; `label` only appears in logs.
    pub(crate) async fn push(&self, label: impl Into<String>) -> Ticket {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.push_back(Waiter {
            id,
            label: label.into(),
            tx,
        });
        Ticket { id, rx }
    }

    /// Answers the oldest waiter, returning its label.
    pub(crate) async fn resolve_oldest(&self, accepted: bool) -> Option<String> {
        let waiter = self.pending.lock().await.pop_front()?;
        trace!(label = %waiter.label, accepted, "ack resolved");
        // The receiver is gone only if the wait already ended.
        let _ = waiter.tx.send(accepted);
        Some(waiter.label)
    }

    /// Removes a waiter that is still pending.
    pub(crate) async fn cancel(&self, ticket: &Ticket) -> bool {
        let mut pending = self.pending.lock().await;
        match pending.iter().position(|w| w.id == ticket.id) {
            Some(index) => pending.remove(index).is_some(),
            None => false,
        }
    }

    /// Drops every pending waiter; their waits end as [`AckOutcome::Dropped`].
    pub(crate) async fn clear(&self) {
        self.pending.lock().await.clear();
    }

    pub(crate) async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Waits for the ticket's answer for at most `limit`.
    ///
    /// On timeout only the wait is abandoned; an answer that raced the
    /// timeout is still honoured.
    pub(crate) async fn wait(&self, mut ticket: Ticket, limit: Duration) -> AckOutcome {
        match tokio::time::timeout(limit, &mut ticket.rx).await {
            Ok(Ok(accepted)) => outcome(accepted),
            Ok(Err(_)) => AckOutcome::Dropped,
            Err(_) => {
                if self.cancel(&ticket).await {
                    return AckOutcome::TimedOut;
                }
                match ticket.rx.try_recv() {
                    Ok(accepted) => outcome(accepted),
                    Err(_) => AckOutcome::Dropped,
                }
            }
        }
    }
}

fn outcome(accepted: bool) -> AckOutcome {
    if accepted {
        AckOutcome::Accepted
    } else {
        AckOutcome::Rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn resolves_in_fifo_order() {
        let waiters = Waiters::default();
        let first = waiters.push("a").await;
        let second = waiters.push("b").await;

        assert_eq!(waiters.resolve_oldest(true).await.as_deref(), Some("a"));
        assert_eq!(waiters.resolve_oldest(false).await.as_deref(), Some("b"));
        assert_eq!(waiters.resolve_oldest(true).await, None);

        let limit = Duration::from_secs(1);
        assert_eq!(waiters.wait(first, limit).await, AckOutcome::Accepted);
        assert_eq!(waiters.wait(second, limit).await, AckOutcome::Rejected);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_removes_only_that_waiter() {
        let waiters = Waiters::default();
        let first = waiters.push("a").await;
        let _second = waiters.push("b").await;

        assert_eq!(
            waiters.wait(first, Duration::from_millis(100)).await,
            AckOutcome::TimedOut
        );
        assert_eq!(waiters.len().await, 1);
        assert_eq!(waiters.resolve_oldest(true).await.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn clear_drops_pending_waits() {
        let waiters = Arc::new(Waiters::default());
        let ticket = waiters.push("a").await;
        let handle = {
            let waiters = waiters.clone();
            tokio::spawn(async move { waiters.wait(ticket, Duration::from_secs(60)).await })
        };
        tokio::task::yield_now().await;
        waiters.clear().await;
        assert_eq!(handle.await.unwrap(), AckOutcome::Dropped);
    }

    #[tokio::test]
    async fn answer_before_wait_is_kept() {
        let waiters = Waiters::default();
        let ticket = waiters.push("a").await;
        waiters.resolve_oldest(true).await;
        assert!(waiters.wait(ticket, Duration::ZERO).await.is_accepted());
    }
}
