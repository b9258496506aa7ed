//! Pass scheduling seam between triggers and the orchestrator

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Kind of sync pass a trigger asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    Full,
    Quick,
}

/// Runs passes on behalf of triggers such as the change watcher.
///
/// Implementations queue the request; the pass itself runs elsewhere.
pub trait Scheduler: Send + Sync {
    fn run_now(&self, kind: PassKind);
}

/// Scheduler that forwards requests over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelScheduler {
    sender: UnboundedSender<PassKind>,
}

impl ChannelScheduler {
    #[must_use]
    pub fn new() -> (Self, PassRequests) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self { sender },
            PassRequests {
                receiver,
                pending: VecDeque::new(),
            },
        )
    }
}

/// Receiving end of a [`ChannelScheduler`].
///
/// Requests that pile up while a pass runs collapse to one of each kind,
/// kept in arrival order.
#[derive(Debug)]
pub struct PassRequests {
    receiver: UnboundedReceiver<PassKind>,
    pending: VecDeque<PassKind>,
}

impl PassRequests {
    /// Next pass to run, or `None` once every scheduler handle is gone.
    pub async fn recv(&mut self) -> Option<PassKind> {
        if self.pending.is_empty() {
            let kind = self.receiver.recv().await?;
            self.pending.push_back(kind);
        }
        while let Ok(kind) = self.receiver.try_recv() {
            if !self.pending.contains(&kind) {
                self.pending.push_back(kind);
            }
        }
        self.pending.pop_front()
    }
}

impl Scheduler for ChannelScheduler {
    fn run_now(&self, kind: PassKind) {
        if self.sender.send(kind).is_err() {
            tracing::warn!(?kind, "Pass requested after the scheduler shut down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn forwards_requests_in_order() {
        let (scheduler, mut requests) = ChannelScheduler::new();
        scheduler.run_now(PassKind::Quick);
        scheduler.run_now(PassKind::Full);

        assert_eq!(requests.recv().await, Some(PassKind::Quick));
        assert_eq!(requests.recv().await, Some(PassKind::Full));
    }

    #[test]
    fn closed_receiver_is_not_fatal() {
        let (scheduler, requests) = ChannelScheduler::new();
        drop(requests);
        scheduler.run_now(PassKind::Quick);
    }

    #[tokio::test]
    async fn queued_requests_collapse_per_kind() {
        let (scheduler, mut requests) = ChannelScheduler::new();
        for _ in 0..5 {
            scheduler.run_now(PassKind::Quick);
        }
        scheduler.run_now(PassKind::Full);
        scheduler.run_now(PassKind::Quick);

        assert_eq!(requests.recv().await, Some(PassKind::Quick));
        // Arrives while the quick pass runs
        scheduler.run_now(PassKind::Quick);
        assert_eq!(requests.recv().await, Some(PassKind::Full));
        assert_eq!(requests.recv().await, Some(PassKind::Quick));

        drop(scheduler);
        assert_eq!(requests.recv().await, None);
    }
}
