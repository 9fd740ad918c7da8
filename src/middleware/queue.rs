//! FIFO queue of requests parked behind an in-flight refresh.
//!
//! Each parked request holds a oneshot paired with a monotonic sequence
//! number, so replay order is auditable: release always walks the queue in
//! enqueue order.

use std::collections::VecDeque;

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::ApiError;

/// Signal delivered to a parked request: `Ok(())` means "tokens are fresh,
/// replay yourself"; `Err` means the refresh was abandoned.
pub type WakeSignal = Result<(), ApiError>;

#[derive(Debug)]
pub struct PendingRequest {
    pub seq: u64,
    pub enqueued_at: Instant,
    tx: oneshot::Sender<WakeSignal>,
}

#[derive(Debug, Default)]
pub struct PendingQueue {
    items: VecDeque<PendingRequest>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a request; the caller awaits the returned receiver.
    pub fn push(&mut self, seq: u64, now: Instant) -> oneshot::Receiver<WakeSignal> {
        let (tx, rx) = oneshot::channel();
        self.items.push_back(PendingRequest {
            seq,
            enqueued_at: now,
            tx,
        });
        rx
    }

    /// Wake every parked request for replay, in enqueue order.
    pub fn release_all(&mut self) {
        let released = self.items.len();
        for req in self.items.drain(..) {
            // Receiver may have given up (queue timeout); that's fine.
            let _ = req.tx.send(Ok(()));
        }
        if released > 0 {
            tracing::debug!(released, "replaying queued requests");
        }
    }

    /// Reject every parked request with `err`.
    pub fn reject_all(&mut self, err: ApiError) {
        let rejected = self.items.len();
        for req in self.items.drain(..) {
            let _ = req.tx.send(Err(err.clone()));
        }
        if rejected > 0 {
            tracing::warn!(rejected, error = %err, "dropping queued requests");
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
