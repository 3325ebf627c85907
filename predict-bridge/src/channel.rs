//! Ordered FIFO of outstanding prediction calls.
//!
//! The wire protocol carries no message identifier, so responses are paired
//! to requests purely by position: every arriving line resolves the oldest
//! unresolved call. A call leaves the queue exactly once, by exactly one of
//! three paths: a matching response line, its own deadline, or a worker
//! crash/stop drain.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::oneshot;
use tracing::warn;

use crate::error::PredictError;
use crate::protocol::Prediction;

/// What a pending call eventually resolves to.
pub(crate) type CallResult = Result<Prediction, PredictError>;

/// One outstanding call, queued in stdin write order.
struct PendingCall {
    id: u64,
    resolver: oneshot::Sender<CallResult>,
}

/// FIFO collection of outstanding calls for one worker generation.
pub(crate) struct RequestChannel {
    queue: Mutex<VecDeque<PendingCall>>,
    next_id: AtomicU64,
}

impl RequestChannel {
    pub(crate) fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Append a new pending call at the tail.
    ///
    /// The FIFO position of a call must equal the order its request line is
    /// written to the worker's stdin, so callers must hold the stdin writer
    /// lock across this registration and the write that follows it.
    pub(crate) fn register(&self) -> (u64, oneshot::Receiver<CallResult>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.lock().push_back(PendingCall { id, resolver: tx });
        (id, rx)
    }

    /// Resolve the oldest outstanding call with `result`.
    ///
    /// Returns false if the FIFO was empty: a response line with no
    /// outstanding call is a protocol violation by the worker, logged and
    /// otherwise ignored.
    pub(crate) fn resolve_head(&self, result: CallResult) -> bool {
        let call = self.lock().pop_front();
        match call {
            Some(call) => {
                // Receiver may be gone if the caller was cancelled.
                let _ = call.resolver.send(result);
                true
            }
            None => {
                warn!("Response line arrived with no outstanding call; dropping it");
                false
            }
        }
    }

    /// Remove one call by identity, regardless of its current position.
    ///
    /// Used by the timeout guard: other calls may have resolved since this
    /// one was queued, so its FIFO index is meaningless. Returns false if
    /// the call already left the queue through another path.
    pub(crate) fn expire(&self, id: u64) -> bool {
        let mut queue = self.lock();
        match queue.iter().position(|call| call.id == id) {
            Some(index) => queue.remove(index).is_some(),
            None => false,
        }
    }

    /// Fail every outstanding call. Returns how many were drained.
    pub(crate) fn drain(&self, reason: impl Fn() -> PredictError) -> usize {
        let calls: Vec<PendingCall> = self.lock().drain(..).collect();
        let drained = calls.len();
        for call in calls {
            let _ = call.resolver.send(Err(reason()));
        }
        drained
    }

    /// Number of outstanding calls.
    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<PendingCall>> {
        // No code path can panic while holding the lock, but recover from
        // poisoning anyway rather than propagating a panic to callers.
        match self.queue.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
