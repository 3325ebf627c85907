//! Failure taxonomy for the prediction bridge.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by [`crate::PredictionBridge::predict`].
///
/// Every variant maps to exactly one stage of a call's life. The bridge never
/// retries on its own; retry policy belongs to the caller.
#[derive(Error, Debug)]
pub enum PredictError {
    /// The caller's feature vector was rejected before anything was sent.
    #[error("Invalid feature vector: {0}")]
    Validation(String),

    /// The worker did not signal readiness within the wait budget. Nothing
    /// was enqueued or written.
    #[error("Worker not ready within {0:?}")]
    NotReady(Duration),

    /// The request was sent but no response arrived within the deadline.
    #[error("Worker did not respond within {0:?}")]
    Timeout(Duration),

    /// The worker failed to spawn, its stdin broke, or the process exited.
    /// Every call queued at that moment fails with this.
    #[error("Worker crashed: {0}")]
    WorkerCrash(String),

    /// A response line could not be decoded. Fails only the oldest
    /// outstanding call; the channel stays usable.
    #[error("Malformed response from worker: {0}")]
    MalformedResponse(String),

    /// The worker answered in-protocol with `success: false`.
    #[error("Worker rejected the request: {0}")]
    Rejected(String),

    /// The bridge was explicitly stopped while the call was in flight.
    #[error("Bridge stopped while the call was in flight")]
    Stopped,
}
