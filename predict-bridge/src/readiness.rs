//! Readiness handshake with the worker's diagnostic stream.
//!
//! The worker announces readiness by printing the literal `READY` line to
//! stderr. The gate's flag starts false on every spawn and is set exactly
//! once per worker lifetime; callers poll it with a bounded budget before
//! sending anything.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, info, warn};

use crate::protocol::{ERROR_LINE_PREFIX, READY_SENTINEL};

/// Per-worker readiness flag.
pub(crate) struct ReadinessGate {
    ready: AtomicBool,
}

impl ReadinessGate {
    pub(crate) fn new() -> Self {
        Self {
            ready: AtomicBool::new(false),
        }
    }

    /// Set the flag. Returns false if it was already set.
    pub(crate) fn mark_ready(&self) -> bool {
        !self.ready.swap(true, Ordering::SeqCst)
    }

    /// Clear the flag (worker gone).
    pub(crate) fn reset(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Poll the flag at `poll_interval` until it is set or `budget` elapses.
    ///
    /// Returns whether the worker became ready in time. A false return means
    /// the caller must fail with `NotReady` without touching the request
    /// channel.
    pub(crate) async fn await_ready(&self, budget: Duration, poll_interval: Duration) -> bool {
        let start = tokio::time::Instant::now();
        loop {
            if self.is_ready() {
                return true;
            }
            if start.elapsed() >= budget {
                return false;
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

/// Consume the worker's stderr line by line until EOF.
///
/// The literal `READY` line flips the gate; `ERROR`-prefixed lines are
/// surfaced as warnings; everything else is passed through at debug level.
pub(crate) async fn watch_stderr<R>(stderr: R, gate: Arc<ReadinessGate>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line == READY_SENTINEL {
                    if gate.mark_ready() {
                        info!("Prediction worker signalled ready");
                    }
                } else if line.starts_with(ERROR_LINE_PREFIX) {
                    warn!(line = %line, "Prediction worker diagnostic error");
                } else {
                    debug!(line = %line, "Prediction worker diagnostic");
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Failed to read worker stderr");
                break;
            }
        }
    }
    debug!("Worker stderr watcher exiting");
}
