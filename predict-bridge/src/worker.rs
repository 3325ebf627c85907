//! Worker process lifecycle.
//!
//! At most one worker is alive at a time. Spawning is single-flight: the
//! manager's slot lock is held across the spawn, so concurrent first callers
//! share one process. Each spawn gets its own readiness gate and request
//! FIFO; a crashed generation's calls are drained and can never leak into
//! its successor. Respawn is lazy: the next call after a crash triggers it.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, error, info, warn};

use crate::channel::{CallResult, RequestChannel};
use crate::config::BridgeConfig;
use crate::error::PredictError;
use crate::protocol;
use crate::readiness::{self, ReadinessGate};

/// Owns the (at most one) live worker and its single-flight startup.
pub(crate) struct WorkerManager {
    config: BridgeConfig,
    slot: Mutex<Option<Arc<WorkerInstance>>>,
}

impl WorkerManager {
    pub(crate) fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            slot: Mutex::new(None),
        }
    }

    /// Return the live worker, spawning one if absent or dead.
    ///
    /// Idempotent and single-flight: the slot lock is held across the spawn,
    /// so concurrent callers never start two processes.
    pub(crate) async fn ensure_started(&self) -> Result<Arc<WorkerInstance>, PredictError> {
        let mut slot = self.slot.lock().await;

        if let Some(worker) = slot.as_ref() {
            if worker.is_alive() {
                return Ok(Arc::clone(worker));
            }
            debug!("Previous worker is gone; spawning a replacement");
        }

        let worker = WorkerInstance::spawn(&self.config)?;
        *slot = Some(Arc::clone(&worker));
        Ok(worker)
    }

    /// The live worker, if any. Never spawns.
    pub(crate) async fn current(&self) -> Option<Arc<WorkerInstance>> {
        self.slot.lock().await.clone()
    }

    /// Kill the live worker, if any. Its in-flight calls fail with `Stopped`.
    pub(crate) async fn shutdown(&self) {
        let worker = self.slot.lock().await.take();
        if let Some(worker) = worker {
            info!(pid = worker.pid, "Stopping prediction worker");
            worker.signal_kill();
        }
    }
}

/// One spawned worker generation: its stdin, readiness gate, and call FIFO.
pub(crate) struct WorkerInstance {
    pub(crate) gate: Arc<ReadinessGate>,
    pub(crate) channel: Arc<RequestChannel>,
    stdin: Mutex<tokio::process::ChildStdin>,
    alive: AtomicBool,
    kill_tx: std::sync::Mutex<Option<oneshot::Sender<()>>>,
    pub(crate) pid: Option<u32>,
}

impl WorkerInstance {
    /// Spawn the worker with piped standard streams and start its reader,
    /// stderr watcher, and exit monitor tasks.
    fn spawn(config: &BridgeConfig) -> Result<Arc<Self>, PredictError> {
        let mut child = Command::new(&config.worker_program)
            .args(&config.worker_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                PredictError::WorkerCrash(format!(
                    "failed to spawn {}: {e}",
                    config.worker_program
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PredictError::WorkerCrash("worker stdin was not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PredictError::WorkerCrash("worker stdout was not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| PredictError::WorkerCrash("worker stderr was not captured".into()))?;

        let gate = Arc::new(ReadinessGate::new());
        let channel = Arc::new(RequestChannel::new());
        let (kill_tx, kill_rx) = oneshot::channel();

        let worker = Arc::new(Self {
            gate: Arc::clone(&gate),
            channel: Arc::clone(&channel),
            stdin: Mutex::new(stdin),
            alive: AtomicBool::new(true),
            kill_tx: std::sync::Mutex::new(Some(kill_tx)),
            pid: child.id(),
        });

        info!(
            pid = worker.pid,
            program = %config.worker_program,
            "Prediction worker spawned"
        );

        tokio::spawn(readiness::watch_stderr(stderr, gate));
        tokio::spawn(read_stdout(stdout, channel));
        tokio::spawn(monitor_exit(child, Arc::clone(&worker), kill_rx));

        Ok(worker)
    }

    /// Register a pending call and write its request line.
    ///
    /// The stdin writer lock spans both steps, so a call's FIFO position
    /// always equals the order its line reached the worker.
    pub(crate) async fn send(
        &self,
        line: &str,
    ) -> Result<(u64, oneshot::Receiver<CallResult>), PredictError> {
        let mut stdin = self.stdin.lock().await;
        let (id, rx) = self.channel.register();

        let written = match stdin.write_all(line.as_bytes()).await {
            Ok(()) => stdin.flush().await,
            Err(e) => Err(e),
        };
        drop(stdin);

        if let Err(e) = written {
            // The pipe broke before the exit monitor noticed. Evict our own
            // registration first so it is not drained with a stale reason.
            self.channel.expire(id);
            let reason = format!("failed to write request to worker stdin: {e}");
            self.mark_crashed(&reason);
            return Err(PredictError::WorkerCrash(reason));
        }

        debug!(call_id = id, outstanding = self.channel.len(), "Prediction request sent");
        Ok((id, rx))
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Tell the exit monitor to kill the process.
    pub(crate) fn signal_kill(&self) {
        let kill_tx = match self.kill_tx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(tx) = kill_tx {
            let _ = tx.send(());
        }
    }

    /// Mark this generation dead and fail everything it still owes.
    fn mark_crashed(&self, reason: &str) {
        self.alive.store(false, Ordering::SeqCst);
        self.gate.reset();
        let drained = self
            .channel
            .drain(|| PredictError::WorkerCrash(reason.to_string()));
        error!(pid = self.pid, drained, reason = %reason, "Prediction worker crashed");
        self.signal_kill();
    }
}

/// Single consumer of the worker's stdout: decodes each line and pairs it
/// with the oldest outstanding call.
async fn read_stdout(stdout: ChildStdout, channel: Arc<RequestChannel>) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                channel.resolve_head(protocol::decode_response(&line));
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Failed to read worker stdout");
                break;
            }
        }
    }
    debug!("Worker stdout reader exiting");
}

/// Wait for the worker to exit, or for a kill signal, then clean up.
///
/// Every exit drains the FIFO, clean exits included: a respawned worker
/// cannot answer calls that were sent to its predecessor, so holding them
/// until their deadlines would only delay the same failure.
async fn monitor_exit(
    mut child: Child,
    worker: Arc<WorkerInstance>,
    mut kill_rx: oneshot::Receiver<()>,
) {
    enum Exit {
        Process(String),
        Killed,
    }

    let exit = tokio::select! {
        status = child.wait() => Exit::Process(match status {
            Ok(status) => status.to_string(),
            Err(e) => format!("wait failed: {e}"),
        }),
        _ = &mut kill_rx => {
            if let Err(e) = child.kill().await {
                warn!(pid = worker.pid, error = %e, "Failed to kill worker process");
            }
            Exit::Killed
        }
    };

    worker.alive.store(false, Ordering::SeqCst);
    worker.gate.reset();

    match exit {
        Exit::Process(status) => {
            let drained = worker
                .channel
                .drain(|| PredictError::WorkerCrash(format!("worker exited ({status})")));
            error!(pid = worker.pid, status = %status, drained, "Prediction worker exited");
        }
        Exit::Killed => {
            let drained = worker.channel.drain(|| PredictError::Stopped);
            info!(pid = worker.pid, drained, "Prediction worker stopped");
        }
    }
}
