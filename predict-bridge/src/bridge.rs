//! Public façade over the worker bridge.
//!
//! A [`PredictionBridge`] lets many concurrent callers obtain predictions
//! from one long-lived external worker process. Every call follows the same
//! path: validate the feature vector, make sure a worker is running, wait
//! for its readiness signal, write one request line, and await the paired
//! response line or the per-call deadline.

use std::sync::Arc;

use tracing::warn;

use crate::config::BridgeConfig;
use crate::error::PredictError;
use crate::protocol::{self, Prediction};
use crate::timeout;
use crate::worker::WorkerManager;

/// Shared reference to a bridge, for handing to request handlers.
pub type SharedPredictionBridge = Arc<PredictionBridge>;

/// Bridge to the external prediction worker.
///
/// Explicitly constructed and explicitly stoppable; there is no ambient
/// global state. All methods take `&self`, so one instance can be shared
/// behind an [`Arc`] across tasks.
pub struct PredictionBridge {
    config: BridgeConfig,
    manager: WorkerManager,
}

impl PredictionBridge {
    /// Create a bridge. The worker is not spawned until [`start`] or the
    /// first [`predict`] call.
    ///
    /// [`start`]: Self::start
    /// [`predict`]: Self::predict
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            manager: WorkerManager::new(config.clone()),
            config,
        }
    }

    /// Create a bridge configured from `PREDICT_*` environment variables.
    pub fn from_env() -> Self {
        Self::new(BridgeConfig::from_env())
    }

    /// The active configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Spawn the worker if needed and wait for its readiness signal.
    ///
    /// Optional warm-up: `predict` does the same lazily.
    pub async fn start(&self) -> Result<(), PredictError> {
        let worker = self.manager.ensure_started().await?;
        if self.await_ready(&worker).await {
            Ok(())
        } else {
            Err(PredictError::NotReady(self.config.readiness_budget))
        }
    }

    /// Kill the worker. Calls in flight fail with [`PredictError::Stopped`];
    /// the bridge stays usable and the next call respawns.
    pub async fn stop(&self) {
        self.manager.shutdown().await;
    }

    /// Obtain a prediction for one feature vector.
    ///
    /// The bridge never retries; a failed call is reported once and retry
    /// policy is the caller's.
    ///
    /// # Errors
    ///
    /// - [`PredictError::Validation`] - wrong arity or non-finite value;
    ///   nothing was sent
    /// - [`PredictError::NotReady`] - the worker did not signal readiness
    ///   within the budget; nothing was sent
    /// - [`PredictError::Timeout`] - no response within the per-call deadline
    /// - [`PredictError::WorkerCrash`] - the worker died before answering
    /// - [`PredictError::MalformedResponse`] / [`PredictError::Rejected`] -
    ///   the worker answered, badly or negatively
    pub async fn predict(&self, features: &[f64]) -> Result<Prediction, PredictError> {
        self.validate(features)?;

        let worker = self.manager.ensure_started().await?;

        if !self.await_ready(&worker).await {
            warn!(
                budget = ?self.config.readiness_budget,
                "Worker not ready within budget; call rejected"
            );
            return Err(PredictError::NotReady(self.config.readiness_budget));
        }

        let line = protocol::encode_request(features)?;
        let (call_id, rx) = worker.send(&line).await?;

        timeout::await_resolution(&worker.channel, call_id, rx, self.config.request_timeout).await
    }

    /// Whether a live worker has signalled readiness.
    pub async fn is_ready(&self) -> bool {
        match self.manager.current().await {
            Some(worker) => worker.is_alive() && worker.gate.is_ready(),
            None => false,
        }
    }

    /// Number of calls currently awaiting a response. The FIFO is unbounded,
    /// so sustained overload shows up here first.
    pub async fn outstanding(&self) -> usize {
        match self.manager.current().await {
            Some(worker) => worker.channel.len(),
            None => 0,
        }
    }

    async fn await_ready(&self, worker: &crate::worker::WorkerInstance) -> bool {
        worker
            .gate
            .await_ready(
                self.config.readiness_budget,
                self.config.readiness_poll_interval,
            )
            .await
    }

    fn validate(&self, features: &[f64]) -> Result<(), PredictError> {
        let expected = self.config.feature_count;
        if features.len() != expected {
            return Err(PredictError::Validation(format!(
                "expected {expected} features, got {}",
                features.len()
            )));
        }
        // serde_json renders non-finite floats as null, which would silently
        // corrupt the request line.
        if let Some(index) = features.iter().position(|f| !f.is_finite()) {
            return Err(PredictError::Validation(format!(
                "feature {index} is not a finite number"
            )));
        }
        Ok(())
    }
}
