//! Bridge configuration.
//!
//! Defaults mirror the deployed worker contract: a 19-value feature vector,
//! a 2 s per-call deadline, and a 5 s readiness budget after spawn.

use std::time::Duration;

/// Default command used to launch the prediction worker.
pub const DEFAULT_WORKER_PROGRAM: &str = "python3";

/// Default path to the worker script, relative to the service working dir.
pub const DEFAULT_WORKER_SCRIPT: &str = "scripts/prediction_worker.py";

/// Number of values in a feature vector.
const DEFAULT_FEATURE_COUNT: usize = 19;

/// Maximum time to wait for a single prediction response (in milliseconds).
const REQUEST_TIMEOUT_MS: u64 = 2_000;

/// Maximum time to wait for the worker's readiness signal (in milliseconds).
const READINESS_BUDGET_MS: u64 = 5_000;

/// Interval between readiness flag polls (in milliseconds).
const READINESS_POLL_INTERVAL_MS: u64 = 50;

/// Configuration for a [`crate::PredictionBridge`].
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Program used to launch the worker process.
    pub worker_program: String,

    /// Arguments passed to the worker program.
    pub worker_args: Vec<String>,

    /// Required length of every feature vector.
    pub feature_count: usize,

    /// Per-call response deadline.
    pub request_timeout: Duration,

    /// How long a call may wait for the worker to become ready.
    pub readiness_budget: Duration,

    /// Poll cadence while waiting on the readiness flag.
    pub readiness_poll_interval: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            worker_program: DEFAULT_WORKER_PROGRAM.to_string(),
            worker_args: vec![DEFAULT_WORKER_SCRIPT.to_string()],
            feature_count: DEFAULT_FEATURE_COUNT,
            request_timeout: Duration::from_millis(REQUEST_TIMEOUT_MS),
            readiness_budget: Duration::from_millis(READINESS_BUDGET_MS),
            readiness_poll_interval: Duration::from_millis(READINESS_POLL_INTERVAL_MS),
        }
    }
}

impl BridgeConfig {
    /// Create a config for the given worker command line.
    pub fn new(worker_program: impl Into<String>, worker_args: Vec<String>) -> Self {
        Self {
            worker_program: worker_program.into(),
            worker_args,
            ..Self::default()
        }
    }

    /// Read configuration from `PREDICT_*` environment variables, falling
    /// back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(program) = std::env::var("PREDICT_WORKER_PROGRAM") {
            config.worker_program = program;
        }
        if let Ok(args) = std::env::var("PREDICT_WORKER_ARGS") {
            config.worker_args = args.split_whitespace().map(str::to_string).collect();
        }
        if let Some(count) = env_parse("PREDICT_FEATURE_COUNT") {
            config.feature_count = count;
        }
        if let Some(ms) = env_parse("PREDICT_REQUEST_TIMEOUT_MS") {
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse("PREDICT_READINESS_BUDGET_MS") {
            config.readiness_budget = Duration::from_millis(ms);
        }

        config
    }

    /// Set the required feature vector length.
    pub fn with_feature_count(mut self, count: usize) -> Self {
        self.feature_count = count;
        self
    }

    /// Set the per-call response deadline.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the readiness wait budget.
    pub fn with_readiness_budget(mut self, budget: Duration) -> Self {
        self.readiness_budget = budget;
        self
    }

    /// Set the readiness poll cadence.
    pub fn with_readiness_poll_interval(mut self, interval: Duration) -> Self {
        self.readiness_poll_interval = interval;
        self
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_worker_contract() {
        let config = BridgeConfig::default();
        assert_eq!(config.feature_count, 19);
        assert_eq!(config.request_timeout, Duration::from_millis(2_000));
        assert_eq!(config.readiness_budget, Duration::from_millis(5_000));
        assert_eq!(config.worker_program, "python3");
    }

    #[test]
    fn test_builder_overrides() {
        let config = BridgeConfig::new("./worker", vec!["--serve".to_string()])
            .with_feature_count(4)
            .with_request_timeout(Duration::from_millis(250))
            .with_readiness_budget(Duration::from_millis(500))
            .with_readiness_poll_interval(Duration::from_millis(10));

        assert_eq!(config.worker_program, "./worker");
        assert_eq!(config.worker_args, vec!["--serve".to_string()]);
        assert_eq!(config.feature_count, 4);
        assert_eq!(config.request_timeout, Duration::from_millis(250));
        assert_eq!(config.readiness_budget, Duration::from_millis(500));
        assert_eq!(config.readiness_poll_interval, Duration::from_millis(10));
    }
}
