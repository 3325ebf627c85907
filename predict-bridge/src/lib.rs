//! predict-bridge: IPC bridge to a long-lived prediction worker process.
//!
//! Many concurrent callers obtain predictions from a single external worker
//! over a line-delimited JSON protocol on the worker's standard streams:
//! requests on stdin, responses on stdout, diagnostics (and the `READY`
//! handshake) on stderr.
//!
//! # Architecture
//!
//! The hard part is multiplexing N independent callers onto one ordered
//! duplex byte stream with no message identifier in the wire format:
//!
//! - Responses are paired to requests **positionally**: each stdout line
//!   resolves the oldest outstanding call, relying on the worker answering
//!   in receipt order, one line per request.
//! - Startup is single-flight; concurrent first callers share one spawn.
//! - Each call carries its own deadline; a worker crash fails everything
//!   queued at that moment, and the next call respawns lazily.
//!
//! The worker computes the actual predictions; this crate only ships
//! requests to it and routes results back.
//!
//! # Example
//!
//! ```ignore
//! use predict_bridge::{BridgeConfig, PredictionBridge};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let bridge = PredictionBridge::new(BridgeConfig::from_env());
//!
//!     let features = vec![0.0; bridge.config().feature_count];
//!     let prediction = bridge.predict(&features).await?;
//!
//!     println!("class {} at p={:.3}", prediction.prediction, prediction.probability);
//!     bridge.stop().await;
//!     Ok(())
//! }
//! ```

mod channel;
mod readiness;
mod timeout;
mod worker;

pub mod bridge;
pub mod config;
pub mod error;
pub mod protocol;

// Re-export the types callers actually touch
pub use bridge::{PredictionBridge, SharedPredictionBridge};
pub use config::BridgeConfig;
pub use error::PredictError;
pub use protocol::{PredictRequest, PredictResponse, Prediction};
