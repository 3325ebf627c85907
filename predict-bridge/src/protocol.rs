//! Line-delimited wire protocol between the bridge and the worker.
//!
//! One JSON document per newline-terminated UTF-8 line:
//! - Request (worker stdin): `{"features": [f0, ..., fN-1]}`
//! - Response (worker stdout): `{"success": bool, "data"?: {...}, "error"?: string}`
//! - Diagnostics (worker stderr): free-form lines; the literal `READY` line
//!   is the readiness sentinel, `ERROR`-prefixed lines are logged and ignored.
//!
//! The protocol carries no message identifier: responses are paired to
//! requests purely by arrival order. The worker must answer every request
//! line with exactly one response line, in receipt order.

use serde::{Deserialize, Serialize};

use crate::error::PredictError;

/// Literal stderr line the worker emits once it can accept requests.
pub const READY_SENTINEL: &str = "READY";

/// Stderr lines with this prefix are worker-side diagnostics.
pub const ERROR_LINE_PREFIX: &str = "ERROR";

/// One prediction request line.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PredictRequest {
    /// Ordered feature vector, length fixed per deployment.
    pub features: Vec<f64>,
}

/// Decoded prediction result.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    /// Predicted class: 0 (down) or 1 (up).
    pub prediction: u8,

    /// Model probability for the positive class.
    pub probability: f64,

    /// Distance of the probability from the decision boundary, in [0, 1].
    pub confidence: f64,

    /// Human-readable confidence bucket reported by the worker.
    pub confidence_level: String,
}

/// One response line from the worker.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PredictResponse {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Prediction>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PredictResponse {
    /// Successful response wrapping a prediction.
    pub fn ok(data: Prediction) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// In-protocol failure carrying a worker-supplied message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }

    /// Collapse the wire envelope into a typed result.
    pub fn into_result(self) -> Result<Prediction, PredictError> {
        if !self.success {
            let message = self
                .error
                .unwrap_or_else(|| "worker reported failure without a message".to_string());
            return Err(PredictError::Rejected(message));
        }
        self.data.ok_or_else(|| {
            PredictError::MalformedResponse("success response carried no data".to_string())
        })
    }
}

/// Encode one feature vector as a newline-terminated request line.
pub fn encode_request(features: &[f64]) -> Result<String, PredictError> {
    let request = PredictRequest {
        features: features.to_vec(),
    };
    let mut line = serde_json::to_string(&request)
        .map_err(|e| PredictError::Validation(format!("unencodable feature vector: {e}")))?;
    line.push('\n');
    Ok(line)
}

/// Decode one response line into a typed result.
pub fn decode_response(line: &str) -> Result<Prediction, PredictError> {
    let response: PredictResponse = serde_json::from_str(line)
        .map_err(|e| PredictError::MalformedResponse(format!("{e} in line {:?}", snippet(line))))?;
    response.into_result()
}

/// Trim a raw line for log/error output so one huge line cannot flood logs.
fn snippet(line: &str) -> &str {
    const MAX: usize = 120;
    if line.len() <= MAX {
        line
    } else {
        let mut end = MAX;
        while !line.is_char_boundary(end) {
            end -= 1;
        }
        &line[..end]
    }
}
