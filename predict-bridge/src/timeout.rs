//! Per-call deadline enforcement.
//!
//! Known limitation of the identifier-less protocol: a timed-out call is
//! evicted from the FIFO, but the worker does not know that. If the worker
//! was merely slow rather than dead, its late answer to the evicted request
//! still arrives and is paired with the next outstanding call, misaligning
//! every pairing after it until the worker is restarted. This is inherent to
//! positional correlation and is deliberately not "fixed" by guessing at
//! worker behavior; the only real cure is an identifier-keyed protocol,
//! which the current wire format does not carry.

use std::time::Duration;

use tokio::sync::oneshot;
use tracing::warn;

use crate::channel::{CallResult, RequestChannel};
use crate::error::PredictError;

/// Await a call's resolution, enforcing the per-call deadline.
///
/// On expiry the call is evicted from `channel` by identity and fails with
/// `Timeout`, unless a response, crash, or stop resolved it first, in which
/// case that resolution wins and no eviction happens.
pub(crate) async fn await_resolution(
    channel: &RequestChannel,
    call_id: u64,
    mut rx: oneshot::Receiver<CallResult>,
    deadline: Duration,
) -> CallResult {
    match tokio::time::timeout(deadline, &mut rx).await {
        Ok(Ok(result)) => result,
        // Resolver dropped without a result: the bridge tore the channel down.
        Ok(Err(_)) => Err(PredictError::Stopped),
        Err(_) => {
            if channel.expire(call_id) {
                warn!(call_id, timeout = ?deadline, "Prediction call timed out");
                Err(PredictError::Timeout(deadline))
            } else {
                // Lost the race: the call was resolved right as the deadline
                // fired. Deliver the real resolution instead.
                match rx.await {
                    Ok(result) => result,
                    Err(_) => Err(PredictError::Stopped),
                }
            }
        }
    }
}
