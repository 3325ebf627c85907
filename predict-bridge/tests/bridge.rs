//! End-to-end tests driving the bridge against a real spawned stub worker.
//!
//! The stub (`src/bin/stub_worker.rs`) speaks the exact wire protocol and
//! answers with a deterministic logistic score over the feature mean, so
//! each test can compute the one response its request must receive. Any
//! cross-pairing of calls and responses shows up as a mismatch.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use predict_bridge::{BridgeConfig, PredictError, PredictionBridge};

const FEATURES: usize = 4;

/// Opt-in bridge logs while debugging: `RUST_LOG=predict_bridge=debug`.
fn init_logs() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// Every test builds its config here, so log init piggybacks on it.
fn stub_config(mode: &str, extra: &[&str]) -> BridgeConfig {
    init_logs();

    let mut args = vec![mode.to_string()];
    args.extend(extra.iter().map(ToString::to_string));

    BridgeConfig::new(env!("CARGO_BIN_EXE_stub-worker"), args)
        .with_feature_count(FEATURES)
        .with_request_timeout(Duration::from_millis(1_500))
        .with_readiness_budget(Duration::from_secs(5))
        .with_readiness_poll_interval(Duration::from_millis(10))
}

fn features(value: f64) -> Vec<f64> {
    vec![value; FEATURES]
}

/// Mirror of the stub's scoring function.
fn expected_probability(value: f64) -> f64 {
    1.0 / (1.0 + (-value).exp())
}

#[tokio::test]
async fn test_fifo_round_trip() -> Result<()> {
    let bridge = PredictionBridge::new(stub_config("run", &[]));

    for value in [-2.0, 0.5, 3.0] {
        let prediction = bridge.predict(&features(value)).await?;
        assert!(
            (prediction.probability - expected_probability(value)).abs() < 1e-9,
            "response paired with the wrong request"
        );
        assert_eq!(prediction.prediction, u8::from(value >= 0.0));
    }

    assert_eq!(bridge.outstanding().await, 0);
    bridge.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_concurrent_calls_pair_one_to_one() -> Result<()> {
    let bridge = Arc::new(PredictionBridge::new(stub_config("run", &[])));
    bridge.start().await?;

    let mut handles = Vec::new();
    for i in 0..8 {
        let bridge = Arc::clone(&bridge);
        handles.push(tokio::spawn(async move {
            let value = f64::from(i) - 4.0;
            let prediction = bridge.predict(&features(value)).await?;
            anyhow::ensure!(
                (prediction.probability - expected_probability(value)).abs() < 1e-9,
                "call {i} received another call's response"
            );
            Ok::<_, anyhow::Error>(())
        }));
    }
    for handle in handles {
        handle.await??;
    }

    assert_eq!(bridge.outstanding().await, 0);
    bridge.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_not_ready_fails_fast_without_sending() {
    let config = stub_config("silent", &[]).with_readiness_budget(Duration::from_millis(300));
    let bridge = PredictionBridge::new(config);

    let started = Instant::now();
    let err = bridge.predict(&features(1.0)).await.unwrap_err();

    assert!(matches!(err, PredictError::NotReady(_)), "got {err:?}");
    assert!(
        started.elapsed() < Duration::from_millis(1_500),
        "readiness wait must respect its budget"
    );
    assert_eq!(
        bridge.outstanding().await,
        0,
        "nothing may be enqueued before readiness"
    );
    bridge.stop().await;
}

#[tokio::test]
async fn test_timeout_evicts_pending_call() {
    let config = stub_config("mute", &[]).with_request_timeout(Duration::from_millis(300));
    let bridge = PredictionBridge::new(config);

    let started = Instant::now();
    let err = bridge.predict(&features(1.0)).await.unwrap_err();

    assert!(matches!(err, PredictError::Timeout(_)), "got {err:?}");
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert_eq!(
        bridge.outstanding().await,
        0,
        "timed-out call must be evicted"
    );
    bridge.stop().await;
}

#[tokio::test]
async fn test_crash_drains_pending_and_respawn_recovers() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let marker = dir.path().join("crashed-once");
    let config = stub_config("crash-once", &["--marker", marker.to_str().unwrap()]);
    let bridge = Arc::new(PredictionBridge::new(config));

    bridge.start().await?;

    // Two calls in flight when the worker dies: the one it consumed and the
    // one still queued behind it. Both must drain with WorkerCrash.
    let first = tokio::spawn({
        let bridge = Arc::clone(&bridge);
        async move { bridge.predict(&features(1.0)).await }
    });
    let second = tokio::spawn({
        let bridge = Arc::clone(&bridge);
        async move { bridge.predict(&features(2.0)).await }
    });

    for outcome in [first.await?, second.await?] {
        match outcome {
            Err(PredictError::WorkerCrash(_)) => {}
            other => panic!("expected WorkerCrash for a drained call, got {other:?}"),
        }
    }

    // The crash does not poison the bridge: the next call respawns, and the
    // marker file makes the stub behave this time.
    let prediction = bridge.predict(&features(1.0)).await?;
    assert!((prediction.probability - expected_probability(1.0)).abs() < 1e-9);

    bridge.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_malformed_line_fails_only_head() {
    let bridge = PredictionBridge::new(stub_config("garbage-first", &[]));

    let err = bridge.predict(&features(1.0)).await.unwrap_err();
    assert!(matches!(err, PredictError::MalformedResponse(_)), "got {err:?}");

    // The channel stays usable for the next call.
    let prediction = bridge
        .predict(&features(2.0))
        .await
        .expect("channel must survive one bad line");
    assert!((prediction.probability - expected_probability(2.0)).abs() < 1e-9);

    bridge.stop().await;
}

#[tokio::test]
async fn test_worker_rejection_surfaces_message() {
    let bridge = PredictionBridge::new(stub_config("reject", &[]));

    match bridge.predict(&features(1.0)).await {
        Err(PredictError::Rejected(message)) => assert_eq!(message, "model unavailable"),
        other => panic!("expected Rejected, got {other:?}"),
    }

    bridge.stop().await;
}

#[tokio::test]
async fn test_single_flight_spawns_one_worker() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let spawn_log = dir.path().join("spawns");
    let config = stub_config("run", &["--spawn-log", spawn_log.to_str().unwrap()]);
    let bridge = Arc::new(PredictionBridge::new(config));

    let mut handles = Vec::new();
    for i in 0..6 {
        let bridge = Arc::clone(&bridge);
        handles.push(tokio::spawn(
            async move { bridge.predict(&features(f64::from(i))).await },
        ));
    }
    for handle in handles {
        handle.await??;
    }

    let spawns = std::fs::read_to_string(&spawn_log)?;
    assert_eq!(
        spawns.lines().count(),
        1,
        "concurrent first callers must share one spawn"
    );

    bridge.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_stop_fails_in_flight_calls() -> Result<()> {
    let config = stub_config("mute", &[]).with_request_timeout(Duration::from_secs(5));
    let bridge = Arc::new(PredictionBridge::new(config));
    bridge.start().await?;

    let call = tokio::spawn({
        let bridge = Arc::clone(&bridge);
        async move { bridge.predict(&features(1.0)).await }
    });
    tokio::time::sleep(Duration::from_millis(200)).await;
    bridge.stop().await;

    match call.await? {
        Err(PredictError::Stopped) => {}
        other => panic!("expected Stopped, got {other:?}"),
    }

    // Stopping is not terminal: the next start spawns a fresh worker.
    bridge.start().await?;
    assert!(bridge.is_ready().await);
    bridge.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_validation_never_spawns_a_worker() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let spawn_log = dir.path().join("spawns");
    let config = stub_config("run", &["--spawn-log", spawn_log.to_str().unwrap()]);
    let bridge = PredictionBridge::new(config);

    let err = bridge.predict(&[1.0]).await.unwrap_err();
    assert!(matches!(err, PredictError::Validation(_)), "got {err:?}");

    let err = bridge.predict(&vec![f64::NAN; FEATURES]).await.unwrap_err();
    assert!(matches!(err, PredictError::Validation(_)), "got {err:?}");

    assert!(
        !spawn_log.exists(),
        "validation failures must reject before any spawn"
    );
    Ok(())
}
