//! Stand-in for the external prediction worker.
//!
//! Speaks the bridge's exact line protocol: emits `READY` on stderr once it
//! can accept requests, then answers each stdin request line with one stdout
//! response line, in receipt order. Used by the integration tests and for
//! local development without the real model runtime.
//!
//! The first argument selects a behavior:
//!
//! - `run` (default): answer every request with a deterministic prediction
//! - `silent`: never signal readiness
//! - `mute`: signal readiness, read requests, never answer
//! - `garbage-first`: answer the first request with a non-JSON line
//! - `reject`: answer every request with an in-protocol failure
//! - `crash-once`: exit mid-request on the first spawn, then behave like
//!   `run` on later spawns (requires `--marker <path>`)
//!
//! `--spawn-log <path>` appends one line per process start so tests can
//! count how many workers were actually spawned.

use std::fs::OpenOptions;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::exit;
use std::time::Duration;

use predict_bridge::protocol::{PredictRequest, PredictResponse, Prediction, READY_SENTINEL};

enum Fault {
    None,
    GarbageFirst,
    Reject,
}

struct Options {
    mode: String,
    marker: Option<PathBuf>,
    spawn_log: Option<PathBuf>,
}

fn parse_args() -> Options {
    let mut options = Options {
        mode: "run".to_string(),
        marker: None,
        spawn_log: None,
    };
    let mut mode_seen = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--marker" => options.marker = args.next().map(PathBuf::from),
            "--spawn-log" => options.spawn_log = args.next().map(PathBuf::from),
            mode if !mode_seen => {
                options.mode = mode.to_string();
                mode_seen = true;
            }
            other => {
                eprintln!("ERROR unknown argument: {other}");
                exit(2);
            }
        }
    }
    options
}

fn main() {
    let options = parse_args();

    if let Some(path) = &options.spawn_log {
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "spawned pid={}", std::process::id());
        }
    }

    match options.mode.as_str() {
        "run" => serve(&Fault::None),
        "silent" => drain_stdin(),
        "mute" => {
            announce_ready();
            drain_stdin();
        }
        "garbage-first" => serve(&Fault::GarbageFirst),
        "reject" => serve(&Fault::Reject),
        "crash-once" => crash_once(options.marker),
        other => {
            eprintln!("ERROR unknown mode: {other}");
            exit(2);
        }
    }
}

fn announce_ready() {
    eprintln!("{READY_SENTINEL}");
}

/// Hold the pipes open without ever answering.
fn drain_stdin() {
    for line in io::stdin().lock().lines() {
        if line.is_err() {
            break;
        }
    }
}

fn serve(fault: &Fault) {
    announce_ready();

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut first = true;

    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let reply = match (fault, first) {
            (Fault::GarbageFirst, true) => "this is not a json response".to_string(),
            (Fault::Reject, _) => encode(&PredictResponse::failure("model unavailable")),
            _ => match serde_json::from_str::<PredictRequest>(&line) {
                Ok(request) => encode(&PredictResponse::ok(predict(&request.features))),
                Err(e) => encode(&PredictResponse::failure(format!("bad request: {e}"))),
            },
        };
        first = false;

        // stdout is block-buffered on a pipe; flush per line or the bridge
        // never sees the response.
        if writeln!(out, "{reply}").and_then(|()| out.flush()).is_err() {
            break;
        }
    }
}

fn encode(response: &PredictResponse) -> String {
    serde_json::to_string(response).unwrap_or_else(|_| r#"{"success":false}"#.to_string())
}

/// Deterministic logistic score over the feature mean, so tests can compute
/// the exact response a given request will get.
fn predict(features: &[f64]) -> Prediction {
    let mean = if features.is_empty() {
        0.0
    } else {
        features.iter().sum::<f64>() / features.len() as f64
    };
    let probability = 1.0 / (1.0 + (-mean).exp());
    let confidence = (probability - 0.5).abs() * 2.0;
    let confidence_level = if confidence >= 0.75 {
        "high"
    } else if confidence >= 0.4 {
        "medium"
    } else {
        "low"
    };

    Prediction {
        prediction: u8::from(probability >= 0.5),
        probability,
        confidence,
        confidence_level: confidence_level.to_string(),
    }
}

fn crash_once(marker: Option<PathBuf>) {
    let Some(marker) = marker else {
        eprintln!("ERROR crash-once requires --marker <path>");
        exit(2);
    };

    if marker.exists() {
        serve(&Fault::None);
        return;
    }

    if std::fs::write(&marker, b"crashed\n").is_err() {
        eprintln!("ERROR cannot write marker file");
        exit(2);
    }

    announce_ready();
    // Give concurrent callers time to enqueue before taking them down.
    std::thread::sleep(Duration::from_millis(300));
    let mut line = String::new();
    let _ = io::stdin().lock().read_line(&mut line);
    eprintln!("ERROR simulated crash");
    exit(3);
}
