//! Callflow simulator
//!
//! Runs one callflow definition against a console "call": prompts are
//! printed and finish after a short delay, caller input is read from stdin.
//!
//! ```text
//! callflow-sim flows/demo.json
//! > 1234#            digits
//! > hangup           caller hangs up
//! > transfer-failed  platform reports a failed transfer
//! > call-result ok   outbound call answered (or `fail`)
//! ```

use async_trait::async_trait;
use callflow_engine::runtime::TelephonyError;
use callflow_engine::{
    spawn_callflow, CallControl, CallInfo, CallflowDefinition, CallflowHandle, EngineConfig,
};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_PLAYBACK_MS: u64 = 1500;

/// Console stand-in for a platform call
struct ConsoleCall {
    info: CallInfo,
    playback: Duration,
    /// Bumped on every play and stop; a finished playback only reports if
    /// nothing replaced or stopped it
    playing: Arc<AtomicU64>,
    played_tx: mpsc::UnboundedSender<()>,
}

#[async_trait]
impl CallControl for ConsoleCall {
    fn info(&self) -> CallInfo {
        self.info.clone()
    }

    async fn terminate(&self) -> Result<(), TelephonyError> {
        println!("[call] terminated");
        Ok(())
    }

    async fn play_audio(&self, file: &Path) -> Result<(), TelephonyError> {
        println!("[call] playing {}", file.display());
        let generation = self.playing.fetch_add(1, Ordering::SeqCst) + 1;
        let playing = Arc::clone(&self.playing);
        let played_tx = self.played_tx.clone();
        let playback = self.playback;
        tokio::spawn(async move {
            tokio::time::sleep(playback).await;
            if playing.load(Ordering::SeqCst) == generation {
                let _ = played_tx.send(());
            }
        });
        Ok(())
    }

    async fn stop_audio(&self) -> Result<(), TelephonyError> {
        self.playing.fetch_add(1, Ordering::SeqCst);
        println!("[call] playback stopped");
        Ok(())
    }

    async fn transfer(&self, destination: &str) -> Result<(), TelephonyError> {
        println!("[call] transferring to {destination}");
        Ok(())
    }

    async fn make_call(&self, destination: &str) -> Result<(), TelephonyError> {
        println!("[call] dialing {destination}");
        Ok(())
    }
}

/// Map one line of console input onto session events
fn post_console_line(handle: &CallflowHandle, line: &str) -> bool {
    let posted = match line.trim() {
        "" => Ok(()),
        "hangup" => handle.post_call_terminated(),
        "transfer-failed" => handle.post_transfer_failed(),
        "call-result ok" => handle.post_call_result(true),
        "call-result fail" => handle.post_call_result(false),
        digits if digits.chars().all(|c| c.is_ascii_digit() || c == '*' || c == '#') => digits
            .chars()
            .try_for_each(|digit| handle.post_digit(digit)),
        other => {
            println!("[sim] unknown input: {other}");
            Ok(())
        }
    };
    posted.is_ok()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    let json_logs = std::env::var("CALLFLOW_LOG_JSON").is_ok_and(|v| v == "1");
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "callflow_engine=info".into()),
        )
        .with(json_logs.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr)
        }))
        .with((!json_logs).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();

    // Configuration
    let definition_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("CALLFLOW_DEFINITION").ok())
        .map(PathBuf::from)
        .ok_or("usage: callflow-sim <definition.json> (or set CALLFLOW_DEFINITION)")?;

    let playback_ms: u64 = std::env::var("CALLFLOW_SIM_PLAYBACK_MS")
        .ok()
        .and_then(|ms| ms.parse().ok())
        .unwrap_or(DEFAULT_PLAYBACK_MS);

    let config = EngineConfig::from_env();
    tracing::info!(path = %definition_path.display(), "Loading callflow definition");
    let definition = CallflowDefinition::load(&definition_path)?;

    let (played_tx, mut played_rx) = mpsc::unbounded_channel();
    let call = ConsoleCall {
        info: CallInfo {
            call_id: uuid::Uuid::new_v4().to_string(),
            caller_id: std::env::var("CALLFLOW_SIM_ANI").unwrap_or_else(|_| "0000000000".into()),
            dialed_number: std::env::var("CALLFLOW_SIM_DNIS").unwrap_or_default(),
            called_number: std::env::var("CALLFLOW_SIM_DID").unwrap_or_default(),
            transferring_extension: None,
        },
        playback: Duration::from_millis(playback_ms),
        playing: Arc::new(AtomicU64::new(0)),
        played_tx,
    };

    let (handle, join) = spawn_callflow(&definition, &config, call)?;

    // Playback completions from the console call
    let playback_handle = handle.clone();
    tokio::spawn(async move {
        while played_rx.recv().await.is_some() {
            if playback_handle.post_prompt_played().is_err() {
                break;
            }
        }
    });

    // Caller input; a plain thread so a pending read never blocks shutdown
    let input_handle = handle.clone();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if !post_console_line(&input_handle, &line) {
                break;
            }
        }
    });
    drop(handle);

    let summary = join.await?;
    println!(
        "[sim] callflow finished in {} flow at step {} (cleanups: {})",
        summary.state.flow, summary.state.position, summary.cleanup_count
    );
    Ok(())
}
