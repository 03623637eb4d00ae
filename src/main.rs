//! ECG Session CLI
//!
//! Drives a measurement session against the simulated sensor feed and
//! exports the finished sample sequence.

use chrono::Utc;
use clap::{Parser, Subcommand};
use crossbeam_channel::Sender;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use ecg_session::{
    config::{Config, SessionConfig},
    feed::{ContactPhase, SimulatedFeed, SimulatedFeedConfig},
    session::{FinishOutcome, SessionController, SessionListener},
    stats::create_shared_log_with_persistence,
    SharedStatsLog, VERSION,
};

#[derive(Parser)]
#[command(name = "ecg-session")]
#[command(author = "Knemognition")]
#[command(version = VERSION)]
#[command(about = "Streaming ECG measurement session controller", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one measurement session against the simulated feed
    Run {
        /// Session length in milliseconds
        #[arg(long)]
        duration_ms: Option<u64>,

        /// Sensor frequency in Hz
        #[arg(long)]
        sample_rate_hz: Option<u32>,

        /// Consecutive in-contact batches required before measuring starts
        #[arg(long)]
        starting_ticks: Option<u32>,

        /// Consecutive no-contact batches before aborting
        #[arg(long)]
        debounce_ticks_off: Option<u32>,

        /// Simulate losing contact after this many delivered batches
        #[arg(long)]
        drop_contact_after: Option<usize>,

        /// Readings per simulated batch
        #[arg(long, default_value = "20")]
        batch_size: usize,

        /// Delay between simulated batches in milliseconds
        #[arg(long, default_value = "40")]
        batch_interval_ms: u64,

        /// Skip writing the finished session record to disk
        #[arg(long)]
        no_export: bool,
    },

    /// Show configuration and cumulative statistics
    Status,

    /// Show configuration
    Config,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            duration_ms,
            sample_rate_hz,
            starting_ticks,
            debounce_ticks_off,
            drop_contact_after,
            batch_size,
            batch_interval_ms,
            no_export,
        } => {
            cmd_run(
                duration_ms,
                sample_rate_hz,
                starting_ticks,
                debounce_ticks_off,
                drop_contact_after,
                batch_size,
                batch_interval_ms,
                no_export,
            );
        }
        Commands::Status => {
            cmd_status();
        }
        Commands::Config => {
            cmd_config();
        }
    }
}

/// Listener wired to stdout, the stats log, and a completion channel.
struct CliListener {
    stats: SharedStatsLog,
    done: Sender<(bool, Vec<f32>, FinishOutcome)>,
    last_printed_percent: u32,
}

impl SessionListener for CliListener {
    fn on_lead_off(&mut self) {
        self.stats.record_lead_off_warning();
    }

    fn on_stable_tick(&mut self) {}

    fn on_progress(&mut self, fraction: f32) {
        let percent = (fraction * 100.0) as u32;
        if percent / 10 > self.last_printed_percent / 10 {
            println!("  Progress: {percent}%");
        }
        self.last_printed_percent = percent;
    }

    fn on_finished(&mut self, success: bool, samples: Vec<f32>, outcome: FinishOutcome) {
        match outcome {
            FinishOutcome::Success => self.stats.record_session_succeeded(),
            FinishOutcome::LeadOff => self.stats.record_session_lead_off(),
            FinishOutcome::Cancelled => self.stats.record_session_cancelled(),
        }
        self.stats.record_samples_collected(samples.len() as u64);
        let _ = self.done.send((success, samples, outcome));
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_run(
    duration_ms: Option<u64>,
    sample_rate_hz: Option<u32>,
    starting_ticks: Option<u32>,
    debounce_ticks_off: Option<u32>,
    drop_contact_after: Option<usize>,
    batch_size: usize,
    batch_interval_ms: u64,
    no_export: bool,
) {
    println!("ECG Session v{VERSION}");
    println!();

    let config = Config::load().unwrap_or_default();
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let session_config = SessionConfig {
        target_duration_ms: duration_ms.unwrap_or(config.session.target_duration_ms),
        sample_rate_hz: sample_rate_hz.unwrap_or(config.session.sample_rate_hz),
        debounce_ticks_off: debounce_ticks_off.unwrap_or(config.session.debounce_ticks_off),
        starting_ticks: starting_ticks.unwrap_or(config.session.starting_ticks),
    };
    if let Err(e) = session_config.validate() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    let script = match drop_contact_after {
        Some(batches) => vec![
            ContactPhase::on_contact(batches),
            ContactPhase::off_contact(usize::MAX),
        ],
        None => vec![ContactPhase::on_contact(usize::MAX)],
    };
    let feed = Arc::new(SimulatedFeed::new(SimulatedFeedConfig {
        batch_interval: Duration::from_millis(batch_interval_ms),
        readings_per_batch: batch_size.max(1),
        sample_rate_hz: session_config.sample_rate_hz,
        script,
    }));

    let stats = create_shared_log_with_persistence(config.data_path.join("stats.json"));
    let controller = Arc::new(SessionController::new(feed, session_config));

    println!("Starting session...");
    println!("  Duration: {}ms", session_config.target_duration_ms);
    println!("  Sample rate: {}Hz", session_config.sample_rate_hz);
    println!(
        "  Target samples: {}",
        session_config.target_sample_count()
    );
    println!("  Arming ticks: {}", session_config.starting_ticks);
    println!("  Lead-off debounce: {}", session_config.debounce_ticks_off);
    println!();
    println!("Press Ctrl+C to cancel");
    println!();

    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    let listener = CliListener {
        stats: stats.clone(),
        done: done_tx,
        last_printed_percent: 0,
    };

    if !controller.start(listener) {
        eprintln!("Error: could not start session (feed unavailable)");
        std::process::exit(1);
    }
    stats.record_session_started();
    let session_id = controller.session_id().unwrap_or_else(Uuid::new_v4);

    // Ctrl+C cancels the session; the listener still receives Finished.
    let cancel_target = controller.clone();
    ctrlc::set_handler(move || {
        println!();
        println!("Cancelling session...");
        cancel_target.stop();
    })
    .expect("Error setting Ctrl+C handler");

    let (success, samples, outcome) = match done_rx.recv() {
        Ok(result) => result,
        Err(_) => {
            eprintln!("Session ended without a result");
            std::process::exit(1);
        }
    };

    println!();
    println!(
        "Session finished: {} ({} samples)",
        outcome_label(outcome),
        samples.len()
    );

    if !no_export && !samples.is_empty() {
        let record = SessionRecord {
            session_id,
            device_id: device_id(),
            recorded_at: Utc::now().to_rfc3339(),
            success,
            outcome: outcome_label(outcome).to_string(),
            sample_rate_hz: session_config.sample_rate_hz,
            target_duration_ms: session_config.target_duration_ms,
            samples,
        };
        let export_path = config.export_path.join(format!(
            "session_{}_{}.json",
            Utc::now().format("%Y%m%d_%H%M%S"),
            session_id
        ));
        match serde_json::to_string_pretty(&record) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&export_path, json) {
                    eprintln!("Error writing session record: {e}");
                } else {
                    println!("Exported session record to {export_path:?}");
                }
            }
            Err(e) => {
                eprintln!("Error serializing session record: {e}");
            }
        }
    }

    if let Err(e) = stats.save() {
        eprintln!("Warning: Could not save stats: {e}");
    }

    println!();
    println!("{}", stats.summary());
}

fn cmd_status() {
    let config = Config::load().unwrap_or_default();

    println!("ECG Session Status");
    println!("==================");
    println!();
    println!("Configuration:");
    println!("  Duration: {}ms", config.session.target_duration_ms);
    println!("  Sample rate: {}Hz", config.session.sample_rate_hz);
    println!(
        "  Target samples: {}",
        config.session.target_sample_count()
    );
    println!("  Arming ticks: {}", config.session.starting_ticks);
    println!(
        "  Lead-off debounce: {}",
        config.session.debounce_ticks_off
    );
    println!();

    let stats_path = config.data_path.join("stats.json");
    if stats_path.exists() {
        let stats = create_shared_log_with_persistence(stats_path);
        println!("{}", stats.summary());
    } else {
        println!("No previous session data found.");
    }
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

fn outcome_label(outcome: FinishOutcome) -> &'static str {
    match outcome {
        FinishOutcome::Success => "success",
        FinishOutcome::LeadOff => "lead-off",
        FinishOutcome::Cancelled => "cancelled",
    }
}

fn device_id() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Exported record of a finished session.
#[derive(Debug, Serialize)]
struct SessionRecord {
    session_id: Uuid,
    device_id: String,
    recorded_at: String,
    success: bool,
    outcome: String,
    sample_rate_hz: u32,
    target_duration_ms: u64,
    samples: Vec<f32>,
}
