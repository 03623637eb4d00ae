//! Demonstration of the ECG session controller.
//!
//! This example shows how to:
//! 1. Build a sensor feed (simulated here)
//! 2. Configure and start a measurement session
//! 3. React to listener callbacks
//! 4. Collect the finished sample sequence
//!
//! Run with: cargo run --example measure_demo

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use ecg_session::{
    config::SessionConfig,
    feed::{ContactPhase, SimulatedFeed, SimulatedFeedConfig},
    session::{FinishOutcome, SessionController, SessionListener},
    VERSION,
};

struct DemoListener {
    ticks: u32,
    done: Sender<(Vec<f32>, FinishOutcome)>,
}

impl SessionListener for DemoListener {
    fn on_lead_off(&mut self) {
        println!("  [lead-off] electrode contact lost");
    }

    fn on_stable_tick(&mut self) {
        self.ticks += 1;
        if self.ticks % 10 == 0 {
            println!("  [contact] {} stable batches", self.ticks);
        }
    }

    fn on_progress(&mut self, fraction: f32) {
        if (fraction * 100.0) as u32 % 25 == 0 {
            println!("  [progress] {:.0}%", fraction * 100.0);
        }
    }

    fn on_finished(&mut self, success: bool, samples: Vec<f32>, outcome: FinishOutcome) {
        println!("  [finished] success={success}, outcome={outcome:?}, {} samples", samples.len());
        let _ = self.done.send((samples, outcome));
    }
}

fn run_scenario(name: &str, script: Vec<ContactPhase>, config: SessionConfig) {
    println!();
    println!("=== {name} ===");

    let feed = Arc::new(SimulatedFeed::new(SimulatedFeedConfig {
        batch_interval: Duration::from_millis(10),
        readings_per_batch: 25,
        sample_rate_hz: config.sample_rate_hz,
        script,
    }));
    let controller = SessionController::new(feed, config);

    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    let listener = DemoListener {
        ticks: 0,
        done: done_tx,
    };

    if !controller.start(listener) {
        println!("  could not start (feed unavailable)");
        return;
    }

    let (samples, outcome) = done_rx
        .recv_timeout(Duration::from_secs(30))
        .expect("session result");
    println!(
        "  -> state: {:?}, outcome: {outcome:?}, first samples: {:?}",
        controller.state(),
        &samples[..samples.len().min(4)]
    );
}

fn main() {
    println!("ECG Session - Measurement Demo v{VERSION}");

    let config = SessionConfig {
        target_duration_ms: 1000,
        sample_rate_hz: 500,
        debounce_ticks_off: 2,
        starting_ticks: 5,
    };

    // Contact holds for the whole session: finishes with Success.
    run_scenario(
        "steady contact",
        vec![ContactPhase::on_contact(usize::MAX)],
        config,
    );

    // Contact drops mid-measurement: finishes with LeadOff after the
    // debounce window.
    run_scenario(
        "contact lost mid-session",
        vec![
            ContactPhase::on_contact(12),
            ContactPhase::off_contact(usize::MAX),
        ],
        config,
    );

    println!();
    println!("Demo complete!");
}
