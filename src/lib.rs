//! ECG Session - streaming-sensor measurement session controller.
//!
//! This library consumes irregular batches of biosignal readings tagged with
//! a contact-quality code, decides when a valid measurement session has
//! begun, accumulates a fixed target number of valid samples, and decides
//! how and when the session ends (success, lost contact, or cancellation).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     ECG Session Controller                   │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌────────────┐   ┌─────────────┐   ┌───────────────┐        │
//! │  │ SensorFeed │──▶│  Debouncer  │──▶│  Accumulator  │        │
//! │  │  (batches) │   │ (stability) │   │ (target cap)  │        │
//! │  └────────────┘   └─────────────┘   └───────────────┘        │
//! │         │                 state machine    │                 │
//! │         ▼                                  ▼                 │
//! │  ┌────────────┐                    ┌───────────────┐         │
//! │  │ Tracker    │                    │   Event       │         │
//! │  │ lifecycle  │                    │   Dispatcher  │──▶ UI   │
//! │  └────────────┘                    └───────────────┘         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The feed callback (producer context) drives the state machine; listener
//! callbacks are delivered in order on a dedicated thread and never block
//! the producer. `start()`/`stop()` belong to the caller's context.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ecg_session::config::SessionConfig;
//! use ecg_session::feed::{SimulatedFeed, SimulatedFeedConfig};
//! use ecg_session::session::{FinishOutcome, SessionController, SessionListener};
//!
//! struct PrintListener;
//!
//! impl SessionListener for PrintListener {
//!     fn on_progress(&mut self, fraction: f32) {
//!         println!("progress: {:.0}%", fraction * 100.0);
//!     }
//!     fn on_finished(&mut self, success: bool, samples: Vec<f32>, _outcome: FinishOutcome) {
//!         println!("finished: success={success}, {} samples", samples.len());
//!     }
//! }
//!
//! let feed = Arc::new(SimulatedFeed::new(SimulatedFeedConfig::default()));
//! let controller = SessionController::new(feed, SessionConfig::default());
//! controller.start(PrintListener);
//! ```

pub mod config;
pub mod feed;
pub mod session;
pub mod stats;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError, SessionConfig};
pub use feed::{
    FeedError, Sample, SampleBatch, ScriptedFeed, SensorFeed, SensorReading, SimulatedFeed,
    SimulatedFeedConfig, TrackerCapability, TrackerHandle, NO_CONTACT_CODE,
};
pub use session::{
    FinishOutcome, SessionController, SessionEvent, SessionListener, SessionState,
};
pub use stats::{create_shared_log_with_persistence, SessionStats, SharedStatsLog, StatsLog};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
