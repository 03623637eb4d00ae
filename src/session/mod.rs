//! The measurement session core.
//!
//! This module contains:
//! - Contact debouncing (noisy per-batch codes → stable signals)
//! - Sample accumulation toward the session target
//! - Event dispatch to the caller's listener
//! - The session state machine tying them together

pub mod accumulator;
pub mod controller;
pub mod debounce;
pub mod events;

// Re-export commonly used types
pub use accumulator::SampleAccumulator;
pub use controller::{SessionController, SessionState};
pub use debounce::ContactDebouncer;
pub use events::{FinishOutcome, SessionEvent, SessionListener};
