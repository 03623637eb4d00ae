//! Sensor feed abstraction and the implementations shipped with the crate.
//!
//! The session controller never talks to hardware directly; it consumes the
//! [`SensorFeed`] trait. Two implementations are provided: a deterministic
//! [`ScriptedFeed`] for tests and demos, and a threaded [`SimulatedFeed`]
//! that stands in for a real wearable.

pub mod scripted;
pub mod simulated;
pub mod types;

// Re-export commonly used types
pub use scripted::ScriptedFeed;
pub use simulated::{ContactPhase, SimulatedFeed, SimulatedFeedConfig};
pub use types::{Sample, SampleBatch, SensorReading, NO_CONTACT_CODE};

/// Sensor types a feed may expose. The session controller consumes
/// [`TrackerCapability::EcgOnDemand`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackerCapability {
    /// On-demand single-lead ECG
    EcgOnDemand,
    /// Continuous heart rate
    HeartRate,
    /// Photoplethysmography
    Ppg,
}

/// Opaque handle for a session-scoped tracker subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackerHandle(pub(crate) u64);

/// Callback invoked by the feed for every delivered batch. Runs on the
/// feed's producer context.
pub type BatchCallback = Box<dyn FnMut(SampleBatch) + Send>;

/// Errors a feed can signal during the subscription lifecycle.
#[derive(Debug)]
pub enum FeedError {
    /// The feed's transport is not connected
    NotConnected,
    /// The requested tracker capability is not available on this device
    UnsupportedCapability(TrackerCapability),
    /// A tracker for this capability is already acquired
    AlreadyAcquired,
}

impl std::fmt::Display for FeedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedError::NotConnected => write!(f, "Sensor feed is not connected"),
            FeedError::UnsupportedCapability(cap) => {
                write!(f, "Tracker capability {cap:?} is not supported")
            }
            FeedError::AlreadyAcquired => write!(f, "Tracker is already acquired"),
        }
    }
}

impl std::error::Error for FeedError {}

/// A source of sample batches with a session-scoped subscription lifecycle.
///
/// `subscribe` and `unsubscribe` must be callable from inside the batch
/// callback itself: the controller tears its subscription down from the
/// producer context when a session finishes mid-batch.
pub trait SensorFeed: Send + Sync {
    /// Whether the feed's transport is currently connected.
    fn is_connected(&self) -> bool;

    /// Whether the device exposes the given tracker capability.
    fn supports(&self, capability: TrackerCapability) -> bool;

    /// Acquire a tracker for the capability. Queried once per session.
    fn acquire(&self, capability: TrackerCapability) -> Result<TrackerHandle, FeedError>;

    /// Release a previously acquired tracker.
    fn release(&self, tracker: TrackerHandle);

    /// Register the batch callback for an acquired tracker. Batches arrive
    /// in delivery order on the feed's producer context.
    fn subscribe(&self, tracker: TrackerHandle, callback: BatchCallback);

    /// Stop delivering batches. Batches already in flight may still be
    /// delivered; subscribers are expected to discard them.
    fn unsubscribe(&self, tracker: TrackerHandle);
}
