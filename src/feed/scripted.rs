//! Deterministic in-process feed for tests and demos.
//!
//! `ScriptedFeed` delivers batches synchronously on the calling thread, so a
//! test can drive the session controller one batch at a time and assert on
//! the state after each delivery.

use crate::feed::{
    BatchCallback, FeedError, SampleBatch, SensorFeed, TrackerCapability, TrackerHandle,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

/// A feed whose batches are pushed by the caller via [`ScriptedFeed::deliver`].
pub struct ScriptedFeed {
    connected: AtomicBool,
    capabilities: Mutex<Vec<TrackerCapability>>,
    subscriber: Mutex<Option<BatchCallback>>,
    subscribed: AtomicBool,
    next_handle: AtomicU64,
}

impl ScriptedFeed {
    /// Create a connected feed exposing the on-demand ECG capability.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            capabilities: Mutex::new(vec![TrackerCapability::EcgOnDemand]),
            subscriber: Mutex::new(None),
            subscribed: AtomicBool::new(false),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Simulate the transport dropping or reconnecting.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Replace the advertised capability set.
    pub fn set_capabilities(&self, capabilities: Vec<TrackerCapability>) {
        *self.capabilities.lock().unwrap() = capabilities;
    }

    /// Whether a subscriber is currently registered.
    pub fn has_subscriber(&self) -> bool {
        self.subscribed.load(Ordering::SeqCst)
    }

    /// Deliver one batch to the current subscriber, on the calling thread.
    ///
    /// The callback slot is taken for the duration of the call so the
    /// subscriber may unsubscribe from inside the callback without
    /// deadlocking; the callback is only put back if still subscribed.
    pub fn deliver(&self, batch: SampleBatch) {
        let callback = self.subscriber.lock().unwrap().take();
        if let Some(mut callback) = callback {
            callback(batch);
            if self.subscribed.load(Ordering::SeqCst) {
                *self.subscriber.lock().unwrap() = Some(callback);
            }
        }
    }
}

impl Default for ScriptedFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorFeed for ScriptedFeed {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn supports(&self, capability: TrackerCapability) -> bool {
        self.capabilities.lock().unwrap().contains(&capability)
    }

    fn acquire(&self, capability: TrackerCapability) -> Result<TrackerHandle, FeedError> {
        if !self.is_connected() {
            return Err(FeedError::NotConnected);
        }
        if !self.supports(capability) {
            return Err(FeedError::UnsupportedCapability(capability));
        }
        Ok(TrackerHandle(self.next_handle.fetch_add(1, Ordering::SeqCst)))
    }

    fn release(&self, _tracker: TrackerHandle) {}

    fn subscribe(&self, _tracker: TrackerHandle, callback: BatchCallback) {
        self.subscribed.store(true, Ordering::SeqCst);
        *self.subscriber.lock().unwrap() = Some(callback);
    }

    fn unsubscribe(&self, _tracker: TrackerHandle) {
        self.subscribed.store(false, Ordering::SeqCst);
        // The slot is empty while a delivery is in progress; the flag above
        // stops the callback from being put back afterwards.
        let _ = self.subscriber.lock().unwrap().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_delivery_reaches_subscriber() {
        let feed = ScriptedFeed::new();
        let tracker = feed.acquire(TrackerCapability::EcgOnDemand).unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        feed.subscribe(
            tracker,
            Box::new(move |batch| {
                seen.fetch_add(batch.len(), Ordering::SeqCst);
            }),
        );

        feed.deliver(SampleBatch::uniform(0, &[0.1, 0.2, 0.3]));
        assert_eq!(count.load(Ordering::SeqCst), 3);

        feed.unsubscribe(tracker);
        feed.deliver(SampleBatch::uniform(0, &[0.4]));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_acquire_respects_connectivity() {
        let feed = ScriptedFeed::new();
        feed.set_connected(false);
        assert!(matches!(
            feed.acquire(TrackerCapability::EcgOnDemand),
            Err(FeedError::NotConnected)
        ));
    }

    #[test]
    fn test_acquire_respects_capabilities() {
        let feed = ScriptedFeed::new();
        feed.set_capabilities(vec![TrackerCapability::HeartRate]);
        assert!(matches!(
            feed.acquire(TrackerCapability::EcgOnDemand),
            Err(FeedError::UnsupportedCapability(_))
        ));
    }

    #[test]
    fn test_unsubscribe_from_inside_callback() {
        let feed = Arc::new(ScriptedFeed::new());
        let tracker = feed.acquire(TrackerCapability::EcgOnDemand).unwrap();

        let inner = feed.clone();
        feed.subscribe(
            tracker,
            Box::new(move |_batch| {
                inner.unsubscribe(tracker);
            }),
        );

        feed.deliver(SampleBatch::uniform(0, &[0.1]));
        assert!(!feed.has_subscriber());
    }
}
