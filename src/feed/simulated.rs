//! Threaded feed that synthesises ECG-shaped batches.
//!
//! `SimulatedFeed` stands in for real wearable hardware: once subscribed it
//! spawns a producer thread that emits batches at a fixed cadence, following
//! a contact script (so lead-off runs can be reproduced on demand). The
//! waveform is a deterministic two-harmonic sine, good enough to make demo
//! output look like a signal rather than a constant.

use crate::feed::{
    BatchCallback, FeedError, SampleBatch, SensorFeed, SensorReading, TrackerCapability,
    TrackerHandle,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::debug;

/// One stretch of the contact script: `batches` consecutive batches all
/// tagged with `contact_quality`.
#[derive(Debug, Clone, Copy)]
pub struct ContactPhase {
    pub contact_quality: i32,
    pub batches: usize,
}

impl ContactPhase {
    pub fn on_contact(batches: usize) -> Self {
        Self {
            contact_quality: 0,
            batches,
        }
    }

    pub fn off_contact(batches: usize) -> Self {
        Self {
            contact_quality: crate::feed::NO_CONTACT_CODE,
            batches,
        }
    }
}

/// Configuration for the simulated producer thread.
#[derive(Debug, Clone)]
pub struct SimulatedFeedConfig {
    /// Delay between consecutive batches
    pub batch_interval: Duration,
    /// Readings per batch
    pub readings_per_batch: usize,
    /// Sample rate used to shape the waveform
    pub sample_rate_hz: u32,
    /// Contact script; once exhausted the last phase's code repeats forever
    pub script: Vec<ContactPhase>,
}

impl Default for SimulatedFeedConfig {
    fn default() -> Self {
        Self {
            batch_interval: Duration::from_millis(40),
            readings_per_batch: 20,
            sample_rate_hz: 500,
            script: vec![ContactPhase::on_contact(usize::MAX)],
        }
    }
}

/// A feed backed by a waveform-generating producer thread.
///
/// Each subscription gets its own stop flag: unsubscribing (or subscribing
/// again) flips the flag and the orphaned producer thread exits on its next
/// iteration. No joins happen here, so `unsubscribe` is safe to call from
/// inside the batch callback.
pub struct SimulatedFeed {
    config: SimulatedFeedConfig,
    connected: AtomicBool,
    streaming: Mutex<Arc<AtomicBool>>,
    next_handle: AtomicU64,
}

impl SimulatedFeed {
    pub fn new(config: SimulatedFeedConfig) -> Self {
        Self {
            config,
            connected: AtomicBool::new(true),
            streaming: Mutex::new(Arc::new(AtomicBool::new(false))),
            next_handle: AtomicU64::new(1),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Whether a producer thread is currently emitting batches.
    pub fn is_streaming(&self) -> bool {
        self.streaming.lock().unwrap().load(Ordering::SeqCst)
    }

    fn stop_streaming(&self) {
        self.streaming.lock().unwrap().store(false, Ordering::SeqCst);
    }
}

impl SensorFeed for SimulatedFeed {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn supports(&self, capability: TrackerCapability) -> bool {
        capability == TrackerCapability::EcgOnDemand
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

    fn release(&self, _tracker: TrackerHandle) {
        self.stop_streaming();
    }

    fn subscribe(&self, _tracker: TrackerHandle, mut callback: BatchCallback) {
        let streaming = Arc::new(AtomicBool::new(true));
        {
            let mut slot = self.streaming.lock().unwrap();
            slot.store(false, Ordering::SeqCst);
            *slot = streaming.clone();
        }

        let config = self.config.clone();
        thread::spawn(move || {
            let mut waveform = Waveform::new(config.sample_rate_hz);
            let mut script = config.script.iter().copied();
            let mut phase = script
                .next()
                .unwrap_or_else(|| ContactPhase::on_contact(usize::MAX));
            let mut emitted_in_phase = 0usize;

            while streaming.load(Ordering::SeqCst) {
                if emitted_in_phase >= phase.batches {
                    // Once the script runs out, keep repeating the last code.
                    if let Some(next) = script.next() {
                        phase = next;
                    }
                    emitted_in_phase = 0;
                }

                let readings: Vec<SensorReading> = (0..config.readings_per_batch)
                    .map(|_| SensorReading::new(phase.contact_quality, waveform.next_millivolts()))
                    .collect();
                callback(SampleBatch::new(readings));
                emitted_in_phase += 1;

                thread::sleep(config.batch_interval);
            }
            debug!("simulated feed producer exiting");
        });
    }

    fn unsubscribe(&self, _tracker: TrackerHandle) {
        self.stop_streaming();
    }
}

/// Deterministic two-harmonic sine generator in millivolts.
struct Waveform {
    sample_rate_hz: f32,
    tick: u64,
}

impl Waveform {
    fn new(sample_rate_hz: u32) -> Self {
        Self {
            sample_rate_hz: sample_rate_hz.max(1) as f32,
            tick: 0,
        }
    }

    fn next_millivolts(&mut self) -> f32 {
        let t = self.tick as f32 / self.sample_rate_hz;
        self.tick += 1;
        let fundamental = (2.0 * std::f32::consts::PI * 1.2 * t).sin();
        let harmonic = 0.25 * (2.0 * std::f32::consts::PI * 12.0 * t).sin();
        0.8 * fundamental + harmonic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_streaming_stops_on_unsubscribe() {
        let config = SimulatedFeedConfig {
            batch_interval: Duration::from_millis(1),
            ..Default::default()
        };
        let feed = SimulatedFeed::new(config);
        let tracker = feed.acquire(TrackerCapability::EcgOnDemand).unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        feed.subscribe(
            tracker,
            Box::new(move |_batch| {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert!(feed.is_streaming());

        // Wait for at least one batch, then stop.
        while count.load(Ordering::SeqCst) == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        feed.unsubscribe(tracker);
        assert!(!feed.is_streaming());
    }

    #[test]
    fn test_contact_script_phases() {
        let config = SimulatedFeedConfig {
            batch_interval: Duration::from_millis(1),
            readings_per_batch: 4,
            script: vec![ContactPhase::on_contact(2), ContactPhase::off_contact(1)],
            ..Default::default()
        };
        let feed = SimulatedFeed::new(config);
        let tracker = feed.acquire(TrackerCapability::EcgOnDemand).unwrap();

        let codes = Arc::new(Mutex::new(Vec::new()));
        let sink = codes.clone();
        feed.subscribe(
            tracker,
            Box::new(move |batch| {
                if let Some(code) = batch.leading_contact_code() {
                    sink.lock().unwrap().push(code);
                }
            }),
        );

        while codes.lock().unwrap().len() < 4 {
            thread::sleep(Duration::from_millis(1));
        }
        feed.unsubscribe(tracker);

        let codes = codes.lock().unwrap();
        assert_eq!(&codes[..4], &[0, 0, crate::feed::NO_CONTACT_CODE, crate::feed::NO_CONTACT_CODE]);
    }

    #[test]
    fn test_waveform_is_bounded() {
        let mut waveform = Waveform::new(500);
        for _ in 0..5_000 {
            let mv = waveform.next_millivolts();
            assert!(mv.abs() <= 1.05);
        }
    }
}
