//! The measurement session state machine.
//!
//! One controller drives one session at a time: it arms on stable contact,
//! accumulates readings toward the target, and finishes exactly once with
//! `Success`, `LeadOff`, or `Cancelled`. Batch processing runs on the feed's
//! producer context; `start()`/`stop()` belong to the consumer context and
//! synchronise with it through one mutation gate plus an atomic finish guard.

use crate::config::SessionConfig;
use crate::feed::{SampleBatch, SensorFeed, TrackerCapability, TrackerHandle};
use crate::session::accumulator::SampleAccumulator;
use crate::session::debounce::{is_off_code, ContactDebouncer};
use crate::session::events::{
    deliver_events, EventDispatcher, FinishOutcome, SessionEvent, SessionListener,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};
use uuid::Uuid;

/// Authoritative session state. Transitions are the only way attributes
/// change; `Finished` is sticky until the next `start()`.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    WaitingForContact,
    Measuring { accepted_count: usize },
    Finished { outcome: FinishOutcome },
}

/// Streaming-sensor session controller.
///
/// Reusable: after a session reaches `Finished`, `start()` may be called
/// again; counters and buffer are reset for the new session.
pub struct SessionController {
    feed: Arc<dyn SensorFeed>,
    shared: Arc<Shared>,
    delivery: Mutex<Option<JoinHandle<()>>>,
}

/// State shared with the feed callback.
struct Shared {
    config: SessionConfig,
    /// The "already finishing" guard: true exactly while a session is live.
    running: AtomicBool,
    /// Cross-context snapshot of the debounced off-contact signal.
    lead_off: AtomicBool,
    core: Mutex<Core>,
}

/// Mutable session fields, owned by whoever holds the lock: the producer
/// during batch processing, the consumer during `start`/`stop`/snapshots.
struct Core {
    state: SessionState,
    debouncer: ContactDebouncer,
    accumulator: SampleAccumulator,
    dispatcher: Option<EventDispatcher>,
    tracker: Option<TrackerHandle>,
    session_id: Option<Uuid>,
}

impl SessionController {
    pub fn new(feed: Arc<dyn SensorFeed>, config: SessionConfig) -> Self {
        let target = config.target_sample_count();
        Self {
            feed,
            shared: Arc::new(Shared {
                config,
                running: AtomicBool::new(false),
                lead_off: AtomicBool::new(true),
                core: Mutex::new(Core {
                    state: SessionState::Idle,
                    debouncer: ContactDebouncer::new(),
                    accumulator: SampleAccumulator::new(target),
                    dispatcher: None,
                    tracker: None,
                    session_id: None,
                }),
            }),
            delivery: Mutex::new(None),
        }
    }

    /// Begin a session and register the one-shot listener.
    ///
    /// No-op (returns `false`) if a session is already running, the feed is
    /// disconnected, or the ECG capability is unavailable; the caller must
    /// re-check connectivity before retrying.
    pub fn start<L: SessionListener + Send + 'static>(&self, listener: L) -> bool {
        if self.shared.running.load(Ordering::SeqCst) {
            debug!("start ignored: session already running");
            return false;
        }
        if !self.feed.is_connected() || !self.feed.supports(TrackerCapability::EcgOnDemand) {
            warn!("start ignored: feed not connected or ECG not supported");
            return false;
        }
        let tracker = match self.feed.acquire(TrackerCapability::EcgOnDemand) {
            Ok(tracker) => tracker,
            Err(error) => {
                warn!(%error, "start ignored: could not acquire tracker");
                return false;
            }
        };

        // The previous session's delivery thread exits right after it hands
        // the listener `Finished`; joining it here keeps the event streams of
        // consecutive sessions from interleaving.
        if let Some(handle) = self.delivery.lock().unwrap().take() {
            let _ = handle.join();
        }

        let (dispatcher, events) = EventDispatcher::channel();
        let session_id = Uuid::new_v4();
        {
            let mut core = self.shared.core.lock().unwrap();
            core.state = SessionState::WaitingForContact;
            core.debouncer.reset();
            core.accumulator = SampleAccumulator::new(self.shared.config.target_sample_count());
            core.dispatcher = Some(dispatcher);
            core.tracker = Some(tracker);
            core.session_id = Some(session_id);
        }
        self.shared.lead_off.store(true, Ordering::SeqCst);

        let handle = thread::spawn(move || deliver_events(events, Box::new(listener)));
        *self.delivery.lock().unwrap() = Some(handle);

        // Mark the session live before subscribing so the first batch is not
        // discarded by the running check.
        self.shared.running.store(true, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        let feed = Arc::clone(&self.feed);
        self.feed.subscribe(
            tracker,
            Box::new(move |batch| Shared::on_batch(&shared, feed.as_ref(), batch)),
        );
        debug!(%session_id, target = self.shared.config.target_sample_count(), "session started");
        true
    }

    /// Cancel the running session, if any. The listener receives
    /// `Finished { outcome: Cancelled }` with whatever was accumulated.
    /// No-op after finish or when never started.
    pub fn stop(&self) {
        if !self.shared.running.load(Ordering::SeqCst) {
            return;
        }
        let mut core = self.shared.core.lock().unwrap();
        Shared::finish_locked(
            &self.shared,
            self.feed.as_ref(),
            &mut core,
            FinishOutcome::Cancelled,
        );
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> SessionState {
        self.shared.core.lock().unwrap().state.clone()
    }

    /// Debounced off-contact signal, readable from any context.
    pub fn is_lead_off(&self) -> bool {
        self.shared.lead_off.load(Ordering::SeqCst)
    }

    /// Whether a session is currently live.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Identifier assigned to the current (or most recent) session.
    pub fn session_id(&self) -> Option<Uuid> {
        self.shared.core.lock().unwrap().session_id
    }

    /// Number of valid readings that constitute a complete session.
    pub fn target_sample_count(&self) -> usize {
        self.shared.config.target_sample_count()
    }

    /// Record a transport error signalled by the feed mid-session. A
    /// transient tracker error does not end a session; only loss of contact
    /// or exhausting the target does.
    pub fn note_feed_error(&self, error: impl std::fmt::Display) {
        if self.shared.running.load(Ordering::SeqCst) {
            warn!(%error, "tracker error mid-session, continuing");
        }
    }
}

impl Shared {
    /// Batch entry point, invoked on the feed's producer context.
    fn on_batch(shared: &Arc<Shared>, feed: &dyn SensorFeed, batch: SampleBatch) {
        if !shared.running.load(Ordering::SeqCst) {
            return;
        }
        // An empty batch is ignored entirely: no counters, no events.
        let Some(code) = batch.leading_contact_code() else {
            return;
        };

        let mut core = shared.core.lock().unwrap();
        // A stop() may have finished the session while this batch waited on
        // the lock; in-flight batches after the transition are dropped.
        if !shared.running.load(Ordering::SeqCst) {
            return;
        }

        if is_off_code(code) {
            Self::on_off_batch(shared, feed, &mut core, &batch);
        } else {
            Self::on_contact_batch(shared, feed, &mut core, &batch);
        }
    }

    fn on_contact_batch(shared: &Shared, feed: &dyn SensorFeed, core: &mut Core, batch: &SampleBatch) {
        core.debouncer.observe(false);
        shared.lead_off.store(false, Ordering::SeqCst);
        core.emit(SessionEvent::StableTick);

        if core.state == SessionState::WaitingForContact {
            if core.debouncer.contact_stable_count() >= shared.config.starting_ticks {
                debug!(
                    ticks = core.debouncer.contact_stable_count(),
                    "contact stable, measuring"
                );
                core.state = SessionState::Measuring { accepted_count: 0 };
            }
            // Readings seen before and while arming belong to the warm-up,
            // not the session; accumulation starts with the next batch.
            return;
        }
        if !matches!(core.state, SessionState::Measuring { .. }) {
            return;
        }

        let added = core.accumulator.accept(&batch.readings);
        core.state = SessionState::Measuring {
            accepted_count: core.accumulator.accepted_count(),
        };
        if added > 0 {
            core.emit(SessionEvent::Progress(core.accumulator.progress_fraction()));
        }
        if core.accumulator.is_full() {
            Self::finish_locked(shared, feed, core, FinishOutcome::Success);
        }
    }

    fn on_off_batch(shared: &Shared, feed: &dyn SensorFeed, core: &mut Core, batch: &SampleBatch) {
        let measuring = matches!(core.state, SessionState::Measuring { .. });
        if measuring {
            // The contact code flips before the tracker stops reporting the
            // last valid values; readings in a lead-off batch that are still
            // individually marked valid count toward the target.
            let trailing: Vec<_> = batch
                .readings
                .iter()
                .copied()
                .filter(|r| !r.is_off_contact())
                .collect();
            core.accumulator.accept(&trailing);
            core.state = SessionState::Measuring {
                accepted_count: core.accumulator.accepted_count(),
            };
        }

        core.debouncer.observe(true);
        shared.lead_off.store(true, Ordering::SeqCst);
        core.emit(SessionEvent::LeadOff);

        if measuring {
            // Target-reached is evaluated before the debounce count, so
            // success wins when both become true on the same batch.
            if core.accumulator.is_full() {
                Self::finish_locked(shared, feed, core, FinishOutcome::Success);
            } else if core.debouncer.off_stable_count() >= shared.config.debounce_ticks_off {
                Self::finish_locked(shared, feed, core, FinishOutcome::LeadOff);
            }
        }
    }

    /// The single finish path. The CAS on `running` makes it execute at most
    /// once per session; whichever trigger loses the race is dropped.
    fn finish_locked(shared: &Shared, feed: &dyn SensorFeed, core: &mut Core, outcome: FinishOutcome) {
        if shared
            .running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        // Tear the subscription down as part of the transition; batches
        // already in flight are dropped by the running check.
        if let Some(tracker) = core.tracker.take() {
            feed.unsubscribe(tracker);
            feed.release(tracker);
        }

        let samples = core.accumulator.drain();
        let success = outcome == FinishOutcome::Success;
        core.state = SessionState::Finished { outcome };
        debug!(?outcome, samples = samples.len(), "session finished");

        if let Some(dispatcher) = core.dispatcher.take() {
            dispatcher.emit(SessionEvent::Finished {
                success,
                samples,
                outcome,
            });
        }
    }
}

impl Core {
    fn emit(&self, event: SessionEvent) {
        if let Some(ref dispatcher) = self.dispatcher {
            dispatcher.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::ScriptedFeed;
    use crate::feed::NO_CONTACT_CODE;
    use crossbeam_channel::Sender;

    fn config(starting_ticks: u32, debounce_ticks_off: u32) -> SessionConfig {
        SessionConfig {
            target_duration_ms: 20,
            sample_rate_hz: 500,
            debounce_ticks_off,
            starting_ticks,
        }
    }

    /// Forwards every listener call onto a channel so tests can assert on
    /// ordering without sleeping.
    struct ChannelListener {
        tx: Sender<SessionEvent>,
    }

    impl SessionListener for ChannelListener {
        fn on_lead_off(&mut self) {
            let _ = self.tx.send(SessionEvent::LeadOff);
        }
        fn on_stable_tick(&mut self) {
            let _ = self.tx.send(SessionEvent::StableTick);
        }
        fn on_progress(&mut self, fraction: f32) {
            let _ = self.tx.send(SessionEvent::Progress(fraction));
        }
        fn on_finished(&mut self, success: bool, samples: Vec<f32>, outcome: FinishOutcome) {
            let _ = self.tx.send(SessionEvent::Finished {
                success,
                samples,
                outcome,
            });
        }
    }

    fn start_session(
        controller: &SessionController,
    ) -> crossbeam_channel::Receiver<SessionEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        assert!(controller.start(ChannelListener { tx }));
        rx
    }

    fn wait_finished(rx: &crossbeam_channel::Receiver<SessionEvent>) -> (bool, Vec<f32>, FinishOutcome) {
        let deadline = std::time::Duration::from_secs(2);
        loop {
            match rx.recv_timeout(deadline).expect("finished event") {
                SessionEvent::Finished {
                    success,
                    samples,
                    outcome,
                } => return (success, samples, outcome),
                _ => continue,
            }
        }
    }

    #[test]
    fn test_start_requires_connected_feed() {
        let feed = Arc::new(ScriptedFeed::new());
        feed.set_connected(false);
        let controller = SessionController::new(feed.clone(), config(1, 2));
        let (tx, _rx) = crossbeam_channel::unbounded();
        assert!(!controller.start(ChannelListener { tx }));
        assert_eq!(controller.state(), SessionState::Idle);
        assert!(!feed.has_subscriber());
    }

    #[test]
    fn test_double_start_is_noop() {
        let feed = Arc::new(ScriptedFeed::new());
        let controller = SessionController::new(feed.clone(), config(1, 2));
        let _rx = start_session(&controller);
        let (tx, _rx2) = crossbeam_channel::unbounded();
        assert!(!controller.start(ChannelListener { tx }));
        controller.stop();
    }

    #[test]
    fn test_waiting_until_starting_ticks() {
        let feed = Arc::new(ScriptedFeed::new());
        let controller = SessionController::new(feed.clone(), config(3, 2));
        let _rx = start_session(&controller);

        feed.deliver(SampleBatch::uniform(0, &[0.1]));
        feed.deliver(SampleBatch::uniform(0, &[0.1]));
        assert_eq!(controller.state(), SessionState::WaitingForContact);

        // The arming batch transitions but contributes no samples.
        feed.deliver(SampleBatch::uniform(0, &[0.1]));
        assert!(matches!(
            controller.state(),
            SessionState::Measuring { accepted_count: 0 }
        ));

        feed.deliver(SampleBatch::uniform(0, &[0.1, 0.2]));
        assert!(matches!(
            controller.state(),
            SessionState::Measuring { accepted_count: 2 }
        ));
        controller.stop();
    }

    #[test]
    fn test_off_batch_resets_arming_progress() {
        let feed = Arc::new(ScriptedFeed::new());
        let controller = SessionController::new(feed.clone(), config(3, 2));
        let _rx = start_session(&controller);

        feed.deliver(SampleBatch::uniform(0, &[0.1]));
        feed.deliver(SampleBatch::uniform(0, &[0.1]));
        feed.deliver(SampleBatch::uniform(NO_CONTACT_CODE, &[0.0]));
        assert_eq!(controller.state(), SessionState::WaitingForContact);

        // Two more on-contact batches are not enough after the reset.
        feed.deliver(SampleBatch::uniform(0, &[0.1]));
        feed.deliver(SampleBatch::uniform(0, &[0.1]));
        assert_eq!(controller.state(), SessionState::WaitingForContact);
        controller.stop();
    }

    #[test]
    fn test_empty_batch_is_ignored() {
        let feed = Arc::new(ScriptedFeed::new());
        let controller = SessionController::new(feed.clone(), config(2, 2));
        let _rx = start_session(&controller);

        feed.deliver(SampleBatch::uniform(0, &[0.1]));
        feed.deliver(SampleBatch::default());
        feed.deliver(SampleBatch::uniform(0, &[0.1]));
        assert!(matches!(controller.state(), SessionState::Measuring { .. }));
        controller.stop();
    }

    #[test]
    fn test_lead_off_snapshot_tracks_contact() {
        let feed = Arc::new(ScriptedFeed::new());
        let controller = SessionController::new(feed.clone(), config(2, 5));
        assert!(controller.is_lead_off());
        let _rx = start_session(&controller);

        feed.deliver(SampleBatch::uniform(0, &[0.1]));
        assert!(!controller.is_lead_off());
        feed.deliver(SampleBatch::uniform(NO_CONTACT_CODE, &[0.0]));
        assert!(controller.is_lead_off());
        controller.stop();
    }

    #[test]
    fn test_success_priority_over_lead_off_on_same_batch() {
        // Target of 2; one accepted sample, then a lead-off batch whose
        // still-valid trailing reading fills the target on the same batch
        // that satisfies the debounce window.
        let config = SessionConfig {
            target_duration_ms: 4,
            sample_rate_hz: 500,
            debounce_ticks_off: 1,
            starting_ticks: 1,
        };
        let feed = Arc::new(ScriptedFeed::new());
        let controller = SessionController::new(feed.clone(), config);
        let rx = start_session(&controller);

        feed.deliver(SampleBatch::uniform(0, &[0.3]));
        feed.deliver(SampleBatch::uniform(0, &[0.5]));
        feed.deliver(SampleBatch::new(vec![
            crate::feed::SensorReading::new(NO_CONTACT_CODE, 0.0),
            crate::feed::SensorReading::new(0, 0.7),
        ]));

        let (success, samples, outcome) = wait_finished(&rx);
        assert!(success);
        assert_eq!(outcome, FinishOutcome::Success);
        assert_eq!(samples, vec![0.5, 0.7]);
    }

    #[test]
    fn test_pure_lead_off_batches_contribute_nothing() {
        let config = SessionConfig {
            target_duration_ms: 20,
            sample_rate_hz: 500,
            debounce_ticks_off: 2,
            starting_ticks: 1,
        };
        let feed = Arc::new(ScriptedFeed::new());
        let controller = SessionController::new(feed.clone(), config);
        let rx = start_session(&controller);

        feed.deliver(SampleBatch::uniform(0, &[0.1]));
        feed.deliver(SampleBatch::uniform(NO_CONTACT_CODE, &[9.0, 9.0]));
        feed.deliver(SampleBatch::uniform(NO_CONTACT_CODE, &[9.0, 9.0]));

        let (success, samples, outcome) = wait_finished(&rx);
        assert!(!success);
        assert_eq!(outcome, FinishOutcome::LeadOff);
        assert!(samples.is_empty());
    }

    #[test]
    fn test_note_feed_error_keeps_session_alive() {
        let feed = Arc::new(ScriptedFeed::new());
        let controller = SessionController::new(feed.clone(), config(1, 2));
        let _rx = start_session(&controller);

        feed.deliver(SampleBatch::uniform(0, &[0.1]));
        controller.note_feed_error("transient tracker fault");
        assert!(controller.is_running());
        assert!(matches!(controller.state(), SessionState::Measuring { .. }));
        controller.stop();
    }
}
