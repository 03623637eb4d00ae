//! Session lifecycle events and their delivery to the caller's listener.
//!
//! The producer context (the feed callback) must never block on, or be
//! reordered by, the consumer. Events therefore travel over a single
//! unbounded FIFO channel; a dedicated delivery thread drains it and invokes
//! the listener, preserving per-batch ordering (stable-tick/lead-off, then
//! progress, then finished).

use crate::feed::Sample;
use crossbeam_channel::{Receiver, Sender};
use tracing::debug;

/// Why a session reached `Finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishOutcome {
    /// The target sample count was reached
    Success,
    /// Contact was lost mid-measurement for the debounce window
    LeadOff,
    /// The caller stopped the session before completion
    Cancelled,
}

/// One state change or sub-state update, 1:1 with a listener callback.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// An off-contact batch arrived (fires immediately, pre-debounce)
    LeadOff,
    /// One more confirmed on-contact batch; drives caller-side grace timers
    StableTick,
    /// New samples were accepted while measuring
    Progress(f32),
    /// Terminal; delivered exactly once per session
    Finished {
        success: bool,
        samples: Vec<Sample>,
        outcome: FinishOutcome,
    },
}

/// Callback surface the presentation layer registers at `start()`.
///
/// Calls arrive on a single delivery thread, in emission order. The listener
/// is one-shot: after `on_finished` no further calls are made and the
/// listener is dropped.
pub trait SessionListener {
    fn on_lead_off(&mut self) {}
    fn on_stable_tick(&mut self) {}
    fn on_progress(&mut self, _fraction: f32) {}
    fn on_finished(&mut self, success: bool, samples: Vec<Sample>, outcome: FinishOutcome);
}

/// Producer-side handle: posts events onto the delivery channel without ever
/// blocking the sensor callback.
#[derive(Debug)]
pub(crate) struct EventDispatcher {
    tx: Sender<SessionEvent>,
}

impl EventDispatcher {
    pub(crate) fn channel() -> (Self, Receiver<SessionEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }

    /// Fire-and-forget post. A send only fails once the delivery thread has
    /// gone away, at which point there is nobody left to notify.
    pub(crate) fn emit(&self, event: SessionEvent) {
        if self.tx.send(event).is_err() {
            debug!("event dropped: delivery thread already exited");
        }
    }
}

/// Drain loop run by the delivery thread: forwards events to the listener in
/// order and exits once `Finished` is delivered (or the channel closes),
/// invalidating the one-shot listener.
pub(crate) fn deliver_events(rx: Receiver<SessionEvent>, mut listener: Box<dyn SessionListener + Send>) {
    for event in rx.iter() {
        match event {
            SessionEvent::LeadOff => listener.on_lead_off(),
            SessionEvent::StableTick => listener.on_stable_tick(),
            SessionEvent::Progress(fraction) => listener.on_progress(fraction),
            SessionEvent::Finished {
                success,
                samples,
                outcome,
            } => {
                listener.on_finished(success, samples, outcome);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl SessionListener for Recorder {
        fn on_lead_off(&mut self) {
            self.calls.lock().unwrap().push("lead_off".into());
        }
        fn on_stable_tick(&mut self) {
            self.calls.lock().unwrap().push("tick".into());
        }
        fn on_progress(&mut self, fraction: f32) {
            self.calls.lock().unwrap().push(format!("progress {fraction}"));
        }
        fn on_finished(&mut self, success: bool, _samples: Vec<Sample>, _outcome: FinishOutcome) {
            self.calls.lock().unwrap().push(format!("finished {success}"));
        }
    }

    #[test]
    fn test_delivery_preserves_order_and_stops_at_finished() {
        let (dispatcher, rx) = EventDispatcher::channel();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let listener = Recorder {
            calls: calls.clone(),
        };

        dispatcher.emit(SessionEvent::StableTick);
        dispatcher.emit(SessionEvent::Progress(0.5));
        dispatcher.emit(SessionEvent::Finished {
            success: true,
            samples: vec![1.0],
            outcome: FinishOutcome::Success,
        });
        // Emitted after Finished: must never reach the listener.
        dispatcher.emit(SessionEvent::StableTick);
        drop(dispatcher);

        deliver_events(rx, Box::new(listener));

        let calls = calls.lock().unwrap();
        assert_eq!(calls.as_slice(), &["tick", "progress 0.5", "finished true"]);
    }

    #[test]
    fn test_emit_after_receiver_dropped_is_silent() {
        let (dispatcher, rx) = EventDispatcher::channel();
        drop(rx);
        dispatcher.emit(SessionEvent::StableTick);
    }
}
