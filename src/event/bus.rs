//! In-memory fan-out event bus (spec §4.5 "Event bus contract").
//!
//! Grounded on the teacher's `event_bus::bus::EventBus`/`SinkEntry`, which
//! backs each run's fan-out with a `tokio::sync::broadcast` channel and
//! treats a lagging receiver as droppable rather than something that should
//! block the publisher or other subscribers.

use super::event::{Event, EventBuilder};
use super::seq::SequenceCounter;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Default per-subscription bounded buffer capacity, matching the teacher's
/// `DEFAULT_BUFFER_CAPACITY`.
pub const DEFAULT_BUFFER_CAPACITY: usize = 1024;

struct RunChannel {
    sender: broadcast::Sender<Event>,
    seq: Arc<SequenceCounter>,
}

/// Fan-out publisher/subscriber registry, one broadcast channel per run id.
/// `publish` never blocks on a slow subscriber: broadcast channels drop the
/// oldest buffered item for lagging receivers instead of backing up the
/// sender.
pub struct EventBus {
    capacity: usize,
    runs: Mutex<FxHashMap<String, RunChannel>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            runs: Mutex::new(FxHashMap::default()),
        }
    }

    fn channel_for(&self, run_id: &str) -> (broadcast::Sender<Event>, Arc<SequenceCounter>) {
        let mut runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        let entry = runs.entry(run_id.to_string()).or_insert_with(|| {
            let (sender, _) = broadcast::channel(self.capacity);
            RunChannel {
                sender,
                seq: Arc::new(SequenceCounter::new()),
            }
        });
        (entry.sender.clone(), Arc::clone(&entry.seq))
    }

    /// Assigns the next sequence number for `run_id` and publishes to every
    /// current subscriber. Returns the sealed event (with its sequence
    /// number) so callers can also hand it to an [`EventStore`](super::EventStore).
    pub fn publish(&self, run_id: &str, builder: EventBuilder) -> Event {
        self.publish_at(run_id, builder, Utc::now())
    }

    /// Like [`publish`](Self::publish), but with an explicit timestamp
    /// instead of the real wall clock — lets callers that carry an
    /// injectable clock (spec §4.2 "Options") keep event timestamps
    /// deterministic.
    pub fn publish_at(&self, run_id: &str, builder: EventBuilder, now: DateTime<Utc>) -> Event {
        let (sender, seq_counter) = self.channel_for(run_id);
        let seq = seq_counter.next();
        let event = builder.seal(seq, now);
        // An Err here just means there are currently no subscribers; the
        // publisher must not block or fail because of that.
        let _ = sender.send(event.clone());
        event
    }

    /// Subscribe to live events for a run. Must be called before reading
    /// the event store during SSE replay, to close the race window (spec
    /// §4.6 "Protocol" step 1).
    #[must_use]
    pub fn subscribe(&self, run_id: &str) -> Subscription {
        let (sender, _) = self.channel_for(run_id);
        Subscription {
            run_id: run_id.to_string(),
            receiver: sender.subscribe(),
        }
    }

    /// Drops bookkeeping for a finished run's channel. Subscriptions already
    /// created keep working off their own receiver until the sender side is
    /// also dropped.
    pub fn close(&self, run_id: &str) {
        self.runs.lock().unwrap_or_else(|e| e.into_inner()).remove(run_id);
    }
}

/// A live subscription to one run's events.
pub struct Subscription {
    run_id: String,
    receiver: broadcast::Receiver<Event>,
}

impl Subscription {
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Waits for the next event. Lagging (receiver fell behind the
    /// broadcast buffer) is logged and skipped rather than surfaced as an
    /// error to the caller — dropping a lagging subscriber must not affect
    /// other subscribers or the publisher (spec §4.5).
    pub async fn next(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(run_id = %self.run_id, skipped, "subscriber lagged, dropping buffered events");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::event::EventKind;

    #[tokio::test]
    async fn subscribe_before_publish_receives_event() {
        let bus = EventBus::default();
        let mut sub = bus.subscribe("run-1");
        let builder = Event::builder(EventKind::RunStarted, "run-1");
        let sent = bus.publish("run-1", builder);
        let received = sub.next().await.unwrap();
        assert_eq!(received.seq, sent.seq);
        assert_eq!(received.kind, EventKind::RunStarted);
    }

    #[tokio::test]
    async fn sequence_numbers_strictly_increase_within_a_run() {
        let bus = EventBus::default();
        let mut sub = bus.subscribe("run-1");
        for _ in 0..5 {
            bus.publish("run-1", Event::builder(EventKind::NodeStarted, "run-1"));
        }
        let mut last = 0;
        for _ in 0..5 {
            let event = sub.next().await.unwrap();
            assert!(event.seq > last);
            last = event.seq;
        }
    }

    #[tokio::test]
    async fn one_lagging_subscriber_does_not_affect_another() {
        let bus = EventBus::new(2);
        let mut slow = bus.subscribe("run-1");
        let mut fast = bus.subscribe("run-1");
        for _ in 0..10 {
            bus.publish("run-1", Event::builder(EventKind::NodeStarted, "run-1"));
        }
        // the fast subscriber drains immediately and keeps receiving fine.
        for _ in 0..10 {
            assert!(fast.next().await.is_some());
        }
        // the slow subscriber lagged but still eventually gets a non-error result.
        assert!(slow.next().await.is_some());
    }
}
