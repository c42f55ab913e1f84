//! Append-only event store (spec §4.5 "Event store contract").

use super::event::Event;
use async_trait::async_trait;
use rustc_hash::FxHashMap;
use std::sync::Mutex;

/// `append`/`list` contract. The store is an append log keyed by run id;
/// `list` must return events in sequence order regardless of arrival order
/// (spec §4.5).
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(&self, event: Event);

    async fn list(&self, run_id: &str, after_seq: u64, limit: Option<usize>) -> Vec<Event>;
}

/// Reference in-memory implementation: a per-run `Vec<Event>` kept sorted
/// by sequence number on read, so out-of-band append order is tolerated.
#[derive(Default)]
pub struct InMemoryEventStore {
    runs: Mutex<FxHashMap<String, Vec<Event>>>,
}

impl InMemoryEventStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, event: Event) {
        let mut runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        runs.entry(event.run_id.clone()).or_default().push(event);
    }

    async fn list(&self, run_id: &str, after_seq: u64, limit: Option<usize>) -> Vec<Event> {
        let runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        let Some(events) = runs.get(run_id) else {
            return Vec::new();
        };
        let mut filtered: Vec<Event> = events.iter().filter(|e| e.seq > after_seq).cloned().collect();
        filtered.sort_by_key(|e| e.seq);
        if let Some(limit) = limit {
            filtered.truncate(limit);
        }
        filtered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::event::EventKind;
    use chrono::Utc;

    fn event(run_id: &str, seq: u64) -> Event {
        Event {
            kind: EventKind::NodeStarted,
            run_id: run_id.to_string(),
            node_id: None,
            node_kind: None,
            time: Utc::now(),
            attempt: 1,
            elapsed_ms: 0,
            payload: serde_json::Value::Null,
            seq,
            trace_id: None,
            span_id: None,
        }
    }

    #[tokio::test]
    async fn list_returns_sequence_order_regardless_of_append_order() {
        let store = InMemoryEventStore::new();
        store.append(event("r1", 3)).await;
        store.append(event("r1", 1)).await;
        store.append(event("r1", 2)).await;

        let events = store.list("r1", 0, None).await;
        let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn after_seq_filters_and_limit_truncates() {
        let store = InMemoryEventStore::new();
        for seq in 1..=5 {
            store.append(event("r1", seq)).await;
        }
        let events = store.list("r1", 3, None).await;
        assert_eq!(events.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![4, 5]);

        let limited = store.list("r1", 0, Some(2)).await;
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn unknown_run_returns_empty() {
        let store = InMemoryEventStore::new();
        assert!(store.list("ghost", 0, None).await.is_empty());
    }
}
