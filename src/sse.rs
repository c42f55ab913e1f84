//! Replay-then-live SSE delivery protocol (spec §4.6).
//!
//! The core is framework-agnostic — it produces a stream of already-framed
//! wire lines — grounded on the teacher's `examples/demo7_axum_sse.rs`
//! pattern of an `async_stream::stream!` adapter feeding a response type.
//! An optional `axum` integration sits behind the `axum-sse` feature.

use crate::event::{Event, EventBus, EventKind, EventStore};
use async_stream::stream;
use futures_util::Stream;
use miette::Diagnostic;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Idle heartbeat interval (spec §4.6).
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Error, Diagnostic)]
#[error("invalid `after` cursor: {0}")]
#[diagnostic(code(petalflow::sse::invalid_after))]
pub struct InvalidAfter(pub String);

/// Parses the `after` query parameter: an optional non-negative integer
/// cursor, default 0. Anything else is an invalid cursor (HTTP 400 per
/// spec §4.6).
pub fn parse_after(raw: Option<&str>) -> Result<u64, InvalidAfter> {
    match raw {
        None => Ok(0),
        Some(s) => s.parse::<u64>().map_err(|_| InvalidAfter(s.to_string())),
    }
}

/// One already-framed line group ready to be written to the wire:
/// `id: <seq>\nevent: <kind>\ndata: <json>\n\n`.
#[must_use]
pub fn frame_event(event: &Event) -> String {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    format!("id: {}\nevent: {}\ndata: {}\n\n", event.seq, event.kind, data)
}

/// The heartbeat comment line (spec §4.6).
#[must_use]
pub fn heartbeat_frame() -> &'static str {
    ": ping\n\n"
}

/// Implements the replay-then-live protocol (spec §4.6 "Protocol") as a
/// stream of [`Event`]s already deduplicated against the replay window.
/// Callers are responsible for framing (`frame_event`) and for the 15s
/// idle heartbeat, since that depends on the surrounding I/O loop.
pub fn replay_then_live(
    store: Arc<dyn EventStore>,
    bus: Arc<EventBus>,
    run_id: String,
    after: u64,
) -> impl Stream<Item = Event> {
    stream! {
        // Step 1: subscribe to the live bus BEFORE reading the store, to
        // close the race window (spec §4.6 "Protocol" step 1).
        let mut subscription = bus.subscribe(&run_id);

        let mut last_written = after;
        let mut closed = false;

        // Step 2: replay.
        let replay = store.list(&run_id, after, None).await;
        for event in replay {
            last_written = event.seq;
            let finished = event.kind == EventKind::RunFinished;
            yield event;
            if finished {
                closed = true;
                break;
            }
        }

        // Step 3: live, deduplicated against the replay window. If the run
        // already reached `run.finished` at or before the requested cursor
        // (a client reconnecting after the run is long over), there is
        // nothing further to wait for — close immediately instead of
        // blocking on a live event that will never arrive.
        let already_finished = !closed
            && store
                .list(&run_id, 0, None)
                .await
                .iter()
                .any(|e| e.kind == EventKind::RunFinished && e.seq <= after);

        if !closed && !already_finished {
            while let Some(event) = subscription.next().await {
                if event.seq <= last_written {
                    continue;
                }
                last_written = event.seq;
                let finished = event.kind == EventKind::RunFinished;
                yield event;
                if finished {
                    break;
                }
            }
        }
    }
}

#[cfg(feature = "axum-sse")]
pub mod axum_integration {
    //! Optional `axum::response::sse::Sse` integration, grounded directly in
    //! the teacher's `examples/demo7_axum_sse.rs`.

    use super::{replay_then_live, InvalidAfter};
    use crate::event::{EventBus, EventStore};
    use axum::response::sse::{Event as SseEvent, Sse};
    use futures_util::StreamExt;
    use std::convert::Infallible;
    use std::sync::Arc;

    /// Builds an Axum SSE response for one run, given the already-parsed
    /// `after` cursor. Callers typically parse `after` with
    /// [`super::parse_after`] and return HTTP 400 themselves on
    /// [`InvalidAfter`] before calling this.
    pub fn sse_response(
        store: Arc<dyn EventStore>,
        bus: Arc<EventBus>,
        run_id: String,
        after: u64,
    ) -> Sse<impl futures_util::Stream<Item = Result<SseEvent, Infallible>>> {
        let events = replay_then_live(store, bus, run_id, after);
        let framed = events.map(|event| {
            let payload = serde_json::to_value(&event).unwrap_or(serde_json::Value::Null);
            let sse_event = SseEvent::default()
                .id(event.seq.to_string())
                .event(event.kind.to_string())
                .json_data(payload)
                .unwrap_or_else(|_| SseEvent::default());
            Ok(sse_event)
        });
        Sse::new(framed)
    }

    pub type AxumAfterError = InvalidAfter;
}
