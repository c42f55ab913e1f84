//! The `Event` wire type (spec §3 "Event", §6 "Events (wire form for SSE)").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event kinds required by the spec's event fabric (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    RunStarted,
    RunFinished,
    NodeStarted,
    NodeFinished,
    NodeFailed,
    NodeOutputDelta,
    NodeOutputFinal,
    RouteDecision,
    ToolCall,
    ToolResult,
    StepPaused,
    StepResumed,
    StepSkipped,
    StepAborted,
}

impl EventKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RunStarted => "run.started",
            Self::RunFinished => "run.finished",
            Self::NodeStarted => "node.started",
            Self::NodeFinished => "node.finished",
            Self::NodeFailed => "node.failed",
            Self::NodeOutputDelta => "node.output.delta",
            Self::NodeOutputFinal => "node.output.final",
            Self::RouteDecision => "route.decision",
            Self::ToolCall => "tool.call",
            Self::ToolResult => "tool.result",
            Self::StepPaused => "step.paused",
            Self::StepResumed => "step.resumed",
            Self::StepSkipped => "step.skipped",
            Self::StepAborted => "step.aborted",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single lifecycle event (spec §3). Immutable once emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub run_id: String,
    pub node_id: Option<String>,
    pub node_kind: Option<String>,
    pub time: DateTime<Utc>,
    pub attempt: u32,
    pub elapsed_ms: i64,
    pub payload: Value,
    pub seq: u64,
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
}

impl Event {
    #[must_use]
    pub fn builder(kind: EventKind, run_id: impl Into<String>) -> EventBuilder {
        EventBuilder {
            kind,
            run_id: run_id.into(),
            node_id: None,
            node_kind: None,
            attempt: 1,
            elapsed_ms: 0,
            payload: Value::Null,
            trace_id: None,
            span_id: None,
        }
    }
}

/// Builder for [`Event`]; the sequence number and timestamp are assigned at
/// emission time by the bus/store, not by the builder.
pub struct EventBuilder {
    kind: EventKind,
    run_id: String,
    node_id: Option<String>,
    node_kind: Option<String>,
    attempt: u32,
    elapsed_ms: i64,
    payload: Value,
    trace_id: Option<String>,
    span_id: Option<String>,
}

impl EventBuilder {
    #[must_use]
    pub fn node(mut self, node_id: impl Into<String>, node_kind: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self.node_kind = Some(node_kind.into());
        self
    }

    #[must_use]
    pub fn attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    #[must_use]
    pub fn elapsed_ms(mut self, elapsed_ms: i64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }

    #[must_use]
    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    #[must_use]
    pub fn trace(mut self, trace_id: impl Into<String>, span_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self.span_id = Some(span_id.into());
        self
    }

    /// Finalize with an assigned sequence number, stamping the current time.
    #[must_use]
    pub fn seal(self, seq: u64, now: DateTime<Utc>) -> Event {
        Event {
            kind: self.kind,
            run_id: self.run_id,
            node_id: self.node_id,
            node_kind: self.node_kind,
            time: now,
            attempt: self.attempt,
            elapsed_ms: self.elapsed_ms,
            payload: self.payload,
            seq,
            trace_id: self.trace_id,
            span_id: self.span_id,
        }
    }
}
