//! The node contract (spec §4.1) and its optional capability extensions
//! (spec §3 "Capabilities", §9 "Dynamic dispatch / capability detection").

use crate::envelope::Envelope;
use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Descriptive tag for a node's class. Not dispatch-critical: the scheduler
/// never branches on `NodeKind`, only on capability queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Llm,
    Tool,
    Transform,
    Filter,
    Merge,
    Router,
    Gate,
    Guardian,
    Human,
    Map,
    Cache,
    Sink,
    Noop,
    Conditional,
    Func,
}

impl NodeKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Llm => "llm",
            Self::Tool => "tool",
            Self::Transform => "transform",
            Self::Filter => "filter",
            Self::Merge => "merge",
            Self::Router => "router",
            Self::Gate => "gate",
            Self::Guardian => "guardian",
            Self::Human => "human",
            Self::Map => "map",
            Self::Cache => "cache",
            Self::Sink => "sink",
            Self::Noop => "noop",
            Self::Conditional => "conditional",
            Self::Func => "func",
        }
    }

    /// All builtin kinds, in the order the registry seeds them (spec
    /// EXPANSION item 3, `registry.rs`).
    pub const ALL: [NodeKind; 15] = [
        Self::Llm,
        Self::Tool,
        Self::Transform,
        Self::Filter,
        Self::Merge,
        Self::Router,
        Self::Gate,
        Self::Guardian,
        Self::Human,
        Self::Map,
        Self::Cache,
        Self::Sink,
        Self::Noop,
        Self::Conditional,
        Self::Func,
    ];
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown node kind `{s}`"))
    }
}

/// Failure returned from [`Node::run`]. Wrapped by the scheduler into
/// `PetalFlowError::NodeExecution` or recorded as an `envelope::NodeError`
/// on the continue-on-error path.
#[derive(Debug, Error, Diagnostic)]
pub enum NodeFailure {
    #[error("missing required input: {what}")]
    #[diagnostic(code(petalflow::node::missing_input))]
    MissingInput { what: &'static str },

    #[error("provider `{provider}` error: {message}")]
    #[diagnostic(code(petalflow::node::provider))]
    Provider { provider: String, message: String },

    #[error("validation failed: {0}")]
    #[diagnostic(code(petalflow::node::validation_failed))]
    ValidationFailed(String),

    #[error(transparent)]
    #[diagnostic(code(petalflow::node::serde))]
    Serde(#[from] serde_json::Error),

    #[error("{0}")]
    #[diagnostic(code(petalflow::node::other))]
    Other(String),
}

/// Minimal execution context handed to every node invocation. Real
/// deployments attach cancellation and event-emission through the
/// scheduler; this type is intentionally small since node-internal
/// behavior (LLM calls, tool transports) is out of this crate's scope.
#[derive(Debug, Clone)]
pub struct NodeContext {
    pub run_id: String,
    pub node_id: String,
    pub step: u32,
}

/// A router's decision about which graph successors should run next (spec
/// §3 "RouteDecision"). Targets are names, not positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDecision {
    pub targets: Vec<String>,
    pub reason: String,
    pub confidence: f64,
}

impl RouteDecision {
    #[must_use]
    pub fn new(targets: Vec<String>, reason: impl Into<String>, confidence: f64) -> Self {
        Self {
            targets,
            reason: reason.into(),
            confidence,
        }
    }
}

/// Optional capability: a node that decides which successors should run.
#[async_trait]
pub trait Router: Send + Sync {
    async fn decide(&self, env: &Envelope) -> Result<RouteDecision, NodeFailure>;
}

/// Optional capability: a node that waits for multiple predecessor
/// envelopes and deterministically merges them into one.
pub trait MergeCapable: Send + Sync {
    /// 0 means "derive from predecessor count" (spec §4.2 parallel executor).
    fn expected_inputs(&self) -> usize;

    fn merge(&self, inputs: Vec<Envelope>) -> Result<Envelope, NodeFailure>;
}

/// One lazily-produced delta chunk from a streaming node, plus the final
/// envelope once the stream completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamDelta {
    pub sequence: u32,
    pub payload: Value,
}

/// Optional capability: a node that produces incremental output chunks in
/// addition to its final envelope.
#[async_trait]
pub trait StreamingLlm: Send + Sync {
    async fn stream(
        &self,
        ctx: &NodeContext,
        env: &Envelope,
    ) -> Result<(Vec<StreamDelta>, Envelope), NodeFailure>;
}

/// The node contract (spec §4.1): a stable identifier, a descriptive kind,
/// and a pure-from-the-node's-perspective `run` method. Capabilities are
/// queried without invoking the node, so the scheduler can ask "does this
/// route?" before it decides how to dispatch successors (spec §9).
#[async_trait]
pub trait Node: Send + Sync {
    fn id(&self) -> &str;
    fn kind(&self) -> NodeKind;

    async fn run(&self, ctx: &NodeContext, env: Envelope) -> Result<Envelope, NodeFailure>;

    fn as_router(&self) -> Option<&dyn Router> {
        None
    }

    fn as_merge(&self) -> Option<&dyn MergeCapable> {
        None
    }

    fn as_streaming(&self) -> Option<&dyn StreamingLlm> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_kind_round_trips_through_display_and_parse() {
        for kind in NodeKind::ALL {
            let parsed: NodeKind = kind.to_string().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn unknown_kind_string_is_rejected() {
        assert!("not_a_kind".parse::<NodeKind>().is_err());
    }
}
