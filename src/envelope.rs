//! The [`Envelope`]: the per-run data vehicle threaded through node execution.

use crate::utils::{new_var_map, VarMap};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One recorded node failure, appended to the envelope's error list on the
/// continue-on-error path (spec §7).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeError {
    pub node_id: String,
    pub kind: String,
    pub message: String,
    pub attempt: u32,
    pub at: DateTime<Utc>,
    pub cause: Option<String>,
}

impl NodeError {
    #[must_use]
    pub fn new(node_id: impl Into<String>, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            kind: kind.into(),
            message: message.into(),
            attempt: 1,
            at: Utc::now(),
            cause: None,
        }
    }

    #[must_use]
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    #[must_use]
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

/// Run-scoped trace metadata. The run identifier is set once by the
/// scheduler before the first node runs and never changes afterward.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraceInfo {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
}

/// The per-run data vehicle. Value type: every node receives one and must
/// return a new one (or the same value unchanged), never mutating the input
/// observably to other branches. Cloning deep-copies the variable map one
/// level so concurrent branches cannot see each other's writes (spec §3,
/// §8 invariant 8).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    vars: VarMap,
    errors: Vec<NodeError>,
    trace: Option<TraceInfo>,
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

impl Envelope {
    /// An envelope with no variables, no errors, and no trace record yet.
    /// The scheduler assigns the trace record at run start (spec §4.2
    /// "Run lifecycle" step 2).
    #[must_use]
    pub fn new() -> Self {
        Self {
            vars: new_var_map(),
            errors: Vec::new(),
            trace: None,
        }
    }

    #[must_use]
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn set_var(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn delete_var(&mut self, key: &str) {
        self.vars.remove(key);
    }

    #[must_use]
    pub fn get_var(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    #[must_use]
    pub fn vars(&self) -> &VarMap {
        &self.vars
    }

    pub fn vars_mut(&mut self) -> &mut VarMap {
        &mut self.vars
    }

    #[must_use]
    pub fn errors(&self) -> &[NodeError] {
        &self.errors
    }

    /// The error list grows only on the failure path (spec §3 invariant).
    pub fn record_error(&mut self, error: NodeError) {
        self.errors.push(error);
    }

    #[must_use]
    pub fn trace(&self) -> Option<&TraceInfo> {
        self.trace.as_ref()
    }

    /// Assigns the run identifier exactly once. Subsequent calls are no-ops
    /// so a provided envelope's trace record, if already set by the caller,
    /// is never overwritten.
    pub fn ensure_trace(&mut self, run_id: impl Into<String>) {
        if self.trace.is_none() {
            self.trace = Some(TraceInfo {
                run_id: run_id.into(),
                started_at: Utc::now(),
            });
        }
    }

    #[must_use]
    pub fn run_id(&self) -> Option<&str> {
        self.trace.as_ref().map(|t| t.run_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clone_does_not_alias_top_level_vars() {
        let mut original = Envelope::new().with_var("a", json!(1));
        let mut clone = original.clone();
        clone.set_var("a", json!(2));
        clone.set_var("b", json!("new"));

        assert_eq!(original.get_var("a"), Some(&json!(1)));
        assert_eq!(original.get_var("b"), None);

        original.set_var("a", json!(99));
        assert_eq!(clone.get_var("a"), Some(&json!(2)));
    }

    #[test]
    fn ensure_trace_is_idempotent() {
        let mut env = Envelope::new();
        env.ensure_trace("run-1");
        let first = env.trace().cloned();
        env.ensure_trace("run-2");
        assert_eq!(env.trace().cloned(), first);
    }

    #[test]
    fn errors_only_grow() {
        let mut env = Envelope::new();
        assert!(env.errors().is_empty());
        env.record_error(NodeError::new("n1", "tool", "boom"));
        assert_eq!(env.errors().len(), 1);
    }
}
