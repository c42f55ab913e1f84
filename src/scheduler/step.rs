//! The optional step debugger interface (spec §4.2.2).

use crate::envelope::Envelope;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPoint {
    BeforeNode,
    AfterNode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    Continue,
    SkipNode,
    Abort,
}

/// Envelope edits a before-node controller decision may request (spec
/// §4.2.2 "optional envelope mutation"). After-node mutations are ignored
/// per spec §4.2 step 6 ("envelope mutation is ignored after the fact").
#[derive(Debug, Clone, Default)]
pub struct EnvelopeMutation {
    pub set_vars: FxHashMap<String, Value>,
    pub delete_vars: Vec<String>,
}

impl EnvelopeMutation {
    pub fn apply(&self, env: &mut Envelope) {
        for key in &self.delete_vars {
            env.delete_var(key);
        }
        for (key, value) in &self.set_vars {
            env.set_var(key.clone(), value.clone());
        }
    }
}

/// Snapshot handed to the controller at a step point (spec §4.2.2).
#[derive(Debug, Clone)]
pub struct StepSnapshot {
    pub run_id: String,
    pub step_point: StepPoint,
    pub node_id: String,
    pub node_kind: String,
    pub envelope: Envelope,
    pub hop_count: u32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Configuration for when the scheduler consults the step controller.
#[derive(Debug, Clone, Copy)]
pub struct StepConfig {
    pub pause_before: bool,
    pub pause_after: bool,
    pub timeout: Option<Duration>,
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            pause_before: false,
            pause_after: false,
            timeout: None,
        }
    }
}

#[async_trait]
pub trait StepController: Send + Sync {
    async fn decide(&self, snapshot: StepSnapshot) -> (StepAction, Option<EnvelopeMutation>);
}
