//! Shared fixtures for integration tests.

use async_trait::async_trait;
use petalflow::envelope::Envelope;
use petalflow::node::{Node, NodeContext, NodeFailure, NodeKind};
use serde_json::Value;
use std::sync::Arc;

/// Writes `value` into `var_name` and passes the envelope through.
pub struct SetVar {
    pub id: &'static str,
    pub var_name: &'static str,
    pub value: Value,
}

#[async_trait]
impl Node for SetVar {
    fn id(&self) -> &str {
        self.id
    }
    fn kind(&self) -> NodeKind {
        NodeKind::Noop
    }
    async fn run(&self, _ctx: &NodeContext, mut env: Envelope) -> Result<Envelope, NodeFailure> {
        env.set_var(self.var_name, self.value.clone());
        Ok(env)
    }
}

pub fn set_var(id: &'static str, var_name: &'static str, value: Value) -> Arc<dyn Node> {
    Arc::new(SetVar { id, var_name, value })
}

/// Fails unconditionally with `message`.
pub struct AlwaysFail {
    pub id: &'static str,
    pub message: &'static str,
}

#[async_trait]
impl Node for AlwaysFail {
    fn id(&self) -> &str {
        self.id
    }
    fn kind(&self) -> NodeKind {
        NodeKind::Noop
    }
    async fn run(&self, _ctx: &NodeContext, _env: Envelope) -> Result<Envelope, NodeFailure> {
        Err(NodeFailure::Other(self.message.to_string()))
    }
}

pub fn always_fail(id: &'static str, message: &'static str) -> Arc<dyn Node> {
    Arc::new(AlwaysFail { id, message })
}
