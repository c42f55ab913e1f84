//! Successor selection algorithm (spec §4.2.1).

use crate::envelope::Envelope;
use crate::graph::Graph;
use crate::node::{Node, RouteDecision};

/// The gate-redirect envelope key (spec §6 "Envelope conventions").
pub const GATE_REDIRECT_KEY: &str = "__gate_redirect__";

pub struct SuccessorSelection {
    pub targets: Vec<String>,
    /// Set whenever a `route.decision` event should be emitted — either a
    /// gate redirect or a router's decision (spec §4.2.1 steps 1-2).
    pub decision: Option<RouteDecision>,
}

/// Computes the next nodes to run after `node_id` finished, given the
/// post-run envelope. The scheduler never re-orders static successors in
/// the non-router case (spec §4.2.1 "Tie-breaks and ordering").
pub fn select_successors(node: &dyn Node, node_id: &str, graph: &Graph, env: &mut Envelope) -> SuccessorSelection {
    let statics = graph.successors(node_id);

    if let Some(redirect) = env
        .get_var(GATE_REDIRECT_KEY)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
    {
        if statics.iter().any(|s| s == &redirect) {
            env.delete_var(GATE_REDIRECT_KEY);
            let decision = RouteDecision::new(vec![redirect.clone()], "gate redirect".to_string(), 1.0);
            return SuccessorSelection {
                targets: vec![redirect],
                decision: Some(decision),
            };
        }
    }

    if node.as_router().is_some() {
        let key = format!("{node_id}_decision");
        if let Some(raw) = env.get_var(&key) {
            if let Ok(decision) = serde_json::from_value::<RouteDecision>(raw.clone()) {
                let targets: Vec<String> = decision
                    .targets
                    .iter()
                    .filter(|t| statics.iter().any(|s| s == *t))
                    .cloned()
                    .collect();
                return SuccessorSelection {
                    targets,
                    decision: Some(decision),
                };
            }
        }
    }

    SuccessorSelection {
        targets: statics.to_vec(),
        decision: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::node::{NodeContext, NodeFailure, NodeKind, Router};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    struct PlainNode(&'static str);

    #[async_trait]
    impl Node for PlainNode {
        fn id(&self) -> &str {
            self.0
        }
        fn kind(&self) -> NodeKind {
            NodeKind::Noop
        }
        async fn run(&self, _ctx: &NodeContext, env: Envelope) -> Result<Envelope, NodeFailure> {
            Ok(env)
        }
    }

    struct RouterNode(&'static str);

    #[async_trait]
    impl Router for RouterNode {
        async fn decide(&self, _env: &Envelope) -> Result<RouteDecision, NodeFailure> {
            unreachable!("test calls select_successors directly")
        }
    }

    #[async_trait]
    impl Node for RouterNode {
        fn id(&self) -> &str {
            self.0
        }
        fn kind(&self) -> NodeKind {
            NodeKind::Router
        }
        async fn run(&self, _ctx: &NodeContext, env: Envelope) -> Result<Envelope, NodeFailure> {
            Ok(env)
        }
        fn as_router(&self) -> Option<&dyn Router> {
            Some(self)
        }
    }

    fn graph() -> Graph {
        GraphBuilder::new()
            .add_node(Arc::new(RouterNode("R")))
            .add_node(Arc::new(PlainNode("X")))
            .add_node(Arc::new(PlainNode("Y")))
            .add_node(Arc::new(PlainNode("Z")))
            .add_edge("R", "X")
            .add_edge("R", "Y")
            .with_entry("R")
            .compile()
            .unwrap()
    }

    #[test]
    fn gate_redirect_takes_priority_and_is_cleared() {
        let g = graph();
        let node = g.node("R").unwrap();
        let mut env = Envelope::new().with_var(GATE_REDIRECT_KEY, json!("Y"));
        let selection = select_successors(node.as_ref(), "R", &g, &mut env);
        assert_eq!(selection.targets, vec!["Y".to_string()]);
        assert!(env.get_var(GATE_REDIRECT_KEY).is_none());
    }

    #[test]
    fn non_successor_redirect_is_ignored() {
        let g = graph();
        let node = g.node("R").unwrap();
        let mut env = Envelope::new().with_var(GATE_REDIRECT_KEY, json!("Z"));
        let selection = select_successors(node.as_ref(), "R", &g, &mut env);
        // Z is a node but not a static successor of R, so the redirect is
        // ignored and the router's decision (absent here) falls through to
        // static successors.
        assert_eq!(selection.targets, vec!["X".to_string(), "Y".to_string()]);
    }

    #[test]
    fn router_decision_is_intersected_with_static_successors() {
        let g = graph();
        let node = g.node("R").unwrap();
        let decision = RouteDecision::new(vec!["Z".to_string(), "X".to_string()], "r".to_string(), 0.9);
        let mut env = Envelope::new().with_var("R_decision", serde_json::to_value(&decision).unwrap());
        let selection = select_successors(node.as_ref(), "R", &g, &mut env);
        assert_eq!(selection.targets, vec!["X".to_string()]);
    }

    #[test]
    fn router_with_no_decision_falls_back_to_static_successors() {
        let g = graph();
        let node = g.node("R").unwrap();
        let mut env = Envelope::new();
        let selection = select_successors(node.as_ref(), "R", &g, &mut env);
        assert_eq!(selection.targets, vec!["X".to_string(), "Y".to_string()]);
    }
}
