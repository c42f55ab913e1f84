//! Integration coverage for conditional routing end-to-end through the
//! sequential scheduler (spec §4.4, §8 scenario S2).

mod common;

use common::set_var;
use petalflow::envelope::Envelope;
use petalflow::event::EventBus;
use petalflow::graph::GraphBuilder;
use petalflow::router::{Condition, ConditionalRouterNode, EvalMode, RouterConfig};
use petalflow::scheduler::{Scheduler, SchedulerOptions};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn s2_router_gate_selects_the_matching_branch() {
    let config = RouterConfig {
        mode: EvalMode::FirstMatch,
        conditions: vec![
            Condition::new("admin_path", "role == \"admin\""),
            Condition::new("guest_path", "role == \"guest\""),
        ],
        ..Default::default()
    };
    let router = ConditionalRouterNode::new("gate", config).unwrap();

    let graph = GraphBuilder::new()
        .add_node(Arc::new(router))
        .add_node(set_var("admin_path", "visited", json!("admin")))
        .add_node(set_var("guest_path", "visited", json!("guest")))
        .add_edge("gate", "admin_path")
        .add_edge("gate", "guest_path")
        .with_entry("gate")
        .compile()
        .unwrap();

    let scheduler = Scheduler::new(Arc::new(EventBus::default()), None);
    let env = Envelope::new().with_var("role", json!("guest"));
    let result = scheduler.run(&graph, env, SchedulerOptions::default()).await.unwrap();

    assert_eq!(result.get_var("visited"), Some(&json!("guest")));
}
