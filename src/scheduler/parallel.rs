//! The parallel executor (spec §4.2 "Parallel executor (concurrency ≥ 2)",
//! spec §5 "Locking discipline"): a fixed worker pool fed by a bounded
//! channel, coordination state partitioned across discrete locks for
//! per-node hop/completion state, merge-input accumulation, and recorded
//! errors.

use super::successor::select_successors;
use super::SchedulerOptions;
use crate::envelope::{Envelope, NodeError};
use crate::error::PetalFlowError;
use crate::event::{Event, EventBus, EventKind, EventStore};
use crate::graph::Graph;
use crate::node::{Node, NodeContext, NodeFailure};
use rustc_hash::FxHashMap;
use serde_json::json;
use std::sync::{Arc, Mutex};

struct WorkItem {
    node_id: String,
    node: Arc<dyn Node>,
    env: Envelope,
    hop: u32,
}

struct WorkResult {
    node_id: String,
    hop: u32,
    elapsed_ms: i64,
    outcome: Result<Envelope, NodeFailure>,
}

/// Per-node hop count and last-known completion, guarded by one lock (spec
/// §5 "Locking discipline").
#[derive(Default)]
struct NodeState {
    hop_counts: FxHashMap<String, u32>,
}

pub async fn run(
    graph: &Graph,
    env: Envelope,
    options: &SchedulerOptions,
    bus: &EventBus,
    store: Option<&dyn EventStore>,
    run_id: &str,
) -> Result<Envelope, PetalFlowError> {
    let (work_tx, work_rx) = flume::bounded::<WorkItem>(256);
    let (result_tx, result_rx) = flume::bounded::<WorkResult>(256);

    let mut workers = Vec::new();
    for _ in 0..options.concurrency.max(1) {
        let work_rx = work_rx.clone();
        let result_tx = result_tx.clone();
        let run_id_owned = run_id.to_string();
        workers.push(tokio::spawn(async move {
            while let Ok(item) = work_rx.recv_async().await {
                let ctx = NodeContext {
                    run_id: run_id_owned.clone(),
                    node_id: item.node_id.clone(),
                    step: item.hop,
                };
                let start = std::time::Instant::now();
                let outcome = item.node.run(&ctx, item.env).await;
                let elapsed_ms = start.elapsed().as_millis() as i64;
                if result_tx
                    .send_async(WorkResult {
                        node_id: item.node_id,
                        hop: item.hop,
                        elapsed_ms,
                        outcome,
                    })
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }));
    }

    let node_state = Mutex::new(NodeState::default());
    let merge_inputs: Mutex<FxHashMap<String, Vec<Envelope>>> = Mutex::new(FxHashMap::default());
    let recorded_errors: Mutex<Vec<NodeError>> = Mutex::new(Vec::new());
    let final_env: Mutex<Option<Envelope>> = Mutex::new(None);

    /// Claims the next hop for `node_id`; `None` means scheduling would
    /// exceed its hop budget (spec §4.2: "Otherwise, if scheduling would
    /// exceed the successor's hop budget, skip.").
    fn claim_hop(node_state: &Mutex<NodeState>, node_id: &str, max_hops: u32) -> Option<u32> {
        let mut state = node_state.lock().unwrap_or_else(|e| e.into_inner());
        let hop = state.hop_counts.entry(node_id.to_string()).or_insert(0);
        let next = *hop + 1;
        if next > max_hops {
            return None;
        }
        *hop = next;
        Some(next)
    }

    let entry_id = graph.entry().to_string();
    let Some(entry_node) = graph.node(&entry_id).cloned() else {
        return Err(PetalFlowError::NodeNotFound(entry_id));
    };
    let Some(entry_hop) = claim_hop(&node_state, &entry_id, options.max_hops) else {
        return Err(PetalFlowError::MaxHopsExceeded {
            node_id: entry_id,
            max_hops: options.max_hops,
        });
    };

    emit_async(
        bus,
        store,
        run_id,
        Event::builder(EventKind::NodeStarted, run_id)
            .node(entry_id.clone(), entry_node.kind().as_str())
            .attempt(entry_hop),
        options,
    )
    .await;

    let mut in_flight: usize = 1;
    let _ = work_tx
        .send_async(WorkItem {
            node_id: entry_id,
            node: entry_node,
            env,
            hop: entry_hop,
        })
        .await;

    let mut run_error: Option<PetalFlowError> = None;

    while in_flight > 0 {
        if options.cancellation.is_cancelled() {
            run_error = Some(PetalFlowError::RunCanceled);
            break;
        }

        let Ok(result) = result_rx.recv_async().await else {
            break;
        };
        in_flight -= 1;

        let Some(node) = graph.node(&result.node_id).cloned() else {
            run_error = Some(PetalFlowError::NodeNotFound(result.node_id));
            break;
        };

        match result.outcome {
            Ok(mut new_env) => {
                emit_async(
                    bus,
                    store,
                    run_id,
                    Event::builder(EventKind::NodeFinished, run_id)
                        .node(result.node_id.clone(), node.kind().as_str())
                        .attempt(result.hop)
                        .elapsed_ms(result.elapsed_ms),
                    options,
                )
                .await;

                let selection = select_successors(node.as_ref(), &result.node_id, graph, &mut new_env);
                if let Some(decision) = &selection.decision {
                    emit_async(
                        bus,
                        store,
                        run_id,
                        Event::builder(EventKind::RouteDecision, run_id)
                            .node(result.node_id.clone(), node.kind().as_str())
                            .payload(serde_json::to_value(decision).unwrap_or(serde_json::Value::Null)),
                        options,
                    )
                    .await;
                }

                if selection.targets.is_empty() {
                    *final_env.lock().unwrap_or_else(|e| e.into_inner()) = Some(new_env);
                } else {
                    for target_id in &selection.targets {
                        let Some(target_node) = graph.node(target_id).cloned() else {
                            continue;
                        };

                        if let Some(merge_cap) = target_node.as_merge() {
                            let expected = if merge_cap.expected_inputs() == 0 {
                                graph.predecessors(target_id).len().max(1)
                            } else {
                                merge_cap.expected_inputs()
                            };

                            let ready = {
                                let mut inputs = merge_inputs.lock().unwrap_or_else(|e| e.into_inner());
                                let entry = inputs.entry(target_id.clone()).or_default();
                                entry.push(new_env.clone());
                                entry.len() >= expected
                            };

                            if ready {
                                let accumulated = {
                                    let mut inputs = merge_inputs.lock().unwrap_or_else(|e| e.into_inner());
                                    inputs.remove(target_id).unwrap_or_default()
                                };
                                let fallback = accumulated.first().cloned();
                                let merged = merge_cap.merge(accumulated);
                                let merged_env = match merged {
                                    Ok(env) => env,
                                    Err(merge_err) if options.continue_on_error => {
                                        recorded_errors.lock().unwrap_or_else(|e| e.into_inner()).push(
                                            NodeError::new(target_id.clone(), target_node.kind().as_str(), merge_err.to_string()),
                                        );
                                        match fallback {
                                            Some(env) => env,
                                            None => continue,
                                        }
                                    }
                                    Err(merge_err) => {
                                        run_error = Some(PetalFlowError::NodeExecution {
                                            node_id: target_id.clone(),
                                            source: Box::new(merge_err),
                                        });
                                        continue;
                                    }
                                };

                                if let Some(hop) = claim_hop(&node_state, target_id, options.max_hops) {
                                    in_flight += 1;
                                    emit_async(
                                        bus,
                                        store,
                                        run_id,
                                        Event::builder(EventKind::NodeStarted, run_id)
                                            .node(target_id.clone(), target_node.kind().as_str())
                                            .attempt(hop),
                                        options,
                                    )
                                    .await;
                                    let _ = work_tx
                                        .send_async(WorkItem {
                                            node_id: target_id.clone(),
                                            node: target_node,
                                            env: merged_env,
                                            hop,
                                        })
                                        .await;
                                }
                            }
                        } else if let Some(hop) = claim_hop(&node_state, target_id, options.max_hops) {
                            in_flight += 1;
                            emit_async(
                                bus,
                                store,
                                run_id,
                                Event::builder(EventKind::NodeStarted, run_id)
                                    .node(target_id.clone(), target_node.kind().as_str())
                                    .attempt(hop),
                                options,
                            )
                            .await;
                            let _ = work_tx
                                .send_async(WorkItem {
                                    node_id: target_id.clone(),
                                    node: target_node,
                                    env: new_env.clone(),
                                    hop,
                                })
                                .await;
                        }
                    }
                }
            }
            Err(node_err) => {
                emit_async(
                    bus,
                    store,
                    run_id,
                    Event::builder(EventKind::NodeFailed, run_id)
                        .node(result.node_id.clone(), node.kind().as_str())
                        .attempt(result.hop)
                        .elapsed_ms(result.elapsed_ms)
                        .payload(json!({ "error": node_err.to_string() })),
                    options,
                )
                .await;

                if options.continue_on_error {
                    recorded_errors.lock().unwrap_or_else(|e| e.into_inner()).push(
                        NodeError::new(result.node_id.clone(), node.kind().as_str(), node_err.to_string())
                            .with_attempt(result.hop),
                    );
                } else {
                    run_error = Some(PetalFlowError::NodeExecution {
                        node_id: result.node_id,
                        source: Box::new(node_err),
                    });
                    break;
                }
            }
        }

        if run_error.is_some() {
            break;
        }
    }

    drop(work_tx);
    for worker in workers {
        let _ = worker.await;
    }

    if let Some(error) = run_error {
        return Err(error);
    }

    let mut result_env = final_env
        .into_inner()
        .unwrap_or_else(|e| e.into_inner())
        .unwrap_or_default();
    for recorded in recorded_errors.into_inner().unwrap_or_else(|e| e.into_inner()) {
        result_env.record_error(recorded);
    }
    Ok(result_env)
}

async fn emit_async(
    bus: &EventBus,
    store: Option<&dyn EventStore>,
    run_id: &str,
    builder: crate::event::EventBuilder,
    options: &SchedulerOptions,
) {
    super::emit(bus, store, run_id, builder, options).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Envelope;
    use crate::node::{MergeCapable, NodeKind};
    use async_trait::async_trait;
    use serde_json::json;

    struct SetVarNode(&'static str, &'static str, serde_json::Value);

    #[async_trait]
    impl Node for SetVarNode {
        fn id(&self) -> &str {
            self.0
        }
        fn kind(&self) -> NodeKind {
            NodeKind::Noop
        }
        async fn run(&self, _ctx: &NodeContext, mut env: Envelope) -> Result<Envelope, NodeFailure> {
            env.set_var(self.1, self.2.clone());
            Ok(env)
        }
    }

    struct DeepMerge(&'static str);

    impl MergeCapable for DeepMerge {
        fn expected_inputs(&self) -> usize {
            2
        }
        fn merge(&self, inputs: Vec<Envelope>) -> Result<Envelope, NodeFailure> {
            let mut merged = Envelope::new();
            for input in inputs {
                for (k, v) in input.vars() {
                    merged.set_var(k.clone(), v.clone());
                }
            }
            Ok(merged)
        }
    }

    #[async_trait]
    impl Node for DeepMerge {
        fn id(&self) -> &str {
            self.0
        }
        fn kind(&self) -> NodeKind {
            NodeKind::Merge
        }
        async fn run(&self, _ctx: &NodeContext, env: Envelope) -> Result<Envelope, NodeFailure> {
            Ok(env)
        }
        fn as_merge(&self) -> Option<&dyn MergeCapable> {
            Some(self)
        }
    }

    #[tokio::test]
    async fn scenario_s3_parallel_merge() {
        let graph = crate::graph::GraphBuilder::new()
            .add_node(Arc::new(SetVarNode("E", "v", json!(10))))
            .add_node(Arc::new(SetVarNode("A", "a", json!(1))))
            .add_node(Arc::new(SetVarNode("B", "b", json!(2))))
            .add_node(Arc::new(DeepMerge("M")))
            .add_edge("E", "A")
            .add_edge("E", "B")
            .add_edge("A", "M")
            .add_edge("B", "M")
            .with_entry("E")
            .compile()
            .unwrap();

        let bus = EventBus::default();
        let options = SchedulerOptions {
            concurrency: 4,
            ..Default::default()
        };

        let env = run(&graph, Envelope::new(), &options, &bus, None, "r1").await.unwrap();
        assert_eq!(env.get_var("v"), Some(&json!(10)));
        assert_eq!(env.get_var("a"), Some(&json!(1)));
        assert_eq!(env.get_var("b"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn every_node_dispatch_emits_node_started() {
        let graph = crate::graph::GraphBuilder::new()
            .add_node(Arc::new(SetVarNode("E", "v", json!(10))))
            .add_node(Arc::new(SetVarNode("A", "a", json!(1))))
            .add_node(Arc::new(SetVarNode("B", "b", json!(2))))
            .add_node(Arc::new(DeepMerge("M")))
            .add_edge("E", "A")
            .add_edge("E", "B")
            .add_edge("A", "M")
            .add_edge("B", "M")
            .with_entry("E")
            .compile()
            .unwrap();

        let bus = EventBus::default();
        let mut sub = bus.subscribe("r1");
        let options = SchedulerOptions {
            concurrency: 4,
            ..Default::default()
        };

        run(&graph, Envelope::new(), &options, &bus, None, "r1").await.unwrap();

        let mut started = 0;
        let mut finished = 0;
        while let Ok(Some(event)) = tokio::time::timeout(std::time::Duration::from_millis(50), sub.next()).await {
            match event.kind {
                EventKind::NodeStarted => started += 1,
                EventKind::NodeFinished => finished += 1,
                _ => {}
            }
        }
        assert_eq!(started, 4);
        assert_eq!(finished, 4);
    }
}
