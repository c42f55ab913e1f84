//! The sequential executor (spec §4.2 "Sequential executor").

use super::step::{EnvelopeMutation, StepAction, StepController, StepPoint, StepSnapshot};
use super::successor::select_successors;
use super::{emit, SchedulerOptions};
use crate::envelope::{Envelope, NodeError};
use crate::error::PetalFlowError;
use crate::event::{Event, EventBus, EventKind, EventStore};
use crate::graph::Graph;
use rustc_hash::FxHashMap;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;

/// Consults `controller`, honoring an optional per-step timeout (spec.md:110
/// "An optional per-step timeout cancels the controller call."). `None`
/// means the timeout elapsed before the controller decided; the caller
/// treats that the same as an explicit `Abort`.
async fn decide_with_timeout(
    controller: &Arc<dyn StepController>,
    snapshot: StepSnapshot,
    timeout: Option<std::time::Duration>,
) -> Option<(StepAction, Option<EnvelopeMutation>)> {
    match timeout {
        Some(duration) => tokio::time::timeout(duration, controller.decide(snapshot)).await.ok(),
        None => Some(controller.decide(snapshot).await),
    }
}

/// Runs `graph` starting at its entry node, one node at a time, honoring
/// hop limits, the optional step controller, and continue-on-error (spec
/// §4.2 "Sequential executor").
pub async fn run(
    graph: &Graph,
    mut env: Envelope,
    options: &SchedulerOptions,
    bus: &EventBus,
    store: Option<&dyn EventStore>,
    run_id: &str,
) -> Result<Envelope, PetalFlowError> {
    let mut queue: VecDeque<String> = VecDeque::new();
    queue.push_back(graph.entry().to_string());
    let mut hop_counts: FxHashMap<String, u32> = FxHashMap::default();

    while let Some(node_id) = queue.pop_front() {
        if options.cancellation.is_cancelled() {
            return Err(PetalFlowError::RunCanceled);
        }

        let hop = hop_counts.entry(node_id.clone()).or_insert(0);
        *hop += 1;
        let hop_count = *hop;
        if hop_count > options.max_hops {
            return Err(PetalFlowError::MaxHopsExceeded {
                node_id,
                max_hops: options.max_hops,
            });
        }

        let Some(node) = graph.node(&node_id) else {
            return Err(PetalFlowError::NodeNotFound(node_id));
        };
        let node = node.clone();

        if options.step_config.pause_before {
            if let Some(controller) = &options.step_controller {
                emit(
                    bus,
                    store,
                    run_id,
                    Event::builder(EventKind::StepPaused, run_id).node(node_id.clone(), node.kind().as_str()),
                    options,
                )
                .await;

                let snapshot = StepSnapshot {
                    run_id: run_id.to_string(),
                    step_point: StepPoint::BeforeNode,
                    node_id: node_id.clone(),
                    node_kind: node.kind().as_str().to_string(),
                    envelope: env.clone(),
                    hop_count,
                    error: None,
                    created_at: (options.now)(),
                };
                let decision = decide_with_timeout(controller, snapshot, options.step_config.timeout).await;

                emit(
                    bus,
                    store,
                    run_id,
                    Event::builder(EventKind::StepResumed, run_id).node(node_id.clone(), node.kind().as_str()),
                    options,
                )
                .await;

                let Some((action, mutation)) = decision else {
                    emit(
                        bus,
                        store,
                        run_id,
                        Event::builder(EventKind::StepAborted, run_id)
                            .node(node_id.clone(), node.kind().as_str())
                            .payload(json!({ "reason": "timeout" })),
                        options,
                    )
                    .await;
                    return Err(PetalFlowError::StepAborted { node_id });
                };

                if let Some(mutation) = mutation {
                    mutation.apply(&mut env);
                }

                match action {
                    StepAction::Abort => {
                        emit(
                            bus,
                            store,
                            run_id,
                            Event::builder(EventKind::StepAborted, run_id).node(node_id.clone(), node.kind().as_str()),
                            options,
                        )
                        .await;
                        return Err(PetalFlowError::StepAborted { node_id });
                    }
                    StepAction::SkipNode => {
                        emit(
                            bus,
                            store,
                            run_id,
                            Event::builder(EventKind::StepSkipped, run_id).node(node_id.clone(), node.kind().as_str()),
                            options,
                        )
                        .await;
                        let mut skip_env = env.clone();
                        let selection = select_successors(node.as_ref(), &node_id, graph, &mut skip_env);
                        env = skip_env;
                        if let Some(decision) = &selection.decision {
                            emit(
                                bus,
                                store,
                                run_id,
                                Event::builder(EventKind::RouteDecision, run_id)
                                    .node(node_id.clone(), node.kind().as_str())
                                    .payload(serde_json::to_value(decision).unwrap_or(serde_json::Value::Null)),
                                options,
                            )
                            .await;
                        }
                        for target in selection.targets {
                            queue.push_back(target);
                        }
                        continue;
                    }
                    StepAction::Continue => {}
                }
            }
        }

        let node_start = std::time::Instant::now();
        emit(
            bus,
            store,
            run_id,
            Event::builder(EventKind::NodeStarted, run_id)
                .node(node_id.clone(), node.kind().as_str())
                .attempt(hop_count),
            options,
        )
        .await;

        let ctx = crate::node::NodeContext {
            run_id: run_id.to_string(),
            node_id: node_id.clone(),
            step: hop_count,
        };
        let pre_node_env = env.clone();
        let run_result = node.run(&ctx, env.clone()).await;
        let elapsed_ms = node_start.elapsed().as_millis() as i64;

        match run_result {
            Ok(new_env) => {
                emit(
                    bus,
                    store,
                    run_id,
                    Event::builder(EventKind::NodeFinished, run_id)
                        .node(node_id.clone(), node.kind().as_str())
                        .attempt(hop_count)
                        .elapsed_ms(elapsed_ms),
                    options,
                )
                .await;
                env = new_env;
            }
            Err(node_err) => {
                emit(
                    bus,
                    store,
                    run_id,
                    Event::builder(EventKind::NodeFailed, run_id)
                        .node(node_id.clone(), node.kind().as_str())
                        .attempt(hop_count)
                        .elapsed_ms(elapsed_ms)
                        .payload(json!({ "error": node_err.to_string() })),
                    options,
                )
                .await;

                if options.continue_on_error {
                    env = pre_node_env;
                    env.record_error(
                        NodeError::new(node_id.clone(), node.kind().as_str(), node_err.to_string())
                            .with_attempt(hop_count),
                    );
                } else {
                    return Err(PetalFlowError::NodeExecution {
                        node_id,
                        source: Box::new(node_err),
                    });
                }
            }
        }

        if options.step_config.pause_after {
            if let Some(controller) = &options.step_controller {
                let snapshot = StepSnapshot {
                    run_id: run_id.to_string(),
                    step_point: StepPoint::AfterNode,
                    node_id: node_id.clone(),
                    node_kind: node.kind().as_str().to_string(),
                    envelope: env.clone(),
                    hop_count,
                    error: None,
                    created_at: (options.now)(),
                };
                let decision = decide_with_timeout(controller, snapshot, options.step_config.timeout).await;
                let aborted = match decision {
                    Some((action, _mutation_ignored)) => action == StepAction::Abort,
                    None => true,
                };
                if aborted {
                    emit(
                        bus,
                        store,
                        run_id,
                        Event::builder(EventKind::StepAborted, run_id).node(node_id.clone(), node.kind().as_str()),
                        options,
                    )
                    .await;
                    return Err(PetalFlowError::StepAborted { node_id });
                }
            }
        }

        let selection = select_successors(node.as_ref(), &node_id, graph, &mut env);
        if let Some(decision) = &selection.decision {
            emit(
                bus,
                store,
                run_id,
                Event::builder(EventKind::RouteDecision, run_id)
                    .node(node_id.clone(), node.kind().as_str())
                    .payload(serde_json::to_value(decision).unwrap_or(serde_json::Value::Null)),
                options,
            )
            .await;
        }
        for target in selection.targets {
            queue.push_back(target);
        }
    }

    Ok(env)
}
