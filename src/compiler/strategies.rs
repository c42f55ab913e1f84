//! Strategy wiring (spec §4.8 "Strategy wiring"): turns the document's
//! `execution.strategy` into the edges (and possibly extra nodes) that
//! connect each task's compiled anchor node into a graph.

use super::document::WorkflowDocument;
use super::{CompileError, GraphIrEdge, GraphIrNode};
use rustc_hash::FxHashMap;
use serde_json::json;

pub struct StrategyOutput {
    pub entry: Option<String>,
    pub extra_nodes: Vec<GraphIrNode>,
    pub edges: Vec<GraphIrEdge>,
}

fn edge(source: &str, source_handle: Option<&str>, target: &str, target_handle: Option<&str>) -> GraphIrEdge {
    GraphIrEdge {
        source: source.to_string(),
        source_handle: source_handle.map(str::to_string),
        target: target.to_string(),
        target_handle: target_handle.map(str::to_string),
    }
}

/// `anchors`: task id → its public successor anchor node id (the LLM node,
/// or its HITL node if `review: human` was set). `llm_nodes`: task id → its
/// `llm_prompt` node id (always present, used for feedback edges regardless
/// of whether a HITL node sits downstream of it).
pub fn wire(
    document: &WorkflowDocument,
    workflow_id: &str,
    task_ids: &[String],
    anchors: &FxHashMap<String, String>,
    llm_nodes: &FxHashMap<String, String>,
) -> Result<StrategyOutput, CompileError> {
    match document.execution.strategy.as_str() {
        "sequential" => wire_sequential(document, task_ids, anchors, llm_nodes),
        "parallel" => wire_parallel(document, workflow_id, task_ids, anchors),
        "hierarchical" => wire_hierarchical(document, workflow_id, task_ids, anchors, llm_nodes),
        "custom" => wire_custom(document, task_ids, anchors, llm_nodes),
        other => Err(CompileError::UnknownStrategy(other.to_string())),
    }
}

fn wire_sequential(
    document: &WorkflowDocument,
    task_ids: &[String],
    anchors: &FxHashMap<String, String>,
    llm_nodes: &FxHashMap<String, String>,
) -> Result<StrategyOutput, CompileError> {
    let order = document
        .execution
        .task_order
        .as_ref()
        .ok_or(CompileError::MissingTaskOrder)?;
    for task_id in order {
        if !task_ids.contains(task_id) {
            return Err(CompileError::UndefinedTask(task_id.clone()));
        }
    }

    let mut edges = Vec::new();
    for pair in order.windows(2) {
        let (from, to) = (&pair[0], &pair[1]);
        let from_anchor = anchors.get(from).expect("validated above");
        let to_llm = llm_nodes.get(to).expect("validated above");
        edges.push(edge(from_anchor, Some("output"), to_llm, Some("input")));
    }

    let entry = order.first().and_then(|id| anchors.get(id)).cloned();
    Ok(StrategyOutput {
        entry,
        extra_nodes: Vec::new(),
        edges,
    })
}

fn wire_parallel(
    document: &WorkflowDocument,
    workflow_id: &str,
    task_ids: &[String],
    anchors: &FxHashMap<String, String>,
) -> Result<StrategyOutput, CompileError> {
    let merge_id = format!("{workflow_id}__merge");
    let config = match &document.execution.merge_strategy {
        Some(strategy) => json!({ "strategy": strategy }),
        None => json!({}),
    };
    let merge_node = GraphIrNode {
        id: merge_id.clone(),
        node_type: "merge".to_string(),
        config,
    };

    let mut edges = Vec::new();
    for task_id in task_ids {
        let anchor = anchors.get(task_id).expect("every task has an anchor");
        edges.push(edge(anchor, Some("output"), &merge_id, Some("input")));
    }

    Ok(StrategyOutput {
        entry: None,
        extra_nodes: vec![merge_node],
        edges,
    })
}

fn wire_hierarchical(
    document: &WorkflowDocument,
    workflow_id: &str,
    task_ids: &[String],
    anchors: &FxHashMap<String, String>,
    llm_nodes: &FxHashMap<String, String>,
) -> Result<StrategyOutput, CompileError> {
    let manager_agent = document
        .execution
        .manager_agent
        .as_ref()
        .ok_or(CompileError::MissingManagerAgent)?;
    if !document.agents.contains_key(manager_agent) {
        return Err(CompileError::UndefinedAgent(manager_agent.clone()));
    }

    let router_id = format!("{workflow_id}__manager");
    let router_node = GraphIrNode {
        id: router_id.clone(),
        node_type: "llm_router".to_string(),
        config: json!({ "agent": manager_agent }),
    };

    let mut edges = Vec::new();
    for task_id in task_ids {
        let anchor = anchors.get(task_id).expect("every task has an anchor");
        let llm = llm_nodes.get(task_id).expect("every task has an llm node");
        edges.push(edge(&router_id, Some("output"), llm, Some("input")));
        edges.push(edge(anchor, Some("output"), &router_id, Some("input")));
    }

    Ok(StrategyOutput {
        entry: Some(router_id),
        extra_nodes: vec![router_node],
        edges,
    })
}

fn wire_custom(
    document: &WorkflowDocument,
    task_ids: &[String],
    anchors: &FxHashMap<String, String>,
    llm_nodes: &FxHashMap<String, String>,
) -> Result<StrategyOutput, CompileError> {
    let mut edges = Vec::new();
    let mut entry = None;

    for task_id in task_ids {
        let deps = document
            .execution
            .tasks
            .get(task_id)
            .map(|t| t.depends_on.as_slice())
            .unwrap_or(&[]);

        if deps.is_empty() && entry.is_none() {
            entry = anchors.get(task_id).cloned();
        }

        let self_llm = llm_nodes.get(task_id).expect("every task has an llm node");
        for dep in deps {
            let dep_anchor = anchors
                .get(dep)
                .ok_or_else(|| CompileError::UndefinedTask(dep.clone()))?;
            edges.push(edge(dep_anchor, Some("output"), self_llm, Some("input")));
        }
    }

    Ok(StrategyOutput {
        entry,
        extra_nodes: Vec::new(),
        edges,
    })
}
