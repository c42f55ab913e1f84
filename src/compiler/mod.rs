//! The agent-workflow compiler (spec §4.8): turns a declarative document
//! into Graph IR, the wire format between the compiler and the scheduler
//! (spec §6 "Graph IR").

mod document;
mod strategies;
mod template;

pub use document::{AgentSpec, ExecutionSpec, ReviewMode, TaskExecutionConfig, TaskSpec, WorkflowDocument};

use crate::registry::{NodeTypeRegistry, ToolMode};
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// The compiler's own version, embedded in compiled Graph IR metadata.
pub const COMPILER_VERSION: &str = "1.0.0";

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("unknown execution strategy {0:?}")]
    UnknownStrategy(String),
    #[error("reference to undefined agent {0:?}")]
    UndefinedAgent(String),
    #[error("reference to undefined task {0:?}")]
    UndefinedTask(String),
    #[error("sequential strategy requires execution.task_order")]
    MissingTaskOrder,
    #[error("hierarchical strategy requires execution.manager_agent")]
    MissingManagerAgent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphIrMetadata {
    pub source_kind: String,
    pub source_version: String,
    pub compiled_at: DateTime<Utc>,
    pub compiler_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphIrNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub config: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphIrEdge {
    pub source: String,
    #[serde(default)]
    pub source_handle: Option<String>,
    pub target: String,
    #[serde(default)]
    pub target_handle: Option<String>,
}

/// The compiler's output: a serializable graph description (spec §6
/// "Graph IR"). Turning this into an executable [`crate::graph::Graph`]
/// requires concrete node factories keyed by `node_type` — out of this
/// crate's scope, since leaf node implementations (LLM providers, tool
/// adapters) are themselves out of scope (spec §1 Non-goals).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphIr {
    pub id: String,
    pub version: String,
    pub metadata: GraphIrMetadata,
    pub entry: Option<String>,
    pub nodes: Vec<GraphIrNode>,
    pub edges: Vec<GraphIrEdge>,
}

/// Compiles `document` into Graph IR, classifying tools via `registry`
/// (spec §4.8 "Mapping"). `compiled_at` is supplied by the caller rather
/// than sourced from the clock internally, keeping this function pure.
pub fn compile(
    document: &WorkflowDocument,
    registry: &NodeTypeRegistry,
    compiled_at: DateTime<Utc>,
) -> Result<GraphIr, CompileError> {
    let mut task_ids: Vec<String> = document.tasks.keys().cloned().collect();
    task_ids.sort();

    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    let mut anchors: FxHashMap<String, String> = FxHashMap::default();
    let mut llm_nodes: FxHashMap<String, String> = FxHashMap::default();

    // Pass 1: per-task node(s), so later template rewrites can resolve
    // `tasks.T.output` against every task's compiled node id regardless of
    // lexical position.
    for task_id in &task_ids {
        let task = &document.tasks[task_id];
        if !document.agents.contains_key(&task.agent) {
            return Err(CompileError::UndefinedAgent(task.agent.clone()));
        }
        let llm_node_id = format!("{task_id}__{}", task.agent);
        llm_nodes.insert(task_id.clone(), llm_node_id.clone());
        anchors.insert(task_id.clone(), llm_node_id);
    }

    for task_id in &task_ids {
        let task = &document.tasks[task_id];
        let agent = &document.agents[&task.agent];
        let llm_node_id = llm_nodes[task_id].clone();

        let system_prompt = build_system_prompt(agent, task);
        let prompt_template = template::rewrite_template(&task.description, &llm_nodes);

        let mut tool_ids = Vec::new();
        for tool in &agent.tools {
            match registry.tool_mode(tool) {
                Some(ToolMode::FunctionCall) => tool_ids.push(tool.clone()),
                Some(ToolMode::Standalone) => {
                    let tool_node_id = format!("{task_id}__{tool}");
                    let node_type = registry.get(tool).map_or_else(|| tool.clone(), |def| def.type_name);
                    nodes.push(GraphIrNode {
                        id: tool_node_id.clone(),
                        node_type,
                        config: json!({}),
                    });
                    edges.push(GraphIrEdge {
                        source: tool_node_id,
                        source_handle: Some("output".to_string()),
                        target: llm_node_id.clone(),
                        target_handle: Some("context".to_string()),
                    });
                }
                None => {}
            }
        }

        nodes.push(GraphIrNode {
            id: llm_node_id.clone(),
            node_type: "llm_prompt".to_string(),
            config: json!({
                "system_prompt": system_prompt,
                "prompt_template": prompt_template,
                "provider": task.provider,
                "model": task.model,
                "temperature": task.temperature,
                "max_tokens": task.max_tokens,
                "output_key": task.output_key,
                "tools": tool_ids,
            }),
        });

        for output_ref in template::extract_task_output_refs(&task.description) {
            if let Some(dep_llm_id) = llm_nodes.get(&output_ref.task_id) {
                edges.push(GraphIrEdge {
                    source: dep_llm_id.clone(),
                    source_handle: Some("output".to_string()),
                    target: llm_node_id.clone(),
                    target_handle: Some("prompt".to_string()),
                });
            }
        }

        if task.review == Some(document::ReviewMode::Human) {
            let hitl_id = format!("{llm_node_id}__hitl");
            nodes.push(GraphIrNode {
                id: hitl_id.clone(),
                node_type: "human".to_string(),
                config: json!({}),
            });
            edges.push(GraphIrEdge {
                source: llm_node_id.clone(),
                source_handle: Some("output".to_string()),
                target: hitl_id.clone(),
                target_handle: Some("input".to_string()),
            });
            anchors.insert(task_id.clone(), hitl_id);
        }
    }

    let strategy_output = strategies::wire(document, &document.id, &task_ids, &anchors, &llm_nodes)?;
    nodes.extend(strategy_output.extra_nodes);
    edges.extend(strategy_output.edges);

    Ok(GraphIr {
        id: document.id.clone(),
        version: document.version.clone(),
        metadata: GraphIrMetadata {
            source_kind: "agent_workflow".to_string(),
            source_version: document.version.clone(),
            compiled_at,
            compiler_version: COMPILER_VERSION.to_string(),
        },
        entry: strategy_output.entry,
        nodes,
        edges,
    })
}

fn build_system_prompt(agent: &document::AgentSpec, task: &document::TaskSpec) -> String {
    format!(
        "You are {role}. Your goal: {goal}. {backstory}\nExpected output: {expected}",
        role = agent.role,
        goal = agent.goal,
        backstory = agent.backstory,
        expected = task.expected_output,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{NodeTypeDefinition, Ports};

    fn doc(strategy: &str) -> WorkflowDocument {
        let mut agents = FxHashMap::default();
        agents.insert(
            "analyst".to_string(),
            AgentSpec {
                role: "Analyst".to_string(),
                goal: "Find facts".to_string(),
                backstory: String::new(),
                tools: Vec::new(),
            },
        );
        agents.insert(
            "writer".to_string(),
            AgentSpec {
                role: "Writer".to_string(),
                goal: "Write reports".to_string(),
                backstory: String::new(),
                tools: Vec::new(),
            },
        );

        let mut tasks = FxHashMap::default();
        tasks.insert(
            "research".to_string(),
            TaskSpec {
                description: "Research {{input.topic}}.".to_string(),
                agent: "analyst".to_string(),
                expected_output: "a summary".to_string(),
                review: None,
                provider: None,
                model: None,
                temperature: None,
                max_tokens: None,
                output_key: None,
            },
        );
        tasks.insert(
            "write".to_string(),
            TaskSpec {
                description: "Write using {{tasks.research.output}}.".to_string(),
                agent: "writer".to_string(),
                expected_output: "a report".to_string(),
                review: Some(ReviewMode::Human),
                provider: None,
                model: None,
                temperature: None,
                max_tokens: None,
                output_key: None,
            },
        );

        WorkflowDocument {
            id: "wf1".to_string(),
            version: "1".to_string(),
            agents,
            tasks,
            execution: ExecutionSpec {
                strategy: strategy.to_string(),
                task_order: Some(vec!["research".to_string(), "write".to_string()]),
                manager_agent: None,
                merge_strategy: None,
                tasks: FxHashMap::default(),
            },
        }
    }

    #[test]
    fn sequential_chain_wires_anchors_in_order() {
        let registry = NodeTypeRegistry::default();
        let ir = compile(&doc("sequential"), &registry, Utc::now()).unwrap();

        assert_eq!(ir.entry.as_deref(), Some("research__analyst"));
        assert!(ir.nodes.iter().any(|n| n.id == "write__writer__hitl"));
        assert!(ir
            .edges
            .iter()
            .any(|e| e.source == "research__analyst" && e.target == "write__writer" && e.target_handle.as_deref() == Some("input")));
    }

    #[test]
    fn task_output_reference_produces_prompt_edge() {
        let registry = NodeTypeRegistry::default();
        let ir = compile(&doc("sequential"), &registry, Utc::now()).unwrap();
        assert!(ir.edges.iter().any(|e| {
            e.source == "research__analyst" && e.target == "write__writer" && e.target_handle.as_deref() == Some("prompt")
        }));
        let write_node = ir.nodes.iter().find(|n| n.id == "write__writer").unwrap();
        let template = write_node.config["prompt_template"].as_str().unwrap();
        assert_eq!(template, "Write using {{.research__analyst_output}}.");
    }

    #[test]
    fn unknown_strategy_is_compile_error() {
        let registry = NodeTypeRegistry::default();
        let result = compile(&doc("bogus"), &registry, Utc::now());
        assert!(matches!(result, Err(CompileError::UnknownStrategy(s)) if s == "bogus"));
    }

    #[test]
    fn undefined_agent_is_compile_error() {
        let mut document = doc("sequential");
        document.tasks.get_mut("research").unwrap().agent = "ghost".to_string();
        let registry = NodeTypeRegistry::default();
        let result = compile(&document, &registry, Utc::now());
        assert!(matches!(result, Err(CompileError::UndefinedAgent(a)) if a == "ghost"));
    }

    #[test]
    fn parallel_strategy_adds_merge_node_with_no_entry() {
        let mut document = doc("parallel");
        document.execution.task_order = None;
        let registry = NodeTypeRegistry::default();
        let ir = compile(&document, &registry, Utc::now()).unwrap();
        assert!(ir.entry.is_none());
        assert!(ir.nodes.iter().any(|n| n.id == "wf1__merge" && n.node_type == "merge"));
        assert_eq!(
            ir.edges
                .iter()
                .filter(|e| e.target == "wf1__merge")
                .count(),
            2
        );
    }

    #[test]
    fn hierarchical_strategy_requires_manager_agent() {
        let mut document = doc("hierarchical");
        document.execution.task_order = None;
        let registry = NodeTypeRegistry::default();
        assert!(matches!(
            compile(&document, &registry, Utc::now()),
            Err(CompileError::MissingManagerAgent)
        ));

        document.execution.manager_agent = Some("analyst".to_string());
        let ir = compile(&document, &registry, Utc::now()).unwrap();
        assert_eq!(ir.entry.as_deref(), Some("wf1__manager"));
    }

    #[test]
    fn custom_strategy_wires_depends_on_and_picks_entry() {
        let mut document = doc("custom");
        document.execution.task_order = None;
        document.execution.tasks.insert(
            "write".to_string(),
            TaskExecutionConfig {
                depends_on: vec!["research".to_string()],
            },
        );
        let registry = NodeTypeRegistry::default();
        let ir = compile(&document, &registry, Utc::now()).unwrap();
        assert_eq!(ir.entry.as_deref(), Some("research__analyst"));
        assert!(ir
            .edges
            .iter()
            .any(|e| e.source == "research__analyst" && e.target == "write__writer" && e.target_handle.as_deref() == Some("input")));
    }

    #[test]
    fn standalone_tool_is_wired_into_context_port() {
        let registry = NodeTypeRegistry::default();
        registry.register(NodeTypeDefinition {
            type_name: "web_search".to_string(),
            category: "tool".to_string(),
            display_name: "Web Search".to_string(),
            description: "Searches the web".to_string(),
            ports: Ports::default(),
            config_schema: json!({}),
            is_tool: true,
            tool_mode: Some(ToolMode::Standalone),
        });

        let mut document = doc("sequential");
        document.agents.get_mut("analyst").unwrap().tools = vec!["web_search".to_string()];
        let ir = compile(&document, &registry, Utc::now()).unwrap();

        assert!(ir.nodes.iter().any(|n| n.id == "research__web_search"));
        assert!(ir.edges.iter().any(|e| {
            e.source == "research__web_search" && e.target == "research__analyst" && e.target_handle.as_deref() == Some("context")
        }));
    }
}
