//! Integration coverage for the agent-workflow compiler (spec §4.8).

use chrono::Utc;
use petalflow::compiler::{compile, AgentSpec, ExecutionSpec, TaskSpec, WorkflowDocument};
use petalflow::registry::NodeTypeRegistry;
use rustc_hash::FxHashMap;

fn minimal_document(strategy: &str) -> WorkflowDocument {
    let mut agents = FxHashMap::default();
    agents.insert(
        "researcher".to_string(),
        AgentSpec {
            role: "Researcher".to_string(),
            goal: "Gather facts".to_string(),
            backstory: "Worked at a think tank.".to_string(),
            tools: Vec::new(),
        },
    );

    let mut tasks = FxHashMap::default();
    tasks.insert(
        "gather".to_string(),
        TaskSpec {
            description: "Research {{input.topic}}.".to_string(),
            agent: "researcher".to_string(),
            expected_output: "bullet points".to_string(),
            review: None,
            provider: Some("anthropic".to_string()),
            model: Some("claude".to_string()),
            temperature: Some(0.2),
            max_tokens: Some(1024),
            output_key: None,
        },
    );

    WorkflowDocument {
        id: "demo".to_string(),
        version: "1".to_string(),
        agents,
        tasks,
        execution: ExecutionSpec {
            strategy: strategy.to_string(),
            task_order: Some(vec!["gather".to_string()]),
            manager_agent: None,
            merge_strategy: None,
            tasks: FxHashMap::default(),
        },
    }
}

#[test]
fn compiles_a_single_task_sequential_workflow() {
    let registry = NodeTypeRegistry::default();
    let ir = compile(&minimal_document("sequential"), &registry, Utc::now()).unwrap();

    assert_eq!(ir.entry.as_deref(), Some("gather__researcher"));
    assert_eq!(ir.nodes.len(), 1);
    assert_eq!(ir.nodes[0].node_type, "llm_prompt");
    assert_eq!(ir.nodes[0].config["prompt_template"], "Research {{.topic}}.");
    assert_eq!(ir.metadata.compiler_version, petalflow::compiler::COMPILER_VERSION);
}

#[test]
fn unknown_strategy_fails_compilation() {
    let registry = NodeTypeRegistry::default();
    let result = compile(&minimal_document("teleportation"), &registry, Utc::now());
    assert!(result.is_err());
}
