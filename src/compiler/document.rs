//! The declarative agent-workflow document (spec §4.8 "Input").

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    pub role: String,
    pub goal: String,
    #[serde(default)]
    pub backstory: String,
    #[serde(default)]
    pub tools: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewMode {
    Human,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub description: String,
    pub agent: String,
    #[serde(default)]
    pub expected_output: String,
    #[serde(default)]
    pub review: Option<ReviewMode>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub output_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskExecutionConfig {
    #[serde(default)]
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSpec {
    pub strategy: String,
    #[serde(default)]
    pub task_order: Option<Vec<String>>,
    #[serde(default)]
    pub manager_agent: Option<String>,
    #[serde(default)]
    pub merge_strategy: Option<String>,
    #[serde(default)]
    pub tasks: FxHashMap<String, TaskExecutionConfig>,
}

/// The document the compiler consumes: `{id, version, agents, tasks,
/// execution}` (spec §4.8 "Input").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDocument {
    pub id: String,
    pub version: String,
    pub agents: FxHashMap<String, AgentSpec>,
    pub tasks: FxHashMap<String, TaskSpec>,
    pub execution: ExecutionSpec,
}
