//! Crate-wide error taxonomy (spec §7).
//!
//! Each variant has a stable identity so callers can pattern-match at a
//! boundary without parsing message text. Subsystem-specific errors
//! (expression evaluation, compilation) live in their own modules and are
//! folded in here via `#[from]`.

use crate::expr::EvaluationError;
use miette::Diagnostic;
use thiserror::Error;

/// Errors surfaced by graph validation, scheduling, and evaluation.
#[derive(Debug, Error, Diagnostic)]
pub enum PetalFlowError {
    #[error("node `{0}` is referenced but not present in the graph")]
    #[diagnostic(
        code(petalflow::node_not_found),
        help("check that every edge and the entry identifier name a node that was added to the builder")
    )]
    NodeNotFound(String),

    #[error("graph has no nodes")]
    #[diagnostic(
        code(petalflow::empty_graph),
        help("add at least one node before compiling the graph")
    )]
    EmptyGraph,

    #[error("graph has no entry node")]
    #[diagnostic(
        code(petalflow::no_entry_node),
        help("call `GraphBuilder::with_entry` before compiling")
    )]
    NoEntryNode,

    #[error("node `{node_id}` exceeded the maximum hop count of {max_hops}")]
    #[diagnostic(
        code(petalflow::max_hops_exceeded),
        help("raise `SchedulerOptions::max_hops` or break the cycle that revisits this node")
    )]
    MaxHopsExceeded { node_id: String, max_hops: u32 },

    #[error("run was canceled")]
    #[diagnostic(code(petalflow::run_canceled))]
    RunCanceled,

    #[error("node `{node_id}` failed: {source}")]
    #[diagnostic(code(petalflow::node_execution))]
    NodeExecution {
        node_id: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("step controller aborted the run at node `{node_id}`")]
    #[diagnostic(code(petalflow::step_aborted))]
    StepAborted { node_id: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error("compile error: {0}")]
    #[diagnostic(code(petalflow::compile_error))]
    CompileError(String),
}

pub type Result<T> = std::result::Result<T, PetalFlowError>;
