//! Conditional router node (spec §4.4): binds the expression evaluator to
//! the `Router` capability.

use crate::envelope::Envelope;
use crate::expr::{parse, Evaluator, Expr};
use crate::node::{Node, NodeContext, NodeFailure, NodeKind, RouteDecision, Router};
use async_trait::async_trait;
use miette::Diagnostic;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum RouterConfigError {
    #[error("condition `{0}` has an empty name")]
    #[diagnostic(code(petalflow::router::empty_name))]
    EmptyName(usize),

    #[error("duplicate condition name `{0}`")]
    #[diagnostic(code(petalflow::router::duplicate_name))]
    DuplicateName(String),

    #[error("condition `{name}` has a syntax error: {source}")]
    #[diagnostic(code(petalflow::router::syntax_error))]
    Syntax {
        name: String,
        #[source]
        source: crate::expr::ParseError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    FirstMatch,
    All,
}

/// One named condition: `{name, expression, description?}` (spec §4.4).
pub struct Condition {
    pub name: String,
    pub expression: String,
    pub description: Option<String>,
}

impl Condition {
    #[must_use]
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
            description: None,
        }
    }
}

struct ParsedCondition {
    name: String,
    expr: Expr,
}

pub struct RouterConfig {
    pub conditions: Vec<Condition>,
    pub default: Option<String>,
    pub mode: EvalMode,
    /// Defaults to `true` — see SPEC_FULL.md "Open Question resolutions"
    /// for why this does not rely on `bool::default()`.
    pub pass_through: bool,
    pub output_key: Option<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            conditions: Vec::new(),
            default: None,
            mode: EvalMode::FirstMatch,
            pass_through: true,
            output_key: None,
        }
    }
}

/// A router node whose decision is produced by evaluating conditions, in
/// order, against the current envelope's variables.
pub struct ConditionalRouterNode {
    id: String,
    conditions: Vec<ParsedCondition>,
    default: Option<String>,
    mode: EvalMode,
    pass_through: bool,
    output_key: String,
    evaluator: Evaluator,
}

impl ConditionalRouterNode {
    /// Parses every expression eagerly; syntax errors and duplicate/empty
    /// condition names cause construction to fail (spec §4.4).
    pub fn new(id: impl Into<String>, config: RouterConfig) -> Result<Self, RouterConfigError> {
        let id = id.into();
        let mut seen = std::collections::HashSet::new();
        let mut parsed = Vec::with_capacity(config.conditions.len());
        for (i, cond) in config.conditions.into_iter().enumerate() {
            if cond.name.is_empty() {
                return Err(RouterConfigError::EmptyName(i));
            }
            if !seen.insert(cond.name.clone()) {
                return Err(RouterConfigError::DuplicateName(cond.name));
            }
            let expr = parse(&cond.expression).map_err(|source| RouterConfigError::Syntax {
                name: cond.name.clone(),
                source,
            })?;
            parsed.push(ParsedCondition { name: cond.name, expr });
        }

        let output_key = config.output_key.unwrap_or_else(|| format!("{id}_output"));

        Ok(Self {
            id,
            conditions: parsed,
            default: config.default,
            mode: config.mode,
            pass_through: config.pass_through,
            output_key,
            evaluator: Evaluator::new(),
        })
    }

    fn decision_key(&self) -> String {
        format!("{}_decision", self.id)
    }

    fn matched_names(&self, env: &Envelope) -> Result<Vec<String>, NodeFailure> {
        let vars_json = Value::Object(
            env.vars()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );

        let mut matched = Vec::new();
        for cond in &self.conditions {
            let result = self
                .evaluator
                .eval(&cond.expr, &vars_json)
                .map_err(|e| NodeFailure::Other(format!("condition `{}`: {e}", cond.name)))?;
            if crate::expr::truthy_value(&result) {
                matched.push(cond.name.clone());
                if self.mode == EvalMode::FirstMatch {
                    break;
                }
            }
        }
        Ok(matched)
    }
}

#[async_trait]
impl Router for ConditionalRouterNode {
    async fn decide(&self, env: &Envelope) -> Result<RouteDecision, NodeFailure> {
        let matched = self.matched_names(env)?;
        if matched.is_empty() {
            return match &self.default {
                Some(default) => Ok(RouteDecision::new(
                    vec![default.clone()],
                    "default".to_string(),
                    1.0,
                )),
                None => Err(NodeFailure::ValidationFailed("no conditions matched".to_string())),
            };
        }
        Ok(RouteDecision::new(matched, "condition matched".to_string(), 1.0))
    }
}

#[async_trait]
impl Node for ConditionalRouterNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Conditional
    }

    async fn run(&self, _ctx: &NodeContext, mut env: Envelope) -> Result<Envelope, NodeFailure> {
        let decision = self.decide(&env).await?;
        let matched_one = decision.targets.first().cloned();

        env.set_var(self.decision_key(), serde_json::to_value(&decision).map_err(NodeFailure::Serde)?);

        if self.pass_through {
            // envelope already carries everything; nothing further to write.
        } else {
            let matched = matched_one.is_some();
            env.set_var(
                self.output_key.clone(),
                json!({ "matched": matched, "condition": matched_one.unwrap_or_default() }),
            );
        }

        Ok(env)
    }

    fn as_router(&self) -> Option<&dyn Router> {
        Some(self)
    }
}
