//! Router condition expression language (spec §4.3): lexer, AST, parser,
//! and evaluator. Stateless and side-effect free, safe against untrusted
//! input — every lookup returns nil rather than erroring, except `matches`
//! against an invalid regex literal.

mod ast;
mod eval;
mod lexer;
mod parser;

pub use ast::Expr;
pub use eval::{truthy as truthy_value, EvaluationError, Evaluator};
pub use parser::{parse, ParseError};

/// Parse and evaluate an expression against a JSON value in one call.
pub fn eval(source: &str, vars: &serde_json::Value) -> Result<serde_json::Value, EvalOrParseError> {
    let expr = parse(source)?;
    let evaluator = Evaluator::new();
    Ok(evaluator.eval(&expr, vars)?)
}

#[derive(Debug, thiserror::Error)]
pub enum EvalOrParseError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Eval(#[from] EvaluationError),
}
