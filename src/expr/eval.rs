//! Tree-walking evaluator for the router condition language (spec §4.3).
//!
//! Every lookup is total: missing identifiers, out-of-range indices, and
//! member access on `null` all produce `Value::Null` rather than an error.
//! The sole error path is an invalid regex literal passed to `matches`.

use super::ast::{BinOp, Expr};
use miette::Diagnostic;
use regex::Regex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[error("invalid regex `{pattern}`: {source}")]
#[diagnostic(code(petalflow::expr::invalid_regex))]
pub struct EvaluationError {
    pattern: String,
    #[source]
    source: regex::Error,
}

/// Evaluates parsed expressions against a JSON value representing the
/// available variables. Caches compiled regexes by source string across
/// calls (spec §4.3 "compiled regexes are cached by source").
pub struct Evaluator {
    regex_cache: Mutex<FxHashMap<String, Regex>>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            regex_cache: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn eval(&self, expr: &Expr, vars: &Value) -> Result<Value, EvaluationError> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Regex(src) => Ok(Value::String(src.clone())),
            Expr::Identifier(name) => Ok(lookup(vars, name)),
            Expr::Member(base, name) => {
                let base_val = self.eval(base, vars)?;
                Ok(member_access(&base_val, name))
            }
            Expr::Index(base, idx) => {
                let base_val = self.eval(base, vars)?;
                let idx_val = self.eval(idx, vars)?;
                Ok(index_access(&base_val, &idx_val))
            }
            Expr::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval(item, vars)?);
                }
                Ok(Value::Array(out))
            }
            Expr::Not(inner) => {
                let val = self.eval(inner, vars)?;
                Ok(Value::Bool(!truthy(&val)))
            }
            Expr::Binary(op, lhs, rhs) => self.eval_binary(*op, lhs, rhs, vars),
        }
    }

    fn eval_binary(&self, op: BinOp, lhs: &Expr, rhs: &Expr, vars: &Value) -> Result<Value, EvaluationError> {
        match op {
            BinOp::Coalesce => {
                let left = self.eval(lhs, vars)?;
                if left.is_null() {
                    self.eval(rhs, vars)
                } else {
                    Ok(left)
                }
            }
            BinOp::Or => {
                let left = self.eval(lhs, vars)?;
                if truthy(&left) {
                    Ok(Value::Bool(true))
                } else {
                    let right = self.eval(rhs, vars)?;
                    Ok(Value::Bool(truthy(&right)))
                }
            }
            BinOp::And => {
                let left = self.eval(lhs, vars)?;
                if !truthy(&left) {
                    Ok(Value::Bool(false))
                } else {
                    let right = self.eval(rhs, vars)?;
                    Ok(Value::Bool(truthy(&right)))
                }
            }
            BinOp::Eq => {
                let (l, r) = (self.eval(lhs, vars)?, self.eval(rhs, vars)?);
                Ok(Value::Bool(value_eq(&l, &r)))
            }
            BinOp::NotEq => {
                let (l, r) = (self.eval(lhs, vars)?, self.eval(rhs, vars)?);
                Ok(Value::Bool(!value_eq(&l, &r)))
            }
            BinOp::Lt | BinOp::LtEq | BinOp::Gt | BinOp::GtEq => {
                let (l, r) = (self.eval(lhs, vars)?, self.eval(rhs, vars)?);
                Ok(Value::Bool(compare(op, &l, &r)))
            }
            BinOp::In => {
                let (l, r) = (self.eval(lhs, vars)?, self.eval(rhs, vars)?);
                let found = r.as_array().is_some_and(|arr| arr.iter().any(|item| value_eq(item, &l)));
                Ok(Value::Bool(found))
            }
            BinOp::Has => {
                let (l, r) = (self.eval(lhs, vars)?, self.eval(rhs, vars)?);
                let found = match (l.as_object(), r.as_str()) {
                    (Some(map), Some(key)) => map.contains_key(key),
                    _ => false,
                };
                Ok(Value::Bool(found))
            }
            BinOp::Contains => {
                let (l, r) = (self.eval(lhs, vars)?, self.eval(rhs, vars)?);
                Ok(Value::Bool(string_pair(&l, &r).is_some_and(|(a, b)| a.contains(&b))))
            }
            BinOp::StartsWith => {
                let (l, r) = (self.eval(lhs, vars)?, self.eval(rhs, vars)?);
                Ok(Value::Bool(string_pair(&l, &r).is_some_and(|(a, b)| a.starts_with(&b))))
            }
            BinOp::EndsWith => {
                let (l, r) = (self.eval(lhs, vars)?, self.eval(rhs, vars)?);
                Ok(Value::Bool(string_pair(&l, &r).is_some_and(|(a, b)| a.ends_with(&b))))
            }
            BinOp::Matches => self.eval_matches(lhs, rhs, vars),
        }
    }

    fn eval_matches(&self, lhs: &Expr, rhs: &Expr, vars: &Value) -> Result<Value, EvaluationError> {
        let left = self.eval(lhs, vars)?;
        let Some(haystack) = left.as_str() else {
            return Ok(Value::Bool(false));
        };
        let pattern = match rhs {
            Expr::Regex(src) => src.clone(),
            other => match self.eval(other, vars)?.as_str() {
                Some(s) => s.to_string(),
                None => return Ok(Value::Bool(false)),
            },
        };
        let is_match = self.with_regex(&pattern)?.is_match(haystack);
        Ok(Value::Bool(is_match))
    }

    fn with_regex(&self, pattern: &str) -> Result<Regex, EvaluationError> {
        let mut cache = self.regex_cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(re) = cache.get(pattern) {
            return Ok(re.clone());
        }
        let compiled = Regex::new(pattern).map_err(|source| EvaluationError {
            pattern: pattern.to_string(),
            source,
        })?;
        cache.insert(pattern.to_string(), compiled.clone());
        Ok(compiled)
    }
}

fn lookup(vars: &Value, name: &str) -> Value {
    vars.as_object()
        .and_then(|map| map.get(name))
        .cloned()
        .unwrap_or(Value::Null)
}

fn member_access(base: &Value, name: &str) -> Value {
    if name == "length" {
        if let Some(len) = length_of(base) {
            return Value::from(len);
        }
    }
    match base {
        Value::Object(map) => map.get(name).cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn length_of(v: &Value) -> Option<usize> {
    match v {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(a) => Some(a.len()),
        Value::Object(m) => Some(m.len()),
        _ => None,
    }
}

fn index_access(base: &Value, idx: &Value) -> Value {
    match (base, idx) {
        (Value::Array(arr), Value::Number(n)) => {
            let Some(i) = n.as_f64() else { return Value::Null };
            if i < 0.0 {
                return Value::Null;
            }
            arr.get(i as usize).cloned().unwrap_or(Value::Null)
        }
        (Value::Object(map), Value::String(key)) => map.get(key).cloned().unwrap_or(Value::Null),
        (Value::String(s), Value::Number(n)) => {
            let Some(i) = n.as_f64() else { return Value::Null };
            if i < 0.0 {
                return Value::Null;
            }
            s.chars().nth(i as usize).map(|c| Value::String(c.to_string())).unwrap_or(Value::Null)
        }
        _ => Value::Null,
    }
}

/// False, null, 0, empty string, empty array, empty map are falsy;
/// everything else is truthy (spec §4.3).
pub fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(m) => !m.is_empty(),
    }
}

/// Normalized numeric equality (int-as-float compares equal to the
/// equivalent float), else structural equality.
fn value_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) if a.is_number() && b.is_number() => x == y,
        _ => a == b,
    }
}

fn compare(op: BinOp, a: &Value, b: &Value) -> bool {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        if a.is_number() && b.is_number() {
            return match op {
                BinOp::Lt => x < y,
                BinOp::LtEq => x <= y,
                BinOp::Gt => x > y,
                BinOp::GtEq => x >= y,
                _ => unreachable!(),
            };
        }
    }
    if let (Some(x), Some(y)) = (a.as_str(), b.as_str()) {
        return match op {
            BinOp::Lt => x < y,
            BinOp::LtEq => x <= y,
            BinOp::Gt => x > y,
            BinOp::GtEq => x >= y,
            _ => unreachable!(),
        };
    }
    false
}

fn string_pair(a: &Value, b: &Value) -> Option<(String, String)> {
    match (a.as_str(), b.as_str()) {
        (Some(a), Some(b)) => Some((a.to_string(), b.to_string())),
        _ => None,
    }
}
