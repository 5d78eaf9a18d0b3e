//! Sandboxed JSONLogic evaluator
//!
//! Evaluates the JSONLogic expression trees carried by contract assertions
//! against a per-span context. The operator set is the subset the contract
//! DSL needs; reimplemented here so the sandbox caps (wall-clock deadline,
//! recursion depth, collection size) hold unconditionally.
//!
//! Shape rules: an object with exactly one key is an operator application,
//! any other object is literal data, arrays evaluate element-wise, and
//! primitives evaluate to themselves. A `var` path that resolves nowhere
//! yields `null`, never an error.

use crate::json_compare::deep_equals;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Resource caps enforced per evaluation.
#[derive(Debug, Clone)]
pub struct SandboxLimits {
    /// Wall-clock deadline for one evaluation
    pub timeout: Duration,
    /// Maximum expression nesting depth
    pub max_depth: usize,
    /// Maximum size of any collection built during evaluation
    pub max_collection: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        SandboxLimits {
            timeout: Duration::from_millis(100),
            max_depth: 64,
            max_collection: 10_000,
        }
    }
}

/// Evaluation failure. Either a sandbox cap tripped or the expression
/// itself is malformed. Both surface as per-assertion failures upstream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("sandbox limit exceeded: {0}")]
    SandboxExceeded(String),

    #[error("invalid expression: {0}")]
    InvalidExpression(String),
}

/// Evaluate `expr` against `context` under `limits`.
pub fn evaluate(expr: &Value, context: &Value, limits: &SandboxLimits) -> Result<Value, EvalError> {
    let sandbox = Sandbox {
        context,
        limits,
        started: Instant::now(),
    };
    sandbox.eval(expr, 0)
}

/// JSONLogic truthiness: `false`, `null`, `0`, `""` and `[]` are falsy,
/// everything else (including empty objects) is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

/// Loose scalar equality in the JSONLogic style: int/float unify, numeric
/// strings compare numerically against numbers, booleans coerce to 0/1
/// against numbers. Arrays and objects fall back to structural equality.
pub fn loose_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
            match (to_number(a), to_number(b)) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            }
        }
        (Value::Bool(_), Value::Number(_)) | (Value::Number(_), Value::Bool(_)) => {
            match (to_number(a), to_number(b)) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            }
        }
        _ => deep_equals(a, b),
    }
}

/// Numeric view of a scalar: numbers as-is, numeric strings parsed,
/// booleans as 0/1. Everything else has no numeric view.
fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

struct Sandbox<'a> {
    context: &'a Value,
    limits: &'a SandboxLimits,
    started: Instant,
}

impl<'a> Sandbox<'a> {
    fn eval(&self, expr: &Value, depth: usize) -> Result<Value, EvalError> {
        if self.started.elapsed() > self.limits.timeout {
            return Err(EvalError::SandboxExceeded(format!(
                "evaluation exceeded {} ms deadline",
                self.limits.timeout.as_millis()
            )));
        }
        if depth > self.limits.max_depth {
            return Err(EvalError::SandboxExceeded(format!(
                "expression nesting exceeded depth {}",
                self.limits.max_depth
            )));
        }

        match expr {
            Value::Object(map) if map.len() == 1 => {
                let (op, args) = map.iter().next().expect("len checked");
                self.apply(op, args, depth)
            }
            Value::Array(items) => {
                if items.len() > self.limits.max_collection {
                    return Err(EvalError::SandboxExceeded(format!(
                        "collection of {} elements exceeds limit {}",
                        items.len(),
                        self.limits.max_collection
                    )));
                }
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval(item, depth + 1)?);
                }
                Ok(Value::Array(out))
            }
            other => Ok(other.clone()),
        }
    }

    fn apply(&self, op: &str, args: &Value, depth: usize) -> Result<Value, EvalError> {
        match op {
            "var" => self.op_var(args, depth),
            "missing" => self.op_missing(args, depth),
            "==" => self.binary(args, depth, |a, b| json!(loose_equals(a, b))),
            "!=" => self.binary(args, depth, |a, b| json!(!loose_equals(a, b))),
            ">" => self.compare(args, depth, |ord| ord == std::cmp::Ordering::Greater),
            ">=" => self.compare(args, depth, |ord| ord != std::cmp::Ordering::Less),
            "<" => self.compare(args, depth, |ord| ord == std::cmp::Ordering::Less),
            "<=" => self.compare(args, depth, |ord| ord != std::cmp::Ordering::Greater),
            "and" => self.op_and(args, depth),
            "or" => self.op_or(args, depth),
            "!" | "not" => {
                let operands = self.arg_list(args);
                let value = match operands.first() {
                    Some(operand) => self.eval(operand, depth + 1)?,
                    None => Value::Null,
                };
                Ok(json!(!is_truthy(&value)))
            }
            "if" => self.op_if(args, depth),
            "in" => self.op_in(args, depth),
            "strlen" => self.op_strlen(args, depth),
            "regex" | "match" => self.op_regex(args, depth),
            unknown => Err(EvalError::InvalidExpression(format!(
                "unknown operator '{}'",
                unknown
            ))),
        }
    }

    /// Operators accept a bare argument in place of a one-element array.
    fn arg_list<'v>(&self, args: &'v Value) -> Vec<&'v Value> {
        match args {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        }
    }

    fn op_var(&self, args: &Value, depth: usize) -> Result<Value, EvalError> {
        let operands = self.arg_list(args);
        let path_value = match operands.first() {
            Some(v) => self.eval(v, depth + 1)?,
            None => Value::Null,
        };
        let resolved = match &path_value {
            // {"var": ""} or {"var": null} yields the whole context
            Value::Null => Some(self.context.clone()),
            Value::String(path) if path.is_empty() => Some(self.context.clone()),
            Value::String(path) => lookup_path(self.context, path),
            Value::Number(n) => lookup_path(self.context, &n.to_string()),
            other => {
                return Err(EvalError::InvalidExpression(format!(
                    "var path must be a string or number, got {}",
                    other
                )))
            }
        };
        match resolved {
            Some(value) => Ok(value),
            None => match operands.get(1) {
                Some(default) => self.eval(default, depth + 1),
                None => Ok(Value::Null),
            },
        }
    }

    fn op_missing(&self, args: &Value, depth: usize) -> Result<Value, EvalError> {
        let operands = self.arg_list(args);
        // {"missing": {"var": ...}} evaluates its argument to a path list
        let paths: Vec<Value> = if operands.len() == 1 {
            match self.eval(operands[0], depth + 1)? {
                Value::Array(items) => items,
                single => vec![single],
            }
        } else {
            operands
                .iter()
                .map(|v| self.eval(v, depth + 1))
                .collect::<Result<_, _>>()?
        };
        if paths.len() > self.limits.max_collection {
            return Err(EvalError::SandboxExceeded(format!(
                "missing() over {} paths exceeds limit {}",
                paths.len(),
                self.limits.max_collection
            )));
        }
        let mut absent = Vec::new();
        for path in paths {
            if let Value::String(p) = &path {
                let found = lookup_path(self.context, p);
                if found.is_none() || found == Some(Value::Null) {
                    absent.push(path);
                }
            }
        }
        Ok(Value::Array(absent))
    }

    fn binary(
        &self,
        args: &Value,
        depth: usize,
        f: impl Fn(&Value, &Value) -> Value,
    ) -> Result<Value, EvalError> {
        let operands = self.arg_list(args);
        if operands.len() != 2 {
            return Err(EvalError::InvalidExpression(format!(
                "expected 2 operands, got {}",
                operands.len()
            )));
        }
        let a = self.eval(operands[0], depth + 1)?;
        let b = self.eval(operands[1], depth + 1)?;
        Ok(f(&a, &b))
    }

    /// Numeric comparison; `<` and `<=` also accept the three-operand
    /// between form. Non-numeric operands make the comparison false.
    fn compare(
        &self,
        args: &Value,
        depth: usize,
        accept: impl Fn(std::cmp::Ordering) -> bool,
    ) -> Result<Value, EvalError> {
        let operands = self.arg_list(args);
        if operands.len() != 2 && operands.len() != 3 {
            return Err(EvalError::InvalidExpression(format!(
                "comparison expects 2 or 3 operands, got {}",
                operands.len()
            )));
        }
        let mut values = Vec::with_capacity(operands.len());
        for operand in &operands {
            values.push(self.eval(operand, depth + 1)?);
        }
        for pair in values.windows(2) {
            let (a, b) = (to_number(&pair[0]), to_number(&pair[1]));
            let holds = match (a, b) {
                (Some(x), Some(y)) => x.partial_cmp(&y).map(&accept).unwrap_or(false),
                _ => false,
            };
            if !holds {
                return Ok(json!(false));
            }
        }
        Ok(json!(true))
    }

    fn op_and(&self, args: &Value, depth: usize) -> Result<Value, EvalError> {
        let operands = self.arg_list(args);
        let mut last = json!(true);
        for operand in operands {
            last = self.eval(operand, depth + 1)?;
            if !is_truthy(&last) {
                return Ok(last);
            }
        }
        Ok(last)
    }

    fn op_or(&self, args: &Value, depth: usize) -> Result<Value, EvalError> {
        let operands = self.arg_list(args);
        let mut last = json!(false);
        for operand in operands {
            last = self.eval(operand, depth + 1)?;
            if is_truthy(&last) {
                return Ok(last);
            }
        }
        Ok(last)
    }

    /// `[cond, then, cond2, then2, ..., else?]`, conditions evaluated
    /// lazily in order.
    fn op_if(&self, args: &Value, depth: usize) -> Result<Value, EvalError> {
        let operands = self.arg_list(args);
        let mut i = 0;
        while i + 1 < operands.len() {
            let cond = self.eval(operands[i], depth + 1)?;
            if is_truthy(&cond) {
                return self.eval(operands[i + 1], depth + 1);
            }
            i += 2;
        }
        if i < operands.len() {
            return self.eval(operands[i], depth + 1);
        }
        Ok(Value::Null)
    }

    fn op_in(&self, args: &Value, depth: usize) -> Result<Value, EvalError> {
        let operands = self.arg_list(args);
        if operands.len() != 2 {
            return Err(EvalError::InvalidExpression(format!(
                "in expects 2 operands, got {}",
                operands.len()
            )));
        }
        let needle = self.eval(operands[0], depth + 1)?;
        let haystack = self.eval(operands[1], depth + 1)?;
        let found = match &haystack {
            Value::String(s) => match &needle {
                Value::String(n) => s.contains(n.as_str()),
                _ => false,
            },
            Value::Array(items) => items.iter().any(|item| loose_equals(item, &needle)),
            _ => false,
        };
        Ok(json!(found))
    }

    fn op_strlen(&self, args: &Value, depth: usize) -> Result<Value, EvalError> {
        let operands = self.arg_list(args);
        let value = match operands.first() {
            Some(v) => self.eval(v, depth + 1)?,
            None => Value::Null,
        };
        match value {
            Value::String(s) => Ok(json!(s.chars().count())),
            Value::Null => Ok(json!(0)),
            other => Err(EvalError::InvalidExpression(format!(
                "strlen expects a string, got {}",
                other
            ))),
        }
    }

    fn op_regex(&self, args: &Value, depth: usize) -> Result<Value, EvalError> {
        let operands = self.arg_list(args);
        if operands.len() != 2 {
            return Err(EvalError::InvalidExpression(format!(
                "regex expects [pattern, value], got {} operands",
                operands.len()
            )));
        }
        let pattern = self.eval(operands[0], depth + 1)?;
        let value = self.eval(operands[1], depth + 1)?;
        let (Value::String(pattern), Value::String(value)) = (&pattern, &value) else {
            return Ok(json!(false));
        };
        let re = regex::Regex::new(pattern)
            .map_err(|e| EvalError::InvalidExpression(format!("bad regex pattern: {}", e)))?;
        Ok(json!(re.is_match(value)))
    }
}

/// Resolve a dotted path against a JSON tree. Segments index objects by
/// key and arrays by non-negative integer. `None` when any segment fails
/// to resolve.
fn lookup_path(root: &Value, path: &str) -> Option<Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => {
                let index: usize = segment.parse().ok()?;
                items.get(index)?
            }
            _ => return None,
        };
    }
    Some(current.clone())
}
