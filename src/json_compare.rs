//! Deep comparison and canonical rendering of JSON values
//!
//! Contract assertions and trace attributes both travel as `serde_json::Value`
//! trees. Round-tripping through different encoders leaves numeric noise
//! behind (`201` vs `201.0`), so equality here unifies integer and float
//! representations. Canonical rendering sorts object keys so that two reports
//! built from the same inputs serialize byte-identically.

use serde_json::Value;
use std::fmt::Write as _;

/// Structural equality with numeric unification.
///
/// Two numbers are equal when they denote the same point on the number line,
/// regardless of integer/float encoding. Everything else is strict: strings
/// never equal numbers, arrays compare element-wise, objects key-wise.
pub fn deep_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => numbers_equal(x, y),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys.iter()).all(|(x, y)| deep_equals(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| deep_equals(x, y)))
        }
        _ => a == b,
    }
}

fn numbers_equal(x: &serde_json::Number, y: &serde_json::Number) -> bool {
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
        return a == b;
    }
    if let (Some(a), Some(b)) = (x.as_u64(), y.as_u64()) {
        return a == b;
    }
    match (x.as_f64(), y.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Render a value as compact JSON with object keys in sorted order.
///
/// Used for the `expression` field of validation details and for the
/// determinism checks on emitted reports.
pub fn canonical_string(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => {
            let _ = write!(out, "{}", b);
        }
        Value::Number(n) => {
            let _ = write!(out, "{}", n);
        }
        Value::String(s) => {
            // serde_json handles escaping; a bare string always serializes
            let _ = write!(out, "{}", Value::String(s.clone()));
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                let _ = write!(out, "{}", Value::String((*key).clone()));
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
    }
}
