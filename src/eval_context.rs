//! Evaluation context construction
//!
//! For every matched span the engine builds one JSON context that assertion
//! expressions resolve `var` paths against. The span itself is exposed under
//! `span`, and a set of flat compatibility aliases gives ergonomic names to
//! the attributes contracts most often reference (span attribute keys contain
//! dots, which dotted `var` paths cannot address directly).

use crate::trace_model::Span;
use serde_json::{json, Map, Value};

/// Flat alias -> source attribute(s), first present source wins.
///
/// Aliases are read-only conveniences; the canonical attribute is always
/// still reachable under `span.attributes`.
const ALIASES: &[(&str, &[&str])] = &[
    ("http_method", &["http.method"]),
    ("http_status_code", &["http.status_code"]),
    ("request_email", &["request.email"]),
    ("request_password", &["request.password"]),
    ("user_id", &["user.id", "request.params.userId"]),
    ("user_role", &["user.role"]),
    ("auth_token", &["auth.token"]),
    ("response_user", &["response.user"]),
    ("response_user_id", &["response.user.id", "response.user_id"]),
];

/// Build the evaluation context for one span.
pub fn build_context(span: &Span) -> Value {
    let attributes: Value = json!(span.attributes);
    let status = json!({
        "code": span.status.code.as_str(),
        "message": span.status.message,
    });
    let events: Value = Value::Array(
        span.events
            .iter()
            .map(|event| {
                json!({
                    "name": event.name,
                    "timestamp": event.timestamp_ns,
                    "attributes": event.attributes,
                })
            })
            .collect(),
    );

    let mut root = Map::new();
    root.insert(
        "span".to_string(),
        json!({
            "attributes": attributes,
            "name": span.name,
            "startTime": span.start_time_ns,
            "status": status,
            "events": events,
        }),
    );

    for (alias, sources) in ALIASES {
        let value = sources
            .iter()
            .find_map(|key| span.attributes.get(*key))
            .cloned();
        if let Some(value) = value {
            let value = if *alias == "http_status_code" {
                coerce_int(value)
            } else {
                value
            };
            root.insert((*alias).to_string(), value);
        }
    }
    root.insert(
        "operation_id".to_string(),
        Value::String(span.operation_key().to_string()),
    );

    root.insert("endTime".to_string(), json!(span.end_time_ns));
    root.insert("status".to_string(), status);
    root.insert("events".to_string(), events);
    Value::Object(root)
}

/// Collapse numeric-looking values to an integer where possible. Status
/// codes arrive as `"201"`, `201` or `201.0` depending on the exporter.
fn coerce_int(value: Value) -> Value {
    match &value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                json!(i)
            } else if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 {
                    json!(f as i64)
                } else {
                    value
                }
            } else {
                value
            }
        }
        Value::String(s) => match s.trim().parse::<i64>() {
            Ok(i) => json!(i),
            Err(_) => value,
        },
        _ => value,
    }
}
