//! Alignment engine
//!
//! Matches every contract against the ingested spans, evaluates its
//! assertions in a sandboxed context per matched span, and produces one
//! `AlignmentResult` per contract. Contracts are distributed over a bounded
//! worker pool; results come back in input order regardless of completion
//! order.
//!
//! Matching: the operation-id index first, the name index as fallback. When
//! several spans match, each is evaluated independently and the counts are
//! summed; the contract only succeeds if every assertion passes on every
//! matched span.
//!
//! Deadlines and cancellation are cooperative: workers check the
//! per-contract deadline and the job-wide cancellation flag between
//! assertions and between contracts, never mid-expression (the sandbox's own
//! cap bounds a single expression).

use crate::error::AlignError;
use crate::eval_context::build_context;
use crate::json_compare::canonical_string;
use crate::jsonlogic::{evaluate, SandboxLimits};
use crate::report::{
    now_unix_nanos, AlignmentResult, AlignmentStatus, DetailType, ValidationDetail,
};
use crate::spec_model::ServiceSpec;
use crate::trace_model::Span;
use crate::trace_store::TraceStore;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Worker pool size
    pub max_workers: usize,
    /// Deadline for one contract across all its matched spans
    pub contract_timeout: Duration,
    /// Caps applied to each individual assertion evaluation
    pub sandbox_limits: SandboxLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_workers: default_worker_count(),
            contract_timeout: Duration::from_secs(30),
            sandbox_limits: SandboxLimits::default(),
        }
    }
}

/// Default pool size: one worker per CPU, capped at 4.
pub fn default_worker_count() -> usize {
    num_cpus::get().clamp(1, 4)
}

/// Parallel contract evaluator. Create one per job; the cancellation token
/// may be shared with a signal handler or driver-side watchdog.
pub struct AlignmentEngine {
    config: EngineConfig,
    cancel: Arc<AtomicBool>,
}

impl AlignmentEngine {
    pub fn new(config: EngineConfig) -> Self {
        AlignmentEngine {
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag observed by every worker between assertions and contracts.
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn worker_count(&self) -> usize {
        self.config.max_workers
    }

    /// Evaluate all contracts against the store.
    ///
    /// Returns results in the order contracts were supplied. Cancellation
    /// does not error: in-flight and queued contracts come back `FAILED`
    /// with a cancellation message so a report can still be emitted.
    pub fn align(
        &self,
        specs: &[ServiceSpec],
        store: &TraceStore,
    ) -> Result<Vec<AlignmentResult>, AlignError> {
        if self.config.max_workers == 0 {
            return Err(AlignError::InputInvalid(
                "maxWorkers must be positive".to_string(),
            ));
        }
        for spec in specs {
            spec.validate().map_err(|msg| {
                AlignError::InputInvalid(format!(
                    "invalid spec at {}:{}: {}",
                    spec.source_file, spec.line_number, msg
                ))
            })?;
        }
        if specs.is_empty() {
            return Ok(Vec::new());
        }

        let worker_count = self.config.max_workers.min(specs.len());
        let (job_tx, job_rx) = crossbeam::channel::unbounded::<(usize, &ServiceSpec)>();
        let (result_tx, result_rx) = crossbeam::channel::unbounded::<(usize, AlignmentResult)>();
        for job in specs.iter().enumerate() {
            job_tx.send(job).expect("job receiver alive");
        }
        drop(job_tx);

        std::thread::scope(|scope| {
            for _ in 0..worker_count {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                let cancel = Arc::clone(&self.cancel);
                let config = &self.config;
                scope.spawn(move || {
                    for (index, spec) in job_rx.iter() {
                        let result = evaluate_contract(spec, store, config, &cancel);
                        if result_tx.send((index, result)).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(result_tx);

        // Reorder worker output back to input order
        let mut slots: Vec<Option<AlignmentResult>> = (0..specs.len()).map(|_| None).collect();
        for (index, result) in result_rx.iter() {
            slots[index] = Some(result);
        }
        slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.ok_or_else(|| {
                    AlignError::Internal(format!("no result produced for contract {}", i))
                })
            })
            .collect()
    }
}

/// Evaluate one contract: match spans, then run every assertion against
/// every matched span's context.
fn evaluate_contract(
    spec: &ServiceSpec,
    store: &TraceStore,
    config: &EngineConfig,
    cancel: &AtomicBool,
) -> AlignmentResult {
    let wall_start = now_unix_nanos();
    let started = Instant::now();

    let mut matched = store.spans_for_operation_id(&spec.operation_id);
    if matched.is_empty() {
        matched = store.spans_for_name(&spec.operation_id);
    }

    if matched.is_empty() {
        debug!(operation_id = %spec.operation_id, "no span matched; contract skipped");
        return skipped_result(spec, wall_start, started);
    }

    let matched_spans: Vec<String> = matched.iter().map(|s| s.span_id.clone()).collect();
    let mut details = Vec::new();
    let mut passed = 0usize;
    let mut failed = 0usize;
    let mut error_message: Option<String> = None;

    'spans: for span in &matched {
        let context = build_context(span);
        let phases = [
            (DetailType::Precondition, &spec.preconditions),
            (DetailType::Postcondition, &spec.postconditions),
        ];
        for (phase, conditions) in phases {
            for (name, expr) in conditions.iter() {
                if cancel.load(Ordering::Relaxed) {
                    error_message = Some("alignment job cancelled".to_string());
                    break 'spans;
                }
                if started.elapsed() > config.contract_timeout {
                    error_message = Some(format!(
                        "contract evaluation exceeded deadline of {} ms",
                        config.contract_timeout.as_millis()
                    ));
                    warn!(operation_id = %spec.operation_id, "contract deadline exceeded");
                    break 'spans;
                }
                let detail =
                    evaluate_assertion(name, expr, &context, phase, span, &config.sandbox_limits);
                if detail.passed() {
                    passed += 1;
                } else {
                    failed += 1;
                }
                details.push(detail);
            }
        }
    }

    let status = if error_message.is_some() || failed > 0 {
        AlignmentStatus::Failed
    } else {
        AlignmentStatus::Success
    };
    let wall_end = now_unix_nanos();
    AlignmentResult {
        spec_operation_id: spec.operation_id.clone(),
        status,
        details,
        execution_time: started.elapsed().as_nanos() as u64,
        start_time: wall_start,
        end_time: wall_end,
        matched_spans,
        assertions_total: passed + failed,
        assertions_passed: passed,
        assertions_failed: failed,
        error_message,
    }
}

fn skipped_result(spec: &ServiceSpec, wall_start: u64, started: Instant) -> AlignmentResult {
    let detail = ValidationDetail {
        detail_type: DetailType::Matching,
        expression: format!("matchSpans(\"{}\")", spec.operation_id),
        expected: Value::String(spec.operation_id.clone()),
        actual: Value::Null,
        message: format!(
            "no span matched operation id or name '{}'",
            spec.operation_id
        ),
        failure_reason: None,
        suggestions: Some(vec![format!(
            "check that the traced service emits a span named '{}' or tagged with the operation.id attribute",
            spec.operation_id
        )]),
        context_info: None,
    };
    AlignmentResult {
        spec_operation_id: spec.operation_id.clone(),
        status: AlignmentStatus::Skipped,
        details: vec![detail],
        execution_time: started.elapsed().as_nanos() as u64,
        start_time: wall_start,
        end_time: now_unix_nanos(),
        matched_spans: Vec::new(),
        assertions_total: 0,
        assertions_passed: 0,
        assertions_failed: 0,
        error_message: None,
    }
}

/// Run one assertion in the sandbox and fold the outcome into a detail.
/// Only boolean `true` passes; every other value, and every evaluation
/// error, is a failure with diagnostics attached.
fn evaluate_assertion(
    name: &str,
    expr: &Value,
    context: &Value,
    phase: DetailType,
    span: &Span,
    limits: &SandboxLimits,
) -> ValidationDetail {
    let expression = canonical_string(expr);
    let phase_word = match phase {
        DetailType::Precondition => "precondition",
        DetailType::Postcondition => "postcondition",
        DetailType::Matching => "matching",
    };
    match evaluate(expr, context, limits) {
        Ok(Value::Bool(true)) => ValidationDetail {
            detail_type: phase,
            expression,
            expected: json!(true),
            actual: json!(true),
            message: format!("{} '{}' passed on span {}", phase_word, name, span.span_id),
            failure_reason: None,
            suggestions: None,
            context_info: None,
        },
        Ok(actual) => {
            let failure_reason = summarize_failure(expr, &actual);
            let suggestions = build_suggestions(expr, &actual);
            ValidationDetail {
                detail_type: phase,
                expression,
                expected: json!(true),
                actual,
                message: format!("{} '{}' failed on span {}", phase_word, name, span.span_id),
                failure_reason: Some(failure_reason),
                suggestions: Some(suggestions),
                context_info: Some(context_info(span)),
            }
        }
        Err(err) => ValidationDetail {
            detail_type: phase,
            expression,
            expected: json!(true),
            actual: Value::Null,
            message: format!(
                "{} '{}' errored on span {}: {}",
                phase_word, name, span.span_id, err
            ),
            failure_reason: Some(err.to_string()),
            suggestions: Some(build_suggestions(expr, &Value::Null)),
            context_info: Some(context_info(span)),
        },
    }
}

/// One-line description of what the failing expression's top operator saw.
fn summarize_failure(expr: &Value, actual: &Value) -> String {
    let rendered = canonical_string(expr);
    let rendered = if rendered.chars().count() > 120 {
        let clipped: String = rendered.chars().take(120).collect();
        format!("{}...", clipped)
    } else {
        rendered
    };
    match expr.as_object().and_then(|m| m.keys().next()) {
        Some(op) => format!("operator '{}' in {} returned {}", op, rendered, actual),
        None => format!("expression {} returned {}", rendered, actual),
    }
}

/// Up to three hints about why the assertion may have failed.
fn build_suggestions(expr: &Value, actual: &Value) -> Vec<String> {
    let mut suggestions = Vec::new();
    let mut paths = Vec::new();
    collect_var_paths(expr, &mut paths);
    for path in paths.iter().take(2) {
        suggestions.push(format!(
            "check that '{}' is populated in the span context",
            path
        ));
    }
    match actual {
        Value::Null => suggestions
            .push("expression evaluated to null; a referenced value may be missing".to_string()),
        Value::Bool(_) => {}
        _ => suggestions.push("contract assertions must evaluate to boolean true".to_string()),
    }
    suggestions.truncate(3);
    suggestions
}

/// Every `var` path referenced anywhere in the expression tree.
fn collect_var_paths(expr: &Value, out: &mut Vec<String>) {
    match expr {
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some(arg) = map.get("var") {
                    match arg {
                        Value::String(path) => {
                            out.push(path.clone());
                            return;
                        }
                        Value::Array(items) => {
                            if let Some(Value::String(path)) = items.first() {
                                out.push(path.clone());
                            }
                            return;
                        }
                        _ => {}
                    }
                }
            }
            for value in map.values() {
                collect_var_paths(value, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_var_paths(item, out);
            }
        }
        _ => {}
    }
}

fn context_info(span: &Span) -> Value {
    json!({
        "spanName": span.name,
        "spanId": span.span_id,
        "status": span.status.code.as_str(),
    })
}
