//! Report renderers
//!
//! The thin presentation shell over the report: a human-readable text form
//! for terminals and the stable JSON form for machine consumers. Both
//! re-check report consistency before emitting; a report that fails its own
//! invariants must never leave the process looking healthy.

use crate::error::AlignError;
use crate::report::{AlignmentReport, AlignmentResult, AlignmentStatus};
use std::fmt::Write as _;

/// Stable JSON rendering of the report (pretty-printed).
pub fn render_json(report: &AlignmentReport) -> Result<String, AlignError> {
    report
        .check_consistency()
        .map_err(AlignError::Internal)?;
    serde_json::to_string_pretty(report)
        .map_err(|e| AlignError::Internal(format!("report serialization failed: {}", e)))
}

/// Terminal rendering: summary block, then one section per contract with
/// failure details expanded.
pub fn render_human(report: &AlignmentReport) -> Result<String, AlignError> {
    report
        .check_consistency()
        .map_err(AlignError::Internal)?;

    let mut out = String::new();
    let summary = &report.summary;
    let _ = writeln!(out, "Alignment Report");
    let _ = writeln!(out, "================");
    let _ = writeln!(
        out,
        "Contracts: {} total | {} success | {} failed | {} skipped",
        summary.total, summary.success, summary.failed, summary.skipped
    );
    let _ = writeln!(
        out,
        "Success rate: {:.1}%  Failure rate: {:.1}%",
        summary.success_rate * 100.0,
        summary.failure_rate * 100.0
    );
    let _ = writeln!(out);

    for result in &report.results {
        render_result(&mut out, result);
    }

    let perf = &report.performance_info;
    let _ = writeln!(
        out,
        "Evaluated {} assertions over {} matched spans with {} workers in {:.1} ms",
        perf.assertions_evaluated,
        perf.spans_matched,
        perf.worker_count,
        report.execution_time as f64 / 1_000_000.0
    );
    let _ = writeln!(
        out,
        "Peak memory {:.1} MiB, {:.1} contracts/s",
        perf.peak_memory_mib, perf.processing_rate
    );
    Ok(out)
}

fn render_result(out: &mut String, result: &AlignmentResult) {
    let marker = match result.status {
        AlignmentStatus::Success => "PASS",
        AlignmentStatus::Failed => "FAIL",
        AlignmentStatus::Skipped => "SKIP",
    };
    let _ = writeln!(
        out,
        "[{}] {} ({}/{} assertions passed, {} span{})",
        marker,
        result.spec_operation_id,
        result.assertions_passed,
        result.assertions_total,
        result.matched_spans.len(),
        if result.matched_spans.len() == 1 { "" } else { "s" }
    );
    if let Some(message) = &result.error_message {
        let _ = writeln!(out, "    error: {}", message);
    }
    for detail in &result.details {
        if detail.passed() {
            continue;
        }
        let _ = writeln!(out, "    {}", detail.message);
        let _ = writeln!(out, "      expression: {}", detail.expression);
        let _ = writeln!(
            out,
            "      expected: {}  actual: {}",
            detail.expected, detail.actual
        );
        if let Some(reason) = &detail.failure_reason {
            let _ = writeln!(out, "      reason: {}", reason);
        }
        for suggestion in detail.suggestions.iter().flatten() {
            let _ = writeln!(out, "      hint: {}", suggestion);
        }
    }
}
