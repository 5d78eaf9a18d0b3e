//! Alignment report schema and assembly
//!
//! The report is the contract with downstream consumers (renderers, JSON
//! sinks, CI gates): camelCase keys, nanosecond integer times, fixed status
//! and detail-type strings. Field order is struct declaration order, which
//! serde keeps stable, so identical inputs serialize byte-identically.

use crate::error::AlignError;
use crate::json_compare::deep_equals;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

/// Terminal state of one contract's evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlignmentStatus {
    Success,
    Failed,
    Skipped,
}

/// What kind of check a validation detail records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailType {
    Precondition,
    Postcondition,
    Matching,
}

/// One assertion (or matching) outcome with enough context to debug it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationDetail {
    #[serde(rename = "type")]
    pub detail_type: DetailType,
    /// Canonical (sorted-key) rendering of the evaluated expression
    pub expression: String,
    pub expected: Value,
    pub actual: Value,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_info: Option<Value>,
}

impl ValidationDetail {
    /// A detail passed iff expected and actual agree structurally.
    pub fn passed(&self) -> bool {
        deep_equals(&self.expected, &self.actual)
    }
}

/// Everything observed while aligning one contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignmentResult {
    pub spec_operation_id: String,
    pub status: AlignmentStatus,
    pub details: Vec<ValidationDetail>,
    /// Nanoseconds spent evaluating this contract
    pub execution_time: u64,
    pub start_time: u64,
    pub end_time: u64,
    pub matched_spans: Vec<String>,
    pub assertions_total: usize,
    pub assertions_passed: usize,
    pub assertions_failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl AlignmentResult {
    /// Per-result invariants checked by the assembler.
    fn check(&self) -> Result<(), String> {
        if self.assertions_total != self.assertions_passed + self.assertions_failed {
            return Err(format!(
                "result {}: assertionsTotal {} != passed {} + failed {}",
                self.spec_operation_id,
                self.assertions_total,
                self.assertions_passed,
                self.assertions_failed
            ));
        }
        if self.matched_spans.is_empty() && self.status != AlignmentStatus::Skipped {
            return Err(format!(
                "result {}: no matched spans but status {:?}",
                self.spec_operation_id, self.status
            ));
        }
        if self.end_time < self.start_time {
            return Err(format!(
                "result {}: endTime precedes startTime",
                self.spec_operation_id
            ));
        }
        Ok(())
    }
}

/// Aggregated counts over all results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub success_rate: f64,
    pub failure_rate: f64,
}

/// Run-level throughput and resource figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceInfo {
    pub specs_processed: usize,
    pub spans_matched: usize,
    pub assertions_evaluated: usize,
    pub worker_count: usize,
    pub peak_memory_mib: f64,
    /// Contracts per second over the whole run
    pub processing_rate: f64,
}

/// The full report emitted to renderers and the JSON sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignmentReport {
    pub summary: Summary,
    pub results: Vec<AlignmentResult>,
    pub execution_time: u64,
    pub start_time: u64,
    pub end_time: u64,
    pub performance_info: PerformanceInfo,
}

impl AlignmentReport {
    /// Verify every report invariant. Renderers call this before emitting;
    /// the assembler calls it before returning. A violation is a programmer
    /// error, not bad input.
    pub fn check_consistency(&self) -> Result<(), String> {
        let summary = &self.summary;
        if summary.total != self.results.len() {
            return Err(format!(
                "summary.total {} != results length {}",
                summary.total,
                self.results.len()
            ));
        }
        let success = count(&self.results, AlignmentStatus::Success);
        let failed = count(&self.results, AlignmentStatus::Failed);
        let skipped = count(&self.results, AlignmentStatus::Skipped);
        if (summary.success, summary.failed, summary.skipped) != (success, failed, skipped) {
            return Err(format!(
                "summary counts ({}, {}, {}) disagree with statuses ({}, {}, {})",
                summary.success, summary.failed, summary.skipped, success, failed, skipped
            ));
        }
        for rate in [summary.success_rate, summary.failure_rate] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(format!("rate {} outside [0, 1]", rate));
            }
        }
        if self.end_time < self.start_time {
            return Err("report endTime precedes startTime".to_string());
        }
        for result in &self.results {
            result.check()?;
        }
        Ok(())
    }
}

fn count(results: &[AlignmentResult], status: AlignmentStatus) -> usize {
    results.iter().filter(|r| r.status == status).count()
}

/// Build the summary and performance block around a finished result slice,
/// then self-check the whole report.
pub fn assemble(
    results: Vec<AlignmentResult>,
    start_time: u64,
    end_time: u64,
    worker_count: usize,
    peak_memory_bytes: u64,
) -> Result<AlignmentReport, AlignError> {
    let total = results.len();
    let success = count(&results, AlignmentStatus::Success);
    let failed = count(&results, AlignmentStatus::Failed);
    let skipped = count(&results, AlignmentStatus::Skipped);
    let (success_rate, failure_rate) = if total > 0 {
        (success as f64 / total as f64, failed as f64 / total as f64)
    } else {
        (0.0, 0.0)
    };

    let spans_matched = results.iter().map(|r| r.matched_spans.len()).sum();
    let assertions_evaluated = results.iter().map(|r| r.assertions_total).sum();
    let execution_time = end_time.saturating_sub(start_time);
    let processing_rate = if execution_time > 0 {
        total as f64 / (execution_time as f64 / 1_000_000_000.0)
    } else {
        0.0
    };

    let report = AlignmentReport {
        summary: Summary {
            total,
            success,
            failed,
            skipped,
            success_rate,
            failure_rate,
        },
        results,
        execution_time,
        start_time,
        end_time,
        performance_info: PerformanceInfo {
            specs_processed: total,
            spans_matched,
            assertions_evaluated,
            worker_count,
            peak_memory_mib: peak_memory_bytes as f64 / (1024.0 * 1024.0),
            processing_rate,
        },
    };
    report
        .check_consistency()
        .map_err(AlignError::Internal)?;
    Ok(report)
}

/// Exit code the shell maps the report to: 0 when every non-skipped
/// contract succeeded, 1 when any failed. (System errors never reach this
/// helper; the driver maps them to 2.)
pub fn exit_code(report: &AlignmentReport) -> i32 {
    if report.summary.failed > 0 {
        1
    } else {
        0
    }
}

/// Current wall-clock time as nanoseconds since the Unix epoch.
pub fn now_unix_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn passing_result(op: &str) -> AlignmentResult {
        AlignmentResult {
            spec_operation_id: op.to_string(),
            status: AlignmentStatus::Success,
            details: vec![ValidationDetail {
                detail_type: DetailType::Precondition,
                expression: r#"{"==":[{"var":"http_method"},"POST"]}"#.to_string(),
                expected: json!(true),
                actual: json!(true),
                message: "precondition 'method' passed".to_string(),
                failure_reason: None,
                suggestions: None,
                context_info: None,
            }],
            execution_time: 1_000,
            start_time: 10,
            end_time: 1_010,
            matched_spans: vec!["s1".to_string()],
            assertions_total: 1,
            assertions_passed: 1,
            assertions_failed: 0,
            error_message: None,
        }
    }

    fn skipped_result(op: &str) -> AlignmentResult {
        AlignmentResult {
            spec_operation_id: op.to_string(),
            status: AlignmentStatus::Skipped,
            details: Vec::new(),
            execution_time: 10,
            start_time: 10,
            end_time: 20,
            matched_spans: Vec::new(),
            assertions_total: 0,
            assertions_passed: 0,
            assertions_failed: 0,
            error_message: None,
        }
    }

    fn failed_result(op: &str) -> AlignmentResult {
        AlignmentResult {
            status: AlignmentStatus::Failed,
            assertions_passed: 0,
            assertions_failed: 1,
            ..passing_result(op)
        }
    }

    #[test]
    fn test_assemble_counts_and_rates() {
        let report = assemble(
            vec![
                passing_result("a"),
                failed_result("b"),
                skipped_result("c"),
                failed_result("d"),
            ],
            1_000,
            2_000,
            4,
            1024 * 1024,
        )
        .unwrap();
        assert_eq!(report.summary.total, 4);
        assert_eq!(report.summary.success, 1);
        assert_eq!(report.summary.failed, 2);
        assert_eq!(report.summary.skipped, 1);
        assert!((report.summary.success_rate - 0.25).abs() < 1e-9);
        assert!((report.summary.failure_rate - 0.5).abs() < 1e-9);
        assert_eq!(report.execution_time, 1_000);
        assert!((report.performance_info.peak_memory_mib - 1.0).abs() < 1e-9);
        assert_eq!(report.performance_info.spans_matched, 3);
        assert_eq!(report.performance_info.assertions_evaluated, 3);
    }

    #[test]
    fn test_assemble_empty_results() {
        let report = assemble(Vec::new(), 5, 10, 1, 0).unwrap();
        assert_eq!(report.summary.total, 0);
        assert_eq!(report.summary.success_rate, 0.0);
        assert_eq!(exit_code(&report), 0);
    }

    #[test]
    fn test_exit_codes() {
        let ok = assemble(vec![passing_result("a")], 0, 1, 1, 0).unwrap();
        assert_eq!(exit_code(&ok), 0);

        let skipped_only = assemble(vec![skipped_result("a")], 0, 1, 1, 0).unwrap();
        assert_eq!(exit_code(&skipped_only), 0);

        let failing = assemble(vec![passing_result("a"), failed_result("b")], 0, 1, 1, 0).unwrap();
        assert_eq!(exit_code(&failing), 1);
    }

    #[test]
    fn test_consistency_rejects_bad_assertion_arithmetic() {
        let mut bad = passing_result("a");
        bad.assertions_total = 5;
        let err = assemble(vec![bad], 0, 1, 1, 0).unwrap_err();
        assert!(matches!(err, AlignError::Internal(_)));
    }

    #[test]
    fn test_consistency_rejects_nonskipped_without_matches() {
        let mut bad = passing_result("a");
        bad.matched_spans.clear();
        let err = assemble(vec![bad], 0, 1, 1, 0).unwrap_err();
        assert!(matches!(err, AlignError::Internal(_)));
    }

    #[test]
    fn test_consistency_rejects_tampered_summary() {
        let mut report = assemble(vec![passing_result("a")], 0, 1, 1, 0).unwrap();
        report.summary.success = 0;
        report.summary.failed = 1;
        assert!(report.check_consistency().is_err());
    }

    #[test]
    fn test_consistency_rejects_inverted_report_times() {
        let mut report = assemble(vec![passing_result("a")], 0, 1, 1, 0).unwrap();
        report.start_time = 100;
        report.end_time = 50;
        assert!(report.check_consistency().is_err());
    }

    #[test]
    fn test_detail_passed_uses_deep_equality() {
        let mut detail = passing_result("a").details.remove(0);
        assert!(detail.passed());
        detail.actual = json!(false);
        assert!(!detail.passed());
        // Numeric unification applies here too
        detail.expected = json!(201);
        detail.actual = json!(201.0);
        assert!(detail.passed());
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(
            serde_json::to_string(&AlignmentStatus::Success).unwrap(),
            "\"SUCCESS\""
        );
        assert_eq!(
            serde_json::to_string(&AlignmentStatus::Failed).unwrap(),
            "\"FAILED\""
        );
        assert_eq!(
            serde_json::to_string(&AlignmentStatus::Skipped).unwrap(),
            "\"SKIPPED\""
        );
    }

    #[test]
    fn test_detail_type_strings() {
        assert_eq!(
            serde_json::to_string(&DetailType::Precondition).unwrap(),
            "\"precondition\""
        );
        assert_eq!(
            serde_json::to_string(&DetailType::Postcondition).unwrap(),
            "\"postcondition\""
        );
        assert_eq!(
            serde_json::to_string(&DetailType::Matching).unwrap(),
            "\"matching\""
        );
    }

    #[test]
    fn test_report_serde_round_trip_is_stable() {
        let report = assemble(
            vec![passing_result("a"), skipped_result("b")],
            1_000,
            2_000,
            2,
            0,
        )
        .unwrap();
        let first = serde_json::to_string(&report).unwrap();
        let decoded: AlignmentReport = serde_json::from_str(&first).unwrap();
        let second = serde_json::to_string(&decoded).unwrap();
        assert_eq!(first, second);
        assert!(first.contains("\"specOperationId\""));
        assert!(first.contains("\"performanceInfo\""));
    }

    #[test]
    fn test_timeout_result_shape() {
        let timed_out = AlignmentResult {
            status: AlignmentStatus::Failed,
            assertions_total: 1,
            assertions_passed: 1,
            assertions_failed: 0,
            error_message: Some(
                "contract evaluation exceeded deadline of 30000 ms".to_string(),
            ),
            ..passing_result("slowOp")
        };
        // Failed-by-timeout with only passing partial assertions is legal
        let report = assemble(vec![timed_out], 0, 1, 1, 0).unwrap();
        assert_eq!(report.summary.failed, 1);
        assert_eq!(exit_code(&report), 1);
    }

    #[test]
    fn test_optional_fields_omitted_when_none() {
        let report = assemble(vec![passing_result("a")], 0, 1, 1, 0).unwrap();
        let encoded = serde_json::to_string(&report).unwrap();
        assert!(!encoded.contains("errorMessage"));
        assert!(!encoded.contains("failureReason"));
        assert!(!encoded.contains("suggestions"));
    }

    #[test]
    fn test_processing_rate_computed() {
        // Two contracts over one second
        let report = assemble(
            vec![passing_result("a"), passing_result("b")],
            0,
            1_000_000_000,
            1,
            0,
        )
        .unwrap();
        assert!((report.performance_info.processing_rate - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_now_unix_nanos_monotone_enough() {
        let a = now_unix_nanos();
        let b = now_unix_nanos();
        assert!(b >= a);
    }
}
