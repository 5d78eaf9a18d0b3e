//! Pipeline driver
//!
//! Ties the subsystems together for one job: scan the source tree, ingest
//! the trace file, align contracts against spans, assemble the report.
//! Per-file and per-assertion problems stay inside the outputs; anything
//! returned as `Err` here is fatal and maps to exit code 2 in the shell.
//!
//! ```text
//! SourceTree ──> AnnotationExtractor ──> ServiceSpec[]
//!                                               │
//! TraceFile  ──> OTLP ingester ──> TraceStore ──┤
//!                                               ▼
//!                              AlignmentEngine (worker pool)
//!                                               │
//!                                               ▼
//!                                       AlignmentReport
//! ```

use crate::align_engine::AlignmentEngine;
use crate::config::AlignConfig;
use crate::error::AlignError;
use crate::extract::{AnnotationExtractor, ExtractError};
use crate::otlp_ingest::ingest_file;
use crate::report::{assemble, now_unix_nanos, AlignmentReport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Everything a driver needs after one run: the report plus the extraction
/// problems that were accumulated (and already logged) along the way.
#[derive(Debug)]
pub struct RunOutput {
    pub report: AlignmentReport,
    pub extract_errors: Vec<ExtractError>,
    pub extract_warnings: Vec<ExtractError>,
}

/// Run the full alignment pipeline.
pub fn run(config: &AlignConfig) -> Result<RunOutput, AlignError> {
    config.validate()?;
    let start_time = now_unix_nanos();

    // The optional job deadline covers the whole run. Expiry during
    // alignment cancels in-flight contracts but still emits a report;
    // expiry before alignment starts aborts the job outright.
    let engine = AlignmentEngine::new(config.engine_config());
    let cancel = engine.cancel_token();
    let watchdog = config
        .job_timeout_ms
        .map(|ms| JobWatchdog::arm(engine.cancel_token(), Duration::from_millis(ms)));

    // 1. Recover contracts from the source tree (scan pool is CPU-bounded,
    //    independent of the alignment worker setting)
    let extractor = AnnotationExtractor::new().with_strict(config.strict_mode);
    let extraction = extractor.scan_directory(&config.source_path)?;
    info!(
        specs = extraction.specs.len(),
        errors = extraction.errors.len(),
        "annotation extraction finished"
    );

    // 2. Ingest and index the trace export
    let (store, ingest_stats) = ingest_file(&config.trace_path, config.max_memory_bytes)?;
    info!(
        traces = store.trace_count(),
        spans = store.span_count(),
        skipped = ingest_stats.spans_skipped,
        "trace ingestion finished"
    );
    for warning in &ingest_stats.warnings {
        warn!("{}", warning);
    }
    for warning in &ingest_stats.trace_warnings {
        warn!(trace_id = %warning.trace_id, "{}", warning.message);
    }

    // 3. Align every contract against the indexed spans. If extraction and
    //    ingestion already consumed the whole job budget, no contract ever
    //    ran and there is no report to emit.
    if cancel.load(Ordering::Relaxed) {
        if let Some(watchdog) = watchdog {
            watchdog.disarm();
        }
        return Err(AlignError::Cancelled);
    }
    let results = engine.align(&extraction.specs, &store)?;
    if let Some(watchdog) = watchdog {
        if watchdog.disarm() {
            warn!("job deadline expired; in-flight contracts were cancelled");
        }
    }

    // 4. Assemble and self-check the report
    let end_time = now_unix_nanos();
    let report = assemble(
        results,
        start_time,
        end_time,
        engine.worker_count(),
        store.retained_bytes(),
    )?;
    info!(
        total = report.summary.total,
        success = report.summary.success,
        failed = report.summary.failed,
        skipped = report.summary.skipped,
        "alignment finished"
    );

    Ok(RunOutput {
        report,
        extract_errors: extraction.errors,
        extract_warnings: extraction.warnings,
    })
}

/// Sets the engine's cancellation token when the job deadline passes.
struct JobWatchdog {
    stop_tx: crossbeam::channel::Sender<()>,
    fired: Arc<AtomicBool>,
    handle: std::thread::JoinHandle<()>,
}

impl JobWatchdog {
    /// Start the countdown on a background thread.
    fn arm(cancel: Arc<AtomicBool>, deadline: Duration) -> Self {
        let (stop_tx, stop_rx) = crossbeam::channel::bounded::<()>(0);
        let fired = Arc::new(AtomicBool::new(false));
        let fired_flag = Arc::clone(&fired);
        let handle = std::thread::spawn(move || {
            use crossbeam::channel::RecvTimeoutError;
            if stop_rx.recv_timeout(deadline) == Err(RecvTimeoutError::Timeout) {
                fired_flag.store(true, Ordering::Relaxed);
                cancel.store(true, Ordering::Relaxed);
            }
        });
        JobWatchdog {
            stop_tx,
            fired,
            handle,
        }
    }

    /// Stop the countdown; true when the deadline had already fired.
    fn disarm(self) -> bool {
        drop(self.stop_tx);
        let _ = self.handle.join();
        self.fired.load(Ordering::Relaxed)
    }
}
