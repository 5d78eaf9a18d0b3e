//! Indexed trace store
//!
//! Holds every ingested trace plus two query indices: spans by operation id
//! (the `operation.id` attribute, falling back to the span name) and spans by
//! name. Index entries keep first-seen order so contract matching is
//! deterministic. A running byte estimate of retained data enforces the
//! ingester's memory budget.

use crate::error::AlignError;
use crate::trace_model::{Span, TraceData, TraceWarning};
use serde_json::Value;
use std::collections::HashMap;

/// Default memory budget: 500 MiB.
pub const DEFAULT_MAX_MEMORY_BYTES: u64 = 524_288_000;

/// Budget checks run every this many span insertions.
const BUDGET_CHECK_CADENCE: usize = 256;

/// Location of one span inside the store.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SpanRef {
    trace_id: String,
    span_id: String,
}

/// The queryable result of one ingestion run.
#[derive(Debug)]
pub struct TraceStore {
    pub traces: HashMap<String, TraceData>,
    by_operation_id: HashMap<String, Vec<SpanRef>>,
    by_name: HashMap<String, Vec<SpanRef>>,
    retained_bytes: u64,
    max_memory_bytes: u64,
    inserted: usize,
}

impl TraceStore {
    pub fn new(max_memory_bytes: u64) -> Self {
        TraceStore {
            traces: HashMap::new(),
            by_operation_id: HashMap::new(),
            by_name: HashMap::new(),
            retained_bytes: 0,
            max_memory_bytes,
            inserted: 0,
        }
    }

    /// Insert one decoded span, updating both indices and the byte estimate.
    ///
    /// Duplicate span ids within a trace keep the first sighting; the
    /// duplicate is dropped and `false` returned. The memory budget is
    /// checked on a fixed cadence; a hit aborts ingestion.
    pub fn insert_span(&mut self, span: Span) -> Result<bool, AlignError> {
        let trace = self
            .traces
            .entry(span.trace_id.clone())
            .or_insert_with(|| TraceData::new(span.trace_id.clone()));
        if trace.spans.contains_key(&span.span_id) {
            return Ok(false);
        }

        self.retained_bytes += estimate_span_bytes(&span);
        let span_ref = SpanRef {
            trace_id: span.trace_id.clone(),
            span_id: span.span_id.clone(),
        };
        self.by_operation_id
            .entry(span.operation_key().to_string())
            .or_default()
            .push(span_ref.clone());
        self.by_name
            .entry(span.name.clone())
            .or_default()
            .push(span_ref);
        trace.insert(span);

        self.inserted += 1;
        if self.inserted % BUDGET_CHECK_CADENCE == 0 {
            self.check_budget()?;
        }
        Ok(true)
    }

    /// Fail when the retained-byte estimate is over budget.
    pub fn check_budget(&self) -> Result<(), AlignError> {
        if self.retained_bytes > self.max_memory_bytes {
            return Err(AlignError::MemoryExceeded {
                retained: self.retained_bytes,
                limit: self.max_memory_bytes,
            });
        }
        Ok(())
    }

    /// Build the span tree of every trace. Called once, after the last
    /// insertion; the store is read-only from here on.
    pub fn finalize(&mut self) -> Result<Vec<TraceWarning>, AlignError> {
        let mut warnings = Vec::new();
        let mut trace_ids: Vec<String> = self.traces.keys().cloned().collect();
        trace_ids.sort();
        for trace_id in trace_ids {
            let trace = self.traces.get_mut(&trace_id).expect("key from iteration");
            warnings.extend(trace.build_tree());
        }
        self.check_budget()?;
        Ok(warnings)
    }

    /// Spans whose operation id equals `key`, in first-seen order.
    pub fn spans_for_operation_id(&self, key: &str) -> Vec<&Span> {
        self.resolve(self.by_operation_id.get(key))
    }

    /// Spans whose name equals `key`, in first-seen order.
    pub fn spans_for_name(&self, key: &str) -> Vec<&Span> {
        self.resolve(self.by_name.get(key))
    }

    fn resolve(&self, refs: Option<&Vec<SpanRef>>) -> Vec<&Span> {
        refs.map(|list| {
            list.iter()
                .filter_map(|r| {
                    self.traces
                        .get(&r.trace_id)
                        .and_then(|t| t.spans.get(&r.span_id))
                })
                .collect()
        })
        .unwrap_or_default()
    }

    pub fn trace_count(&self) -> usize {
        self.traces.len()
    }

    pub fn span_count(&self) -> usize {
        self.traces.values().map(|t| t.spans.len()).sum()
    }

    pub fn retained_bytes(&self) -> u64 {
        self.retained_bytes
    }

    pub fn max_memory_bytes(&self) -> u64 {
        self.max_memory_bytes
    }
}

impl Default for TraceStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MEMORY_BYTES)
    }
}

/// Retained-size estimate for one span: struct overhead plus every owned
/// string and attribute tree. An estimate, not an allocator measurement;
/// deliberately on the generous side.
fn estimate_span_bytes(span: &Span) -> u64 {
    let mut bytes = 256u64;
    bytes += span.span_id.len() as u64;
    bytes += span.trace_id.len() as u64;
    bytes += span.parent_span_id.as_ref().map_or(0, |p| p.len()) as u64;
    bytes += span.name.len() as u64;
    bytes += span.status.message.len() as u64;
    for (key, value) in &span.attributes {
        bytes += key.len() as u64 + 48;
        bytes += estimate_value_bytes(value);
    }
    for event in &span.events {
        bytes += event.name.len() as u64 + 64;
        for (key, value) in &event.attributes {
            bytes += key.len() as u64 + 48;
            bytes += estimate_value_bytes(value);
        }
    }
    bytes
}

fn estimate_value_bytes(value: &Value) -> u64 {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => 16,
        Value::String(s) => 24 + s.len() as u64,
        Value::Array(items) => 24 + items.iter().map(estimate_value_bytes).sum::<u64>(),
        Value::Object(map) => {
            24 + map
                .iter()
                .map(|(k, v)| k.len() as u64 + 48 + estimate_value_bytes(v))
                .sum::<u64>()
        }
    }
}
