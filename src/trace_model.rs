//! Span and trace model
//!
//! In-memory representation of one OTLP trace export: spans with attributes,
//! events and status, grouped into per-trace span maps with a reconstructed
//! parent/child tree. The ingester fills these structures; the alignment
//! engine reads them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Span status code, normalized from the OTLP numeric/string encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatusCode {
    Ok,
    Error,
    Timeout,
    Unset,
}

impl StatusCode {
    /// Decode the OTLP numeric status code (`1 = OK`, `2 = ERROR`).
    pub fn from_otlp_number(code: i64) -> Self {
        match code {
            1 => StatusCode::Ok,
            2 => StatusCode::Error,
            _ => StatusCode::Unset,
        }
    }

    /// Decode a string status code. Accepts both the protobuf enum names
    /// (`STATUS_CODE_OK`) and bare names (`OK`, `ERROR`, `TIMEOUT`).
    pub fn from_token(token: &str) -> Self {
        match token {
            "STATUS_CODE_OK" | "OK" => StatusCode::Ok,
            "STATUS_CODE_ERROR" | "ERROR" => StatusCode::Error,
            "TIMEOUT" => StatusCode::Timeout,
            _ => StatusCode::Unset,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::Error => "ERROR",
            StatusCode::Timeout => "TIMEOUT",
            StatusCode::Unset => "UNSET",
        }
    }
}

/// Status of a span: normalized code plus the exporter-supplied message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanStatus {
    pub code: StatusCode,
    #[serde(default)]
    pub message: String,
}

impl Default for SpanStatus {
    fn default() -> Self {
        SpanStatus {
            code: StatusCode::Unset,
            message: String::new(),
        }
    }
}

/// A timestamped event attached to a span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanEvent {
    pub name: String,
    pub timestamp_ns: u64,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

/// One operation instance within a trace.
///
/// Attribute values keep their JSON type (`intValue` stays an integer,
/// `doubleValue` a float). `parent_span_id == None` marks a root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    pub span_id: String,
    pub trace_id: String,
    pub parent_span_id: Option<String>,
    pub name: String,
    pub start_time_ns: u64,
    pub end_time_ns: u64,
    #[serde(default)]
    pub status: SpanStatus,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
    #[serde(default)]
    pub events: Vec<SpanEvent>,
}

impl Span {
    /// The key this span is indexed under for contract matching: the
    /// `operation.id` attribute when present and a string, otherwise the
    /// span name.
    pub fn operation_key(&self) -> &str {
        match self.attributes.get("operation.id") {
            Some(Value::String(id)) if !id.is_empty() => id,
            _ => &self.name,
        }
    }

    /// Structural sanity check applied by the ingester before insertion.
    pub fn validate(&self) -> Result<(), String> {
        if self.span_id.is_empty() {
            return Err("spanId must be non-empty".to_string());
        }
        if self.trace_id.is_empty() {
            return Err("traceId must be non-empty".to_string());
        }
        if self.end_time_ns < self.start_time_ns {
            return Err(format!(
                "endTime {} precedes startTime {}",
                self.end_time_ns, self.start_time_ns
            ));
        }
        Ok(())
    }
}

/// Non-fatal observation recorded while building a trace.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceWarning {
    pub trace_id: String,
    pub message: String,
}

/// All spans sharing one `trace_id`, plus the reconstructed span tree.
///
/// When the trace has more than one root (dangling parents, cycles), the
/// deterministically-chosen primary root lands in `root_span` and the rest
/// in `secondary_roots`; the forest stays queryable.
#[derive(Debug, Clone, Default)]
pub struct TraceData {
    pub trace_id: String,
    pub spans: HashMap<String, Span>,
    pub root_span: Option<String>,
    pub secondary_roots: Vec<String>,
    pub children: HashMap<String, Vec<String>>,
}

impl TraceData {
    pub fn new(trace_id: impl Into<String>) -> Self {
        TraceData {
            trace_id: trace_id.into(),
            ..Default::default()
        }
    }

    /// Insert a span. Returns false (and leaves the trace untouched) when a
    /// span with the same id is already present; first sighting wins.
    pub fn insert(&mut self, span: Span) -> bool {
        if self.spans.contains_key(&span.span_id) {
            return false;
        }
        self.spans.insert(span.span_id.clone(), span);
        true
    }

    /// Rebuild parent/child lists and pick the root.
    ///
    /// Root candidates are spans with no parent, a parent id absent from this
    /// trace, or an ancestor chain that re-enters itself. The primary root is
    /// the candidate with the earliest start time, span-id order breaking
    /// ties. Returns warnings for dangling parents, cycles, and multi-root
    /// traces.
    pub fn build_tree(&mut self) -> Vec<TraceWarning> {
        let mut warnings = Vec::new();
        self.children.clear();
        self.secondary_roots.clear();
        self.root_span = None;

        if self.spans.is_empty() {
            return warnings;
        }

        let mut roots: Vec<String> = Vec::new();
        for (span_id, span) in &self.spans {
            match &span.parent_span_id {
                None => roots.push(span_id.clone()),
                Some(parent_id) => {
                    if !self.spans.contains_key(parent_id) {
                        warnings.push(TraceWarning {
                            trace_id: self.trace_id.clone(),
                            message: format!(
                                "span {} references missing parent {}; demoted to root",
                                span_id, parent_id
                            ),
                        });
                        roots.push(span_id.clone());
                    } else if self.ancestor_chain_cycles(span_id) {
                        warnings.push(TraceWarning {
                            trace_id: self.trace_id.clone(),
                            message: format!(
                                "span {} is part of a parent cycle; demoted to root",
                                span_id
                            ),
                        });
                        roots.push(span_id.clone());
                    }
                }
            }
        }

        // Child lists only link spans whose parent resolves and is acyclic.
        let root_set: HashSet<&String> = roots.iter().collect();
        for (span_id, span) in &self.spans {
            if root_set.contains(span_id) {
                continue;
            }
            if let Some(parent_id) = &span.parent_span_id {
                self.children
                    .entry(parent_id.clone())
                    .or_default()
                    .push(span_id.clone());
            }
        }
        for child_list in self.children.values_mut() {
            child_list.sort();
        }

        if roots.is_empty() {
            // Every span sits on a cycle that self-resolves within the trace
            warnings.push(TraceWarning {
                trace_id: self.trace_id.clone(),
                message: "trace has spans but no resolvable root".to_string(),
            });
            return warnings;
        }

        roots.sort_by(|a, b| {
            let sa = &self.spans[a];
            let sb = &self.spans[b];
            sa.start_time_ns.cmp(&sb.start_time_ns).then(a.cmp(b))
        });
        roots.dedup();

        if roots.len() > 1 {
            warnings.push(TraceWarning {
                trace_id: self.trace_id.clone(),
                message: format!("trace has {} roots; first by start time chosen", roots.len()),
            });
        }
        let mut iter = roots.into_iter();
        self.root_span = iter.next();
        self.secondary_roots = iter.collect();
        warnings
    }

    /// Walk the parent chain from `span_id`; true when the chain revisits a
    /// span before reaching a root.
    fn ancestor_chain_cycles(&self, span_id: &str) -> bool {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut current = span_id;
        loop {
            if !seen.insert(current) {
                return true;
            }
            match self
                .spans
                .get(current)
                .and_then(|s| s.parent_span_id.as_deref())
            {
                Some(parent) if self.spans.contains_key(parent) => current = parent,
                _ => return false,
            }
        }
    }

    /// Ids of every span reachable from the primary root.
    pub fn reachable_from_root(&self) -> HashSet<String> {
        let mut reachable = HashSet::new();
        let mut stack: Vec<String> = self.root_span.iter().cloned().collect();
        while let Some(id) = stack.pop() {
            if !reachable.insert(id.clone()) {
                continue;
            }
            if let Some(kids) = self.children.get(&id) {
                stack.extend(kids.iter().cloned());
            }
        }
        reachable
    }
}
