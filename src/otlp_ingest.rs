//! Streaming OTLP-JSON trace ingestion
//!
//! Reads an OpenTelemetry JSON trace export
//! (`{resourceSpans: [{scopeSpans: [{spans: [...]}]}]}`) through a seeded
//! deserializer: the resource/scope nesting is walked token by token and each
//! span is materialized, converted and inserted into the store one at a time.
//! The file is never held in memory whole.
//!
//! Exporters disagree on encodings, so the converter accepts the known
//! variants: timestamps and `intValue` as JSON string or integer, status
//! codes numeric (`1`/`2`) or string (`STATUS_CODE_OK`/`OK`), missing status
//! as `UNSET`.
//!
//! A malformed individual span is skipped with a warning; malformed
//! top-level JSON fails the ingestion with `FormatInvalid`.

use crate::error::AlignError;
use crate::trace_model::{Span, SpanEvent, SpanStatus, StatusCode, TraceWarning};
use crate::trace_store::TraceStore;
use serde::de::{self, DeserializeSeed, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Counters and non-fatal observations from one ingestion run.
#[derive(Debug, Default)]
pub struct IngestStats {
    pub spans_ingested: usize,
    pub spans_skipped: usize,
    pub warnings: Vec<String>,
    pub trace_warnings: Vec<TraceWarning>,
    memory_exceeded: Option<(u64, u64)>,
}

/// Ingest an OTLP-JSON trace file into a fresh store.
pub fn ingest_file(
    path: &Path,
    max_memory_bytes: u64,
) -> Result<(TraceStore, IngestStats), AlignError> {
    let metadata = std::fs::metadata(path).map_err(|e| AlignError::io(path, e))?;
    if !metadata.is_file() {
        return Err(AlignError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
        ));
    }
    let file = File::open(path).map_err(|e| AlignError::io(path, e))?;
    ingest_reader(BufReader::new(file), max_memory_bytes)
}

/// Ingest from any reader. Entry point for tests and in-memory use.
pub fn ingest_reader<R: Read>(
    reader: R,
    max_memory_bytes: u64,
) -> Result<(TraceStore, IngestStats), AlignError> {
    let mut store = TraceStore::new(max_memory_bytes);
    let mut stats = IngestStats::default();

    let outcome = {
        let mut sink = SpanSink {
            store: &mut store,
            stats: &mut stats,
        };
        let mut deserializer = serde_json::Deserializer::from_reader(reader);
        RootSeed(&mut sink)
            .deserialize(&mut deserializer)
            .and_then(|()| deserializer.end())
    };

    if let Err(err) = outcome {
        if let Some((retained, limit)) = stats.memory_exceeded {
            return Err(AlignError::MemoryExceeded { retained, limit });
        }
        return Err(AlignError::FormatInvalid(err.to_string()));
    }

    stats.trace_warnings = store.finalize()?;
    Ok((store, stats))
}

/// Mutable ingestion state threaded through the deserialization seeds.
struct SpanSink<'a> {
    store: &'a mut TraceStore,
    stats: &'a mut IngestStats,
}

impl SpanSink<'_> {
    /// Convert and insert one raw span. `Err` aborts the whole run and is
    /// only produced for the memory budget.
    fn accept(&mut self, raw: &Value) -> Result<(), String> {
        match span_from_json(raw) {
            Ok(span) => match self.store.insert_span(span) {
                Ok(true) => {
                    self.stats.spans_ingested += 1;
                    Ok(())
                }
                Ok(false) => {
                    self.stats.spans_skipped += 1;
                    self.stats
                        .warnings
                        .push("duplicate span id dropped".to_string());
                    Ok(())
                }
                Err(AlignError::MemoryExceeded { retained, limit }) => {
                    self.stats.memory_exceeded = Some((retained, limit));
                    Err("memory budget exceeded".to_string())
                }
                Err(other) => Err(other.to_string()),
            },
            Err(message) => {
                self.stats.spans_skipped += 1;
                self.stats
                    .warnings
                    .push(format!("skipped malformed span: {}", message));
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Seeded walk of resourceSpans[].scopeSpans[].spans[]
// ---------------------------------------------------------------------------

struct RootSeed<'a, 'b>(&'a mut SpanSink<'b>);

impl<'de> DeserializeSeed<'de> for RootSeed<'_, '_> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_map(RootVisitor(self.0))
    }
}

struct RootVisitor<'a, 'b>(&'a mut SpanSink<'b>);

impl<'de> Visitor<'de> for RootVisitor<'_, '_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an OTLP export object with a resourceSpans array")
    }

    fn visit_map<A: MapAccess<'de>>(mut self, mut map: A) -> Result<(), A::Error> {
        let mut saw_resource_spans = false;
        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "resourceSpans" | "resource_spans" => {
                    saw_resource_spans = true;
                    map.next_value_seed(ResourceSpansSeed(&mut *self.0))?;
                }
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        if !saw_resource_spans {
            return Err(de::Error::custom("missing resourceSpans array"));
        }
        Ok(())
    }
}

struct ResourceSpansSeed<'a, 'b>(&'a mut SpanSink<'b>);

impl<'de> DeserializeSeed<'de> for ResourceSpansSeed<'_, '_> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_seq(SeqOfMaps {
            sink: self.0,
            list_keys: &["scopeSpans", "scope_spans", "instrumentationLibrarySpans"],
            inner: InnerList::ScopeSpans,
        })
    }
}

/// Which nested list the current map level dispatches into.
enum InnerList {
    ScopeSpans,
    Spans,
}

/// Visits a sequence of objects, descending into the named list keys and
/// ignoring everything else (resource, scope, schemaUrl, ...).
struct SeqOfMaps<'a, 'b> {
    sink: &'a mut SpanSink<'b>,
    list_keys: &'static [&'static str],
    inner: InnerList,
}

impl<'de> Visitor<'de> for SeqOfMaps<'_, '_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an array of objects")
    }

    fn visit_seq<A: SeqAccess<'de>>(mut self, mut seq: A) -> Result<(), A::Error> {
        loop {
            let entry = EntrySeed {
                sink: &mut *self.sink,
                list_keys: self.list_keys,
                inner: &self.inner,
            };
            if seq.next_element_seed(entry)?.is_none() {
                return Ok(());
            }
        }
    }
}

struct EntrySeed<'a, 'b> {
    sink: &'a mut SpanSink<'b>,
    list_keys: &'static [&'static str],
    inner: &'a InnerList,
}

impl<'de> DeserializeSeed<'de> for EntrySeed<'_, '_> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for EntrySeed<'_, '_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a resourceSpans or scopeSpans entry")
    }

    fn visit_map<A: MapAccess<'de>>(mut self, mut map: A) -> Result<(), A::Error> {
        while let Some(key) = map.next_key::<String>()? {
            if self.list_keys.contains(&key.as_str()) {
                match self.inner {
                    InnerList::ScopeSpans => {
                        map.next_value_seed(ScopeSpansSeed(&mut *self.sink))?;
                    }
                    InnerList::Spans => {
                        map.next_value_seed(SpanListSeed(&mut *self.sink))?;
                    }
                }
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(())
    }
}

struct ScopeSpansSeed<'a, 'b>(&'a mut SpanSink<'b>);

impl<'de> DeserializeSeed<'de> for ScopeSpansSeed<'_, '_> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_seq(SeqOfMaps {
            sink: self.0,
            list_keys: &["spans"],
            inner: InnerList::Spans,
        })
    }
}

struct SpanListSeed<'a, 'b>(&'a mut SpanSink<'b>);

impl<'de> DeserializeSeed<'de> for SpanListSeed<'_, '_> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for SpanListSeed<'_, '_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an array of spans")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<(), A::Error> {
        // One span materialized at a time; the store takes ownership of each
        // before the next is decoded.
        while let Some(raw) = seq.next_element::<Value>()? {
            self.0.accept(&raw).map_err(de::Error::custom)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Raw span conversion
// ---------------------------------------------------------------------------

/// Convert one raw OTLP JSON span object to the internal model.
fn span_from_json(raw: &Value) -> Result<Span, String> {
    let obj = raw.as_object().ok_or("span is not an object")?;

    let trace_id = str_field(obj, &["traceId", "trace_id"]).unwrap_or_default();
    let span_id = str_field(obj, &["spanId", "span_id"]).unwrap_or_default();
    let parent_span_id =
        str_field(obj, &["parentSpanId", "parent_span_id"]).filter(|s| !s.is_empty());
    let name = str_field(obj, &["name"]).unwrap_or_default();

    let start_time_ns = nano_field(obj, &["startTimeUnixNano", "start_time_unix_nano"])?;
    let end_time_ns = nano_field(obj, &["endTimeUnixNano", "end_time_unix_nano"])?;

    let attributes = attributes_from_json(obj.get("attributes"));
    let events = events_from_json(obj.get("events"))?;
    let status = status_from_json(obj.get("status"));

    let span = Span {
        span_id,
        trace_id,
        parent_span_id,
        name,
        start_time_ns,
        end_time_ns,
        status,
        attributes,
        events,
    };
    span.validate()?;
    Ok(span)
}

fn str_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| obj.get(*k))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

/// Nanosecond timestamps arrive string-encoded or integer-encoded.
fn nano_field(obj: &Map<String, Value>, keys: &[&str]) -> Result<u64, String> {
    let Some(value) = keys.iter().find_map(|k| obj.get(*k)) else {
        return Ok(0);
    };
    parse_nanos(value)
}

fn parse_nanos(value: &Value) -> Result<u64, String> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .ok_or_else(|| format!("negative timestamp {}", n)),
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| format!("invalid nanosecond timestamp '{}'", s)),
        other => Err(format!("timestamp is neither string nor integer: {}", other)),
    }
}

fn attributes_from_json(raw: Option<&Value>) -> BTreeMap<String, Value> {
    let mut attributes = BTreeMap::new();
    let Some(Value::Array(entries)) = raw else {
        return attributes;
    };
    for entry in entries {
        let Some(obj) = entry.as_object() else {
            continue;
        };
        let Some(key) = obj.get("key").and_then(|k| k.as_str()) else {
            continue;
        };
        if let Some(value) = obj.get("value").and_then(any_value_to_json) {
            attributes.insert(key.to_string(), value);
        }
    }
    attributes
}

/// Decode an OTLP `AnyValue` wrapper, preserving numeric type: `intValue`
/// (string- or integer-encoded) stays integer, `doubleValue` stays float.
fn any_value_to_json(raw: &Value) -> Option<Value> {
    let obj = raw.as_object()?;
    if let Some(v) = pick(obj, &["stringValue", "string_value"]) {
        return v.as_str().map(|s| Value::String(s.to_string()));
    }
    if let Some(v) = pick(obj, &["intValue", "int_value"]) {
        return match v {
            Value::Number(n) => n.as_i64().map(|i| Value::from(i)),
            Value::String(s) => s.trim().parse::<i64>().ok().map(Value::from),
            _ => None,
        };
    }
    if let Some(v) = pick(obj, &["boolValue", "bool_value"]) {
        return v.as_bool().map(Value::Bool);
    }
    if let Some(v) = pick(obj, &["doubleValue", "double_value"]) {
        return v.as_f64().and_then(|f| serde_json::Number::from_f64(f).map(Value::Number));
    }
    if let Some(v) = pick(obj, &["arrayValue", "array_value"]) {
        let values = v.get("values").and_then(|vs| vs.as_array())?;
        return Some(Value::Array(
            values.iter().filter_map(any_value_to_json).collect(),
        ));
    }
    if let Some(v) = pick(obj, &["kvlistValue", "kvlist_value"]) {
        let values = v.get("values").and_then(|vs| vs.as_array())?;
        let mut map = Map::new();
        for entry in values {
            let key = entry.get("key").and_then(|k| k.as_str())?;
            if let Some(value) = entry.get("value").and_then(any_value_to_json) {
                map.insert(key.to_string(), value);
            }
        }
        return Some(Value::Object(map));
    }
    None
}

fn pick<'v>(obj: &'v Map<String, Value>, keys: &[&str]) -> Option<&'v Value> {
    keys.iter().find_map(|k| obj.get(*k))
}

fn events_from_json(raw: Option<&Value>) -> Result<Vec<SpanEvent>, String> {
    let Some(Value::Array(entries)) = raw else {
        return Ok(Vec::new());
    };
    let mut events = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(obj) = entry.as_object() else {
            continue;
        };
        let name = str_field(obj, &["name"]).unwrap_or_default();
        let timestamp_ns = nano_field(obj, &["timeUnixNano", "time_unix_nano"])?;
        let attributes = attributes_from_json(obj.get("attributes"));
        events.push(SpanEvent {
            name,
            timestamp_ns,
            attributes,
        });
    }
    Ok(events)
}

/// Missing status is `UNSET`; the code may be numeric or a string token.
fn status_from_json(raw: Option<&Value>) -> SpanStatus {
    let Some(obj) = raw.and_then(|v| v.as_object()) else {
        return SpanStatus::default();
    };
    let code = match obj.get("code") {
        Some(Value::Number(n)) => n
            .as_i64()
            .map(StatusCode::from_otlp_number)
            .unwrap_or(StatusCode::Unset),
        Some(Value::String(s)) => match s.trim().parse::<i64>() {
            Ok(n) => StatusCode::from_otlp_number(n),
            Err(_) => StatusCode::from_token(s),
        },
        _ => StatusCode::Unset,
    };
    let message = str_field(obj, &["message"]).unwrap_or_default();
    SpanStatus { code, message }
}
