//! `@ServiceSpec` annotation parsing
//!
//! A comment block is an annotation when its logical content begins with the
//! `@ServiceSpec` tag. The lines after the tag form a YAML document with the
//! recognized top-level keys `operationId`, `description`, `preconditions`
//! and `postconditions`; condition values are JSONLogic expression trees
//! written as inline JSON, which YAML parses natively. Expressions are
//! preserved verbatim, never evaluated here.
//!
//! Unknown top-level keys are warnings, or errors in strict mode. A parse
//! failure produces one error record and the scan moves on.

use super::comment::CommentBlock;
use super::ExtractError;
use crate::spec_model::ServiceSpec;
use serde_json::Value;
use std::collections::BTreeMap;

/// The literal tag opening an annotation.
pub const TAG: &str = "@ServiceSpec";

/// Recognized top-level annotation keys.
pub const KNOWN_KEYS: &[&str] = &[
    "operationId",
    "description",
    "preconditions",
    "postconditions",
];

/// What one comment block turned out to be.
#[derive(Debug)]
pub enum AnnotationOutcome {
    /// Block carries no annotation tag
    NotAnAnnotation,
    /// Parsed successfully, possibly with unknown-key warnings
    Parsed {
        spec: ServiceSpec,
        warnings: Vec<ExtractError>,
    },
    /// The block is an annotation but could not be parsed
    Failed(ExtractError),
}

/// Parse one comment block.
pub fn parse_annotation(block: &CommentBlock, file: &str, strict: bool) -> AnnotationOutcome {
    // The tag must be the first non-empty content line
    let mut lines = block.lines.iter();
    let Some((tag_line, first_content)) = lines.find(|(_, content)| !content.trim().is_empty())
    else {
        return AnnotationOutcome::NotAnAnnotation;
    };
    let first_content = first_content.trim();
    if !first_content.starts_with(TAG) {
        return AnnotationOutcome::NotAnAnnotation;
    }
    let line_number = *tag_line;

    // YAML payload: anything after the tag on its own line, plus the rest
    let mut payload_lines: Vec<&str> = Vec::new();
    let after_tag = first_content[TAG.len()..].trim();
    if !after_tag.is_empty() {
        payload_lines.push(after_tag);
    }
    for (_, content) in lines {
        payload_lines.push(content);
    }
    let payload = payload_lines.join("\n");

    let parsed: serde_yaml::Value = match serde_yaml::from_str(&payload) {
        Ok(value) => value,
        Err(err) => {
            return AnnotationOutcome::Failed(ExtractError {
                file: file.to_string(),
                line: line_number,
                message: format!("malformed annotation YAML: {}", err),
            });
        }
    };

    let serde_yaml::Value::Mapping(mapping) = parsed else {
        return AnnotationOutcome::Failed(ExtractError {
            file: file.to_string(),
            line: line_number,
            message: "annotation payload must be a YAML mapping".to_string(),
        });
    };

    let mut operation_id = String::new();
    let mut description = String::new();
    let mut preconditions = BTreeMap::new();
    let mut postconditions = BTreeMap::new();
    let mut warnings = Vec::new();

    for (key, value) in &mapping {
        let Some(key) = key.as_str() else {
            return AnnotationOutcome::Failed(ExtractError {
                file: file.to_string(),
                line: line_number,
                message: "annotation keys must be strings".to_string(),
            });
        };
        match key {
            "operationId" => {
                operation_id = value.as_str().unwrap_or_default().to_string();
            }
            "description" => {
                description = value.as_str().unwrap_or_default().to_string();
            }
            "preconditions" | "postconditions" => {
                let target = if key == "preconditions" {
                    &mut preconditions
                } else {
                    &mut postconditions
                };
                match condition_map(value) {
                    Ok(map) => *target = map,
                    Err(message) => {
                        return AnnotationOutcome::Failed(ExtractError {
                            file: file.to_string(),
                            line: line_number,
                            message: format!("invalid {}: {}", key, message),
                        });
                    }
                }
            }
            unknown => {
                let record = ExtractError {
                    file: file.to_string(),
                    line: line_number,
                    message: format!("unknown annotation key '{}'", unknown),
                };
                if strict {
                    return AnnotationOutcome::Failed(record);
                }
                warnings.push(record);
            }
        }
    }

    let spec = ServiceSpec {
        operation_id,
        description,
        preconditions,
        postconditions,
        source_file: file.to_string(),
        line_number,
    };
    if let Err(message) = spec.validate() {
        return AnnotationOutcome::Failed(ExtractError {
            file: file.to_string(),
            line: line_number,
            message,
        });
    }
    AnnotationOutcome::Parsed { spec, warnings }
}

/// A `preconditions`/`postconditions` value: mapping of assertion name to
/// expression tree.
fn condition_map(value: &serde_yaml::Value) -> Result<BTreeMap<String, Value>, String> {
    match value {
        serde_yaml::Value::Null => Ok(BTreeMap::new()),
        serde_yaml::Value::Mapping(entries) => {
            let mut map = BTreeMap::new();
            for (name, expr) in entries {
                let Some(name) = name.as_str() else {
                    return Err("assertion names must be strings".to_string());
                };
                map.insert(name.to_string(), yaml_to_json(expr)?);
            }
            Ok(map)
        }
        _ => Err("expected a mapping of assertion name to expression".to_string()),
    }
}

/// Convert a YAML tree to the JSON model used everywhere downstream.
fn yaml_to_json(value: &serde_yaml::Value) -> Result<Value, String> {
    match value {
        serde_yaml::Value::Null => Ok(Value::Null),
        serde_yaml::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::from(i))
            } else if let Some(u) = n.as_u64() {
                Ok(Value::from(u))
            } else if let Some(f) = n.as_f64() {
                serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| format!("non-finite number {}", f))
            } else {
                Err("unrepresentable number".to_string())
            }
        }
        serde_yaml::Value::String(s) => Ok(Value::String(s.clone())),
        serde_yaml::Value::Sequence(items) => items
            .iter()
            .map(yaml_to_json)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        serde_yaml::Value::Mapping(entries) => {
            let mut map = serde_json::Map::new();
            for (key, val) in entries {
                let Some(key) = key.as_str() else {
                    return Err("object keys must be strings".to_string());
                };
                map.insert(key.to_string(), yaml_to_json(val)?);
            }
            Ok(Value::Object(map))
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(&tagged.value),
    }
}
