//! Contract model for source-embedded service specifications
//!
//! A `ServiceSpec` is one operation's declared contract, recovered from a
//! `@ServiceSpec` annotation block by the extractor. Pre- and postconditions
//! are named JSONLogic expression trees, preserved verbatim; the extractor
//! never evaluates them.
//!
//! # Example annotation
//!
//! ```text
//! /**
//!  * @ServiceSpec
//!  * operationId: "createUser"
//!  * description: "Create a user account"
//!  * preconditions:
//!  *   method_is_post: {"==": [{"var": "http_method"}, "POST"]}
//!  * postconditions:
//!  *   created: {"==": [{"var": "http_status_code"}, 201]}
//!  */
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One operation's contract, keyed by `operation_id` against trace spans.
///
/// Immutable after extraction. The `BTreeMap` assertion maps give the
/// deterministic sorted-by-name evaluation order the engine relies on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    /// Join key against spans (`operation.id` attribute or span name)
    pub operation_id: String,

    /// Free-text description of the operation
    pub description: String,

    /// Named JSONLogic assertions checked against the matched span's context
    #[serde(default)]
    pub preconditions: BTreeMap<String, Value>,

    /// Same shape as preconditions, labelled separately in the report
    #[serde(default)]
    pub postconditions: BTreeMap<String, Value>,

    /// Path of the file the annotation was found in
    pub source_file: String,

    /// 1-based line of the annotation's first line
    pub line_number: usize,
}

impl ServiceSpec {
    /// Check the structural invariants of a freshly parsed spec.
    ///
    /// Empty assertion maps are fine; empty identity fields are not.
    pub fn validate(&self) -> Result<(), String> {
        if self.operation_id.trim().is_empty() {
            return Err("operationId must be non-empty".to_string());
        }
        if self.description.trim().is_empty() {
            return Err("description must be non-empty".to_string());
        }
        if self.source_file.is_empty() {
            return Err("sourceFile must be non-empty".to_string());
        }
        if self.line_number < 1 {
            return Err("lineNumber must be >= 1".to_string());
        }
        Ok(())
    }

    /// Total number of assertions across both condition maps.
    pub fn assertion_count(&self) -> usize {
        self.preconditions.len() + self.postconditions.len()
    }
}
