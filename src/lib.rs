//! tracealign - checks source-declared service contracts against
//! OpenTelemetry trace recordings
//!
//! The pipeline recovers `@ServiceSpec` annotations from a source tree,
//! ingests an OTLP-JSON trace export, matches each contract to the spans it
//! describes, evaluates the contract's JSONLogic assertions in a sandboxed
//! context, and emits a structured pass/fail report.
//!
//! # Example
//!
//! ```no_run
//! use tracealign::config::AlignConfig;
//! use tracealign::{pipeline, render, report};
//!
//! # fn main() -> Result<(), tracealign::error::AlignError> {
//! let config = AlignConfig::new("services/user-service", "traces/run42.json");
//! let output = pipeline::run(&config)?;
//! println!("{}", render::render_human(&output.report)?);
//! std::process::exit(report::exit_code(&output.report));
//! # }
//! ```

pub mod align_engine;
pub mod cli;
pub mod config;
pub mod error;
pub mod eval_context;
pub mod extract;
pub mod json_compare;
pub mod jsonlogic;
pub mod otlp_ingest;
pub mod pipeline;
pub mod render;
pub mod report;
pub mod spec_model;
pub mod trace_model;
pub mod trace_store;
