//! Pipeline configuration
//!
//! `AlignConfig` carries every knob the core recognizes, validated before
//! the pipeline starts. Defaults may come from an optional `tracealign.toml`
//! next to the scanned source tree; explicit driver/CLI values override the
//! file.
//!
//! # Example tracealign.toml
//!
//! ```toml
//! max_workers = 2
//! contract_timeout_ms = 10000
//! strict = true
//! log_level = "warn"
//! ```

use crate::align_engine::{default_worker_count, EngineConfig};
use crate::error::AlignError;
use crate::jsonlogic::SandboxLimits;
use crate::trace_store::DEFAULT_MAX_MEMORY_BYTES;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Name of the optional defaults file looked up in the source root.
pub const DEFAULTS_FILE: &str = "tracealign.toml";

/// Log verbosity recognized by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string for the tracing `EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!(
                "unknown log level '{}': expected debug|info|warn|error",
                other
            )),
        }
    }
}

/// Everything the core needs to run one alignment job.
#[derive(Debug, Clone)]
pub struct AlignConfig {
    /// Directory scanned for annotations
    pub source_path: PathBuf,
    /// OTLP-JSON trace file
    pub trace_path: PathBuf,
    /// Alignment worker pool size
    pub max_workers: usize,
    /// Per-contract evaluation deadline
    pub contract_timeout_ms: u64,
    /// Per-assertion sandbox deadline
    pub assertion_timeout_ms: u64,
    /// Trace ingestion memory budget
    pub max_memory_bytes: u64,
    /// Optional whole-job deadline; in-flight contracts observe the
    /// cancellation at the next assertion boundary
    pub job_timeout_ms: Option<u64>,
    /// Unknown annotation keys become errors
    pub strict_mode: bool,
    pub log_level: LogLevel,
}

impl AlignConfig {
    /// Config with spec defaults for everything but the two paths.
    pub fn new(source_path: impl Into<PathBuf>, trace_path: impl Into<PathBuf>) -> Self {
        AlignConfig {
            source_path: source_path.into(),
            trace_path: trace_path.into(),
            max_workers: default_worker_count(),
            contract_timeout_ms: 30_000,
            assertion_timeout_ms: 100,
            max_memory_bytes: DEFAULT_MAX_MEMORY_BYTES,
            job_timeout_ms: None,
            strict_mode: false,
            log_level: LogLevel::default(),
        }
    }

    /// Constraint check run before the pipeline starts.
    pub fn validate(&self) -> Result<(), AlignError> {
        if self.source_path.as_os_str().is_empty() {
            return Err(AlignError::InputInvalid(
                "sourcePath must be non-empty".to_string(),
            ));
        }
        if self.trace_path.as_os_str().is_empty() {
            return Err(AlignError::InputInvalid(
                "tracePath must be non-empty".to_string(),
            ));
        }
        if self.max_workers == 0 {
            return Err(AlignError::InputInvalid(
                "maxWorkers must be positive".to_string(),
            ));
        }
        if self.contract_timeout_ms == 0 {
            return Err(AlignError::InputInvalid(
                "perContractTimeoutMs must be positive".to_string(),
            ));
        }
        if self.assertion_timeout_ms == 0 {
            return Err(AlignError::InputInvalid(
                "perAssertionTimeoutMs must be positive".to_string(),
            ));
        }
        if self.max_memory_bytes == 0 {
            return Err(AlignError::InputInvalid(
                "maxMemoryBytes must be positive".to_string(),
            ));
        }
        if self.job_timeout_ms == Some(0) {
            return Err(AlignError::InputInvalid(
                "jobTimeoutMs must be positive when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Engine tuning derived from this config.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_workers: self.max_workers,
            contract_timeout: Duration::from_millis(self.contract_timeout_ms),
            sandbox_limits: SandboxLimits {
                timeout: Duration::from_millis(self.assertion_timeout_ms),
                ..SandboxLimits::default()
            },
        }
    }

    /// Fill in values from a defaults file; explicit fields already set by
    /// the caller are expected to be applied *after* this.
    pub fn apply_defaults(&mut self, defaults: &FileDefaults) -> Result<(), AlignError> {
        if let Some(max_workers) = defaults.max_workers {
            self.max_workers = max_workers;
        }
        if let Some(ms) = defaults.contract_timeout_ms {
            self.contract_timeout_ms = ms;
        }
        if let Some(ms) = defaults.assertion_timeout_ms {
            self.assertion_timeout_ms = ms;
        }
        if let Some(bytes) = defaults.max_memory_bytes {
            self.max_memory_bytes = bytes;
        }
        if let Some(ms) = defaults.job_timeout_ms {
            self.job_timeout_ms = Some(ms);
        }
        if let Some(strict) = defaults.strict {
            self.strict_mode = strict;
        }
        if let Some(level) = &defaults.log_level {
            self.log_level = level.parse().map_err(AlignError::InputInvalid)?;
        }
        Ok(())
    }
}

/// Optional defaults loaded from `tracealign.toml` in the source root.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FileDefaults {
    pub max_workers: Option<usize>,
    pub contract_timeout_ms: Option<u64>,
    pub assertion_timeout_ms: Option<u64>,
    pub max_memory_bytes: Option<u64>,
    pub job_timeout_ms: Option<u64>,
    pub strict: Option<bool>,
    pub log_level: Option<String>,
}

impl FileDefaults {
    /// Load the defaults file from a source root if present.
    pub fn load(source_root: &Path) -> Result<Option<Self>, AlignError> {
        let path = source_root.join(DEFAULTS_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path).map_err(|e| AlignError::io(&path, e))?;
        Self::from_toml_str(&content).map(Some)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, AlignError> {
        toml::from_str(content)
            .map_err(|e| AlignError::InputInvalid(format!("invalid {}: {}", DEFAULTS_FILE, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AlignConfig::new("src", "trace.json");
        assert!(config.max_workers >= 1 && config.max_workers <= 4);
        assert_eq!(config.contract_timeout_ms, 30_000);
        assert_eq!(config.assertion_timeout_ms, 100);
        assert_eq!(config.max_memory_bytes, 524_288_000);
        assert!(!config.strict_mode);
        assert_eq!(config.log_level, LogLevel::Info);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        let mut config = AlignConfig::new("src", "trace.json");
        config.max_workers = 0;
        assert!(matches!(
            config.validate(),
            Err(AlignError::InputInvalid(_))
        ));

        let mut config = AlignConfig::new("src", "trace.json");
        config.contract_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AlignConfig::new("src", "trace.json");
        config.assertion_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AlignConfig::new("src", "trace.json");
        config.max_memory_bytes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_job_timeout() {
        let mut config = AlignConfig::new("src", "trace.json");
        config.job_timeout_ms = Some(0);
        assert!(config.validate().is_err());
        config.job_timeout_ms = Some(60_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_empty_paths() {
        let config = AlignConfig::new("", "trace.json");
        assert!(config.validate().is_err());
        let config = AlignConfig::new("src", "");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_engine_config_derivation() {
        let mut config = AlignConfig::new("src", "trace.json");
        config.max_workers = 2;
        config.contract_timeout_ms = 5_000;
        config.assertion_timeout_ms = 50;
        let engine = config.engine_config();
        assert_eq!(engine.max_workers, 2);
        assert_eq!(engine.contract_timeout, Duration::from_millis(5_000));
        assert_eq!(engine.sandbox_limits.timeout, Duration::from_millis(50));
        // Untouched sandbox caps keep their defaults
        assert_eq!(engine.sandbox_limits.max_depth, 64);
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!("debug".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("INFO".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("error".parse::<LogLevel>().unwrap(), LogLevel::Error);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_file_defaults_applied() {
        let toml = r#"
            max_workers = 2
            contract_timeout_ms = 10000
            strict = true
            log_level = "warn"
        "#;
        let defaults = FileDefaults::from_toml_str(toml).unwrap();
        let mut config = AlignConfig::new("src", "trace.json");
        config.apply_defaults(&defaults).unwrap();
        assert_eq!(config.max_workers, 2);
        assert_eq!(config.contract_timeout_ms, 10_000);
        assert!(config.strict_mode);
        assert_eq!(config.log_level, LogLevel::Warn);
        // Fields the file does not set keep their defaults
        assert_eq!(config.assertion_timeout_ms, 100);
    }

    #[test]
    fn test_file_defaults_bad_log_level() {
        let defaults = FileDefaults {
            log_level: Some("shout".to_string()),
            ..FileDefaults::default()
        };
        let mut config = AlignConfig::new("src", "trace.json");
        assert!(matches!(
            config.apply_defaults(&defaults),
            Err(AlignError::InputInvalid(_))
        ));
    }

    #[test]
    fn test_file_defaults_invalid_toml() {
        assert!(matches!(
            FileDefaults::from_toml_str("max_workers = [broken"),
            Err(AlignError::InputInvalid(_))
        ));
    }

    #[test]
    fn test_load_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(FileDefaults::load(dir.path()).unwrap(), None);
    }

    #[test]
    fn test_load_present_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DEFAULTS_FILE), "max_workers = 3\n").unwrap();
        let defaults = FileDefaults::load(dir.path()).unwrap().unwrap();
        assert_eq!(defaults.max_workers, Some(3));
    }
}
