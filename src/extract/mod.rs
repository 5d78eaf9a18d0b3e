//! Annotation extraction orchestrator
//!
//! Walks a source tree, hands each recognized file to the matching language
//! extractor on a CPU-bounded worker pool, and merges per-file outcomes into
//! one aggregate. A single malformed file or annotation never fails the
//! scan; it lands in `errors` and the walk continues.
//!
//! Language extractors are capabilities: anything implementing
//! `SpecExtractor` can be registered without touching the orchestrator.

pub mod annotation;
pub mod comment;
pub mod golang;
pub mod java;
pub mod typescript;

use crate::error::AlignError;
use crate::spec_model::ServiceSpec;
use annotation::{parse_annotation, AnnotationOutcome};
use comment::{scan_comments, CommentSyntax};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Directory names skipped during the walk (vendored and build output).
pub const SKIP_DIRS: &[&str] = &["node_modules", "vendor", ".git", "build", "dist", "target"];

/// One accumulated per-file problem, with a 1-based line where known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractError {
    pub file: String,
    pub line: usize,
    pub message: String,
}

/// Aggregate result of scanning one file or a whole tree.
#[derive(Debug, Default)]
pub struct ExtractOutcome {
    pub specs: Vec<ServiceSpec>,
    pub errors: Vec<ExtractError>,
    pub warnings: Vec<ExtractError>,
}

impl ExtractOutcome {
    fn merge(&mut self, other: ExtractOutcome) {
        self.specs.extend(other.specs);
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

/// A language extractor capability.
pub trait SpecExtractor: Send + Sync {
    fn name(&self) -> &'static str;
    /// Whether this extractor recognizes the file (by extension).
    fn can_handle(&self, path: &Path) -> bool;
    /// Scan one file. I/O problems become a single error record.
    fn extract(&self, path: &Path, strict: bool) -> ExtractOutcome;
}

/// Shared per-file scan used by every C-family language extractor: read,
/// recover comment blocks, parse each block that carries the tag.
pub(crate) fn extract_with_syntax(
    path: &Path,
    syntax: &CommentSyntax,
    strict: bool,
) -> ExtractOutcome {
    let mut outcome = ExtractOutcome::default();
    let file = path.display().to_string();
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            outcome.errors.push(ExtractError {
                file,
                line: 0,
                message: format!("cannot read file: {}", err),
            });
            return outcome;
        }
    };
    for block in scan_comments(&source, syntax) {
        match parse_annotation(&block, &file, strict) {
            AnnotationOutcome::NotAnAnnotation => {}
            AnnotationOutcome::Parsed { spec, warnings } => {
                outcome.specs.push(spec);
                outcome.warnings.extend(warnings);
            }
            AnnotationOutcome::Failed(error) => outcome.errors.push(error),
        }
    }
    outcome
}

/// Walks the tree and dispatches files to registered extractors.
pub struct AnnotationExtractor {
    extractors: Vec<Box<dyn SpecExtractor>>,
    strict: bool,
    max_workers: usize,
}

impl AnnotationExtractor {
    /// Extractor with the built-in language set registered.
    pub fn new() -> Self {
        AnnotationExtractor {
            extractors: vec![
                Box::new(java::JavaExtractor),
                Box::new(typescript::TypeScriptExtractor),
                Box::new(golang::GoExtractor),
            ],
            strict: false,
            max_workers: num_cpus::get().max(1),
        }
    }

    /// Strict mode: unknown annotation keys become errors.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// Register an additional language capability.
    pub fn register(&mut self, extractor: Box<dyn SpecExtractor>) {
        self.extractors.push(extractor);
    }

    /// Scan a directory tree for annotations.
    ///
    /// Unrecognized files are ignored silently; vendor and build
    /// directories are pruned by name. Output is sorted by file then line
    /// and deduplicated, so repeated runs over the same tree are identical.
    pub fn scan_directory(&self, root: &Path) -> Result<ExtractOutcome, AlignError> {
        let metadata = std::fs::metadata(root).map_err(|e| AlignError::io(root, e))?;
        if !metadata.is_dir() {
            return Err(AlignError::io(
                root,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
            ));
        }

        let files = self.collect_files(root);
        debug!(count = files.len(), "source files recognized for scanning");
        let mut outcome = self.scan_files(&files);

        outcome
            .specs
            .sort_by(|a, b| (&a.source_file, a.line_number).cmp(&(&b.source_file, b.line_number)));
        outcome
            .errors
            .sort_by(|a, b| (&a.file, a.line).cmp(&(&b.file, b.line)));
        outcome
            .warnings
            .sort_by(|a, b| (&a.file, a.line).cmp(&(&b.file, b.line)));

        // Identical (operationId, file, line) triples collapse to one spec
        let mut seen: HashSet<(String, String, usize)> = HashSet::new();
        outcome.specs.retain(|spec| {
            seen.insert((
                spec.operation_id.clone(),
                spec.source_file.clone(),
                spec.line_number,
            ))
        });

        for error in &outcome.errors {
            warn!(file = %error.file, line = error.line, "{}", error.message);
        }
        for warning in &outcome.warnings {
            warn!(file = %warning.file, line = warning.line, "{}", warning.message);
        }
        Ok(outcome)
    }

    /// Recognized files under the root, with the index of the extractor
    /// responsible for each.
    fn collect_files(&self, root: &Path) -> Vec<(PathBuf, usize)> {
        let mut files = Vec::new();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                let is_dir = entry.file_type().is_dir();
                let name = entry.file_name().to_string_lossy();
                !(is_dir && SKIP_DIRS.contains(&name.as_ref()))
            });
        for entry in walker.flatten() {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.into_path();
            if let Some(index) = self.extractors.iter().position(|e| e.can_handle(&path)) {
                files.push((path, index));
            }
        }
        files.sort();
        files
    }

    /// Fan the file list out over the worker pool and merge results.
    fn scan_files(&self, files: &[(PathBuf, usize)]) -> ExtractOutcome {
        if files.is_empty() {
            return ExtractOutcome::default();
        }
        let worker_count = self.max_workers.min(files.len());
        let (job_tx, job_rx) = crossbeam::channel::unbounded::<&(PathBuf, usize)>();
        let (out_tx, out_rx) = crossbeam::channel::unbounded::<ExtractOutcome>();
        for file in files {
            job_tx.send(file).expect("job receiver alive");
        }
        drop(job_tx);

        std::thread::scope(|scope| {
            for _ in 0..worker_count {
                let job_rx = job_rx.clone();
                let out_tx = out_tx.clone();
                scope.spawn(move || {
                    for (path, index) in job_rx.iter() {
                        let started = Instant::now();
                        let outcome = self.extractors[*index].extract(path, self.strict);
                        debug!(
                            file = %path.display(),
                            elapsed_us = started.elapsed().as_micros() as u64,
                            specs = outcome.specs.len(),
                            "file scanned"
                        );
                        if out_tx.send(outcome).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(out_tx);

        let mut merged = ExtractOutcome::default();
        for outcome in out_rx.iter() {
            merged.merge(outcome);
        }
        merged
    }
}

impl Default for AnnotationExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    const JAVA_ANNOTATED: &str = r#"/**
 * @ServiceSpec
 * operationId: "createUser"
 * description: "Create a user"
 */
public class UserService {}
"#;

    const GO_ANNOTATED: &str = r#"package h

// @ServiceSpec
// operationId: "getUser"
// description: "Fetch a user"
func GetUser() {}
"#;

    #[test]
    fn test_scan_directory_finds_specs_across_languages() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/UserService.java", JAVA_ANNOTATED);
        write(dir.path(), "internal/handlers.go", GO_ANNOTATED);
        write(dir.path(), "web/routes.ts", "// @ServiceSpec\n// operationId: \"listUsers\"\n// description: \"List\"\n");
        write(dir.path(), "README.md", "# not scanned\n");

        let outcome = AnnotationExtractor::new()
            .scan_directory(dir.path())
            .unwrap();
        assert!(outcome.errors.is_empty());
        let ids: Vec<&str> = outcome
            .specs
            .iter()
            .map(|s| s.operation_id.as_str())
            .collect();
        assert_eq!(ids.len(), 3);
        assert!(ids.contains(&"createUser"));
        assert!(ids.contains(&"getUser"));
        assert!(ids.contains(&"listUsers"));
    }

    #[test]
    fn test_vendor_directories_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "node_modules/dep/index.ts", "// @ServiceSpec\n// operationId: \"dep\"\n// description: \"d\"\n");
        write(dir.path(), "vendor/lib/lib.go", GO_ANNOTATED);
        write(dir.path(), ".git/hooks/x.java", JAVA_ANNOTATED);
        write(dir.path(), "build/out.ts", "// @ServiceSpec\n// operationId: \"b\"\n// description: \"d\"\n");
        write(dir.path(), "dist/out.ts", "// @ServiceSpec\n// operationId: \"c\"\n// description: \"d\"\n");
        write(dir.path(), "src/real.go", GO_ANNOTATED);

        let outcome = AnnotationExtractor::new()
            .scan_directory(dir.path())
            .unwrap();
        assert_eq!(outcome.specs.len(), 1);
        assert_eq!(outcome.specs[0].operation_id, "getUser");
    }

    #[test]
    fn test_empty_tree_is_empty_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = AnnotationExtractor::new()
            .scan_directory(dir.path())
            .unwrap();
        assert!(outcome.specs.is_empty());
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn test_missing_root_is_io_error() {
        let err = AnnotationExtractor::new()
            .scan_directory(Path::new("/definitely/not/here"))
            .unwrap_err();
        assert!(matches!(err, AlignError::Io { .. }));
    }

    #[test]
    fn test_root_must_be_directory() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = AnnotationExtractor::new()
            .scan_directory(file.path())
            .unwrap_err();
        assert!(matches!(err, AlignError::Io { .. }));
    }

    #[test]
    fn test_malformed_annotation_does_not_fail_scan() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "bad.go", "// @ServiceSpec\n// operationId: [broken\n");
        write(dir.path(), "good.go", GO_ANNOTATED);

        let outcome = AnnotationExtractor::new()
            .scan_directory(dir.path())
            .unwrap();
        assert_eq!(outcome.specs.len(), 1);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].file.ends_with("bad.go"));
    }

    #[test]
    fn test_output_sorted_by_file_then_line() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "a.go",
            "package a\n\n// @ServiceSpec\n// operationId: \"op1\"\n// description: \"d\"\nfunc A() {}\n\n// @ServiceSpec\n// operationId: \"op2\"\n// description: \"d\"\nfunc B() {}\n",
        );
        write(dir.path(), "b.go", GO_ANNOTATED);

        let outcome = AnnotationExtractor::new()
            .scan_directory(dir.path())
            .unwrap();
        assert_eq!(outcome.specs.len(), 3);
        assert!(outcome.specs[0].source_file < outcome.specs[2].source_file
            || outcome.specs[0].line_number < outcome.specs[1].line_number);
        assert_eq!(outcome.specs[0].operation_id, "op1");
        assert_eq!(outcome.specs[1].operation_id, "op2");
        assert_eq!(outcome.specs[2].operation_id, "getUser");
    }

    #[test]
    fn test_strict_mode_turns_unknown_keys_into_errors() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "f.go",
            "// @ServiceSpec\n// operationId: \"x\"\n// description: \"d\"\n// owner: platform\n",
        );

        let relaxed = AnnotationExtractor::new()
            .scan_directory(dir.path())
            .unwrap();
        assert_eq!(relaxed.specs.len(), 1);
        assert_eq!(relaxed.warnings.len(), 1);
        assert!(relaxed.errors.is_empty());

        let strict = AnnotationExtractor::new()
            .with_strict(true)
            .scan_directory(dir.path())
            .unwrap();
        assert!(strict.specs.is_empty());
        assert_eq!(strict.errors.len(), 1);
    }

    #[test]
    fn test_same_operation_id_in_two_files_is_kept_twice() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.go", GO_ANNOTATED);
        write(dir.path(), "b.go", GO_ANNOTATED);

        let outcome = AnnotationExtractor::new()
            .scan_directory(dir.path())
            .unwrap();
        // Dedup keys on (operationId, file, line); distinct files both count
        assert_eq!(outcome.specs.len(), 2);
        assert!(outcome.specs.iter().all(|s| s.operation_id == "getUser"));
    }

    #[test]
    fn test_extension_dispatch_ignores_unknown_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "notes.txt", "// @ServiceSpec\n// operationId: \"x\"\n");
        write(dir.path(), "script.py", "# @ServiceSpec\n# operationId: \"x\"\n");
        write(dir.path(), "Makefile", "# @ServiceSpec\n");

        let outcome = AnnotationExtractor::new()
            .scan_directory(dir.path())
            .unwrap();
        assert!(outcome.specs.is_empty());
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn test_custom_capability_registration() {
        struct KotlinExtractor;
        impl SpecExtractor for KotlinExtractor {
            fn name(&self) -> &'static str {
                "kotlin"
            }
            fn can_handle(&self, path: &Path) -> bool {
                path.extension().and_then(|e| e.to_str()) == Some("kt")
            }
            fn extract(&self, path: &Path, strict: bool) -> ExtractOutcome {
                extract_with_syntax(path, &comment::C_STYLE, strict)
            }
        }

        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "Service.kt",
            "// @ServiceSpec\n// operationId: \"kotlinOp\"\n// description: \"d\"\n",
        );

        let mut extractor = AnnotationExtractor::new();
        extractor.register(Box::new(KotlinExtractor));
        let outcome = extractor.scan_directory(dir.path()).unwrap();
        assert_eq!(outcome.specs.len(), 1);
        assert_eq!(outcome.specs[0].operation_id, "kotlinOp");
    }

    #[test]
    fn test_single_worker_matches_parallel_output() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..12 {
            write(
                dir.path(),
                &format!("f{}.go", i),
                &format!(
                    "// @ServiceSpec\n// operationId: \"op{}\"\n// description: \"d\"\n",
                    i
                ),
            );
        }
        let parallel = AnnotationExtractor::new()
            .scan_directory(dir.path())
            .unwrap();
        let serial = AnnotationExtractor::new()
            .with_max_workers(1)
            .scan_directory(dir.path())
            .unwrap();
        let a: Vec<_> = parallel.specs.iter().map(|s| &s.operation_id).collect();
        let b: Vec<_> = serial.specs.iter().map(|s| &s.operation_id).collect();
        assert_eq!(a, b);
    }
}
