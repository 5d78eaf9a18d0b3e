//! Java annotation extractor
//!
//! Recognizes `@ServiceSpec` blocks in Javadoc (`/** ... */`), plain block
//! comments and `//` groups of `.java` files.

use super::comment::C_STYLE;
use super::{extract_with_syntax, ExtractOutcome, SpecExtractor};
use std::path::Path;

pub struct JavaExtractor;

impl SpecExtractor for JavaExtractor {
    fn name(&self) -> &'static str {
        "java"
    }

    fn can_handle(&self, path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()) == Some("java")
    }

    fn extract(&self, path: &Path, strict: bool) -> ExtractOutcome {
        extract_with_syntax(path, &C_STYLE, strict)
    }
}
