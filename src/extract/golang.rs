//! Go annotation extractor
//!
//! Go convention puts `@ServiceSpec` blocks in `//` comment groups above the
//! handler; `/* */` blocks are accepted too.

use super::comment::C_STYLE;
use super::{extract_with_syntax, ExtractOutcome, SpecExtractor};
use std::path::Path;

pub struct GoExtractor;

impl SpecExtractor for GoExtractor {
    fn name(&self) -> &'static str {
        "go"
    }

    fn can_handle(&self, path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()) == Some("go")
    }

    fn extract(&self, path: &Path, strict: bool) -> ExtractOutcome {
        extract_with_syntax(path, &C_STYLE, strict)
    }
}
