//! TypeScript annotation extractor
//!
//! Handles `.ts` and `.tsx` files; JSDoc blocks and `//` groups share the
//! C-family comment syntax.

use super::comment::C_STYLE;
use super::{extract_with_syntax, ExtractOutcome, SpecExtractor};
use std::path::Path;

pub struct TypeScriptExtractor;

impl SpecExtractor for TypeScriptExtractor {
    fn name(&self) -> &'static str {
        "typescript"
    }

    fn can_handle(&self, path: &Path) -> bool {
        matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("ts") | Some("tsx")
        )
    }

    fn extract(&self, path: &Path, strict: bool) -> ExtractOutcome {
        extract_with_syntax(path, &C_STYLE, strict)
    }
}
