//! Language-neutral comment-block recovery
//!
//! Turns raw source text into logical comment blocks: one block per
//! `/* ... */` span and one per contiguous group of line comments. Leaders
//! (`//`, `*`, the comment delimiters themselves) are peeled so downstream
//! parsing sees only the comment's content. Every content line keeps its
//! 1-based source line number.
//!
//! The scanner is line-oriented and deliberately tolerant: it does not lex
//! string literals, so a comment marker inside a string can open a phantom
//! block. Phantom blocks carry no `@ServiceSpec` tag and are discarded by
//! the annotation parser, which keeps the scan fault-tolerant on real-world
//! source.

/// Comment delimiters for one language family.
#[derive(Debug, Clone)]
pub struct CommentSyntax {
    /// Line-comment leader, e.g. `//`
    pub line_prefix: &'static str,
    /// Block-comment opener, e.g. `/*` (also covers `/**`)
    pub block_start: &'static str,
    /// Block-comment closer, e.g. `*/`
    pub block_end: &'static str,
}

/// C-family comment syntax shared by Java, TypeScript and Go.
pub const C_STYLE: CommentSyntax = CommentSyntax {
    line_prefix: "//",
    block_start: "/*",
    block_end: "*/",
};

/// One logical comment with per-line source positions.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentBlock {
    /// 1-based line of the comment's first line
    pub start_line: usize,
    /// (1-based source line, peeled content) pairs
    pub lines: Vec<(usize, String)>,
}

impl CommentBlock {
    /// The peeled content joined with newlines.
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|(_, content)| content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Scan source text for comment blocks.
pub fn scan_comments(source: &str, syntax: &CommentSyntax) -> Vec<CommentBlock> {
    let mut blocks = Vec::new();
    let mut current: Option<CommentBlock> = None;
    let mut in_block_comment = false;

    for (index, raw_line) in source.lines().enumerate() {
        let line_no = index + 1;
        let trimmed = raw_line.trim_start();

        if in_block_comment {
            let block = current.as_mut().expect("open block while in_block_comment");
            if let Some(end) = trimmed.find(syntax.block_end) {
                let content = peel_block_line(&trimmed[..end]);
                if !content.is_empty() {
                    block.lines.push((line_no, content));
                }
                blocks.push(current.take().expect("open block"));
                in_block_comment = false;
            } else {
                block.lines.push((line_no, peel_block_line(trimmed)));
            }
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix(syntax.block_start) {
            // `/**` is `/*` followed by a leading `*` the peeler removes
            close_group(&mut current, &mut blocks);
            let mut block = CommentBlock {
                start_line: line_no,
                lines: Vec::new(),
            };
            if let Some(end) = rest.find(syntax.block_end) {
                // Single-line block comment
                let content = peel_block_line(&rest[..end]);
                if !content.is_empty() {
                    block.lines.push((line_no, content));
                }
                blocks.push(block);
            } else {
                let content = peel_block_line(rest);
                if !content.is_empty() {
                    block.lines.push((line_no, content));
                }
                current = Some(block);
                in_block_comment = true;
            }
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix(syntax.line_prefix) {
            let content = rest.strip_prefix(' ').unwrap_or(rest).to_string();
            match &mut current {
                Some(block) => block.lines.push((line_no, content)),
                None => {
                    current = Some(CommentBlock {
                        start_line: line_no,
                        lines: vec![(line_no, content)],
                    });
                }
            }
            continue;
        }

        close_group(&mut current, &mut blocks);
    }

    // EOF closes whatever is still open, including unterminated blocks
    close_group(&mut current, &mut blocks);
    blocks
}

fn close_group(current: &mut Option<CommentBlock>, blocks: &mut Vec<CommentBlock>) {
    if let Some(block) = current.take() {
        blocks.push(block);
    }
}

/// Strip the decorative `*` leader (and one following space) used inside
/// block comments, plus surrounding whitespace noise.
fn peel_block_line(line: &str) -> String {
    let line = line.trim_start();
    let line = line.strip_prefix('*').unwrap_or(line);
    let line = line.strip_prefix(' ').unwrap_or(line);
    line.trim_end().to_string()
}
