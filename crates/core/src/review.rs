//! Consistency Validator.
//!
//! Compares the variables a template declares against the tokens found in its document, and
//! flags blocks that are likely to break substitution. Nothing here is fatal: the
//! [`ReviewReport`] is handed to the caller, who decides whether to proceed.

use crate::constants::TOKEN_DELIMITER;
use crate::document::{BlockKind, Document};
use crate::scanner;
use crate::TemplateResult;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

const PREVIEW_CHARS: usize = 40;

/// Why a block was flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum BlockIssue {
    /// Odd number of `#` characters.
    UnterminatedToken { delimiters: usize },
    /// More segments than the configured ceiling.
    Fragmented { segments: usize, ceiling: usize },
}

/// A block flagged by the review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MalformedBlock {
    pub block: usize,
    pub location: BlockKind,
    pub issue: BlockIssue,
    /// Start of the block's logical text.
    pub preview: String,
}

/// Result of reviewing a document against a declared variable set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReviewReport {
    pub declared: BTreeSet<String>,
    pub discovered: BTreeSet<String>,
    /// Declared but never present as a token.
    pub missing_in_document: BTreeSet<String>,
    /// Present as a token but never declared.
    pub missing_in_variables: BTreeSet<String>,
    pub malformed_blocks: Vec<MalformedBlock>,
}

impl ReviewReport {
    /// True when declared and discovered variables match exactly.
    pub fn is_consistent(&self) -> bool {
        self.missing_in_document.is_empty() && self.missing_in_variables.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.is_consistent() || !self.malformed_blocks.is_empty()
    }

    /// Index of the first block with an odd `#` count.
    pub fn first_unterminated_block(&self) -> Option<usize> {
        self.malformed_blocks
            .iter()
            .find(|b| matches!(b.issue, BlockIssue::UnterminatedToken { .. }))
            .map(|b| b.block)
    }

    /// One human-readable line per warning.
    pub fn warnings(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for name in &self.missing_in_document {
            lines.push(format!("variable {} is declared but #{}# is not in the document", name, name));
        }
        for name in &self.missing_in_variables {
            lines.push(format!("token #{}# is in the document but {} is not declared", name, name));
        }
        for block in &self.malformed_blocks {
            let reason = match block.issue {
                BlockIssue::UnterminatedToken { delimiters } => {
                    format!("unterminated token ({} '#' characters)", delimiters)
                }
                BlockIssue::Fragmented { segments, ceiling } => {
                    format!("{} segments exceed the ceiling of {}", segments, ceiling)
                }
            };
            lines.push(format!("block {}: {}: {:?}", block.block, reason, block.preview));
        }
        lines
    }
}

impl fmt::Display for ReviewReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} declared variable(s) missing from the document, {} undeclared token(s), {} malformed block(s)",
            self.missing_in_document.len(),
            self.missing_in_variables.len(),
            self.malformed_blocks.len()
        )
    }
}

/// Reviews `document` against the `declared` variables.
///
/// # Arguments
///
/// * `document` - Document bound to the template
/// * `declared` - Variables the template declares
/// * `max_segments` - Segment count above which a block is reported as fragmented
pub fn review(
    document: &Document,
    declared: &[String],
    max_segments: usize,
) -> TemplateResult<ReviewReport> {
    let declared: BTreeSet<String> = declared.iter().cloned().collect();
    let discovered = scanner::scan(document)?;

    let mut malformed_blocks = Vec::new();
    for (index, block) in document.blocks().enumerate() {
        let text = block.logical_text();
        let preview: String = text.chars().take(PREVIEW_CHARS).collect();

        let delimiters = text.matches(TOKEN_DELIMITER).count();
        if delimiters % 2 == 1 {
            malformed_blocks.push(MalformedBlock {
                block: index,
                location: block.kind(),
                issue: BlockIssue::UnterminatedToken { delimiters },
                preview: preview.clone(),
            });
        }

        let segments = block.segments().len();
        if segments > max_segments {
            malformed_blocks.push(MalformedBlock {
                block: index,
                location: block.kind(),
                issue: BlockIssue::Fragmented {
                    segments,
                    ceiling: max_segments,
                },
                preview,
            });
        }
    }

    Ok(ReviewReport {
        missing_in_document: declared.difference(&discovered).cloned().collect(),
        missing_in_variables: discovered.difference(&declared).cloned().collect(),
        declared,
        discovered,
        malformed_blocks,
    })
}
