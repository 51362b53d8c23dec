//! Token Rewriter.
//!
//! Replaces literal text inside blocks while keeping as much run formatting as possible.
//!
//! Each block is handled on its own, in one of two tiers:
//!
//! 1. **In place.** When every occurrence lies within a single segment, the text of those
//!    segments is edited and all other segments, with their styles, are left untouched.
//! 2. **Collapsed.** When any occurrence crosses a segment boundary, the block is reduced to its
//!    first segment, which keeps its style and takes over the other runs' children in order.
//!    Text formatting differences inside the block are lost; breaks, symbols and drawings stay.
//!
//! Matching is literal and left-to-right. Replacement text is never matched again, so a value
//! that contains a token is inserted as-is.

use crate::document::{Block, Document};
use serde::Serialize;
use std::ops::Range;

/// How a block was rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteTier {
    InPlace,
    Collapsed,
}

/// Outcome of rewriting one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRewrite {
    pub tier: RewriteTier,
    pub occurrences: usize,
}

/// Outcome of rewriting a whole document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RewriteSummary {
    pub occurrences: usize,
    pub in_place_blocks: usize,
    pub collapsed_blocks: usize,
}

impl RewriteSummary {
    pub fn is_empty(&self) -> bool {
        self.occurrences == 0
    }

    fn record(&mut self, rewrite: BlockRewrite) {
        self.occurrences += rewrite.occurrences;
        match rewrite.tier {
            RewriteTier::InPlace => self.in_place_blocks += 1,
            RewriteTier::Collapsed => self.collapsed_blocks += 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Occurrence {
    start: usize,
    len: usize,
    pair: usize,
}

/// Replaces every occurrence of `old` with `new` in every block of `document`.
///
/// An empty `old` matches nothing.
pub fn replace_all(document: &mut Document, old: &str, new: &str) -> RewriteSummary {
    substitute(document, &[(old, new)])
}

/// Replaces several literals in a single left-to-right pass over each block.
///
/// Where two search strings match at the same position the earlier pair wins.
pub fn substitute(document: &mut Document, pairs: &[(&str, &str)]) -> RewriteSummary {
    let mut summary = RewriteSummary::default();
    for (index, block) in document.blocks_mut().iter_mut().enumerate() {
        if let Some(rewrite) = rewrite_block(block, pairs) {
            tracing::debug!(
                "block {}: {} occurrence(s) rewritten ({:?})",
                index,
                rewrite.occurrences,
                rewrite.tier
            );
            summary.record(rewrite);
        }
    }
    summary
}

pub(crate) fn rewrite_block(block: &mut Block, pairs: &[(&str, &str)]) -> Option<BlockRewrite> {
    let found = find_occurrences(&block.logical_text(), pairs);
    if found.is_empty() || block.segments.is_empty() {
        return None;
    }

    let mut bounds = Vec::with_capacity(block.segments.len());
    let mut offset = 0;
    for segment in &block.segments {
        bounds.push(offset..offset + segment.text.len());
        offset += segment.text.len();
    }

    let mut per_segment: Vec<Vec<(Range<usize>, &str)>> = vec![Vec::new(); block.segments.len()];
    let mut contained = true;
    for occurrence in &found {
        let end = occurrence.start + occurrence.len;
        match bounds
            .iter()
            .position(|b| b.start <= occurrence.start && end <= b.end)
        {
            Some(i) => {
                let start = occurrence.start - bounds[i].start;
                per_segment[i].push((start..start + occurrence.len, pairs[occurrence.pair].1));
            }
            None => {
                contained = false;
                break;
            }
        }
    }

    let tier = if contained {
        for (segment, edits) in block.segments.iter_mut().zip(&per_segment) {
            if !edits.is_empty() {
                segment.apply(edits);
            }
        }
        RewriteTier::InPlace
    } else {
        let edits: Vec<(Range<usize>, &str)> = found
            .iter()
            .map(|o| (o.start..o.start + o.len, pairs[o.pair].1))
            .collect();
        block.collapse();
        if let Some(first) = block.segments.first_mut() {
            first.apply(&edits);
        }
        RewriteTier::Collapsed
    };

    Some(BlockRewrite {
        tier,
        occurrences: found.len(),
    })
}

fn find_occurrences(text: &str, pairs: &[(&str, &str)]) -> Vec<Occurrence> {
    let mut found = Vec::new();
    let mut pos = 0;
    while pos < text.len() {
        let rest = &text[pos..];
        let hit = pairs
            .iter()
            .position(|(old, _)| !old.is_empty() && rest.starts_with(old));
        match hit {
            Some(pair) => {
                let len = pairs[pair].0.len();
                found.push(Occurrence {
                    start: pos,
                    len,
                    pair,
                });
                pos += len;
            }
            None => pos += rest.chars().next().map_or(1, char::len_utf8),
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocxBuilder, Run};

    fn doc(builder: DocxBuilder) -> Document {
        Document::parse(&builder.build().unwrap()).unwrap()
    }

    #[test]
    fn in_place_rewrite_keeps_sibling_segments() {
        let mut document = doc(DocxBuilder::new().runs([
            Run::bold("Cliente: "),
            Run::plain("#NOME#, "),
            Run::italic("cidade #CIDADE#"),
        ]));
        let styles: Vec<_> = document.block(0).unwrap().segments().iter().map(|s| s.style().clone()).collect();

        let summary = replace_all(&mut document, "#NOME#", "Acme");

        assert_eq!(summary.occurrences, 1);
        assert_eq!(summary.in_place_blocks, 1);
        assert_eq!(summary.collapsed_blocks, 0);
        let block = document.block(0).unwrap();
        assert_eq!(block.segments().len(), 3);
        assert_eq!(block.segments()[0].text(), "Cliente: ");
        assert_eq!(block.segments()[1].text(), "Acme, ");
        let after: Vec<_> = block.segments().iter().map(|s| s.style().clone()).collect();
        assert_eq!(after, styles);
    }

    #[test]
    fn token_split_across_segments_collapses_block() {
        let mut document = doc(DocxBuilder::new().runs([
            Run::bold("#X"),
            Run::plain("#"),
            Run::italic(" e mais #X#"),
        ]));
        let first_style = document.block(0).unwrap().segments()[0].style().clone();

        let summary = replace_all(&mut document, "#X#", "valor");

        assert_eq!(summary.collapsed_blocks, 1);
        assert_eq!(summary.occurrences, 2);
        let block = document.block(0).unwrap();
        assert_eq!(block.segments().len(), 1);
        assert_eq!(block.segments()[0].style(), &first_style);
        assert_eq!(block.logical_text(), "valor e mais valor");
    }

    #[test]
    fn collapsed_block_survives_serialisation() {
        let mut document = doc(
            DocxBuilder::new()
                .paragraph("antes")
                .runs([Run::bold("#X"), Run::plain("#")])
                .paragraph("depois"),
        );
        replace_all(&mut document, "#X#", "ok");

        let reparsed = Document::parse(&document.to_bytes().unwrap()).unwrap();

        assert_eq!(reparsed.text(), "antes\nok\ndepois");
        let block = reparsed.block(1).unwrap();
        assert_eq!(block.segments().len(), 1);
        assert_eq!(block.segments()[0].style().as_raw(), "<w:rPr><w:b/></w:rPr>");
    }

    #[test]
    fn zero_occurrences_leave_document_unchanged() {
        let mut document = doc(DocxBuilder::new().paragraph("sem marcadores"));
        let before = document.to_bytes().unwrap();

        let summary = replace_all(&mut document, "#V#", "X");

        assert!(summary.is_empty());
        assert!(!document.is_edited());
        assert_eq!(document.text(), "sem marcadores");
        assert_eq!(document.to_bytes().unwrap(), before);
    }

    #[test]
    fn empty_search_string_matches_nothing() {
        let mut document = doc(DocxBuilder::new().paragraph("abc"));
        assert!(replace_all(&mut document, "", "X").is_empty());
    }

    #[test]
    fn replacement_is_not_rescanned() {
        let mut document = doc(DocxBuilder::new().paragraph("#A# e #B#"));

        let summary = substitute(&mut document, &[("#A#", "contém #B#"), ("#B#", "b")]);

        assert_eq!(summary.occurrences, 2);
        assert_eq!(document.text(), "contém #B# e b");
    }

    #[test]
    fn rewriting_is_deterministic() {
        let bytes = DocxBuilder::new()
            .runs([Run::bold("#T"), Run::plain("# e #T#")])
            .paragraph("#T##T#")
            .build()
            .unwrap();

        let run = || {
            let mut document = Document::parse(&bytes).unwrap();
            replace_all(&mut document, "#T#", "v");
            document.to_bytes().unwrap()
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn occurrences_do_not_overlap() {
        let mut document = doc(DocxBuilder::new().paragraph("aaaa"));
        let summary = replace_all(&mut document, "aa", "b");
        assert_eq!(summary.occurrences, 2);
        assert_eq!(document.text(), "bb");
    }

    #[test]
    fn table_cells_are_rewritten() {
        let mut document = doc(DocxBuilder::new().table(vec![vec![
            vec![Run::plain("#NOME#")],
            vec![Run::bold("#NO"), Run::plain("ME#")],
        ]]));

        let summary = replace_all(&mut document, "#NOME#", "Ana");

        assert_eq!(summary.in_place_blocks, 1);
        assert_eq!(summary.collapsed_blocks, 1);
        assert_eq!(document.text(), "Ana\nAna");
    }
}
