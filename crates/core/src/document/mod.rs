//! Document Text Model.
//!
//! A [`Document`] is a `.docx` package viewed as an ordered list of [`Block`]s. Each block is a
//! paragraph, either in the body or inside a table cell, and holds the ordered [`Segment`]s
//! (formatting runs) that carry its text.
//!
//! ## Block Order
//!
//! Body paragraphs come first in document order, followed by table-cell paragraphs in
//! table → row → cell → paragraph order. Block indices are stable for the lifetime of a
//! `Document`; rewrites never add, remove or reorder blocks.
//!
//! ## Editing
//!
//! [`Document::replace_in_block`] and the functions in [`crate::rewriter`] are the only
//! mutators. Edits are kept on the segments and spliced into the original XML by
//! [`Document::to_bytes`], so markup outside the edited runs is preserved byte for byte.

mod builder;
mod docx;

pub use builder::{DocxBuilder, Run};

use crate::rewriter::{self, BlockRewrite};
use crate::TemplateResult;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Opaque formatting handle of a segment.
///
/// Holds the run's raw `w:rPr` markup, or nothing for a run without run properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Style(String);

impl Style {
    pub(crate) fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Raw run-properties markup, empty for an unstyled run.
    pub fn as_raw(&self) -> &str {
        &self.0
    }

    pub fn is_plain(&self) -> bool {
        self.0.is_empty()
    }
}

/// Where a block sits in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockKind {
    Paragraph,
    TableCell { table: usize, row: usize, cell: usize },
}

/// One child of a run, in document order.
#[derive(Debug, Clone)]
pub(crate) enum Piece {
    /// Character data of a `w:t`. `source` is `None` once the text has been edited.
    Text {
        text: String,
        source: Option<Range<usize>>,
    },
    /// A child read as one character (`w:tab`, `w:br`, `w:cr`). Its markup is written back as is.
    Mark { ch: char, source: Range<usize> },
    /// Any other child, such as `w:noBreakHyphen`, `w:sym` or `w:drawing`. It has no text.
    Opaque { source: Range<usize> },
}

impl Piece {
    fn text_len(&self) -> usize {
        match self {
            Piece::Text { text, .. } => text.len(),
            Piece::Mark { ch, .. } => ch.len_utf8(),
            Piece::Opaque { .. } => 0,
        }
    }

    fn push_text(&self, out: &mut String) {
        match self {
            Piece::Text { text, .. } => out.push_str(text),
            Piece::Mark { ch, .. } => out.push(*ch),
            Piece::Opaque { .. } => {}
        }
    }
}

/// A contiguous run of text sharing one style.
#[derive(Debug, Clone)]
pub struct Segment {
    pub(crate) style: Style,
    pub(crate) text: String,
    pub(crate) pieces: Vec<Piece>,
    /// Byte span in `word/document.xml` covering the run's children after `w:rPr`.
    pub(crate) source: Range<usize>,
    pub(crate) dirty: bool,
}

impl Segment {
    pub(crate) fn new(style: Style, pieces: Vec<Piece>, source: Range<usize>) -> Self {
        let mut segment = Self {
            style,
            text: String::new(),
            pieces,
            source,
            dirty: false,
        };
        segment.refresh_text();
        segment
    }

    pub fn style(&self) -> &Style {
        &self.style
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Replaces byte ranges of the segment's text.
    ///
    /// `edits` must be sorted and disjoint. Each replacement lands in the first piece its range
    /// touches; covered text is removed from the other pieces and covered marks are dropped.
    /// Opaque pieces are never touched. Characters that cannot appear in XML are dropped from
    /// replacements.
    pub(crate) fn apply(&mut self, edits: &[(Range<usize>, &str)]) {
        for (range, replacement) in edits.iter().rev() {
            let replacement: String = replacement
                .chars()
                .filter(|c| docx::is_text_char(*c))
                .collect();
            let pieces = std::mem::take(&mut self.pieces);
            self.pieces = splice_pieces(pieces, range.clone(), &replacement);
        }
        self.refresh_text();
        self.dirty = true;
    }

    fn refresh_text(&mut self) {
        let mut text = String::new();
        for piece in &self.pieces {
            piece.push_text(&mut text);
        }
        self.text = text;
    }
}

fn splice_pieces(pieces: Vec<Piece>, range: Range<usize>, replacement: &str) -> Vec<Piece> {
    let mut out = Vec::with_capacity(pieces.len() + 1);
    let mut offset = 0;
    let mut placed = false;

    for piece in pieces {
        let start = offset;
        let end = offset + piece.text_len();
        offset = end;
        let overlaps = start < range.end && end > range.start;

        match piece {
            Piece::Text { text, .. } if overlaps => {
                let from = range.start.saturating_sub(start);
                let to = range.end.min(end) - start;
                let mut edited = String::with_capacity(text.len() + replacement.len());
                edited.push_str(&text[..from]);
                if !placed {
                    edited.push_str(replacement);
                    placed = true;
                }
                edited.push_str(&text[to..]);
                out.push(Piece::Text {
                    text: edited,
                    source: None,
                });
            }
            Piece::Mark { .. } if overlaps => {
                if !placed {
                    out.push(Piece::Text {
                        text: replacement.to_owned(),
                        source: None,
                    });
                    placed = true;
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// A paragraph: the unit over which substitution is attempted.
#[derive(Debug, Clone)]
pub struct Block {
    pub(crate) kind: BlockKind,
    pub(crate) segments: Vec<Segment>,
    /// Spans of runs whose pieces were folded into the first segment.
    pub(crate) removed: Vec<Range<usize>>,
}

impl Block {
    pub(crate) fn new(kind: BlockKind, segments: Vec<Segment>) -> Self {
        Self {
            kind,
            segments,
            removed: Vec::new(),
        }
    }

    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Concatenation of the block's segment texts, in order.
    pub fn logical_text(&self) -> String {
        self.segments.iter().map(|s| s.text.as_str()).collect()
    }

    /// Folds every segment into the first one, which keeps its style.
    ///
    /// The pieces of the other segments move over in order, so their breaks and other markup
    /// survive; their runs are left empty.
    pub(crate) fn collapse(&mut self) {
        if self.segments.len() < 2 {
            return;
        }
        let rest = self.segments.split_off(1);
        if let Some(first) = self.segments.first_mut() {
            for segment in rest {
                self.removed.push(segment.source);
                first.pieces.extend(segment.pieces);
                first.text.push_str(&segment.text);
            }
            first.dirty = true;
        }
    }

    fn is_edited(&self) -> bool {
        !self.removed.is_empty() || self.segments.iter().any(|s| s.dirty)
    }
}

/// A parsed `.docx` document.
///
/// Cloning yields a fully independent snapshot.
#[derive(Debug, Clone)]
pub struct Document {
    package: docx::Package,
    xml: String,
    /// Prefix bound to the WordprocessingML namespace, empty when it is the default namespace.
    prefix: String,
    blocks: Vec<Block>,
}

impl Document {
    /// Parses a `.docx` package.
    ///
    /// # Errors
    ///
    /// Returns `TemplateError::MalformedDocument` if the bytes are not a zip package, the package
    /// has no `word/document.xml`, or that part is not well-formed XML.
    pub fn parse(bytes: &[u8]) -> TemplateResult<Self> {
        docx::parse(bytes)
    }

    /// Serialises the document back into `.docx` bytes.
    ///
    /// An unedited document yields exactly the bytes it was parsed from. Otherwise the package is
    /// rewritten with the same entries, in the same order, with a fixed timestamp, so identical
    /// edits always produce identical bytes.
    pub fn to_bytes(&self) -> TemplateResult<Vec<u8>> {
        docx::render(self)
    }

    /// Blocks in document order. The iterator can be recreated any number of times.
    pub fn blocks(&self) -> std::slice::Iter<'_, Block> {
        self.blocks.iter()
    }

    pub fn block(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn logical_text(&self, index: usize) -> Option<String> {
        self.blocks.get(index).map(Block::logical_text)
    }

    /// Logical text of every block, one line per block.
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .map(Block::logical_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Replaces every occurrence of `old` with `new` inside one block.
    ///
    /// Returns `None` if the block does not exist or contains no occurrence.
    pub fn replace_in_block(&mut self, index: usize, old: &str, new: &str) -> Option<BlockRewrite> {
        let block = self.blocks.get_mut(index)?;
        rewriter::rewrite_block(block, &[(old, new)])
    }

    pub fn is_edited(&self) -> bool {
        self.blocks.iter().any(Block::is_edited)
    }

    pub(crate) fn blocks_mut(&mut self) -> &mut [Block] {
        &mut self.blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        let bytes = DocxBuilder::new()
            .paragraph("Contrato de locação")
            .runs([Run::plain("Locatário: "), Run::bold("#NOME#")])
            .table(vec![
                vec![vec![Run::plain("A1")], vec![Run::plain("B1")]],
                vec![vec![Run::plain("A2")], vec![Run::italic("B2")]],
            ])
            .paragraph("Assinatura")
            .build()
            .unwrap();
        Document::parse(&bytes).unwrap()
    }

    #[test]
    fn blocks_list_body_paragraphs_before_table_cells() {
        let doc = sample();
        let texts: Vec<String> = doc.blocks().map(Block::logical_text).collect();

        assert_eq!(
            texts,
            vec![
                "Contrato de locação",
                "Locatário: #NOME#",
                "Assinatura",
                "A1",
                "B1",
                "A2",
                "B2"
            ]
        );
        assert_eq!(doc.block(0).unwrap().kind(), BlockKind::Paragraph);
        assert_eq!(
            doc.block(6).unwrap().kind(),
            BlockKind::TableCell {
                table: 0,
                row: 1,
                cell: 1
            }
        );
    }

    #[test]
    fn blocks_iterator_is_restartable() {
        let doc = sample();
        let first: Vec<String> = doc.blocks().map(Block::logical_text).collect();
        let second: Vec<String> = doc.blocks().map(Block::logical_text).collect();
        assert_eq!(first, second);
        assert_eq!(doc.block_count(), first.len());
    }

    #[test]
    fn segments_carry_run_styles() {
        let doc = sample();
        let block = doc.block(1).unwrap();

        assert_eq!(block.segments().len(), 2);
        assert!(block.segments()[0].style().is_plain());
        assert!(block.segments()[1].style().as_raw().contains("w:b"));
        assert_eq!(block.segments()[1].text(), "#NOME#");
    }

    #[test]
    fn unedited_document_round_trips_to_identical_bytes() {
        let bytes = DocxBuilder::new().paragraph("Olá").build().unwrap();
        let doc = Document::parse(&bytes).unwrap();

        assert!(!doc.is_edited());
        assert_eq!(doc.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn replace_in_block_out_of_range_is_none() {
        let mut doc = sample();
        assert!(doc.replace_in_block(99, "A", "B").is_none());
        assert!(doc.replace_in_block(0, "absent", "B").is_none());
        assert!(!doc.is_edited());
    }

    #[test]
    fn edits_survive_serialisation() {
        let mut doc = sample();
        doc.replace_in_block(1, "#NOME#", "Ana & Filhos <Ltda>").unwrap();
        doc.replace_in_block(6, "B2", "linha 1\nlinha 2\tfim").unwrap();

        let reparsed = Document::parse(&doc.to_bytes().unwrap()).unwrap();

        assert_eq!(
            reparsed.logical_text(1).unwrap(),
            "Locatário: Ana & Filhos <Ltda>"
        );
        assert_eq!(reparsed.logical_text(6).unwrap(), "linha 1\nlinha 2\tfim");
        assert_eq!(reparsed.logical_text(0).unwrap(), "Contrato de locação");
        assert!(reparsed.block(6).unwrap().segments()[0]
            .style()
            .as_raw()
            .contains("w:i"));
    }

    #[test]
    fn parse_rejects_non_zip_bytes() {
        let result = Document::parse(b"definitely not a docx");
        assert!(matches!(
            result,
            Err(crate::TemplateError::MalformedDocument(_))
        ));
    }
}
