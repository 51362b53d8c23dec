//! `.docx` package codec for the Document Text Model.

use super::{Block, BlockKind, Document, Piece, Segment, Style};
use crate::{TemplateError, TemplateResult};
use roxmltree::{Node, NodeId};
use std::cmp::Reverse;
use std::io::{Cursor, Read, Write};
use std::ops::Range;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// WordprocessingML main namespace.
pub(crate) const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

/// Package part holding the main document body.
pub(crate) const DOCUMENT_PART: &str = "word/document.xml";

/// Zip package a document was read from.
#[derive(Debug, Clone)]
pub(super) struct Package {
    original: Vec<u8>,
    entries: Vec<PackageEntry>,
}

#[derive(Debug, Clone)]
struct PackageEntry {
    name: String,
    data: Vec<u8>,
    compression: CompressionMethod,
}

fn malformed(reason: impl std::fmt::Display) -> TemplateError {
    TemplateError::MalformedDocument(reason.to_string())
}

fn render_error(reason: impl std::fmt::Display) -> TemplateError {
    TemplateError::DocumentRender(reason.to_string())
}

pub(super) fn parse(bytes: &[u8]) -> TemplateResult<Document> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| malformed(format!("not a zip package: {}", e)))?;

    let mut entries = Vec::with_capacity(archive.len());
    let mut xml = None;

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| malformed(format!("unreadable package entry {}: {}", i, e)))?;
        let name = file.name().to_owned();
        let compression = file.compression();

        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .map_err(|e| malformed(format!("unreadable package entry {}: {}", name, e)))?;

        if name == DOCUMENT_PART {
            let text = String::from_utf8(data.clone())
                .map_err(|e| malformed(format!("{} is not UTF-8: {}", DOCUMENT_PART, e)))?;
            xml = Some(text);
        }

        entries.push(PackageEntry {
            name,
            data,
            compression,
        });
    }

    let mut xml = xml.ok_or_else(|| malformed(format!("package has no {}", DOCUMENT_PART)))?;
    if let Some(stripped) = xml.strip_prefix('\u{feff}') {
        xml = stripped.to_owned();
    }

    let (prefix, blocks) = read_blocks(&xml)?;

    Ok(Document {
        package: Package {
            original: bytes.to_vec(),
            entries,
        },
        xml,
        prefix,
        blocks,
    })
}

fn read_blocks(xml: &str) -> TemplateResult<(String, Vec<Block>)> {
    let doc = roxmltree::Document::parse(xml)
        .map_err(|e| malformed(format!("invalid XML in {}: {}", DOCUMENT_PART, e)))?;

    let root = doc.root_element();
    if !root.has_tag_name((W_NS, "document")) {
        return Err(malformed(format!(
            "{} root element is not w:document",
            DOCUMENT_PART
        )));
    }
    let prefix = root.lookup_prefix(W_NS).unwrap_or("").to_owned();

    let tables: Vec<NodeId> = doc
        .descendants()
        .filter(|n| n.has_tag_name((W_NS, "tbl")))
        .map(|n| n.id())
        .collect();

    let mut body = Vec::new();
    let mut cells = Vec::new();
    for paragraph in doc.descendants().filter(|n| n.has_tag_name((W_NS, "p"))) {
        let segments = read_segments(paragraph);
        match cell_position(paragraph, &tables) {
            Some(kind) => cells.push(Block::new(kind, segments)),
            None => body.push(Block::new(BlockKind::Paragraph, segments)),
        }
    }
    body.append(&mut cells);

    Ok((prefix, body))
}

fn nearest<'a, 'input>(node: Node<'a, 'input>, local: &str) -> Option<Node<'a, 'input>> {
    node.ancestors().skip(1).find(|n| n.has_tag_name((W_NS, local)))
}

fn cell_position(paragraph: Node, tables: &[NodeId]) -> Option<BlockKind> {
    let cell = nearest(paragraph, "tc")?;
    let row = nearest(cell, "tr")?;
    let table = nearest(row, "tbl")?;

    let row_index = table
        .children()
        .filter(|n| n.has_tag_name((W_NS, "tr")))
        .position(|n| n == row)
        .unwrap_or(0);
    let cell_index = row
        .children()
        .filter(|n| n.has_tag_name((W_NS, "tc")))
        .position(|n| n == cell)
        .unwrap_or(0);

    Some(BlockKind::TableCell {
        table: tables.iter().position(|id| *id == table.id())?,
        row: row_index,
        cell: cell_index,
    })
}

fn read_segments(paragraph: Node) -> Vec<Segment> {
    paragraph
        .descendants()
        .filter(|n| n.has_tag_name((W_NS, "r")))
        .filter(|run| nearest(*run, "p") == Some(paragraph))
        .filter_map(read_run)
        .collect()
}

/// Reads one `w:r`; runs without text-bearing children are not segments.
///
/// Every child after `w:rPr` becomes a piece, so children without text are kept in place.
fn read_run(run: Node) -> Option<Segment> {
    let input = run.document().input_text();
    let mut style = Style::default();
    let mut pieces = Vec::new();
    let mut span: Option<Range<usize>> = None;

    for child in run.children().filter(Node::is_element) {
        let range = child.range();
        let tag = child.tag_name();
        let piece = match (tag.namespace() == Some(W_NS), tag.name()) {
            (true, "rPr") => {
                style = Style::from_raw(&input[range.clone()]);
                continue;
            }
            (true, "t") => Piece::Text {
                text: child.text().unwrap_or("").to_owned(),
                source: Some(range.clone()),
            },
            (true, "tab") => Piece::Mark {
                ch: '\t',
                source: range.clone(),
            },
            (true, "br" | "cr") => Piece::Mark {
                ch: '\n',
                source: range.clone(),
            },
            _ => Piece::Opaque {
                source: range.clone(),
            },
        };

        span = Some(match span {
            Some(existing) => existing.start..range.end,
            None => range,
        });
        pieces.push(piece);
    }

    if pieces.iter().all(|p| matches!(p, Piece::Opaque { .. })) {
        return None;
    }
    span.map(|source| Segment::new(style, pieces, source))
}

enum Edit<'d> {
    /// A run whose pieces moved to another segment.
    Remove,
    Rewrite(&'d Segment),
}

pub(super) fn render(document: &Document) -> TemplateResult<Vec<u8>> {
    let mut edits: Vec<(Range<usize>, Edit<'_>)> = Vec::new();
    for block in &document.blocks {
        edits.extend(block.removed.iter().map(|r| (r.clone(), Edit::Remove)));
        edits.extend(
            block
                .segments
                .iter()
                .filter(|s| s.dirty)
                .map(|s| (s.source.clone(), Edit::Rewrite(s))),
        );
    }

    if edits.is_empty() {
        return Ok(document.package.original.clone());
    }

    // Outer spans first, so edits nested inside them are applied while copying their pieces.
    edits.sort_by_key(|(range, _)| (range.start, Reverse(range.end)));

    let splicer = Splicer {
        xml: &document.xml,
        prefix: &document.prefix,
        edits: &edits,
    };
    let mut xml = String::with_capacity(document.xml.len());
    splicer.copy(0..document.xml.len(), &mut xml)?;

    write_package(document.package.entries.iter().map(|entry| {
        let data = if entry.name == DOCUMENT_PART {
            xml.as_bytes()
        } else {
            entry.data.as_slice()
        };
        (entry.name.as_str(), data, entry.compression)
    }))
}

/// Rebuilds `word/document.xml` from the original text and the pending edits.
struct Splicer<'a> {
    xml: &'a str,
    prefix: &'a str,
    edits: &'a [(Range<usize>, Edit<'a>)],
}

impl Splicer<'_> {
    /// Copies `range` of the original XML into `out`, applying the edits strictly inside it.
    fn copy(&self, range: Range<usize>, out: &mut String) -> TemplateResult<()> {
        let mut cursor = range.start;
        for (span, edit) in self.edits {
            if span.start < cursor || span.end > range.end || *span == range {
                continue;
            }
            out.push_str(self.slice(cursor..span.start)?);
            if let Edit::Rewrite(segment) = edit {
                self.rewrite(segment, out)?;
            }
            cursor = span.end;
        }
        out.push_str(self.slice(cursor..range.end)?);
        Ok(())
    }

    fn rewrite(&self, segment: &Segment, out: &mut String) -> TemplateResult<()> {
        for piece in &segment.pieces {
            match piece {
                Piece::Text { text, source: None } => {
                    out.push_str(&run_text_xml(self.prefix, text));
                }
                Piece::Text {
                    source: Some(source),
                    ..
                }
                | Piece::Mark { source, .. }
                | Piece::Opaque { source } => self.copy(source.clone(), out)?,
            }
        }
        Ok(())
    }

    fn slice(&self, range: Range<usize>) -> TemplateResult<&str> {
        self.xml.get(range.clone()).ok_or_else(|| {
            render_error(format!(
                "edit at bytes {}..{} is outside {}",
                range.start, range.end, DOCUMENT_PART
            ))
        })
    }
}

/// Writes a zip package with a fixed entry timestamp.
///
/// Entries keep `Stored` if they were stored; everything else is deflated.
pub(super) fn write_package<'a>(
    entries: impl IntoIterator<Item = (&'a str, &'a [u8], CompressionMethod)>,
) -> TemplateResult<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    for (name, data, compression) in entries {
        let method = match compression {
            CompressionMethod::Stored => CompressionMethod::Stored,
            _ => CompressionMethod::Deflated,
        };
        let options: FileOptions<'_, ()> = FileOptions::default()
            .compression_method(method)
            .last_modified_time(zip::DateTime::default());

        if name.ends_with('/') {
            zip.add_directory(name, options).map_err(render_error)?;
            continue;
        }
        zip.start_file(name, options).map_err(render_error)?;
        zip.write_all(data).map_err(render_error)?;
    }

    let cursor = zip.finish().map_err(render_error)?;
    Ok(cursor.into_inner())
}

/// Text-bearing run children for `text`, using `w:tab` and `w:br` for tabs and line breaks.
pub(super) fn run_text_xml(prefix: &str, text: &str) -> String {
    let tag = |local: &str| {
        if prefix.is_empty() {
            local.to_owned()
        } else {
            format!("{}:{}", prefix, local)
        }
    };
    let t = tag("t");

    let mut out = String::with_capacity(text.len() + 32);
    let mut piece = String::new();
    for ch in text.chars() {
        match ch {
            '\t' | '\n' => {
                push_text_element(&mut out, &t, &piece);
                piece.clear();
                let local = if ch == '\t' { "tab" } else { "br" };
                out.push('<');
                out.push_str(&tag(local));
                out.push_str("/>");
            }
            c if !is_text_char(c) => {}
            '&' => piece.push_str("&amp;"),
            '<' => piece.push_str("&lt;"),
            '>' => piece.push_str("&gt;"),
            c => piece.push(c),
        }
    }
    push_text_element(&mut out, &t, &piece);
    out
}

/// True for characters that can be written as run text.
///
/// Tabs and line breaks become `w:tab`/`w:br`. Other control characters, and the two
/// noncharacters U+FFFE and U+FFFF, are outside the XML 1.0 `Char` production.
pub(super) fn is_text_char(c: char) -> bool {
    matches!(c, '\t' | '\n') || (c >= ' ' && !matches!(c, '\u{FFFE}' | '\u{FFFF}'))
}

fn push_text_element(out: &mut String, tag: &str, escaped: &str) {
    if escaped.is_empty() {
        return;
    }
    out.push('<');
    out.push_str(tag);
    out.push_str(" xml:space=\"preserve\">");
    out.push_str(escaped);
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}
