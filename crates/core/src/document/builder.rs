use super::docx::{run_text_xml, write_package, DOCUMENT_PART, W_NS};
use crate::TemplateResult;
use zip::CompressionMethod;

const CONTENT_TYPES: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    "\n",
    r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
    r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
    r#"<Default Extension="xml" ContentType="application/xml"/>"#,
    r#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#,
    "</Types>"
);

const PACKAGE_RELS: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    "\n",
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>"#,
    "</Relationships>"
);

/// A run of text for [`DocxBuilder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    text: String,
    bold: bool,
    italic: bool,
}

impl Run {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bold: false,
            italic: false,
        }
    }

    pub fn bold(text: impl Into<String>) -> Self {
        Self {
            bold: true,
            ..Self::plain(text)
        }
    }

    pub fn italic(text: impl Into<String>) -> Self {
        Self {
            italic: true,
            ..Self::plain(text)
        }
    }

    fn to_xml(&self) -> String {
        let mut xml = String::from("<w:r>");
        if self.bold || self.italic {
            xml.push_str("<w:rPr>");
            if self.bold {
                xml.push_str("<w:b/>");
            }
            if self.italic {
                xml.push_str("<w:i/>");
            }
            xml.push_str("</w:rPr>");
        }
        xml.push_str(&run_text_xml("w", &self.text));
        xml.push_str("</w:r>");
        xml
    }
}

#[derive(Debug, Clone)]
enum BodyItem {
    Paragraph(Vec<Run>),
    /// Rows of cells; each cell is a single paragraph of runs.
    Table(Vec<Vec<Vec<Run>>>),
}

/// Builds a minimal `.docx` package.
///
/// ```
/// use contrato_core::document::{Document, DocxBuilder, Run};
///
/// let bytes = DocxBuilder::new()
///     .paragraph("Contrato")
///     .runs([Run::plain("Cliente: "), Run::bold("#NOME#")])
///     .build()
///     .unwrap();
/// let doc = Document::parse(&bytes).unwrap();
/// assert_eq!(doc.logical_text(1).unwrap(), "Cliente: #NOME#");
/// ```
#[derive(Debug, Clone, Default)]
pub struct DocxBuilder {
    items: Vec<BodyItem>,
}

impl DocxBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a paragraph with a single unstyled run.
    pub fn paragraph(self, text: impl Into<String>) -> Self {
        self.runs([Run::plain(text)])
    }

    /// Appends a paragraph made of `runs`.
    pub fn runs(mut self, runs: impl IntoIterator<Item = Run>) -> Self {
        self.items
            .push(BodyItem::Paragraph(runs.into_iter().collect()));
        self
    }

    /// Appends a table given as rows of cells, each cell a list of runs.
    pub fn table(mut self, rows: Vec<Vec<Vec<Run>>>) -> Self {
        self.items.push(BodyItem::Table(rows));
        self
    }

    /// Returns the `word/document.xml` part.
    pub fn document_xml(&self) -> String {
        let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        xml.push('\n');
        xml.push_str(&format!(r#"<w:document xmlns:w="{}"><w:body>"#, W_NS));

        for item in &self.items {
            match item {
                BodyItem::Paragraph(runs) => push_paragraph(&mut xml, runs),
                BodyItem::Table(rows) => {
                    xml.push_str("<w:tbl>");
                    for row in rows {
                        xml.push_str("<w:tr>");
                        for cell in row {
                            xml.push_str("<w:tc>");
                            push_paragraph(&mut xml, cell);
                            xml.push_str("</w:tc>");
                        }
                        xml.push_str("</w:tr>");
                    }
                    xml.push_str("</w:tbl>");
                }
            }
        }

        xml.push_str("<w:sectPr/></w:body></w:document>");
        xml
    }

    /// Packages the document. Output is byte-identical for identical builders.
    pub fn build(&self) -> TemplateResult<Vec<u8>> {
        let document_xml = self.document_xml();
        write_package([
            (
                "[Content_Types].xml",
                CONTENT_TYPES.as_bytes(),
                CompressionMethod::Deflated,
            ),
            ("_rels/.rels", PACKAGE_RELS.as_bytes(), CompressionMethod::Deflated),
            (
                DOCUMENT_PART,
                document_xml.as_bytes(),
                CompressionMethod::Deflated,
            ),
        ])
    }
}

fn push_paragraph(xml: &mut String, runs: &[Run]) {
    xml.push_str("<w:p>");
    for run in runs {
        xml.push_str(&run.to_xml());
    }
    xml.push_str("</w:p>");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;

    #[test]
    fn build_is_deterministic() {
        let builder = DocxBuilder::new().paragraph("a").paragraph("b");
        assert_eq!(builder.build().unwrap(), builder.build().unwrap());
    }

    #[test]
    fn styled_runs_become_distinct_segments() {
        let bytes = DocxBuilder::new()
            .runs([Run::bold("#X"), Run::plain("#"), Run::italic(" fim")])
            .build()
            .unwrap();
        let doc = Document::parse(&bytes).unwrap();

        let segments = doc.block(0).unwrap().segments();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].style().as_raw(), "<w:rPr><w:b/></w:rPr>");
        assert!(segments[1].style().is_plain());
        assert_eq!(segments[2].style().as_raw(), "<w:rPr><w:i/></w:rPr>");
    }

    #[test]
    fn empty_run_is_not_a_segment() {
        let bytes = DocxBuilder::new()
            .runs([Run::plain(""), Run::plain("texto")])
            .build()
            .unwrap();
        let doc = Document::parse(&bytes).unwrap();

        assert_eq!(doc.block(0).unwrap().segments().len(), 1);
    }
}
