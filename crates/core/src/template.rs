//! Templates and template drafting.
//!
//! A [`TemplateDraft`] is where marking happens: the operator selects text, names it, and the
//! draft rewrites the selection into a `#NAME#` token and declares the variable. A finished
//! draft becomes a [`Template`], which the repository persists.

use crate::document::Document;
use crate::review::{self, ReviewReport};
use crate::rewriter::{self, RewriteSummary};
use crate::scanner;
use crate::validation::{validate_template_name, validate_variable_name, validate_variable_set};
use crate::{TemplateError, TemplateResult};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A named, versioned pairing of a document snapshot and its declared variables.
///
/// Version 0 means the template has not been saved yet. The repository assigns the version and
/// modification time on every save.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    variables: Vec<String>,
    document: Document,
    version: u64,
    last_modified: DateTime<Utc>,
}

impl Template {
    /// Creates an unsaved template.
    ///
    /// # Errors
    ///
    /// - `InvalidTemplateName` if `name` is not a valid template name
    /// - `InvalidInput` if a variable name is not `[A-Za-z0-9_]+`
    /// - `InvalidTemplate` if a variable is declared twice, or if there are no variables and the
    ///   document has no text
    pub fn new(name: &str, variables: Vec<String>, document: Document) -> TemplateResult<Self> {
        validate_template_name(name)?;
        validate_variable_set(&variables)?;

        if variables.is_empty() && document.blocks().all(|b| b.logical_text().is_empty()) {
            return Err(TemplateError::InvalidTemplate(format!(
                "template {} has neither variables nor document text",
                name
            )));
        }

        Ok(Self {
            name: name.to_owned(),
            variables,
            document,
            version: 0,
            last_modified: Utc::now(),
        })
    }

    pub(crate) fn with_metadata(mut self, version: u64, last_modified: DateTime<Utc>) -> Self {
        self.version = version;
        self.last_modified = last_modified;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared variables in declaration order.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    /// Reviews the template against its own document.
    pub fn review(&self, max_segments: usize) -> TemplateResult<ReviewReport> {
        review::review(&self.document, &self.variables, max_segments)
    }
}

/// Result of marking a selection as a variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkOutcome {
    pub name: String,
    /// Token written into the document.
    pub token: String,
    pub summary: RewriteSummary,
}

/// Replaces every occurrence of `selection` in `document` with the token for `name`.
///
/// The selection is matched literally, including surrounding whitespace. Occurrences that
/// cross formatting boundaries collapse their block (see [`crate::rewriter`]).
///
/// # Errors
///
/// - `InvalidInput` if `name` is not `[A-Za-z0-9_]+` or `selection` is blank
/// - `SelectionNotFound` if `selection` does not occur; the document is left unchanged
pub fn mark(document: &mut Document, selection: &str, name: &str) -> TemplateResult<MarkOutcome> {
    validate_variable_name(name)?;
    if selection.trim().is_empty() {
        return Err(TemplateError::InvalidInput(
            "selection cannot be empty".into(),
        ));
    }

    let token = scanner::token(name);
    let summary = rewriter::replace_all(document, selection, &token);
    if summary.is_empty() {
        return Err(TemplateError::SelectionNotFound(selection.to_owned()));
    }

    tracing::info!(
        "marked {} occurrence(s) as {} ({} block(s) collapsed)",
        summary.occurrences,
        token,
        summary.collapsed_blocks
    );

    Ok(MarkOutcome {
        name: name.to_owned(),
        token,
        summary,
    })
}

/// A document being turned into a template.
#[derive(Debug, Clone)]
pub struct TemplateDraft {
    document: Document,
    variables: Vec<String>,
}

impl TemplateDraft {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            variables: Vec::new(),
        }
    }

    /// Parses `bytes` into a fresh draft.
    pub fn from_bytes(bytes: &[u8]) -> TemplateResult<Self> {
        Ok(Self::new(Document::parse(bytes)?))
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Marks `selection` as variable `name` and declares it.
    ///
    /// Marking the same name twice is allowed; the variable is declared once.
    pub fn mark(&mut self, selection: &str, name: &str) -> TemplateResult<MarkOutcome> {
        let outcome = mark(&mut self.document, selection, name)?;
        self.push_variable(name);
        Ok(outcome)
    }

    /// Declares `name` without touching the document.
    ///
    /// Returns `false` if it was already declared.
    pub fn declare(&mut self, name: &str) -> TemplateResult<bool> {
        validate_variable_name(name)?;
        Ok(self.push_variable(name))
    }

    /// Declares every token already present in the document. Returns how many were new.
    pub fn declare_discovered(&mut self) -> TemplateResult<usize> {
        let discovered = scanner::scan(&self.document)?;
        Ok(discovered
            .iter()
            .filter(|name| self.push_variable(name))
            .count())
    }

    pub fn review(&self, max_segments: usize) -> TemplateResult<ReviewReport> {
        review::review(&self.document, &self.variables, max_segments)
    }

    /// Finishes the draft as an unsaved template called `name`.
    pub fn into_template(self, name: &str) -> TemplateResult<Template> {
        Template::new(name, self.variables, self.document)
    }

    fn push_variable(&mut self, name: &str) -> bool {
        if self.variables.iter().any(|v| v == name) {
            return false;
        }
        self.variables.push(name.to_owned());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_MAX_SEGMENTS_PER_BLOCK;
    use crate::document::{DocxBuilder, Run};

    fn doc(builder: DocxBuilder) -> Document {
        Document::parse(&builder.build().unwrap()).unwrap()
    }

    #[test]
    fn mark_rewrites_every_occurrence() {
        let mut document = doc(
            DocxBuilder::new()
                .paragraph("Locatário: João da Silva")
                .table(vec![vec![vec![Run::plain("Assina: João da Silva")]]]),
        );

        let outcome = mark(&mut document, "João da Silva", "NOME").unwrap();

        assert_eq!(outcome.token, "#NOME#");
        assert_eq!(outcome.summary.occurrences, 2);
        assert_eq!(document.text(), "Locatário: #NOME#\nAssina: #NOME#");
    }

    #[test]
    fn mark_rejects_bad_names_and_blank_selection() {
        let mut document = doc(DocxBuilder::new().paragraph("texto"));

        assert!(matches!(
            mark(&mut document, "texto", "NOME COMPLETO"),
            Err(TemplateError::InvalidInput(_))
        ));
        assert!(matches!(
            mark(&mut document, "texto", ""),
            Err(TemplateError::InvalidInput(_))
        ));
        assert!(matches!(
            mark(&mut document, "   ", "NOME"),
            Err(TemplateError::InvalidInput(_))
        ));
        assert!(!document.is_edited());
    }

    #[test]
    fn mark_missing_selection_is_not_found() {
        let mut document = doc(DocxBuilder::new().paragraph("texto"));

        let result = mark(&mut document, "ausente", "NOME");

        assert!(matches!(result, Err(TemplateError::SelectionNotFound(s)) if s == "ausente"));
        assert!(!document.is_edited());
    }

    #[test]
    fn mark_keeps_name_case() {
        let mut document = doc(DocxBuilder::new().paragraph("Maringá"));
        let outcome = mark(&mut document, "Maringá", "cidade").unwrap();
        assert_eq!(outcome.token, "#cidade#");
    }

    #[test]
    fn draft_declares_marked_variables_once() {
        let mut draft = TemplateDraft::new(doc(
            DocxBuilder::new().paragraph("Acme e Acme Ltda, Maringá"),
        ));

        draft.mark("Acme Ltda", "EMPRESA").unwrap();
        draft.mark("Acme", "NOME").unwrap();
        draft.mark("Maringá", "CIDADE").unwrap();
        assert!(!draft.declare("NOME").unwrap());

        assert_eq!(draft.variables(), ["EMPRESA", "NOME", "CIDADE"]);
        assert_eq!(draft.document().text(), "#NOME# e #EMPRESA#, #CIDADE#");
        assert!(!draft.review(DEFAULT_MAX_SEGMENTS_PER_BLOCK).unwrap().has_warnings());
    }

    #[test]
    fn draft_declare_discovered_adds_existing_tokens() {
        let mut draft = TemplateDraft::new(doc(DocxBuilder::new().paragraph("#B# #A# #B#")));
        draft.declare("B").unwrap();

        assert_eq!(draft.declare_discovered().unwrap(), 1);
        assert_eq!(draft.variables(), ["B", "A"]);
    }

    #[test]
    fn into_template_validates_name() {
        let draft = TemplateDraft::new(doc(DocxBuilder::new().paragraph("#A#")));
        assert!(matches!(
            draft.clone().into_template("../fora"),
            Err(TemplateError::InvalidTemplateName(_))
        ));

        let template = draft.into_template("modelo1").unwrap();
        assert_eq!(template.name(), "modelo1");
        assert_eq!(template.version(), 0);
    }

    #[test]
    fn template_without_variables_or_text_is_invalid() {
        let document = doc(DocxBuilder::new().paragraph(""));
        assert!(matches!(
            Template::new("vazio", vec![], document),
            Err(TemplateError::InvalidTemplate(_))
        ));
    }

    #[test]
    fn template_rejects_duplicate_variables() {
        let document = doc(DocxBuilder::new().paragraph("#A#"));
        assert!(matches!(
            Template::new("modelo1", vec!["A".into(), "A".into()], document),
            Err(TemplateError::InvalidTemplate(_))
        ));
    }

    #[test]
    fn marking_then_filling_with_original_text_restores_document() {
        let original = doc(DocxBuilder::new().runs([
            Run::bold("Cliente: "),
            Run::plain("Acme Comércio"),
            Run::italic(", Maringá"),
        ]));
        let mut document = original.clone();

        mark(&mut document, "Acme Comércio", "NOME").unwrap();
        rewriter::replace_all(&mut document, "#NOME#", "Acme Comércio");

        assert_eq!(document.text(), original.text());
        assert_eq!(document.block(0).unwrap().segments().len(), 3);
    }
}
