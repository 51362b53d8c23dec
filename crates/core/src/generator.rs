//! Contract Generator.
//!
//! Fills a template with caller-supplied values. The generator moves through
//! `Loaded → Validated → Filled` as marker types, and rendering a filled generator produces the
//! terminal [`GeneratedContract`]. Each transition consumes the previous state, so a
//! contract cannot be rendered before every value has been checked.
//!
//! The generator works on its own copy of the template's document; the stored template is never
//! modified.

use crate::constants::{DOCUMENT_EXTENSION, FILLED_SUFFIX};
use crate::document::Document;
use crate::rewriter::{self, RewriteSummary};
use crate::scanner;
use crate::template::Template;
use crate::{TemplateError, TemplateResult};
use chrono::{DateTime, Utc};
use contrato_files::BACKUP_TIMESTAMP_FORMAT;
use std::collections::HashMap;

// ============================================================================
// TYPE-STATE MARKERS
// ============================================================================

/// Marker type: template loaded, values not yet checked.
#[derive(Clone, Copy, Debug)]
pub struct Loaded;

/// Marker type: every declared variable has a non-empty value.
#[derive(Clone, Debug)]
pub struct Validated {
    /// `(token, value)` in declared variable order.
    bindings: Vec<(String, String)>,
}

/// Marker type: tokens have been substituted.
#[derive(Clone, Copy, Debug)]
pub struct Filled {
    summary: RewriteSummary,
}

// ============================================================================
// CONTRACT GENERATOR
// ============================================================================

/// Fills one template.
///
/// Generic parameter `S` is `Loaded`, `Validated` or `Filled`.
#[derive(Clone, Debug)]
pub struct ContractGenerator<S> {
    template_name: String,
    variables: Vec<String>,
    document: Document,
    state: S,
}

impl ContractGenerator<Loaded> {
    /// Starts a generation from a loaded template.
    pub fn new(template: &Template) -> Self {
        Self {
            template_name: template.name().to_owned(),
            variables: template.variables().to_vec(),
            document: template.document().clone(),
            state: Loaded,
        }
    }

    /// Checks that every declared variable has a value.
    ///
    /// Variables are checked in declaration order and the first one without a value fails the
    /// transition. A value made only of whitespace counts as missing. Values are kept verbatim,
    /// untrimmed. Values for undeclared names are ignored.
    ///
    /// # Errors
    ///
    /// Returns `TemplateError::MissingValue` naming the first variable without a value.
    pub fn validate(
        self,
        values: &HashMap<String, String>,
    ) -> TemplateResult<ContractGenerator<Validated>> {
        let mut bindings = Vec::with_capacity(self.variables.len());
        for name in &self.variables {
            match values.get(name) {
                Some(value) if !value.trim().is_empty() => {
                    bindings.push((scanner::token(name), value.clone()));
                }
                _ => return Err(TemplateError::MissingValue(name.clone())),
            }
        }

        for name in values.keys().filter(|k| !self.variables.contains(k)) {
            tracing::debug!(
                "template {}: ignoring value for undeclared variable {}",
                self.template_name,
                name
            );
        }

        Ok(ContractGenerator {
            template_name: self.template_name,
            variables: self.variables,
            document: self.document,
            state: Validated { bindings },
        })
    }
}

impl ContractGenerator<Validated> {
    /// Substitutes every declared token with its value.
    ///
    /// All tokens are replaced in one pass, so a value containing another variable's token is
    /// inserted literally.
    pub fn fill(self) -> ContractGenerator<Filled> {
        let pairs: Vec<(&str, &str)> = self
            .state
            .bindings
            .iter()
            .map(|(token, value)| (token.as_str(), value.as_str()))
            .collect();

        let mut document = self.document;
        let summary = rewriter::substitute(&mut document, &pairs);

        ContractGenerator {
            template_name: self.template_name,
            variables: self.variables,
            document,
            state: Filled { summary },
        }
    }
}

impl ContractGenerator<Filled> {
    pub fn summary(&self) -> RewriteSummary {
        self.state.summary
    }

    /// Logical text of the filled document, one line per block.
    pub fn text(&self) -> String {
        self.document.text()
    }

    /// Serialises the filled document.
    pub fn render(self) -> TemplateResult<GeneratedContract> {
        let bytes = self.document.to_bytes()?;

        tracing::info!(
            "filled template {}: {} substitution(s), {} block(s) collapsed",
            self.template_name,
            self.state.summary.occurrences,
            self.state.summary.collapsed_blocks
        );

        Ok(GeneratedContract {
            template_name: self.template_name,
            generated_at: Utc::now(),
            bytes,
            substitutions: self.state.summary,
        })
    }
}

/// A rendered document, ready to hand to the caller.
#[derive(Clone, Debug)]
pub struct GeneratedContract {
    pub template_name: String,
    pub generated_at: DateTime<Utc>,
    pub bytes: Vec<u8>,
    pub substitutions: RewriteSummary,
}

impl GeneratedContract {
    /// `{template_name}_preenchido.docx`
    pub fn suggested_filename(&self) -> String {
        format!(
            "{}_{}.{}",
            self.template_name, FILLED_SUFFIX, DOCUMENT_EXTENSION
        )
    }

    /// `{template_name}_preenchido_{YYYYMMDD_HHMMSS}.docx`
    pub fn timestamped_filename(&self) -> String {
        format!(
            "{}_{}_{}.{}",
            self.template_name,
            FILLED_SUFFIX,
            self.generated_at.format(BACKUP_TIMESTAMP_FORMAT),
            DOCUMENT_EXTENSION
        )
    }
}
