//! Template service.
//!
//! [`TemplateService`] is the entry point used by the CLI and the REST server. It ties the
//! repository, the consistency validator and the contract generator together, and is where the
//! save policy for review warnings is enforced.

use crate::config::CoreConfig;
use crate::document::Document;
use crate::generator::{ContractGenerator, GeneratedContract};
use crate::repository::{SaveOutcome, TemplateRepository, TemplateSummary};
use crate::review::{self, ReviewReport};
use crate::template::{self, MarkOutcome, Template};
use crate::{TemplateError, TemplateResult};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// What to do when a template's review has warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SavePolicy {
    /// Refuse to save.
    #[default]
    Strict,
    /// Log every warning and save anyway.
    Override,
}

/// A saved template together with the review it was saved under.
#[derive(Debug, Clone)]
pub struct SavedTemplate {
    pub outcome: SaveOutcome,
    pub review: ReviewReport,
}

/// Template operations for one data directory.
#[derive(Debug, Clone)]
pub struct TemplateService {
    cfg: Arc<CoreConfig>,
    repository: Arc<TemplateRepository>,
}

impl TemplateService {
    /// Opens the service, creating the data directory if needed.
    pub fn new(cfg: Arc<CoreConfig>) -> TemplateResult<Self> {
        let repository = TemplateRepository::new(Arc::clone(&cfg))?;
        Ok(Self {
            cfg,
            repository: Arc::new(repository),
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.cfg
    }

    pub fn repository(&self) -> &TemplateRepository {
        &self.repository
    }

    /// Marks `selection` in `document` as variable `name`.
    pub fn mark(
        &self,
        document: &mut Document,
        selection: &str,
        name: &str,
    ) -> TemplateResult<MarkOutcome> {
        template::mark(document, selection, name)
    }

    /// Reviews `document` against `declared`.
    pub fn review(&self, document: &Document, declared: &[String]) -> TemplateResult<ReviewReport> {
        review::review(document, declared, self.cfg.max_segments_per_block())
    }

    /// Reviews a saved template against its stored document.
    pub fn review_template(&self, name: &str) -> TemplateResult<ReviewReport> {
        let template = self.repository.load(name)?;
        template.review(self.cfg.max_segments_per_block())
    }

    /// Saves a new template.
    ///
    /// # Errors
    ///
    /// - `InvalidTemplateName` if a template with the same name exists
    /// - `UnterminatedToken` or `Inconsistent` under [`SavePolicy::Strict`] when the review has
    ///   warnings
    pub fn create_template(
        &self,
        template: &Template,
        policy: SavePolicy,
    ) -> TemplateResult<SavedTemplate> {
        if self.repository.exists(template.name())? {
            return Err(TemplateError::InvalidTemplateName(format!(
                "template {} already exists",
                template.name()
            )));
        }
        let review = self.gate(template, policy)?;
        let outcome = self.repository.create(template)?;
        Ok(SavedTemplate { outcome, review })
    }

    /// Saves a template, backing up and replacing any existing one of the same name.
    ///
    /// # Errors
    ///
    /// `UnterminatedToken` or `Inconsistent` under [`SavePolicy::Strict`] when the review has
    /// warnings, plus any repository error.
    pub fn save_template(
        &self,
        template: &Template,
        policy: SavePolicy,
    ) -> TemplateResult<SavedTemplate> {
        let review = self.gate(template, policy)?;
        let outcome = self.repository.save(template)?;
        Ok(SavedTemplate { outcome, review })
    }

    fn gate(&self, template: &Template, policy: SavePolicy) -> TemplateResult<ReviewReport> {
        let review = template.review(self.cfg.max_segments_per_block())?;
        if !review.has_warnings() {
            return Ok(review);
        }

        match policy {
            SavePolicy::Strict => {
                if let Some(block) = review.first_unterminated_block() {
                    return Err(TemplateError::UnterminatedToken { block });
                }
                Err(TemplateError::Inconsistent(Box::new(review)))
            }
            SavePolicy::Override => {
                for warning in review.warnings() {
                    tracing::warn!(
                        "template {}: saving despite warning: {}",
                        template.name(),
                        warning
                    );
                }
                Ok(review)
            }
        }
    }

    pub fn load_template(&self, name: &str) -> TemplateResult<Template> {
        self.repository.load(name)
    }

    pub fn template_summary(&self, name: &str) -> TemplateResult<TemplateSummary> {
        self.repository.summary(name)
    }

    pub fn list_templates(&self) -> TemplateResult<Vec<String>> {
        self.repository.list()
    }

    /// Backups of `name` as absolute paths, oldest first.
    pub fn list_backups(&self, name: &str) -> TemplateResult<Vec<PathBuf>> {
        Ok(self
            .repository
            .backups(name)?
            .iter()
            .map(|p| self.repository.resolve(p))
            .collect())
    }

    /// Fills the template called `name` with `values`.
    ///
    /// Nothing is written: the stored template is unchanged and the filled document is only
    /// returned.
    ///
    /// # Errors
    ///
    /// - `TemplateNotFound` if no such template exists
    /// - `MissingValue` for the first declared variable without a non-blank value
    pub fn fill(
        &self,
        name: &str,
        values: &HashMap<String, String>,
    ) -> TemplateResult<GeneratedContract> {
        let template = self.repository.load(name)?;
        ContractGenerator::new(&template)
            .validate(values)?
            .fill()
            .render()
    }
}
