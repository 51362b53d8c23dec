//! # Contrato Core
//!
//! Placeholder substitution and consistency engine for `.docx` contract templates.
//!
//! An operator marks spans of a document as named placeholders (`#NAME#` tokens). The template
//! is saved together with its declared variables, and later filled with values to produce a
//! finished document.
//!
//! This crate contains:
//! - [`document`]: the Document Text Model and the `.docx` codec
//! - [`scanner`]: discovery of `#NAME#` tokens
//! - [`rewriter`]: format-preserving text replacement
//! - [`review`]: consistency checks between declared variables and document tokens
//! - [`template`]: templates, drafts and marking
//! - [`repository`]: durable storage with backups
//! - [`generator`]: the fill state machine
//! - [`service`]: the [`TemplateService`] facade used by the binaries
//!
//! **No API concerns**: HTTP handlers and command-line parsing belong in `contrato-run` and
//! `contrato-cli`.

pub mod config;
pub mod constants;
pub mod document;
pub mod error;
pub mod generator;
pub mod repository;
pub mod review;
pub mod rewriter;
pub mod scanner;
pub mod service;
pub mod template;
pub mod validation;

pub use config::{max_segments_from_env_value, CoreConfig};
pub use document::{Block, BlockKind, Document, DocxBuilder, Run, Segment, Style};
pub use error::{TemplateError, TemplateResult};
pub use generator::{ContractGenerator, GeneratedContract};
pub use repository::{SaveOutcome, TemplateRepository, TemplateSummary};
pub use review::{BlockIssue, MalformedBlock, ReviewReport};
pub use rewriter::{RewriteSummary, RewriteTier};
pub use service::{SavePolicy, SavedTemplate, TemplateService};
pub use template::{mark, MarkOutcome, Template, TemplateDraft};
