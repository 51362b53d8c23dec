//! Constants used throughout the contrato core crate.
//!
//! This module contains all path, filename and naming constants to ensure
//! consistency across the codebase and make maintenance easier.

/// Default directory for template data when no explicit directory is configured.
pub const DEFAULT_TEMPLATE_DATA_DIR: &str = "template_data";

/// Directory name for template records, relative to the data directory.
pub const TEMPLATES_DIR_NAME: &str = "templates";

/// Directory name for document backups, relative to the data directory.
pub const BACKUPS_DIR_NAME: &str = "backups";

/// Filename for the per-template YAML record.
pub const TEMPLATE_RECORD_FILENAME: &str = "template.yaml";

/// Stem of the versioned document snapshot (`document.v<N>.docx`).
pub const DOCUMENT_FILE_STEM: &str = "document";

/// Extension of stored and generated documents.
pub const DOCUMENT_EXTENSION: &str = "docx";

/// Media type of stored and generated documents.
pub const DOCX_MEDIA_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Suffix inserted into the name of a filled document.
pub const FILLED_SUFFIX: &str = "preenchido";

/// Default ceiling on segments per block before the block is reported as fragmented.
pub const DEFAULT_MAX_SEGMENTS_PER_BLOCK: usize = 64;

/// Character that opens and closes a placeholder token.
pub const TOKEN_DELIMITER: char = '#';

/// Maximum length of a template name, in bytes.
pub const MAX_TEMPLATE_NAME_LEN: usize = 128;
