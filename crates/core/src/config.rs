//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. Library code never reads environment variables while handling a
//! request, so every service built from the same `CoreConfig` sees the same settings.

use crate::constants::{
    BACKUPS_DIR_NAME, DEFAULT_MAX_SEGMENTS_PER_BLOCK, TEMPLATES_DIR_NAME,
};
use crate::{TemplateError, TemplateResult};
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    template_data_dir: PathBuf,
    max_segments_per_block: usize,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns `TemplateError::InvalidInput` if `max_segments_per_block` is zero.
    pub fn new(template_data_dir: PathBuf, max_segments_per_block: usize) -> TemplateResult<Self> {
        if max_segments_per_block == 0 {
            return Err(TemplateError::InvalidInput(
                "max_segments_per_block must be at least 1".into(),
            ));
        }

        Ok(Self {
            template_data_dir,
            max_segments_per_block,
        })
    }

    pub fn template_data_dir(&self) -> &Path {
        &self.template_data_dir
    }

    /// Directory holding one subdirectory per template.
    pub fn templates_dir(&self) -> PathBuf {
        self.template_data_dir.join(TEMPLATES_DIR_NAME)
    }

    /// Directory receiving document backups.
    pub fn backups_dir(&self) -> PathBuf {
        self.template_data_dir.join(BACKUPS_DIR_NAME)
    }

    pub fn max_segments_per_block(&self) -> usize {
        self.max_segments_per_block
    }
}

/// Parse the fragmentation ceiling from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns [`DEFAULT_MAX_SEGMENTS_PER_BLOCK`].
pub fn max_segments_from_env_value(value: Option<String>) -> TemplateResult<usize> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    let Some(value) = value else {
        return Ok(DEFAULT_MAX_SEGMENTS_PER_BLOCK);
    };

    match value.parse::<usize>() {
        Ok(0) | Err(_) => Err(TemplateError::InvalidInput(format!(
            "max segments per block must be a positive integer, got {:?}",
            value
        ))),
        Ok(n) => Ok(n),
    }
}
