//! Input validation utilities.
//!
//! This module contains functions for validating template names and variable names before
//! they are used to build file paths or placeholder tokens.

use crate::constants::MAX_TEMPLATE_NAME_LEN;
use crate::{TemplateError, TemplateResult};
use std::collections::HashSet;

/// Validates that a template name is safe to use as a directory and backup file stem.
///
/// The name becomes `templates/<name>/` and `backups/<name>_<timestamp>.docx`, so:
/// - Rejects empty or whitespace-only strings
/// - Bounds the length to avoid pathological inputs
/// - Restricts characters to ASCII letters, digits, space, '.', '-' and '_'
/// - Rejects a leading '.' or space, which would hide the directory or make `..` possible
///
/// # Errors
///
/// Returns a `TemplateError::InvalidTemplateName` if the name is invalid.
pub fn validate_template_name(name: &str) -> TemplateResult<()> {
    if name.trim().is_empty() {
        return Err(TemplateError::InvalidTemplateName(
            "template name cannot be empty".into(),
        ));
    }

    if name.len() > MAX_TEMPLATE_NAME_LEN {
        return Err(TemplateError::InvalidTemplateName(format!(
            "template name exceeds maximum length of {} characters",
            MAX_TEMPLATE_NAME_LEN
        )));
    }

    let ok = name.bytes().all(|b| {
        matches!(b, b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' | b' ' | b'.' | b'-' | b'_')
    });
    if !ok {
        return Err(TemplateError::InvalidTemplateName(format!(
            "{:?} contains invalid characters (only alphanumeric, space, '.', '-', '_' allowed)",
            name
        )));
    }

    if name.starts_with('.') || name.starts_with(' ') {
        return Err(TemplateError::InvalidTemplateName(format!(
            "{:?} must not start with '.' or a space",
            name
        )));
    }

    Ok(())
}

/// Returns true if `name` can appear between the `#` delimiters of a token.
pub fn is_variable_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' | b'_'))
}

/// Validates a single variable name against `[A-Za-z0-9_]+`.
///
/// # Errors
///
/// Returns a `TemplateError::InvalidInput` if the name is empty or contains other characters.
pub fn validate_variable_name(name: &str) -> TemplateResult<()> {
    if is_variable_name(name) {
        Ok(())
    } else {
        Err(TemplateError::InvalidInput(format!(
            "variable name {:?} must match [A-Za-z0-9_]+",
            name
        )))
    }
}

/// Validates a declared variable list: every name well-formed, no name repeated.
pub fn validate_variable_set(variables: &[String]) -> TemplateResult<()> {
    let mut seen = HashSet::with_capacity(variables.len());
    for name in variables {
        validate_variable_name(name)?;
        if !seen.insert(name.as_str()) {
            return Err(TemplateError::InvalidTemplate(format!(
                "variable {} is declared more than once",
                name
            )));
        }
    }
    Ok(())
}
