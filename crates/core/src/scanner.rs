//! Placeholder Scanner.
//!
//! Finds `#NAME#` tokens in the logical text of every block. Names are case-sensitive and
//! returned as a set.

use crate::constants::TOKEN_DELIMITER;
use crate::document::Document;
use crate::{TemplateError, TemplateResult};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Pattern of a well-formed token; group 1 is the variable name.
pub const TOKEN_PATTERN: &str = r"#([A-Za-z0-9_]+)#";

static TOKEN_REGEX: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(TOKEN_PATTERN));

fn token_regex() -> TemplateResult<&'static Regex> {
    TOKEN_REGEX
        .as_ref()
        .map_err(|e| TemplateError::InvalidInput(format!("token pattern does not compile: {}", e)))
}

/// Builds the token for `name`.
pub fn token(name: &str) -> String {
    format!("{0}{1}{0}", TOKEN_DELIMITER, name)
}

/// Distinct variable names of the tokens in `text`.
pub fn scan_text(text: &str) -> TemplateResult<BTreeSet<String>> {
    let regex = token_regex()?;
    Ok(regex
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_owned())
        .collect())
}

/// Distinct variable names of the tokens anywhere in `document`.
///
/// Tokens split across segments are found, since each block is scanned as a whole.
pub fn scan(document: &Document) -> TemplateResult<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    for block in document.blocks() {
        names.append(&mut scan_text(&block.logical_text())?);
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocxBuilder, Run};

    #[test]
    fn scan_text_finds_distinct_names() {
        let names = scan_text("#NOME# mora em #CIDADE#; #NOME# assina").unwrap();
        assert_eq!(
            names.into_iter().collect::<Vec<_>>(),
            vec!["CIDADE".to_string(), "NOME".to_string()]
        );
    }

    #[test]
    fn scan_text_ignores_malformed_tokens() {
        assert!(scan_text("# NOME # e #NOME COMPLETO# e ## e #-#").unwrap().is_empty());
    }

    #[test]
    fn scan_text_is_case_sensitive() {
        let names = scan_text("#nome# #NOME#").unwrap();
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn adjacent_tokens_are_both_found() {
        let names = scan_text("#A##B#").unwrap();
        assert!(names.contains("A") && names.contains("B"));
    }

    #[test]
    fn scan_covers_paragraphs_tables_and_split_tokens() {
        let bytes = DocxBuilder::new()
            .paragraph("Cliente: #NOME#")
            .runs([Run::bold("#CI"), Run::plain("DADE#")])
            .table(vec![vec![vec![Run::plain("Valor: #VALOR#")]]])
            .build()
            .unwrap();
        let document = Document::parse(&bytes).unwrap();

        let names = scan(&document).unwrap();

        assert_eq!(
            names.into_iter().collect::<Vec<_>>(),
            vec!["CIDADE".to_string(), "NOME".to_string(), "VALOR".to_string()]
        );
    }

    #[test]
    fn token_wraps_name_in_delimiters() {
        assert_eq!(token("NOME"), "#NOME#");
    }
}
