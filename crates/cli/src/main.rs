use clap::{Parser, Subcommand};
use contrato_core::constants::DEFAULT_TEMPLATE_DATA_DIR;
use contrato_core::{
    max_segments_from_env_value, scanner, CoreConfig, Document, ReviewReport, SavePolicy,
    TemplateDraft, TemplateError, TemplateService,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "contrato")]
#[command(about = "Contract template CLI: mark placeholders, save templates, fill contracts")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List saved templates
    List,
    /// List the #NAME# tokens found in a document
    Scan {
        /// Path to a .docx document
        document: PathBuf,
    },
    /// Replace every occurrence of a text with a #NAME# token
    Mark {
        /// Path to a .docx document
        document: PathBuf,
        /// Text to replace, matched literally
        #[arg(long)]
        selection: String,
        /// Variable name ([A-Za-z0-9_]+)
        #[arg(long)]
        name: String,
        /// Where to write the marked document (defaults to overwriting the input)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Save a document as a template
    Create {
        /// Template name
        name: String,
        /// Path to a .docx document containing #NAME# tokens
        document: PathBuf,
        /// Declared variable (repeatable); defaults to the tokens found in the document
        #[arg(long = "variable")]
        variables: Vec<String>,
        /// Replace an existing template of the same name (its document is backed up)
        #[arg(long)]
        replace: bool,
        /// Save even if the review reports warnings
        #[arg(long)]
        force: bool,
    },
    /// Review a saved template against its document
    Review {
        /// Template name
        name: String,
    },
    /// Fill a template and write the resulting document
    Fill {
        /// Template name
        name: String,
        /// Variable value as NAME=VALUE (repeatable)
        #[arg(long = "value", value_parser = parse_binding)]
        values: Vec<(String, String)>,
        /// Output path (defaults to <name>_preenchido.docx)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List backups of a template, oldest first
    Backups {
        /// Template name
        name: String,
    },
}

fn parse_binding(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got {:?}", raw)),
    }
}

fn load_document(path: &Path) -> Result<Document, Box<dyn std::error::Error>> {
    let bytes = std::fs::read(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    Ok(Document::parse(&bytes)?)
}

fn print_review(report: &ReviewReport) {
    println!(
        "Declared:   {}",
        report.declared.iter().cloned().collect::<Vec<_>>().join(", ")
    );
    println!(
        "Discovered: {}",
        report.discovered.iter().cloned().collect::<Vec<_>>().join(", ")
    );
    if report.has_warnings() {
        for warning in report.warnings() {
            println!("warning: {}", warning);
        }
    } else {
        println!("No problems found.");
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::from_default_env()
                .add_directive("contrato=warn".parse()?)
                .add_directive("contrato_core=warn".parse()?),
        )
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let data_dir = std::env::var("CONTRATO_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_TEMPLATE_DATA_DIR));
    let max_segments = max_segments_from_env_value(std::env::var("CONTRATO_MAX_SEGMENTS").ok())?;
    let cfg = Arc::new(CoreConfig::new(data_dir, max_segments)?);

    let mut failed = false;

    match cli.command {
        Some(Commands::List) => {
            let service = TemplateService::new(cfg)?;
            match service.list_templates() {
                Ok(names) if names.is_empty() => println!("No templates found."),
                Ok(names) => {
                    for name in names {
                        match service.template_summary(&name) {
                            Ok(summary) => println!(
                                "{} (v{}, {} variable(s), modified {})",
                                summary.name,
                                summary.version,
                                summary.variables.len(),
                                summary.last_modified.format("%Y-%m-%d %H:%M:%S")
                            ),
                            Err(e) => println!("{} (unreadable: {})", name, e),
                        }
                    }
                }
                Err(e) => {
                    eprintln!("Error listing templates: {}", e);
                    failed = true;
                }
            }
        }
        Some(Commands::Scan { document }) => {
            let doc = load_document(&document)?;
            match scanner::scan(&doc) {
                Ok(names) if names.is_empty() => println!("No tokens found."),
                Ok(names) => {
                    for name in names {
                        println!("{}", scanner::token(&name));
                    }
                }
                Err(e) => {
                    eprintln!("Error scanning document: {}", e);
                    failed = true;
                }
            }
        }
        Some(Commands::Mark {
            document,
            selection,
            name,
            output,
        }) => {
            let service = TemplateService::new(cfg)?;
            let mut doc = load_document(&document)?;
            match service.mark(&mut doc, &selection, &name) {
                Ok(outcome) => {
                    let target = output.unwrap_or(document);
                    std::fs::write(&target, doc.to_bytes()?)?;
                    println!(
                        "Marked {} occurrence(s) as {} in {}",
                        outcome.summary.occurrences,
                        outcome.token,
                        target.display()
                    );
                    if outcome.summary.collapsed_blocks > 0 {
                        println!(
                            "note: {} paragraph(s) had their formatting merged",
                            outcome.summary.collapsed_blocks
                        );
                    }
                }
                Err(e) => {
                    eprintln!("Error marking document: {}", e);
                    failed = true;
                }
            }
        }
        Some(Commands::Create {
            name,
            document,
            variables,
            replace,
            force,
        }) => {
            let service = TemplateService::new(cfg)?;
            let mut draft = TemplateDraft::new(load_document(&document)?);
            if variables.is_empty() {
                draft.declare_discovered()?;
            } else {
                for variable in &variables {
                    draft.declare(variable)?;
                }
            }

            let policy = if force {
                SavePolicy::Override
            } else {
                SavePolicy::Strict
            };
            let result = draft.into_template(&name).and_then(|template| {
                if replace {
                    service.save_template(&template, policy)
                } else {
                    service.create_template(&template, policy)
                }
            });

            match result {
                Ok(saved) => {
                    println!("Saved template {} version {}", name, saved.outcome.version);
                    if let Some(backup) = saved.outcome.backup {
                        println!("Previous document backed up to {}", backup.display());
                    }
                    for warning in saved.review.warnings() {
                        println!("warning: {}", warning);
                    }
                }
                Err(TemplateError::Inconsistent(report)) => {
                    eprintln!("Template {} was not saved:", name);
                    for warning in report.warnings() {
                        eprintln!("  {}", warning);
                    }
                    eprintln!("Use --force to save anyway.");
                    failed = true;
                }
                Err(e) => {
                    eprintln!("Error saving template: {}", e);
                    failed = true;
                }
            }
        }
        Some(Commands::Review { name }) => {
            let service = TemplateService::new(cfg)?;
            match service.review_template(&name) {
                Ok(report) => print_review(&report),
                Err(e) => {
                    eprintln!("Error reviewing template: {}", e);
                    failed = true;
                }
            }
        }
        Some(Commands::Fill {
            name,
            values,
            output,
        }) => {
            let service = TemplateService::new(cfg)?;
            let values: HashMap<String, String> = values.into_iter().collect();
            match service.fill(&name, &values) {
                Ok(contract) => {
                    let target =
                        output.unwrap_or_else(|| PathBuf::from(contract.suggested_filename()));
                    std::fs::write(&target, &contract.bytes)?;
                    println!(
                        "Wrote {} ({} substitution(s))",
                        target.display(),
                        contract.substitutions.occurrences
                    );
                }
                Err(e) => {
                    eprintln!("Error filling template: {}", e);
                    failed = true;
                }
            }
        }
        Some(Commands::Backups { name }) => {
            let service = TemplateService::new(cfg)?;
            match service.list_backups(&name) {
                Ok(paths) if paths.is_empty() => println!("No backups found for {}.", name),
                Ok(paths) => {
                    for path in paths {
                        println!("{}", path.display());
                    }
                }
                Err(e) => {
                    eprintln!("Error listing backups: {}", e);
                    failed = true;
                }
            }
        }
        None => {
            println!("Use 'contrato --help' for commands");
        }
    }

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_binding_splits_on_first_equals() {
        assert_eq!(
            parse_binding("NOME=Acme=Ltda").unwrap(),
            ("NOME".to_string(), "Acme=Ltda".to_string())
        );
        assert_eq!(
            parse_binding("NOME=").unwrap(),
            ("NOME".to_string(), String::new())
        );
    }

    #[test]
    fn parse_binding_requires_name() {
        assert!(parse_binding("=Acme").is_err());
        assert!(parse_binding("NOME").is_err());
    }

    #[test]
    fn cli_parses_repeated_values() {
        let cli = Cli::try_parse_from([
            "contrato", "fill", "modelo1", "--value", "NOME=Acme", "--value", "CIDADE=Maringá",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::Fill { name, values, output }) => {
                assert_eq!(name, "modelo1");
                assert_eq!(values.len(), 2);
                assert!(output.is_none());
            }
            _ => panic!("expected fill"),
        }
    }
}
