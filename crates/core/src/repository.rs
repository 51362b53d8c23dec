//! Template Repository.
//!
//! Durable storage of templates: one directory per template holding a YAML record and the
//! document snapshot it references, plus a shared append-only backup directory.
//!
//! ## Storage Layout
//!
//! ```text
//! <template_data_dir>/
//!   templates/
//!     <name>/
//!       template.yaml       # name, variables, version, document file + SHA-256
//!       document.v<N>.docx  # snapshot for version N
//!   backups/
//!     <name>_<YYYYMMDD_HHMMSS>.docx
//! ```
//!
//! ## Save Order
//!
//! 1. Render the document
//! 2. Back up the previous snapshot, if any
//! 3. Write the new versioned snapshot
//! 4. Replace `template.yaml` (the commit point)
//! 5. Remove the superseded snapshot
//!
//! A failure before step 4 leaves the previous record and snapshot in place.
//!
//! ## Concurrency
//!
//! Saves and loads of the same name are serialised by a per-name mutex. Different names do not
//! contend.

use crate::config::CoreConfig;
use crate::constants::{
    BACKUPS_DIR_NAME, DOCUMENT_EXTENSION, DOCUMENT_FILE_STEM, TEMPLATES_DIR_NAME,
    TEMPLATE_RECORD_FILENAME,
};
use crate::document::Document;
use crate::template::Template;
use crate::validation::{validate_template_name, validate_variable_set};
use crate::{TemplateError, TemplateResult};
use chrono::{DateTime, Utc};
use contrato_files::{FileMetadata, FilesError, FilesService};
use contrato_types::Sha256Hash;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// On-disk record of a template.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TemplateRecord {
    name: String,
    variables: Vec<String>,
    document_file: String,
    document_sha256: Sha256Hash,
    version: u64,
    last_modified: DateTime<Utc>,
}

/// Template metadata without the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateSummary {
    pub name: String,
    pub variables: Vec<String>,
    pub version: u64,
    pub last_modified: DateTime<Utc>,
}

impl From<TemplateRecord> for TemplateSummary {
    fn from(record: TemplateRecord) -> Self {
        Self {
            name: record.name,
            variables: record.variables,
            version: record.version,
            last_modified: record.last_modified,
        }
    }
}

/// Result of a successful save.
#[derive(Debug, Clone)]
pub struct SaveOutcome {
    pub version: u64,
    pub last_modified: DateTime<Utc>,
    /// Backup of the previous snapshot, relative to the data directory.
    pub backup: Option<PathBuf>,
    pub document: FileMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SaveMode {
    Create,
    Overwrite,
}

/// Durable template storage.
#[derive(Debug)]
pub struct TemplateRepository {
    files: FilesService,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TemplateRepository {
    /// Opens the repository under the configured data directory, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns `StorageDirCreation` if the directory cannot be created, or `Files` if it cannot
    /// be used as a storage root.
    pub fn new(cfg: Arc<CoreConfig>) -> TemplateResult<Self> {
        let data_dir = cfg.template_data_dir();
        fs::create_dir_all(data_dir).map_err(TemplateError::StorageDirCreation)?;

        Ok(Self {
            files: FilesService::new(data_dir)?,
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// Returns true if a template called `name` has been saved.
    pub fn exists(&self, name: &str) -> TemplateResult<bool> {
        validate_template_name(name)?;
        Ok(self.files.exists(&record_path(name))?)
    }

    /// Saves `template`, replacing any existing record of the same name.
    ///
    /// An existing snapshot is copied to the backup directory before anything is overwritten.
    pub fn save(&self, template: &Template) -> TemplateResult<SaveOutcome> {
        self.save_with(template, SaveMode::Overwrite)
    }

    /// Saves `template` only if no template of the same name exists.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTemplateName` if the name is taken.
    pub fn create(&self, template: &Template) -> TemplateResult<SaveOutcome> {
        self.save_with(template, SaveMode::Create)
    }

    fn save_with(&self, template: &Template, mode: SaveMode) -> TemplateResult<SaveOutcome> {
        validate_template_name(template.name())?;
        self.with_lock(template.name(), || self.save_locked(template, mode))
    }

    fn save_locked(&self, template: &Template, mode: SaveMode) -> TemplateResult<SaveOutcome> {
        let name = template.name();
        let bytes = template.document().to_bytes()?;
        let previous = self.read_record(name)?;

        if mode == SaveMode::Create && previous.is_some() {
            return Err(TemplateError::InvalidTemplateName(format!(
                "template {} already exists",
                name
            )));
        }

        let version = previous.as_ref().map_or(1, |r| r.version + 1);
        let now = Utc::now();

        let backup = match &previous {
            Some(record) => {
                let metadata = self.files.backup(
                    &template_dir(name).join(&record.document_file),
                    Path::new(BACKUPS_DIR_NAME),
                    name,
                    DOCUMENT_EXTENSION,
                    now,
                )?;
                Some(PathBuf::from(metadata.relative_path.as_str()))
            }
            None => None,
        };

        let document_file = document_file_name(version);
        let document = self
            .files
            .write(&template_dir(name).join(&document_file), &bytes)?;

        let record = TemplateRecord {
            name: name.to_owned(),
            variables: template.variables().to_vec(),
            document_file: document_file.clone(),
            document_sha256: document.hash.clone(),
            version,
            last_modified: now,
        };
        let yaml = serde_yaml::to_string(&record).map_err(TemplateError::YamlSerialization)?;
        self.files.write(&record_path(name), yaml.as_bytes())?;

        if let Some(previous) = previous.filter(|r| r.document_file != document_file) {
            let superseded = template_dir(name).join(&previous.document_file);
            if let Err(e) = self.files.remove(&superseded) {
                tracing::warn!(
                    "template {}: failed to remove superseded snapshot {}: {}",
                    name,
                    superseded.display(),
                    e
                );
            }
        }

        tracing::info!(
            "saved template {} version {} ({} bytes, {} variable(s))",
            name,
            version,
            document.size_bytes,
            record.variables.len()
        );

        Ok(SaveOutcome {
            version,
            last_modified: now,
            backup,
            document,
        })
    }

    /// Loads an independent copy of the template called `name`.
    ///
    /// # Errors
    ///
    /// - `TemplateNotFound` if no such template was saved
    /// - `MalformedDocument` if the snapshot fails its integrity check or cannot be parsed
    pub fn load(&self, name: &str) -> TemplateResult<Template> {
        validate_template_name(name)?;
        self.with_lock(name, || self.load_locked(name))
    }

    fn load_locked(&self, name: &str) -> TemplateResult<Template> {
        let record = self
            .read_record(name)?
            .ok_or_else(|| TemplateError::TemplateNotFound(name.to_owned()))?;
        validate_variable_set(&record.variables)?;

        let path = template_dir(name).join(&record.document_file);
        let bytes = match self.files.read_verified(&path, &record.document_sha256) {
            Ok(bytes) => bytes,
            Err(FilesError::IntegrityMismatch { expected, actual, .. }) => {
                return Err(TemplateError::MalformedDocument(format!(
                    "template {}: snapshot {} has digest {}, record expects {}",
                    name, record.document_file, actual, expected
                )));
            }
            Err(FilesError::FileNotFound(_)) => {
                return Err(TemplateError::MalformedDocument(format!(
                    "template {}: snapshot {} is missing",
                    name, record.document_file
                )));
            }
            Err(e) => return Err(e.into()),
        };
        let document = Document::parse(&bytes)?;

        tracing::info!("loaded template {} version {}", name, record.version);

        Ok(Template::new(name, record.variables, document)?
            .with_metadata(record.version, record.last_modified))
    }

    /// Loads the metadata of `name` without reading its document.
    pub fn summary(&self, name: &str) -> TemplateResult<TemplateSummary> {
        validate_template_name(name)?;
        self.with_lock(name, || {
            self.read_record(name)?
                .map(TemplateSummary::from)
                .ok_or_else(|| TemplateError::TemplateNotFound(name.to_owned()))
        })
    }

    /// Names of all saved templates, sorted.
    ///
    /// Directories without a record, or with a name that is not a valid template name, are
    /// skipped.
    pub fn list(&self) -> TemplateResult<Vec<String>> {
        let mut names = Vec::new();
        for dir in self.files.list_dirs(Path::new(TEMPLATES_DIR_NAME))? {
            if validate_template_name(&dir).is_err() {
                tracing::warn!("skipping directory with invalid template name: {:?}", dir);
                continue;
            }
            if self.files.exists(&record_path(&dir))? {
                names.push(dir);
            }
        }
        Ok(names)
    }

    /// Backups of `name`, oldest first, relative to the data directory.
    pub fn backups(&self, name: &str) -> TemplateResult<Vec<PathBuf>> {
        validate_template_name(name)?;
        Ok(self
            .files
            .list_backups(Path::new(BACKUPS_DIR_NAME), name, DOCUMENT_EXTENSION)?)
    }

    /// Absolute location of a path returned by this repository.
    pub fn resolve(&self, relative: &Path) -> PathBuf {
        self.files.root_directory().join(relative)
    }

    fn read_record(&self, name: &str) -> TemplateResult<Option<TemplateRecord>> {
        let bytes = match self.files.read(&record_path(name)) {
            Ok(bytes) => bytes,
            Err(FilesError::FileNotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let record: TemplateRecord =
            serde_yaml::from_slice(&bytes).map_err(TemplateError::YamlDeserialization)?;
        if record.name != name {
            return Err(TemplateError::InvalidTemplate(format!(
                "record in {} names template {}",
                name, record.name
            )));
        }
        Ok(Some(record))
    }

    /// Runs `f` while holding the per-name lock.
    fn with_lock<T>(&self, name: &str, f: impl FnOnce() -> TemplateResult<T>) -> TemplateResult<T> {
        let lock = self.lock_for(name);
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };
        self.release(name, lock);
        result
    }

    fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(name.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drops this caller's handle and forgets the lock once nobody else holds one.
    fn release(&self, name: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        if locks.get(name).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(name);
        }
    }
}

fn template_dir(name: &str) -> PathBuf {
    Path::new(TEMPLATES_DIR_NAME).join(name)
}

fn record_path(name: &str) -> PathBuf {
    template_dir(name).join(TEMPLATE_RECORD_FILENAME)
}

fn document_file_name(version: u64) -> String {
    format!("{}.v{}.{}", DOCUMENT_FILE_STEM, version, DOCUMENT_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_MAX_SEGMENTS_PER_BLOCK;
    use crate::document::DocxBuilder;
    use tempfile::TempDir;

    fn repository(temp: &TempDir) -> TemplateRepository {
        let cfg = CoreConfig::new(temp.path().join("data"), DEFAULT_MAX_SEGMENTS_PER_BLOCK).unwrap();
        TemplateRepository::new(Arc::new(cfg)).unwrap()
    }

    fn template(name: &str, text: &str, variables: &[&str]) -> Template {
        let bytes = DocxBuilder::new().paragraph(text).build().unwrap();
        Template::new(
            name,
            variables.iter().map(|v| v.to_string()).collect(),
            Document::parse(&bytes).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn save_then_load_round_trips() {
        let temp = TempDir::new().unwrap();
        let repo = repository(&temp);

        let outcome = repo
            .save(&template("modelo1", "Cliente: #NOME#", &["NOME"]))
            .unwrap();
        assert_eq!(outcome.version, 1);
        assert!(outcome.backup.is_none());

        let loaded = repo.load("modelo1").unwrap();
        assert_eq!(loaded.name(), "modelo1");
        assert_eq!(loaded.variables(), ["NOME"]);
        assert_eq!(loaded.version(), 1);
        assert_eq!(loaded.last_modified(), outcome.last_modified);
        assert_eq!(loaded.document().text(), "Cliente: #NOME#");
    }

    #[test]
    fn record_is_yaml_next_to_versioned_snapshot() {
        let temp = TempDir::new().unwrap();
        let repo = repository(&temp);
        repo.save(&template("modelo1", "#A#", &["A"])).unwrap();

        let dir = temp.path().join("data/templates/modelo1");
        let yaml = fs::read_to_string(dir.join("template.yaml")).unwrap();
        assert!(yaml.contains("name: modelo1"));
        assert!(yaml.contains("document_file: document.v1.docx"));
        assert!(yaml.contains("- A"));
        assert!(dir.join("document.v1.docx").is_file());
    }

    #[test]
    fn overwrite_backs_up_previous_snapshot_exactly_once() {
        let temp = TempDir::new().unwrap();
        let repo = repository(&temp);

        repo.save(&template("modelo1", "versão 1 #A#", &["A"])).unwrap();
        let previous_bytes =
            fs::read(temp.path().join("data/templates/modelo1/document.v1.docx")).unwrap();

        let outcome = repo
            .save(&template("modelo1", "versão 2 #A#", &["A"]))
            .unwrap();

        assert_eq!(outcome.version, 2);
        let backups = repo.backups("modelo1").unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(outcome.backup.as_ref(), Some(&backups[0]));
        assert_eq!(fs::read(repo.resolve(&backups[0])).unwrap(), previous_bytes);

        let dir = temp.path().join("data/templates/modelo1");
        assert!(!dir.join("document.v1.docx").exists());
        assert!(dir.join("document.v2.docx").is_file());
        assert_eq!(repo.load("modelo1").unwrap().document().text(), "versão 2 #A#");
    }

    #[test]
    fn repeated_saves_never_overwrite_backups() {
        let temp = TempDir::new().unwrap();
        let repo = repository(&temp);

        for i in 0..4 {
            repo.save(&template("modelo1", &format!("v{} #A#", i), &["A"]))
                .unwrap();
        }

        assert_eq!(repo.backups("modelo1").unwrap().len(), 3);
        assert_eq!(repo.load("modelo1").unwrap().version(), 4);
    }

    #[test]
    fn create_refuses_existing_name() {
        let temp = TempDir::new().unwrap();
        let repo = repository(&temp);
        repo.create(&template("modelo1", "#A#", &["A"])).unwrap();

        let result = repo.create(&template("modelo1", "#B#", &["B"]));

        assert!(matches!(result, Err(TemplateError::InvalidTemplateName(_))));
        assert!(repo.backups("modelo1").unwrap().is_empty());
        assert_eq!(repo.load("modelo1").unwrap().variables(), ["A"]);
    }

    #[test]
    fn load_unknown_template_is_not_found() {
        let temp = TempDir::new().unwrap();
        let repo = repository(&temp);

        assert!(matches!(
            repo.load("inexistente"),
            Err(TemplateError::TemplateNotFound(name)) if name == "inexistente"
        ));
        assert!(matches!(
            repo.summary("inexistente"),
            Err(TemplateError::TemplateNotFound(_))
        ));
    }

    #[test]
    fn load_detects_tampered_snapshot() {
        let temp = TempDir::new().unwrap();
        let repo = repository(&temp);
        repo.save(&template("modelo1", "#A#", &["A"])).unwrap();

        let other = DocxBuilder::new().paragraph("alterado").build().unwrap();
        fs::write(
            temp.path().join("data/templates/modelo1/document.v1.docx"),
            other,
        )
        .unwrap();

        assert!(matches!(
            repo.load("modelo1"),
            Err(TemplateError::MalformedDocument(_))
        ));
    }

    #[test]
    fn loaded_templates_are_independent_snapshots() {
        let temp = TempDir::new().unwrap();
        let repo = repository(&temp);
        repo.save(&template("modelo1", "#A#", &["A"])).unwrap();

        let mut first = repo.load("modelo1").unwrap();
        let mut document = first.document().clone();
        crate::rewriter::replace_all(&mut document, "#A#", "x");
        first = Template::new("modelo1", vec!["A".into()], document).unwrap();

        assert_eq!(first.document().text(), "x");
        assert_eq!(repo.load("modelo1").unwrap().document().text(), "#A#");
    }

    #[test]
    fn list_returns_saved_names_only() {
        let temp = TempDir::new().unwrap();
        let repo = repository(&temp);
        assert!(repo.list().unwrap().is_empty());

        repo.save(&template("b", "#A#", &["A"])).unwrap();
        repo.save(&template("a", "#A#", &["A"])).unwrap();
        fs::create_dir_all(temp.path().join("data/templates/sem-registro")).unwrap();

        assert_eq!(repo.list().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn summary_reads_metadata() {
        let temp = TempDir::new().unwrap();
        let repo = repository(&temp);
        repo.save(&template("modelo1", "#A# #B#", &["A", "B"])).unwrap();

        let summary = repo.summary("modelo1").unwrap();

        assert_eq!(summary.variables, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(summary.version, 1);
    }

    #[test]
    fn concurrent_saves_of_same_name_are_serialised() {
        let temp = TempDir::new().unwrap();
        let repo = Arc::new(repository(&temp));
        repo.save(&template("modelo1", "#A#", &["A"])).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let repo = Arc::clone(&repo);
                std::thread::spawn(move || {
                    repo.save(&template("modelo1", &format!("{} #A#", i), &["A"]))
                        .unwrap()
                        .version
                })
            })
            .collect();

        let mut versions: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        versions.sort_unstable();

        assert_eq!(versions, (2..=9).collect::<Vec<u64>>());
        assert_eq!(repo.backups("modelo1").unwrap().len(), 8);
        assert_eq!(repo.load("modelo1").unwrap().version(), 9);
        assert!(repo.locks.lock().unwrap().is_empty());
    }

    #[test]
    fn per_name_locks_are_released_after_use() {
        let temp = TempDir::new().unwrap();
        let repo = repository(&temp);

        for i in 0..5 {
            let name = format!("modelo{}", i);
            repo.save(&template(&name, "#A#", &["A"])).unwrap();
            repo.load(&name).unwrap();
            repo.summary(&name).unwrap();
        }
        assert!(repo.load("ausente").is_err());

        assert!(repo.locks.lock().unwrap().is_empty());
    }
}
