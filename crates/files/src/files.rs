//! Root-scoped file storage service implementation
//!
//! This module provides [`FilesService`], which owns every byte contrato writes to disk for a
//! template: document snapshots, template records and backups.
//!
//! # Atomic Writes
//!
//! [`FilesService::write`] writes to `<target>.tmp`, flushes it to disk and renames it over the
//! target. Readers therefore observe either the old file or the complete new file, never a
//! partially written one.
//!
//! # Backups
//!
//! [`FilesService::backup`] copies an existing file into a backup directory under the name
//! `{stem}_{YYYYMMDD_HHMMSS}.{ext}`. The file is opened with `create_new`, so an existing backup
//! is never replaced. Two backups of the same stem in the same second get a `_<n>` suffix.
//!
//! # Security Model
//!
//! - The root directory is canonicalised at construction time
//! - Relative paths must not be absolute and must not contain `..` components
//! - The service is stateless apart from its root; it implements `Debug` and `Clone`

use crate::constants::{BACKUP_TIMESTAMP_FORMAT, HASH_ALGORITHM, MAX_BACKUP_ATTEMPTS, TEMP_SUFFIX};
use crate::FilesError;
use chrono::{DateTime, Utc};
use contrato_types::{NonEmptyText, Sha256Hash};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};

/// Metadata for a stored file
///
/// Describes one file written by [`FilesService`]: its digest, where it lives relative to the
/// root directory, its size and a best-effort media type.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct FileMetadata {
    /// Hashing algorithm used (always "sha256" for current implementation)
    pub hash_algorithm: NonEmptyText,

    /// Hexadecimal digest of the file content
    pub hash: Sha256Hash,

    /// Path relative to the root directory where the file is stored
    pub relative_path: NonEmptyText,

    /// Size of the file in bytes
    pub size_bytes: u64,

    /// Detected media type (MIME type), if available
    ///
    /// This is a best-effort detection and should not be considered authoritative.
    pub media_type: Option<NonEmptyText>,

    /// UTC timestamp when the file was stored
    pub stored_at: DateTime<Utc>,
}

/// Computes the SHA-256 digest of `bytes`.
pub fn sha256_digest(bytes: &[u8]) -> Result<Sha256Hash, FilesError> {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Ok(Sha256Hash::parse(&hex::encode(hasher.finalize()))?)
}

/// Builds the file name for a backup of `stem` taken at `at`.
///
/// `attempt` 0 yields `{stem}_{YYYYMMDD_HHMMSS}.{extension}`; later attempts append `_<n>`
/// before the extension.
pub fn backup_file_name(stem: &str, extension: &str, at: DateTime<Utc>, attempt: usize) -> String {
    let timestamp = at.format(BACKUP_TIMESTAMP_FORMAT);
    if attempt == 0 {
        format!("{}_{}.{}", stem, timestamp, extension)
    } else {
        format!("{}_{}_{}.{}", stem, timestamp, attempt, extension)
    }
}

/// Returns true if `file_name` is a backup produced by [`backup_file_name`] for `stem`.
fn is_backup_of(file_name: &str, stem: &str, extension: &str) -> bool {
    let Some(rest) = file_name.strip_prefix(stem) else {
        return false;
    };
    let Some(rest) = rest.strip_prefix('_') else {
        return false;
    };
    let Some(rest) = rest.strip_suffix(extension) else {
        return false;
    };
    let Some(rest) = rest.strip_suffix('.') else {
        return false;
    };

    let bytes = rest.as_bytes();
    if bytes.len() < 15 {
        return false;
    }
    let (timestamp, counter) = bytes.split_at(15);
    let timestamp_ok = timestamp
        .iter()
        .enumerate()
        .all(|(i, b)| if i == 8 { *b == b'_' } else { b.is_ascii_digit() });
    if !timestamp_ok {
        return false;
    }

    match counter.split_first() {
        None => true,
        Some((b'_', digits)) => !digits.is_empty() && digits.iter().all(u8::is_ascii_digit),
        Some(_) => false,
    }
}

/// Runs `write`, removing whatever it left at `path` if it fails.
fn write_or_remove(
    path: &Path,
    write: impl FnOnce() -> std::io::Result<()>,
) -> std::io::Result<()> {
    write().inspect_err(|e| {
        if let Err(cleanup) = fs::remove_file(path) {
            if cleanup.kind() != ErrorKind::NotFound {
                tracing::warn!(
                    "failed to remove partial file {} after {}: {}",
                    path.display(),
                    e,
                    cleanup
                );
            }
        }
    })
}

/// Sort key for a backup name: its timestamp, then its `_<n>` counter.
fn backup_order_key(file_name: &str, stem: &str) -> (String, usize) {
    let rest = file_name.get(stem.len() + 1..).unwrap_or("");
    let timestamp = rest.get(..15).unwrap_or(rest).to_owned();
    let counter = rest
        .get(16..)
        .and_then(|tail| tail.split('.').next())
        .and_then(|digits| digits.parse().ok())
        .unwrap_or(0);
    (timestamp, counter)
}

/// Service for managing files beneath one root directory
///
/// # Design
///
/// - Root-scoped: every operation resolves paths against the canonical root
/// - Atomic: writes are staged in a temporary sibling and renamed into place
/// - Append-only backups: backup files are created with `create_new`
#[derive(Debug, Clone)]
pub struct FilesService {
    /// Canonical root directory
    root_directory: PathBuf,
}

impl FilesService {
    /// Creates a new `FilesService` rooted at `root_directory`
    ///
    /// # Errors
    ///
    /// Returns `FilesError::InvalidRootDirectory` if:
    /// - The root directory does not exist or is not a directory
    /// - Path canonicalisation fails
    pub fn new(root_directory: &Path) -> Result<Self, FilesError> {
        if !root_directory.exists() {
            return Err(FilesError::InvalidRootDirectory(format!(
                "Directory does not exist: {}",
                root_directory.display()
            )));
        }

        if !root_directory.is_dir() {
            return Err(FilesError::InvalidRootDirectory(format!(
                "Path is not a directory: {}",
                root_directory.display()
            )));
        }

        let root_directory = root_directory.canonicalize().map_err(|e| {
            FilesError::InvalidRootDirectory(format!(
                "Cannot canonicalize path {}: {}",
                root_directory.display(),
                e
            ))
        })?;

        Ok(Self { root_directory })
    }

    /// Returns the canonical root directory
    #[must_use]
    pub fn root_directory(&self) -> &Path {
        &self.root_directory
    }

    /// Returns true if a regular file exists at `relative_path`.
    pub fn exists(&self, relative_path: &Path) -> Result<bool, FilesError> {
        Ok(self.resolve(relative_path)?.is_file())
    }

    /// Atomically writes `bytes` to `relative_path`, creating parent directories as needed
    ///
    /// # Errors
    ///
    /// Returns `FilesError` if:
    /// - `relative_path` is unsafe (absolute, empty or containing `..`)
    /// - Directory creation, the staged write or the final rename fails (I/O)
    pub fn write(&self, relative_path: &Path, bytes: &[u8]) -> Result<FileMetadata, FilesError> {
        let target = self.resolve(relative_path)?;

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                FilesError::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to create directory {}: {}", parent.display(), e),
                ))
            })?;
        }

        let mut staged = target.clone().into_os_string();
        staged.push(TEMP_SUFFIX);
        let staged = PathBuf::from(staged);

        let staged_write = write_or_remove(&staged, || {
            let mut file = fs::File::create(&staged)?;
            file.write_all(bytes)?;
            file.sync_all()
        });
        if let Err(e) = staged_write {
            return Err(FilesError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to write {}: {}", staged.display(), e),
            )));
        }

        fs::rename(&staged, &target).map_err(|e| {
            let _ = fs::remove_file(&staged);
            FilesError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to move file into {}: {}", target.display(), e),
            ))
        })?;

        self.describe(relative_path, bytes)
    }

    /// Reads the file at `relative_path`
    ///
    /// # Errors
    ///
    /// Returns `FilesError::FileNotFound` if nothing is stored there, or `FilesError::Io` if the
    /// file cannot be read.
    pub fn read(&self, relative_path: &Path) -> Result<Vec<u8>, FilesError> {
        let path = self.resolve(relative_path)?;

        if !path.is_file() {
            return Err(FilesError::FileNotFound(relative_path.display().to_string()));
        }

        fs::read(&path).map_err(|e| {
            FilesError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read file from {}: {}", path.display(), e),
            ))
        })
    }

    /// Reads the file at `relative_path` and checks it against `expected`
    ///
    /// # Errors
    ///
    /// In addition to the errors of [`FilesService::read`], returns
    /// `FilesError::IntegrityMismatch` if the digest differs.
    pub fn read_verified(
        &self,
        relative_path: &Path,
        expected: &Sha256Hash,
    ) -> Result<Vec<u8>, FilesError> {
        let bytes = self.read(relative_path)?;
        let actual = sha256_digest(&bytes)?;
        if &actual != expected {
            return Err(FilesError::IntegrityMismatch {
                path: relative_path.display().to_string(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(bytes)
    }

    /// Removes the file at `relative_path`; a missing file is not an error.
    pub fn remove(&self, relative_path: &Path) -> Result<(), FilesError> {
        let path = self.resolve(relative_path)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FilesError::Io(e)),
        }
    }

    /// Copies the file at `source` into `backup_dir` under a timestamp-qualified name
    ///
    /// # Arguments
    ///
    /// * `source` - Relative path of the file to back up
    /// * `backup_dir` - Relative directory receiving the backup (created if missing)
    /// * `stem` - Leading part of the backup name, usually the template name
    /// * `extension` - Extension of the backup file, without the dot
    /// * `at` - Timestamp encoded into the name
    ///
    /// # Errors
    ///
    /// Returns `FilesError` if the source cannot be read, the backup cannot be created, or
    /// every `_<n>` suffix for that second is already taken.
    pub fn backup(
        &self,
        source: &Path,
        backup_dir: &Path,
        stem: &str,
        extension: &str,
        at: DateTime<Utc>,
    ) -> Result<FileMetadata, FilesError> {
        let bytes = self.read(source)?;
        let dir = self.resolve(backup_dir)?;
        fs::create_dir_all(&dir)?;

        for attempt in 0..MAX_BACKUP_ATTEMPTS {
            let file_name = backup_file_name(stem, extension, at, attempt);
            let relative = backup_dir.join(&file_name);
            let candidate = dir.join(&file_name);

            let mut file = match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
            {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(FilesError::Io(e)),
            };

            write_or_remove(&candidate, || {
                file.write_all(&bytes)?;
                file.sync_all()
            })?;

            tracing::info!(
                "backed up {} to {}",
                source.display(),
                relative.display()
            );
            return self.describe(&relative, &bytes);
        }

        Err(FilesError::BackupNameExhausted(stem.to_owned()))
    }

    /// Lists the backups of `stem` in `backup_dir`, oldest first
    ///
    /// Returns relative paths. A missing backup directory yields an empty list.
    pub fn list_backups(
        &self,
        backup_dir: &Path,
        stem: &str,
        extension: &str,
    ) -> Result<Vec<PathBuf>, FilesError> {
        let dir = self.resolve(backup_dir)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(FilesError::Io(e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if is_backup_of(&name, stem, extension) {
                names.push(name);
            }
        }

        names.sort_by_cached_key(|name| backup_order_key(name, stem));
        Ok(names.into_iter().map(|n| backup_dir.join(n)).collect())
    }

    /// Lists the names of the immediate subdirectories of `relative_dir`.
    pub fn list_dirs(&self, relative_dir: &Path) -> Result<Vec<String>, FilesError> {
        let dir = self.resolve(relative_dir)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(FilesError::Io(e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            match entry.file_name().to_str() {
                Some(name) => names.push(name.to_owned()),
                None => tracing::warn!(
                    "skipping non UTF-8 directory name under {}",
                    dir.display()
                ),
            }
        }
        names.sort();
        Ok(names)
    }

    /// Resolves a relative path against the root, rejecting anything that could escape it.
    fn resolve(&self, relative_path: &Path) -> Result<PathBuf, FilesError> {
        if relative_path.as_os_str().is_empty() {
            return Err(FilesError::InvalidPath("path is empty".into()));
        }

        for component in relative_path.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(FilesError::InvalidPath(format!(
                        "path must stay within the root directory: {}",
                        relative_path.display()
                    )));
                }
            }
        }

        Ok(self.root_directory.join(relative_path))
    }

    fn describe(&self, relative_path: &Path, bytes: &[u8]) -> Result<FileMetadata, FilesError> {
        let media_type = match infer::get(bytes) {
            Some(kind) => Some(NonEmptyText::new(kind.mime_type())?),
            None => None,
        };

        Ok(FileMetadata {
            hash_algorithm: NonEmptyText::new(HASH_ALGORITHM)?,
            hash: sha256_digest(bytes)?,
            relative_path: NonEmptyText::new(relative_path.to_string_lossy())?,
            size_bytes: bytes.len() as u64,
            media_type,
            stored_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn service(temp: &TempDir) -> FilesService {
        FilesService::new(temp.path()).expect("valid root")
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 12, 0, 5).unwrap()
    }

    #[test]
    fn test_files_service_root_not_exists() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("non-existent");

        let service = FilesService::new(&root);

        assert!(matches!(service, Err(FilesError::InvalidRootDirectory(_))));
    }

    #[test]
    fn test_files_service_root_not_directory() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("file.txt");
        fs::write(&root, "not a directory").unwrap();

        let service = FilesService::new(&root);

        assert!(matches!(service, Err(FilesError::InvalidRootDirectory(_))));
    }

    #[test]
    fn test_write_then_read() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp);

        let metadata = service
            .write(Path::new("templates/modelo1/document.v1.docx"), b"Hello, World!")
            .unwrap();

        assert_eq!(metadata.hash_algorithm.as_str(), "sha256");
        assert_eq!(metadata.size_bytes, 13);
        assert_eq!(metadata.hash.as_str().len(), 64);
        assert_eq!(
            metadata.relative_path.as_str(),
            "templates/modelo1/document.v1.docx"
        );

        let bytes = service
            .read(Path::new("templates/modelo1/document.v1.docx"))
            .unwrap();
        assert_eq!(bytes, b"Hello, World!");
    }

    #[test]
    fn test_write_replaces_existing_and_leaves_no_staging_file() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp);
        let path = Path::new("templates/a/template.yaml");

        service.write(path, b"first").unwrap();
        service.write(path, b"second").unwrap();

        assert_eq!(service.read(path).unwrap(), b"second");
        assert!(!temp.path().join("templates/a/template.yaml.tmp").exists());
    }

    #[test]
    fn test_write_detects_media_type() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp);

        let png_header = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        let metadata = service.write(Path::new("image.png"), &png_header).unwrap();

        assert_eq!(
            metadata.media_type.as_ref().map(|t| t.as_str()),
            Some("image/png")
        );
    }

    #[test]
    fn test_rejects_paths_escaping_root() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp);

        assert!(matches!(
            service.write(Path::new("../outside"), b"x"),
            Err(FilesError::InvalidPath(_))
        ));
        assert!(matches!(
            service.read(Path::new("/etc/passwd")),
            Err(FilesError::InvalidPath(_))
        ));
        assert!(matches!(
            service.read(Path::new("")),
            Err(FilesError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_read_missing_file() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp);

        let result = service.read(Path::new("missing.docx"));

        assert!(matches!(result, Err(FilesError::FileNotFound(_))));
    }

    #[test]
    fn test_read_verified_detects_tampering() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp);
        let path = Path::new("doc.docx");

        let metadata = service.write(path, b"original").unwrap();
        assert_eq!(service.read_verified(path, &metadata.hash).unwrap(), b"original");

        fs::write(temp.path().join("doc.docx"), b"tampered").unwrap();
        let result = service.read_verified(path, &metadata.hash);
        assert!(matches!(result, Err(FilesError::IntegrityMismatch { .. })));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp);
        let path = Path::new("doc.docx");

        service.write(path, b"x").unwrap();
        service.remove(path).unwrap();
        service.remove(path).unwrap();

        assert!(!service.exists(path).unwrap());
    }

    #[test]
    fn test_backup_file_name_format() {
        assert_eq!(
            backup_file_name("modelo1", "docx", noon(), 0),
            "modelo1_20250314_120005.docx"
        );
        assert_eq!(
            backup_file_name("modelo1", "docx", noon(), 2),
            "modelo1_20250314_120005_2.docx"
        );
    }

    #[test]
    fn test_backup_copies_content() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp);
        let source = Path::new("templates/modelo1/document.v1.docx");
        service.write(source, b"previous bytes").unwrap();

        let metadata = service
            .backup(source, Path::new("backups"), "modelo1", "docx", noon())
            .unwrap();

        assert_eq!(
            metadata.relative_path.as_str(),
            "backups/modelo1_20250314_120005.docx"
        );
        let stored = fs::read(temp.path().join("backups/modelo1_20250314_120005.docx")).unwrap();
        assert_eq!(stored, b"previous bytes");
    }

    #[test]
    fn test_failed_write_removes_partial_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("modelo1_20250314_120005.docx");

        let result = write_or_remove(&path, || {
            fs::write(&path, b"trunc")?;
            Err(std::io::Error::new(ErrorKind::WriteZero, "disk full"))
        });

        assert_eq!(result.unwrap_err().kind(), ErrorKind::WriteZero);
        assert!(!path.exists());
    }

    #[test]
    fn test_failed_write_without_file_keeps_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("never_created.docx");

        let result = write_or_remove(&path, || {
            Err(std::io::Error::new(ErrorKind::PermissionDenied, "denied"))
        });

        assert_eq!(result.unwrap_err().kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_backup_never_overwrites_within_same_second() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp);
        let source = Path::new("doc.docx");

        service.write(source, b"one").unwrap();
        let first = service
            .backup(source, Path::new("backups"), "modelo1", "docx", noon())
            .unwrap();
        service.write(source, b"two").unwrap();
        let second = service
            .backup(source, Path::new("backups"), "modelo1", "docx", noon())
            .unwrap();

        assert_ne!(first.relative_path, second.relative_path);
        assert_eq!(
            service.read(Path::new(first.relative_path.as_str())).unwrap(),
            b"one"
        );
        assert_eq!(
            service.read(Path::new(second.relative_path.as_str())).unwrap(),
            b"two"
        );
    }

    #[test]
    fn test_list_backups_filters_by_stem() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp);
        let source = Path::new("doc.docx");
        service.write(source, b"x").unwrap();

        service
            .backup(source, Path::new("backups"), "modelo1", "docx", noon())
            .unwrap();
        service
            .backup(source, Path::new("backups"), "modelo1_extra", "docx", noon())
            .unwrap();
        fs::write(temp.path().join("backups/modelo1_notes.txt"), b"x").unwrap();

        let backups = service
            .list_backups(Path::new("backups"), "modelo1", "docx")
            .unwrap();

        assert_eq!(
            backups,
            vec![PathBuf::from("backups/modelo1_20250314_120005.docx")]
        );
    }

    #[test]
    fn test_list_backups_missing_dir_is_empty() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp);

        let backups = service
            .list_backups(Path::new("backups"), "modelo1", "docx")
            .unwrap();

        assert!(backups.is_empty());
    }

    #[test]
    fn test_list_dirs_sorted() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp);
        service.write(Path::new("templates/b/template.yaml"), b"x").unwrap();
        service.write(Path::new("templates/a/template.yaml"), b"x").unwrap();
        service.write(Path::new("templates/file.txt"), b"x").unwrap();

        let dirs = service.list_dirs(Path::new("templates")).unwrap();

        assert_eq!(dirs, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_list_backups_orders_counters_numerically() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp);
        let source = Path::new("doc.docx");
        service.write(source, b"x").unwrap();

        for _ in 0..12 {
            service
                .backup(source, Path::new("backups"), "m", "docx", noon())
                .unwrap();
        }

        let names: Vec<String> = service
            .list_backups(Path::new("backups"), "m", "docx")
            .unwrap()
            .iter()
            .filter_map(|p| p.file_name()?.to_str().map(str::to_owned))
            .collect();

        assert_eq!(names[0], "m_20250314_120005.docx");
        assert_eq!(names[2], "m_20250314_120005_2.docx");
        assert_eq!(names[11], "m_20250314_120005_11.docx");
    }

    #[test]
    fn test_is_backup_of() {
        assert!(is_backup_of("m_20250314_120005.docx", "m", "docx"));
        assert!(is_backup_of("m_20250314_120005_3.docx", "m", "docx"));
        assert!(!is_backup_of("m_20250314_120005_.docx", "m", "docx"));
        assert!(!is_backup_of("m_x_20250314_120005.docx", "m", "docx"));
        assert!(!is_backup_of("m_20250314-120005.docx", "m", "docx"));
        assert!(!is_backup_of("m_20250314_120005.pdf", "m", "docx"));
    }
}
