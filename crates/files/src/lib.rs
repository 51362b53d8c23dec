//! Contrato File Storage
//!
//! This crate stores the binary document snapshots that back contrato templates.
//!
//! ## Design Principles
//!
//! - Structured template records and binary document bytes are kept in separate files
//! - Every write is atomic: content goes to a temporary sibling and is renamed into place
//! - Every stored file is described by a [`FileMetadata`] carrying its SHA-256 digest
//! - Backups are append-only; an existing backup is never overwritten or removed
//!
//! ## Storage Model
//!
//! A [`FilesService`] is scoped to one root directory. All paths handed to it are relative to
//! that root and are rejected if they could escape it:
//!
//! ```text
//! <root>/
//! ├── templates/
//! │   └── <name>/
//! │       ├── template.yaml
//! │       └── document.v3.docx
//! └── backups/
//!     └── <name>_20250101_120000.docx
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use contrato_files::FilesService;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let service = FilesService::new(Path::new("template_data"))?;
//! let metadata = service.write(Path::new("templates/modelo1/document.v1.docx"), b"PK")?;
//! println!("stored {} bytes ({})", metadata.size_bytes, metadata.hash);
//! # Ok(())
//! # }
//! ```

mod constants;
mod files;

pub use constants::{BACKUP_TIMESTAMP_FORMAT, HASH_ALGORITHM};
pub use files::{backup_file_name, sha256_digest, FileMetadata, FilesService};

/// Errors that can occur during file operations
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    /// Root directory does not exist or is not a directory
    #[error("Invalid root directory: {0}")]
    InvalidRootDirectory(String),

    /// Path validation failed (potential directory traversal or unsafe path)
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Requested file does not exist under the root directory
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Stored bytes do not match the digest recorded for them
    #[error("Integrity check failed for {path}: expected {expected}, found {actual}")]
    IntegrityMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// Every candidate backup name for the given second was already taken
    #[error("Could not allocate a backup file name for {0}")]
    BackupNameExhausted(String),

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Validated text construction failed
    #[error("Invalid text: {0}")]
    Text(#[from] contrato_types::TextError),
}
