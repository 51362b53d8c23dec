/// Hashing algorithm recorded in every [`crate::FileMetadata`].
pub const HASH_ALGORITHM: &str = "sha256";

/// `chrono` format string for the timestamp part of backup file names.
pub const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Suffix appended to a file name while it is being written.
pub(crate) const TEMP_SUFFIX: &str = ".tmp";

/// Upper bound on `_<n>` suffixes tried for backups taken within the same second.
pub(crate) const MAX_BACKUP_ATTEMPTS: usize = 1_000;
