use config::{Config, File, FileFormat};
use serde::Deserialize;
use std::path::Path;

use crate::handlers::JobError;
use crate::humanize::ByteSize;
use crate::storage::Credentials;

pub const DEFAULT_MAX_ARCHIVE_BYTES: ByteSize = ByteSize::gib(1);
pub const DEFAULT_MAX_ENTRY_BYTES: ByteSize = ByteSize::mib(100);
pub const DEFAULT_MAX_ENTRY_COUNT: usize = 10;

/// On-disk shape of the archive handler config. Zero or negative limits
/// fall back to the defaults.
#[derive(Debug, Default, Deserialize)]
struct RawArchiveConfig {
    #[serde(default)]
    access_key: String,
    #[serde(default)]
    secret_key: String,
    #[serde(default)]
    max_archive_bytes: Option<ByteSize>,
    #[serde(default)]
    max_entry_bytes: Option<ByteSize>,
    #[serde(default)]
    max_entry_count: Option<i64>,
}

/// Effective settings of the archive handler, limits already defaulted.
#[derive(Debug, Clone)]
pub struct ArchiveJobConfig {
    pub credentials: Credentials,
    pub max_archive_bytes: u64,
    pub max_entry_bytes: u64,
    pub max_entry_count: usize,
}

impl ArchiveJobConfig {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            max_archive_bytes: DEFAULT_MAX_ARCHIVE_BYTES.as_u64(),
            max_entry_bytes: DEFAULT_MAX_ENTRY_BYTES.as_u64(),
            max_entry_count: DEFAULT_MAX_ENTRY_COUNT,
        }
    }

    /// Load from a JSON document, or TOML when the file ends in `.toml`.
    pub fn load(path: &Path) -> Result<Self, JobError> {
        if !path.is_file() {
            return Err(JobError::Config(format!(
                "Open archive config failed, {} not found",
                path.display()
            )));
        }

        let format = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => FileFormat::Toml,
            _ => FileFormat::Json,
        };

        let raw: RawArchiveConfig = Config::builder()
            .add_source(File::from(path).format(format).required(true))
            .build()
            .and_then(Config::try_deserialize)
            .map_err(|e| JobError::Config(format!("Parse archive config failed, {e}")))?;

        Self::from_raw(raw)
    }

    fn from_raw(raw: RawArchiveConfig) -> Result<Self, JobError> {
        let credentials = Credentials::new(raw.access_key, raw.secret_key);
        if !credentials.is_complete() {
            return Err(JobError::Config(
                "invalid archive config, no access_key or secret_key".to_string(),
            ));
        }

        let byte_limit = |value: Option<ByteSize>, default: ByteSize| match value {
            Some(size) if !size.is_zero() => size.as_u64(),
            _ => default.as_u64(),
        };

        Ok(Self {
            credentials,
            max_archive_bytes: byte_limit(raw.max_archive_bytes, DEFAULT_MAX_ARCHIVE_BYTES),
            max_entry_bytes: byte_limit(raw.max_entry_bytes, DEFAULT_MAX_ENTRY_BYTES),
            max_entry_count: match raw.max_entry_count {
                Some(count) if count > 0 => count as usize,
                _ => DEFAULT_MAX_ENTRY_COUNT,
            },
        })
    }
}
