//! Object storage contract for file operations
//!
//! Operations never talk to a bucket directly. They ask the backend for a
//! scoped upload token and then hand it bytes or a local file, either in one
//! request or as a chunked (resumable) transfer. [`ObjectStoreBackend`] is the
//! bundled implementation on top of the `object_store` crate.

mod object;
mod token;

use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub use object::ObjectStoreBackend;
pub use token::{Credentials, PutPolicy, PutScope, TokenError, UploadToken};

/// Structured code returned when a create-only upload hits an existing key.
pub const CODE_FILE_EXISTS: u16 = 614;

#[derive(Debug, Error)]
pub enum BackendError {
    /// Rejection reported by the backend itself, with a machine-readable message.
    #[error("backend error {code}: {message}")]
    Api { code: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("local read error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError {
    pub fn api(code: u16, message: impl Into<String>) -> Self {
        BackendError::Api {
            code,
            message: message.into(),
        }
    }

    /// The structured message when there is one, the raw error text otherwise.
    pub fn message(&self) -> String {
        match self {
            BackendError::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<object_store::Error> for BackendError {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::AlreadyExists { .. } => {
                BackendError::api(CODE_FILE_EXISTS, "file exists")
            }
            other => BackendError::Transport(other.to_string()),
        }
    }
}

/// Payload handed to an upload.
#[derive(Debug, Clone)]
pub enum PutSource<'a> {
    Bytes(Bytes),
    File(&'a Path),
}

/// What the backend reports for a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutRet {
    pub key: String,
    pub hash: String,
    pub size: u64,
}

/// Chunking parameters for [`ObjectBackend::resumable_put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumableSettings {
    pub chunk_size: usize,
    pub max_workers: usize,
}

impl Default for ResumableSettings {
    fn default() -> Self {
        Self {
            chunk_size: 4 * 1024 * 1024,
            max_workers: 8,
        }
    }
}

#[async_trait]
pub trait ObjectBackend: Send + Sync {
    /// Sign an upload token for `scope`, valid for `expiry`.
    fn issue_token(
        &self,
        credentials: &Credentials,
        scope: &PutScope,
        expiry: Duration,
    ) -> Result<UploadToken, BackendError> {
        Ok(PutPolicy::new(scope, expiry).sign(credentials))
    }

    /// Store `source` under `key` in a single request.
    async fn put(
        &self,
        token: &UploadToken,
        key: &str,
        source: PutSource<'_>,
    ) -> Result<PutRet, BackendError>;

    /// Store `source` under `key` as fixed-size chunks, at most
    /// `settings.max_workers` of them in flight at once.
    async fn resumable_put(
        &self,
        token: &UploadToken,
        key: &str,
        source: PutSource<'_>,
        settings: ResumableSettings,
    ) -> Result<PutRet, BackendError>;
}
