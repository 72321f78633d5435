use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

use super::types::{JobBody, JobOutput, JobRequest};

/// Whole-job failures. Every variant aborts the job with no partial result.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("{0}")]
    Config(String),
    #[error("{0}")]
    CommandFormat(String),
    #[error("retrieve resource data failed, {0}")]
    Upstream(String),
    #[error("{0}")]
    SizeLimit(String),
    #[error("unsupported file name encoding, {0}")]
    Encoding(String),
    #[error("invalid zip file, {0}")]
    InvalidArchive(String),
    #[error("{0}")]
    LocalCache(String),
    #[error("no operation available for the request")]
    NoHandler,
}

impl JobError {
    pub fn code(&self) -> &'static str {
        match self {
            JobError::Config(_) => "CONFIG",
            JobError::CommandFormat(_) => "COMMAND_FORMAT",
            JobError::Upstream(_) => "UPSTREAM_FETCH",
            JobError::SizeLimit(_) => "SIZE_LIMIT_EXCEEDED",
            JobError::Encoding(_) => "ENCODING",
            JobError::InvalidArchive(_) => "INVALID_ARCHIVE",
            JobError::LocalCache(_) => "LOCAL_CACHE",
            JobError::NoHandler => "NO_HANDLER",
        }
    }
}

/// A file operation that can be registered with the [`HandlerRegistry`].
///
/// `configure` runs exactly once, before registration; afterwards the handler
/// is shared between concurrent requests and must not change.
///
/// [`HandlerRegistry`]: super::HandlerRegistry
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Stable operation name, the first command segment without prefix.
    fn name(&self) -> &str;

    /// Load operation-specific settings from `path`.
    fn configure(&mut self, path: &Path) -> Result<(), JobError>;

    /// Run one job. `request.command` has the registration prefix stripped.
    async fn execute(
        &self,
        request: &JobRequest,
        body: &mut JobBody,
    ) -> Result<JobOutput, JobError>;
}
