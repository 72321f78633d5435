//! Archive extraction job
//!
//! Downloads a zip archive from the job URL, checks it against the
//! configured limits, then stores every file entry as its own object under
//! `prefix + entry name`. Entry failures are reported per entry; anything
//! that goes wrong with the archive as a whole fails the job.

mod command;
mod entries;
mod fetch;
mod outcome;
mod settings;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use zip::ZipArchive;

pub use command::ArchiveCommand;
pub use settings::{
    ArchiveJobConfig, DEFAULT_MAX_ARCHIVE_BYTES, DEFAULT_MAX_ENTRY_BYTES, DEFAULT_MAX_ENTRY_COUNT,
};
pub use outcome::{ArchiveResult, UploadOutcome};

use entries::{ArchiveEntry, EntryPayload, Extraction};
use fetch::{ArchiveSource, FetchLimits};

use super::{JobBody, JobError, JobHandler, JobOutput, JobRequest};
use crate::storage::{BackendError, ObjectBackend, PutRet, ResumableSettings, UploadToken};

pub const OP_NAME: &str = "archive";

/// Upload tokens outlive any single job.
pub const TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const MIB: u64 = 1024 * 1024;

/// Where archive and entry bytes live while a job runs, and when uploads
/// switch to chunked transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPolicy {
    /// Archives with a declared length up to this stay in memory.
    pub archive_memory_threshold: u64,
    /// Entries declaring more than this are spooled to disk.
    pub entry_memory_threshold: u64,
    /// Entries declaring more than this use a resumable upload.
    pub resumable_threshold: u64,
    pub resumable: ResumableSettings,
}

impl Default for BufferPolicy {
    fn default() -> Self {
        Self {
            archive_memory_threshold: 20 * MIB,
            entry_memory_threshold: 20 * MIB,
            resumable_threshold: 20 * MIB,
            resumable: ResumableSettings::default(),
        }
    }
}

pub struct ArchiveJob {
    backend: Arc<dyn ObjectBackend>,
    http: reqwest::Client,
    spool_dir: PathBuf,
    policy: BufferPolicy,
    config: Option<ArchiveJobConfig>,
}

impl ArchiveJob {
    pub fn new(backend: Arc<dyn ObjectBackend>, http: reqwest::Client) -> Self {
        Self {
            backend,
            http,
            spool_dir: std::env::temp_dir(),
            policy: BufferPolicy::default(),
            config: None,
        }
    }

    pub fn with_spool_dir(mut self, spool_dir: impl Into<PathBuf>) -> Self {
        self.spool_dir = spool_dir.into();
        self
    }

    pub fn with_buffer_policy(mut self, policy: BufferPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Use `config` directly instead of loading it in [`JobHandler::configure`].
    pub fn with_config(mut self, config: ArchiveJobConfig) -> Self {
        self.config = Some(config);
        self
    }

    async fn run(
        &self,
        config: &ArchiveJobConfig,
        request: &JobRequest,
    ) -> Result<ArchiveResult, JobError> {
        let command = ArchiveCommand::parse(&request.command)?;
        let request_id = request.request_id.as_str();

        info!(
            request_id,
            url = %request.source_url,
            bucket = %command.bucket,
            prefix = %command.prefix,
            overwrite = command.overwrite,
            "Downloading archive"
        );
        let source = fetch::fetch_archive(
            &self.http,
            request,
            FetchLimits {
                max_bytes: config.max_archive_bytes,
                memory_threshold: self.policy.archive_memory_threshold,
            },
            &self.spool_dir,
        )
        .await?;
        let spooled = source.is_spooled();

        let (mut archive, listed) = blocking(move || {
            let mut archive = entries::open_archive(source)?;
            let listed = entries::list_entries(&mut archive)?;
            Ok::<_, JobError>((archive, listed))
        })
        .await??;

        entries::check_limits(&listed, config.max_entry_count, config.max_entry_bytes)?;
        info!(request_id, entries = listed.len(), spooled, "Archive accepted");

        let extraction = Extraction {
            request_id: request_id.to_string(),
            spool_dir: self.spool_dir.clone(),
            memory_threshold: self.policy.entry_memory_threshold,
            max_entry_bytes: config.max_entry_bytes,
        };

        let mut result = ArchiveResult::default();
        for entry in listed.iter().filter(|entry| !entry.is_dir) {
            let name = match entry.name() {
                Ok(name) => name,
                Err(err) => {
                    warn!(
                        request_id,
                        index = entry.index,
                        stored = result.stored_count(),
                        "Undecodable entry name, aborting archive job"
                    );
                    return Err(err);
                }
            };
            let key = command.key_for(&name);

            let token = match self.backend.issue_token(
                &config.credentials,
                &command.scope_for(&key),
                TOKEN_TTL,
            ) {
                Ok(token) => token,
                Err(err) => {
                    result.files.push(failure(request_id, key, save_error(&err)));
                    continue;
                }
            };

            let (returned, payload) =
                extract(archive, extraction.clone(), entry.clone()).await?;
            archive = returned;
            let outcome = match payload {
                Ok(payload) => {
                    let outcome = self
                        .store(request_id, &token, &key, entry, &payload)
                        .await;
                    drop(payload);
                    outcome
                }
                Err(err) => failure(request_id, key, format!("extract file failed, {err}")),
            };
            result.files.push(outcome);
        }

        info!(
            request_id,
            stored = result.stored_count(),
            failed = result.files.len() - result.stored_count(),
            "Archive entries processed"
        );
        Ok(result)
    }

    async fn store(
        &self,
        request_id: &str,
        token: &UploadToken,
        key: &str,
        entry: &ArchiveEntry,
        payload: &EntryPayload,
    ) -> UploadOutcome {
        let resumable = entry.size > self.policy.resumable_threshold;
        info!(
            request_id,
            key,
            size = entry.size,
            buffer = payload.strategy(),
            resumable,
            "Uploading archive entry"
        );

        let put: Result<PutRet, BackendError> = if resumable {
            self.backend
                .resumable_put(token, key, payload.source(), self.policy.resumable)
                .await
        } else {
            self.backend.put(token, key, payload.source()).await
        };

        match put {
            Ok(ret) => UploadOutcome::stored(key, ret.hash),
            Err(err) => failure(request_id, key.to_string(), save_error(&err)),
        }
    }
}

fn save_error(err: &BackendError) -> String {
    format!("save file to bucket error, {}", err.message())
}

fn failure(request_id: &str, key: String, error: String) -> UploadOutcome {
    warn!(request_id, key = %key, error = %error, "Archive entry not stored");
    UploadOutcome::failed(key, error)
}

/// Run blocking archive work off the async workers.
async fn blocking<T, F>(work: F) -> Result<T, JobError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| JobError::LocalCache(format!("archive worker failed, {e}")))
}

/// Decompress one entry; the archive is moved into the worker and handed back.
async fn extract(
    mut archive: ZipArchive<ArchiveSource>,
    extraction: Extraction,
    entry: ArchiveEntry,
) -> Result<
    (
        ZipArchive<ArchiveSource>,
        Result<EntryPayload, entries::ExtractError>,
    ),
    JobError,
> {
    blocking(move || {
        let payload = extraction.extract(&mut archive, &entry);
        (archive, payload)
    })
    .await
}

#[async_trait]
impl JobHandler for ArchiveJob {
    fn name(&self) -> &str {
        OP_NAME
    }

    fn configure(&mut self, path: &Path) -> Result<(), JobError> {
        self.config = Some(ArchiveJobConfig::load(path)?);
        Ok(())
    }

    async fn execute(
        &self,
        request: &JobRequest,
        _body: &mut JobBody,
    ) -> Result<JobOutput, JobError> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| JobError::Config(format!("{OP_NAME} handler is not configured")))?;

        let result = self.run(config, request).await?;
        Ok(JobOutput::json(result))
    }
}
