use bytes::{Bytes, BytesMut};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::Path;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::handlers::{JobError, JobRequest};

/// Downloaded archive, held in memory or in a spool file.
///
/// The spool file is removed when this value is dropped.
pub(crate) enum ArchiveSource {
    Memory(Cursor<Bytes>),
    Disk {
        file: std::fs::File,
        _spool: TempPath,
    },
}

impl ArchiveSource {
    pub fn is_spooled(&self) -> bool {
        matches!(self, ArchiveSource::Disk { .. })
    }
}

impl Read for ArchiveSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            ArchiveSource::Memory(cursor) => cursor.read(buf),
            ArchiveSource::Disk { file, .. } => file.read(buf),
        }
    }
}

impl Seek for ArchiveSource {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        match self {
            ArchiveSource::Memory(cursor) => cursor.seek(pos),
            ArchiveSource::Disk { file, .. } => file.seek(pos),
        }
    }
}

/// Download limits for the source archive.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FetchLimits {
    pub max_bytes: u64,
    pub memory_threshold: u64,
}

fn too_large() -> JobError {
    JobError::SizeLimit("source archive length exceeds the limit".to_string())
}

/// GET the archive behind `request.source_url`.
///
/// Small archives with a declared length stay in memory; everything else is
/// spooled under `spool_dir`. The byte limit is enforced while reading, so a
/// missing or lying Content-Length cannot get around it.
pub(crate) async fn fetch_archive(
    http: &Client,
    request: &JobRequest,
    limits: FetchLimits,
    spool_dir: &Path,
) -> Result<ArchiveSource, JobError> {
    let response = http
        .get(&request.source_url)
        .send()
        .await
        .map_err(|e| JobError::Upstream(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(JobError::Upstream(status.to_string()));
    }

    let declared = response.content_length();
    info!(
        request_id = %request.request_id,
        content_length = ?declared,
        content_type = ?response.headers().get(CONTENT_TYPE),
        "Source archive responded"
    );

    match declared {
        Some(len) if len > limits.max_bytes => Err(too_large()),
        Some(len) if len <= limits.memory_threshold => {
            buffer_in_memory(response, len, limits.max_bytes).await
        }
        _ => spool_to_disk(response, request, limits.max_bytes, spool_dir).await,
    }
}

async fn buffer_in_memory(
    mut response: reqwest::Response,
    declared: u64,
    max_bytes: u64,
) -> Result<ArchiveSource, JobError> {
    let mut buf = BytesMut::with_capacity(declared as usize);
    while let Some(chunk) = next_chunk(&mut response).await? {
        if (buf.len() + chunk.len()) as u64 > max_bytes {
            return Err(too_large());
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(ArchiveSource::Memory(Cursor::new(buf.freeze())))
}

async fn spool_to_disk(
    mut response: reqwest::Response,
    request: &JobRequest,
    max_bytes: u64,
    spool_dir: &Path,
) -> Result<ArchiveSource, JobError> {
    let cache_error = |action: &str, e: std::io::Error| {
        JobError::LocalCache(format!("{action} local archive cache file failed, {e}"))
    };

    let spool = tempfile::Builder::new()
        .prefix(&format!("{}-archive-", request.request_id))
        .suffix(".zip")
        .tempfile_in(spool_dir)
        .map_err(|e| cache_error("open", e))?;
    let (file, path) = spool.into_parts();
    let mut writer = tokio::fs::File::from_std(file);

    let mut written = 0u64;
    while let Some(chunk) = next_chunk(&mut response).await? {
        written += chunk.len() as u64;
        if written > max_bytes {
            return Err(too_large());
        }
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| cache_error("write", e))?;
    }
    writer.flush().await.map_err(|e| cache_error("write", e))?;
    drop(writer);

    debug!(request_id = %request.request_id, path = %path.display(), written, "Spooled source archive");

    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|e| cache_error("reopen", e))?
        .into_std()
        .await;

    Ok(ArchiveSource::Disk { file, _spool: path })
}

async fn next_chunk(response: &mut reqwest::Response) -> Result<Option<Bytes>, JobError> {
    response
        .chunk()
        .await
        .map_err(|e| JobError::Upstream(e.to_string()))
}
