use bytes::Bytes;
use std::io::{Read, Seek};
use std::path::PathBuf;
use tempfile::TempPath;
use thiserror::Error;
use zip::ZipArchive;
use zip::result::ZipError;

use crate::handlers::JobError;
use crate::storage::PutSource;

/// Directory record of one archive member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ArchiveEntry {
    pub index: usize,
    pub raw_name: Vec<u8>,
    pub size: u64,
    pub is_dir: bool,
}

impl ArchiveEntry {
    pub fn name(&self) -> Result<String, JobError> {
        decode_entry_name(&self.raw_name)
    }
}

/// Entry names are UTF-8 or, failing that, GBK.
pub(crate) fn decode_entry_name(raw: &[u8]) -> Result<String, JobError> {
    if let Ok(name) = std::str::from_utf8(raw) {
        return Ok(name.to_string());
    }

    let (decoded, had_errors) = encoding_rs::GBK.decode_without_bom_handling(raw);
    if had_errors {
        return Err(JobError::Encoding(format!(
            "entry name {} is neither UTF-8 nor GBK",
            String::from_utf8_lossy(raw)
        )));
    }
    Ok(decoded.into_owned())
}

pub(crate) fn open_archive<R: Read + Seek>(source: R) -> Result<ZipArchive<R>, JobError> {
    ZipArchive::new(source).map_err(|e| JobError::InvalidArchive(e.to_string()))
}

/// Read the central directory without decompressing anything.
pub(crate) fn list_entries<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<Vec<ArchiveEntry>, JobError> {
    (0..archive.len())
        .map(|index| {
            let file = archive
                .by_index_raw(index)
                .map_err(|e| JobError::InvalidArchive(e.to_string()))?;
            Ok(ArchiveEntry {
                index,
                raw_name: file.name_raw().to_vec(),
                size: file.size(),
                is_dir: file.is_dir(),
            })
        })
        .collect()
}

/// Reject the archive before any upload if it has too many entries or one
/// entry declares more than `max_entry_bytes`. Directories count too.
pub(crate) fn check_limits(
    entries: &[ArchiveEntry],
    max_entry_count: usize,
    max_entry_bytes: u64,
) -> Result<(), JobError> {
    if entries.len() > max_entry_count {
        return Err(JobError::SizeLimit(
            "archive entries count exceeds the limit".to_string(),
        ));
    }
    if entries.iter().any(|entry| entry.size > max_entry_bytes) {
        return Err(JobError::SizeLimit(
            "archive entry length exceeds the limit".to_string(),
        ));
    }
    Ok(())
}

/// Per-entry extraction failure; recorded against the entry, never fatal.
#[derive(Debug, Error)]
pub(crate) enum ExtractError {
    #[error("read archive entry failed, {0}")]
    Zip(#[from] ZipError),
    #[error("read archive entry failed, {0}")]
    Io(#[from] std::io::Error),
    #[error("archive entry inflates beyond {0} bytes")]
    Oversized(u64),
}

/// Decompressed entry content ready for upload.
#[derive(Debug)]
pub(crate) enum EntryPayload {
    Memory(Bytes),
    Spooled(TempPath),
}

impl EntryPayload {
    pub fn source(&self) -> PutSource<'_> {
        match self {
            EntryPayload::Memory(data) => PutSource::Bytes(data.clone()),
            EntryPayload::Spooled(path) => PutSource::File(path),
        }
    }

    pub fn strategy(&self) -> &'static str {
        match self {
            EntryPayload::Memory(_) => "memory",
            EntryPayload::Spooled(_) => "spool",
        }
    }
}

/// Where and how entry content is buffered.
#[derive(Debug, Clone)]
pub(crate) struct Extraction {
    pub request_id: String,
    pub spool_dir: PathBuf,
    pub memory_threshold: u64,
    pub max_entry_bytes: u64,
}

impl Extraction {
    /// Decompress `entry`, spooling it when its declared size is above the
    /// memory threshold. Output past `max_entry_bytes` is refused whatever
    /// the entry declared.
    pub fn extract<R: Read + Seek>(
        &self,
        archive: &mut ZipArchive<R>,
        entry: &ArchiveEntry,
    ) -> Result<EntryPayload, ExtractError> {
        let file = archive.by_index(entry.index)?;
        let mut limited = file.take(self.max_entry_bytes.saturating_add(1));

        if entry.size > self.memory_threshold {
            let spool = tempfile::Builder::new()
                .prefix(&format!("{}-entry-", self.request_id))
                .tempfile_in(&self.spool_dir)?;
            let (mut out, path) = spool.into_parts();
            let copied = std::io::copy(&mut limited, &mut out)?;
            if copied > self.max_entry_bytes {
                return Err(ExtractError::Oversized(self.max_entry_bytes));
            }
            Ok(EntryPayload::Spooled(path))
        } else {
            let mut buf = Vec::with_capacity(entry.size as usize);
            limited.read_to_end(&mut buf)?;
            if buf.len() as u64 > self.max_entry_bytes {
                return Err(ExtractError::Oversized(self.max_entry_bytes));
            }
            Ok(EntryPayload::Memory(Bytes::from(buf)))
        }
    }
}
