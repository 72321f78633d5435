#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Mutex;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use fopbox::storage::{
    BackendError, ObjectBackend, PutRet, PutSource, ResumableSettings, UploadToken,
};

pub const ACCESS_KEY: &str = "test-ak";
pub const SECRET_KEY: &str = "test-sk";

/// Build a zip archive in memory. Names ending in `/` become directories.
pub fn build_zip(files: &[(&str, &[u8])]) -> Bytes {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in files {
        if name.ends_with('/') {
            writer
                .add_directory(*name, SimpleFileOptions::default())
                .unwrap();
        } else {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
    }
    Bytes::from(writer.finish().unwrap().into_inner())
}

/// Build a stored (uncompressed) zip whose entry names are raw bytes, for
/// names that are not UTF-8.
pub fn build_raw_zip(files: &[(&[u8], &[u8])]) -> Bytes {
    let mut out = Vec::new();
    let mut central = Vec::new();

    for (name, data) in files {
        let offset = out.len() as u32;
        let crc = crc32(data);
        let size = data.len() as u32;

        out.extend_from_slice(&0x0403_4b50u32.to_le_bytes());
        out.extend_from_slice(&20u16.to_le_bytes()); // version needed
        out.extend_from_slice(&0u16.to_le_bytes()); // flags: no UTF-8 bit
        out.extend_from_slice(&0u16.to_le_bytes()); // stored
        out.extend_from_slice(&0u32.to_le_bytes()); // dos time + date
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(name);
        out.extend_from_slice(data);

        central.extend_from_slice(&0x0201_4b50u32.to_le_bytes());
        central.extend_from_slice(&20u16.to_le_bytes()); // version made by
        central.extend_from_slice(&20u16.to_le_bytes()); // version needed
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&0u32.to_le_bytes());
        central.extend_from_slice(&crc.to_le_bytes());
        central.extend_from_slice(&size.to_le_bytes());
        central.extend_from_slice(&size.to_le_bytes());
        central.extend_from_slice(&(name.len() as u16).to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes()); // extra
        central.extend_from_slice(&0u16.to_le_bytes()); // comment
        central.extend_from_slice(&0u16.to_le_bytes()); // disk
        central.extend_from_slice(&0u16.to_le_bytes()); // internal attrs
        central.extend_from_slice(&0u32.to_le_bytes()); // external attrs
        central.extend_from_slice(&offset.to_le_bytes());
        central.extend_from_slice(name);
    }

    let central_offset = out.len() as u32;
    let central_size = central.len() as u32;
    out.extend_from_slice(&central);

    out.extend_from_slice(&0x0605_4b50u32.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&(files.len() as u16).to_le_bytes());
    out.extend_from_slice(&(files.len() as u16).to_le_bytes());
    out.extend_from_slice(&central_size.to_le_bytes());
    out.extend_from_slice(&central_offset.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());

    Bytes::from(out)
}

fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xffff_ffffu32;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xedb8_8320 & mask);
        }
    }
    !crc
}

/// Serves `archive` at `/archive.zip` (with Content-Length), at `/stream.zip`
/// (chunked, no Content-Length), and 404 at `/missing.zip`.
pub async fn start_source_server(archive: Bytes) -> String {
    let sized = archive.clone();
    let streamed = archive;

    let app = Router::new()
        .route(
            "/archive.zip",
            get(move || {
                let body = sized.clone();
                async move { ([(header::CONTENT_TYPE, "application/zip")], body) }
            }),
        )
        .route(
            "/stream.zip",
            get(move || {
                let body = streamed.clone();
                async move { chunked(body) }
            }),
        )
        .route(
            "/missing.zip",
            get(|| async { (StatusCode::NOT_FOUND, "no such archive") }),
        );

    // Bind to random available port
    let addr = SocketAddr::from(([127, 0, 0, 1], 0));
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    let bound_addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{bound_addr}")
}

fn chunked(data: Bytes) -> Response {
    let chunks: Vec<Result<Bytes, std::io::Error>> = data
        .chunks(1024)
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect();
    Body::from_stream(futures::stream::iter(chunks)).into_response()
}

pub fn spool_is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Token(String),
    Put(String),
    ResumablePut(String),
}

/// Backend double: records every call, stores nothing, and fails uploads of
/// the configured keys.
#[derive(Default)]
pub struct RecordingBackend {
    calls: Mutex<Vec<Call>>,
    failing: HashSet<String>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(keys: &[&str]) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: keys.iter().map(|k| k.to_string()).collect(),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    async fn store(&self, key: &str, source: PutSource<'_>) -> Result<PutRet, BackendError> {
        if self.failing.contains(key) {
            return Err(BackendError::api(599, "quota exceeded"));
        }
        let size = match source {
            PutSource::Bytes(data) => data.len() as u64,
            PutSource::File(path) => tokio::fs::metadata(path).await?.len(),
        };
        Ok(PutRet {
            key: key.to_string(),
            hash: format!("hash-of-{key}"),
            size,
        })
    }
}

#[async_trait]
impl ObjectBackend for RecordingBackend {
    fn issue_token(
        &self,
        credentials: &fopbox::storage::Credentials,
        scope: &fopbox::storage::PutScope,
        expiry: std::time::Duration,
    ) -> Result<UploadToken, BackendError> {
        self.calls.lock().unwrap().push(Call::Token(scope.to_string()));
        Ok(fopbox::storage::PutPolicy::new(scope, expiry).sign(credentials))
    }

    async fn put(
        &self,
        _token: &UploadToken,
        key: &str,
        source: PutSource<'_>,
    ) -> Result<PutRet, BackendError> {
        self.calls.lock().unwrap().push(Call::Put(key.to_string()));
        self.store(key, source).await
    }

    async fn resumable_put(
        &self,
        _token: &UploadToken,
        key: &str,
        source: PutSource<'_>,
        _settings: ResumableSettings,
    ) -> Result<PutRet, BackendError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::ResumablePut(key.to_string()));
        self.store(key, source).await
    }
}
