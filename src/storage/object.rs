//! Object backend on top of the `object_store` crate

use async_trait::async_trait;
use bytes::Bytes;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as StoragePath;
use object_store::{ObjectStore, PutMode, PutOptions, PutPayload, WriteMultipart};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use super::{
    BackendError, CODE_FILE_EXISTS, Credentials, ObjectBackend, PutRet, PutScope, PutSource,
    ResumableSettings, UploadToken,
};

enum Buckets {
    Memory(Mutex<HashMap<String, Arc<InMemory>>>),
    Local(PathBuf),
}

/// Bucket-aware backend that checks upload tokens before writing.
///
/// The `memory` flavour keeps one [`InMemory`] store per bucket for the life
/// of the process; the `local` flavour maps bucket `b` to `<root>/b` on disk.
pub struct ObjectStoreBackend {
    buckets: Buckets,
    credentials: Credentials,
}

impl ObjectStoreBackend {
    pub fn in_memory(credentials: Credentials) -> Self {
        Self {
            buckets: Buckets::Memory(Mutex::new(HashMap::new())),
            credentials,
        }
    }

    pub fn local(root: impl Into<PathBuf>, credentials: Credentials) -> Self {
        Self {
            buckets: Buckets::Local(root.into()),
            credentials,
        }
    }

    /// Fetch a stored object; used by tests and operators.
    pub async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, BackendError> {
        let store = self.store_for(bucket)?;
        let path = parse_key(key)?;
        let result = store.get(&path).await?;
        Ok(result.bytes().await?)
    }

    fn store_for(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, BackendError> {
        validate_bucket(bucket)?;

        match &self.buckets {
            Buckets::Memory(stores) => {
                let mut stores = stores
                    .lock()
                    .map_err(|_| BackendError::Transport("bucket table poisoned".to_string()))?;
                let store: Arc<dyn ObjectStore> = stores
                    .entry(bucket.to_string())
                    .or_insert_with(|| Arc::new(InMemory::new()))
                    .clone();
                Ok(store)
            }
            Buckets::Local(root) => {
                let dir = root.join(bucket);
                std::fs::create_dir_all(&dir)?;
                let store: Arc<dyn ObjectStore> = Arc::new(LocalFileSystem::new_with_prefix(&dir)?);
                Ok(store)
            }
        }
    }

    /// Resolve the store, object path and write mode a token allows for `key`.
    fn authorize(
        &self,
        token: &UploadToken,
        key: &str,
    ) -> Result<(Arc<dyn ObjectStore>, StoragePath, PutMode), BackendError> {
        let policy = token
            .verify(&self.credentials, chrono::Utc::now().timestamp())
            .map_err(|e| BackendError::api(401, e.to_string()))?;

        let scope = PutScope::parse(&policy.scope);
        let mode = match &scope {
            PutScope::Bucket(_) => PutMode::Create,
            PutScope::Key { key: allowed, .. } if allowed == key => PutMode::Overwrite,
            PutScope::Key { .. } => {
                return Err(BackendError::api(403, "key does not match token scope"));
            }
        };

        let store = self.store_for(scope.bucket())?;
        let path = parse_key(key)?;
        Ok((store, path, mode))
    }
}

#[async_trait]
impl ObjectBackend for ObjectStoreBackend {
    async fn put(
        &self,
        token: &UploadToken,
        key: &str,
        source: PutSource<'_>,
    ) -> Result<PutRet, BackendError> {
        let (store, path, mode) = self.authorize(token, key)?;

        let data = match source {
            PutSource::Bytes(data) => data,
            PutSource::File(file) => Bytes::from(tokio::fs::read(file).await?),
        };
        let hash = hex::encode(Sha256::digest(&data));
        let size = data.len() as u64;

        store
            .put_opts(&path, PutPayload::from(data), PutOptions::from(mode))
            .await?;

        debug!(key, size, "Stored object");
        Ok(PutRet {
            key: key.to_string(),
            hash,
            size,
        })
    }

    async fn resumable_put(
        &self,
        token: &UploadToken,
        key: &str,
        source: PutSource<'_>,
        settings: ResumableSettings,
    ) -> Result<PutRet, BackendError> {
        let (store, path, mode) = self.authorize(token, key)?;

        // multipart uploads cannot be conditional, so create-only is checked up front
        if matches!(mode, PutMode::Create) {
            match store.head(&path).await {
                Ok(_) => return Err(BackendError::api(CODE_FILE_EXISTS, "file exists")),
                Err(object_store::Error::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }

        let upload = store.put_multipart(&path).await?;
        let mut writer = WriteMultipart::new_with_chunk_size(upload, settings.chunk_size.max(1));
        let mut hasher = Sha256::new();

        let size = match feed_chunks(&mut writer, source, settings, &mut hasher).await {
            Ok(size) => size,
            Err(e) => {
                if let Err(abort_err) = writer.abort().await {
                    warn!(key, error = %abort_err, "Failed to abort multipart upload");
                }
                return Err(e);
            }
        };
        writer.finish().await?;

        debug!(key, size, chunk_size = settings.chunk_size, "Stored object in chunks");
        Ok(PutRet {
            key: key.to_string(),
            hash: hex::encode(hasher.finalize()),
            size,
        })
    }
}

async fn feed_chunks(
    writer: &mut WriteMultipart,
    source: PutSource<'_>,
    settings: ResumableSettings,
    hasher: &mut Sha256,
) -> Result<u64, BackendError> {
    let chunk_size = settings.chunk_size.max(1);
    let max_workers = settings.max_workers.max(1);
    let mut size = 0u64;

    match source {
        PutSource::Bytes(data) => {
            for chunk in data.chunks(chunk_size) {
                writer.wait_for_capacity(max_workers).await?;
                writer.write(chunk);
                hasher.update(chunk);
                size += chunk.len() as u64;
            }
        }
        PutSource::File(file) => {
            let mut file = tokio::fs::File::open(file).await?;
            let mut buf = vec![0u8; chunk_size];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                writer.wait_for_capacity(max_workers).await?;
                writer.write(&buf[..n]);
                hasher.update(&buf[..n]);
                size += n as u64;
            }
        }
    }

    Ok(size)
}

fn validate_bucket(bucket: &str) -> Result<(), BackendError> {
    let valid = !bucket.is_empty()
        && bucket != "."
        && bucket != ".."
        && bucket
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(BackendError::api(400, format!("invalid bucket name '{bucket}'")))
    }
}

fn parse_key(key: &str) -> Result<StoragePath, BackendError> {
    if key.is_empty() {
        return Err(BackendError::api(400, "empty key"));
    }
    StoragePath::parse(key).map_err(|e| BackendError::api(400, format!("invalid key: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn creds() -> Credentials {
        Credentials::new("ak", "sk")
    }

    fn token(backend: &ObjectStoreBackend, scope: PutScope) -> UploadToken {
        backend
            .issue_token(&creds(), &scope, Duration::from_secs(60))
            .unwrap()
    }

    #[tokio::test]
    async fn test_put_and_get_roundtrip() {
        let backend = ObjectStoreBackend::in_memory(creds());
        let token = token(&backend, PutScope::Bucket("media".into()));

        let ret = backend
            .put(&token, "docs/a.txt", PutSource::Bytes(Bytes::from_static(b"hello")))
            .await
            .unwrap();

        assert_eq!(ret.size, 5);
        assert_eq!(ret.hash, hex::encode(Sha256::digest(b"hello")));
        assert_eq!(backend.get("media", "docs/a.txt").await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_bucket_scope_refuses_existing_key() {
        let backend = ObjectStoreBackend::in_memory(creds());
        let token = token(&backend, PutScope::Bucket("media".into()));

        backend
            .put(&token, "a.txt", PutSource::Bytes(Bytes::from_static(b"one")))
            .await
            .unwrap();
        let err = backend
            .put(&token, "a.txt", PutSource::Bytes(Bytes::from_static(b"two")))
            .await
            .unwrap_err();

        assert!(matches!(err, BackendError::Api { code: CODE_FILE_EXISTS, .. }));
        assert_eq!(backend.get("media", "a.txt").await.unwrap(), "one");
    }

    #[tokio::test]
    async fn test_key_scope_overwrites_only_its_key() {
        let backend = ObjectStoreBackend::in_memory(creds());
        let bucket_token = token(&backend, PutScope::Bucket("media".into()));
        backend
            .put(&bucket_token, "a.txt", PutSource::Bytes(Bytes::from_static(b"one")))
            .await
            .unwrap();

        let key_token = token(
            &backend,
            PutScope::Key {
                bucket: "media".into(),
                key: "a.txt".into(),
            },
        );
        backend
            .put(&key_token, "a.txt", PutSource::Bytes(Bytes::from_static(b"two")))
            .await
            .unwrap();
        assert_eq!(backend.get("media", "a.txt").await.unwrap(), "two");

        let err = backend
            .put(&key_token, "b.txt", PutSource::Bytes(Bytes::from_static(b"x")))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Api { code: 403, .. }));
    }

    #[tokio::test]
    async fn test_foreign_token_is_rejected() {
        let backend = ObjectStoreBackend::in_memory(creds());
        let token = backend
            .issue_token(
                &Credentials::new("ak", "wrong"),
                &PutScope::Bucket("media".into()),
                Duration::from_secs(60),
            )
            .unwrap();

        let err = backend
            .put(&token, "a.txt", PutSource::Bytes(Bytes::from_static(b"x")))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Api { code: 401, .. }));
        assert_eq!(err.message(), "bad token signature");
    }

    #[tokio::test]
    async fn test_resumable_put_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("payload.bin");
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&file, &data).unwrap();

        let backend = ObjectStoreBackend::in_memory(creds());
        let token = token(&backend, PutScope::Bucket("media".into()));
        let settings = ResumableSettings {
            chunk_size: 1024,
            max_workers: 2,
        };

        let ret = backend
            .resumable_put(&token, "big.bin", PutSource::File(&file), settings)
            .await
            .unwrap();

        assert_eq!(ret.size, 10_000);
        assert_eq!(ret.hash, hex::encode(Sha256::digest(&data)));
        assert_eq!(backend.get("media", "big.bin").await.unwrap().as_ref(), &data[..]);

        let err = backend
            .resumable_put(&token, "big.bin", PutSource::File(&file), settings)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Api { code: CODE_FILE_EXISTS, .. }));
    }

    #[tokio::test]
    async fn test_local_buckets_live_under_root() {
        let dir = tempfile::TempDir::new().unwrap();
        let backend = ObjectStoreBackend::local(dir.path(), creds());
        let token = token(&backend, PutScope::Bucket("media".into()));

        backend
            .put(&token, "nested/a.txt", PutSource::Bytes(Bytes::from_static(b"disk")))
            .await
            .unwrap();

        let stored = std::fs::read(dir.path().join("media").join("nested").join("a.txt")).unwrap();
        assert_eq!(stored, b"disk");
    }

    #[tokio::test]
    async fn test_invalid_bucket_and_key() {
        let backend = ObjectStoreBackend::in_memory(creds());

        let token = token(&backend, PutScope::Bucket("../etc".into()));
        let err = backend
            .put(&token, "a", PutSource::Bytes(Bytes::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Api { code: 400, .. }));

        let token = self::token(&backend, PutScope::Bucket("media".into()));
        let err = backend
            .put(&token, "a/../b", PutSource::Bytes(Bytes::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Api { code: 400, .. }));
    }
}
