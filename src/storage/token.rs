//! Signed upload tokens
//!
//! A token is `<access_key>:<signature>:<policy>` where `policy` is the
//! URL-safe base64 of a JSON put policy and `signature` is the URL-safe base64
//! HMAC-SHA256 of `policy` under the secret key.

use base64::prelude::*;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone, Default, Deserialize, Serialize)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl Credentials {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.access_key.is_empty() && !self.secret_key.is_empty()
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .expect("HMAC can take key of any size")
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// What a token may write: any new key in a bucket, or one exact key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutScope {
    /// Create-only writes anywhere in the bucket.
    Bucket(String),
    /// Writes to a single key, overwriting it if present.
    Key { bucket: String, key: String },
}

impl PutScope {
    pub fn bucket(&self) -> &str {
        match self {
            PutScope::Bucket(bucket) | PutScope::Key { bucket, .. } => bucket,
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((bucket, key)) => PutScope::Key {
                bucket: bucket.to_string(),
                key: key.to_string(),
            },
            None => PutScope::Bucket(raw.to_string()),
        }
    }
}

impl fmt::Display for PutScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PutScope::Bucket(bucket) => f.write_str(bucket),
            PutScope::Key { bucket, key } => write!(f, "{bucket}:{key}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutPolicy {
    pub scope: String,
    /// Unix seconds after which the token is refused.
    pub deadline: i64,
}

impl PutPolicy {
    pub fn new(scope: &PutScope, expiry: Duration) -> Self {
        let ttl = i64::try_from(expiry.as_secs()).unwrap_or(i64::MAX);
        Self {
            scope: scope.to_string(),
            deadline: chrono::Utc::now().timestamp().saturating_add(ttl),
        }
    }

    pub fn sign(&self, credentials: &Credentials) -> UploadToken {
        let policy = serde_json::json!({
            "scope": self.scope,
            "deadline": self.deadline,
        })
        .to_string();
        let encoded = BASE64_URL_SAFE.encode(policy);

        let mut mac = credentials.mac();
        mac.update(encoded.as_bytes());
        let signature = BASE64_URL_SAFE.encode(mac.finalize().into_bytes());

        UploadToken(format!("{}:{}:{}", credentials.access_key, signature, encoded))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed upload token")]
    Malformed,
    #[error("unknown access key")]
    UnknownAccessKey,
    #[error("bad token signature")]
    BadSignature,
    #[error("upload token expired")]
    Expired,
}

#[derive(Clone, PartialEq, Eq)]
pub struct UploadToken(String);

impl UploadToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check the token against `credentials` and return its policy.
    pub fn verify(&self, credentials: &Credentials, now: i64) -> Result<PutPolicy, TokenError> {
        let mut parts = self.0.splitn(3, ':');
        let (Some(access_key), Some(signature), Some(encoded)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed);
        };

        if access_key != credentials.access_key {
            return Err(TokenError::UnknownAccessKey);
        }

        let signature = BASE64_URL_SAFE
            .decode(signature)
            .map_err(|_| TokenError::Malformed)?;
        let mut mac = credentials.mac();
        mac.update(encoded.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let policy = BASE64_URL_SAFE
            .decode(encoded)
            .map_err(|_| TokenError::Malformed)?;
        let policy: PutPolicy =
            serde_json::from_slice(&policy).map_err(|_| TokenError::Malformed)?;

        if policy.deadline < now {
            return Err(TokenError::Expired);
        }

        Ok(policy)
    }
}

impl fmt::Debug for UploadToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // access key only; the rest is a bearer credential
        let access_key = self.0.split(':').next().unwrap_or_default();
        write!(f, "UploadToken({access_key}:..)")
    }
}
