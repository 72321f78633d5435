use serde::{Deserialize, Serialize};

/// Per-entry result reported to the caller.
///
/// Exactly one of `hash` and `error` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadOutcome {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadOutcome {
    pub fn stored(key: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            hash: Some(hash.into()),
            error: None,
        }
    }

    pub fn failed(key: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            hash: None,
            error: Some(error.into()),
        }
    }

    pub fn is_stored(&self) -> bool {
        self.hash.is_some()
    }
}

/// JSON body of a finished archive job, entries in archive order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveResult {
    pub files: Vec<UploadOutcome>,
}

impl ArchiveResult {
    pub fn stored_count(&self) -> usize {
        self.files.iter().filter(|f| f.is_stored()).count()
    }
}
