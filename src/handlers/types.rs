use axum::body::Body;
use bytes::Bytes;
use http_body_util::BodyExt;
use serde::Serialize;
use tempfile::TempPath;

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_OCTET: &str = "application/octet-stream";

/// One inbound job, as seen by a handler
#[derive(Debug, Clone, Serialize)]
pub struct JobRequest {
    #[serde(rename = "cmd")]
    pub command: String,
    #[serde(rename = "url")]
    pub source_url: String,
    #[serde(skip)]
    pub request_id: String,
}

impl JobRequest {
    pub fn new(
        command: impl Into<String>,
        source_url: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            command: command.into(),
            source_url: source_url.into(),
            request_id: request_id.into(),
        }
    }

    /// Copy of this request with a different command.
    pub fn with_command(&self, command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..self.clone()
        }
    }
}

/// Request body handed to a handler.
///
/// Whatever the handler leaves unread is drained by the registry once it
/// returns.
#[derive(Debug, Default)]
pub struct JobBody {
    inner: Option<Body>,
}

impl JobBody {
    pub fn new(body: Body) -> Self {
        Self { inner: Some(body) }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Discard whatever is left of the body and return how many bytes that was.
    pub async fn drain(&mut self) -> u64 {
        let Some(mut body) = self.inner.take() else {
            return 0;
        };

        let mut drained = 0u64;
        while let Some(frame) = body.frame().await {
            match frame {
                Ok(frame) => {
                    if let Some(data) = frame.data_ref() {
                        drained += data.len() as u64;
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Request body ended early while draining");
                    break;
                }
            }
        }
        drained
    }
}

/// JSON result payload; serialization happens when the response is written.
pub trait JsonPayload: Send {
    fn to_json(&self) -> serde_json::Result<Vec<u8>>;
}

impl<T> JsonPayload for T
where
    T: Serialize + Send,
{
    fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// Result of a successful job, one variant per way of answering the caller
pub enum JobOutput {
    /// Structured payload written as a JSON document.
    Json(Box<dyn JsonPayload>),
    /// Bytes written verbatim.
    Bytes { data: Bytes, content_type: String },
    /// Local file streamed to the caller, removed afterwards.
    File { path: TempPath, content_type: String },
    /// Remote resource proxied to the caller.
    Remote { url: String },
}

impl JobOutput {
    pub fn json<T>(payload: T) -> Self
    where
        T: Serialize + Send + 'static,
    {
        JobOutput::Json(Box::new(payload))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            JobOutput::Json(_) => "json",
            JobOutput::Bytes { .. } => "bytes",
            JobOutput::File { .. } => "file",
            JobOutput::Remote { .. } => "remote",
        }
    }
}

impl std::fmt::Debug for JobOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobOutput::Json(_) => f.write_str("Json(..)"),
            JobOutput::Bytes { data, content_type } => f
                .debug_struct("Bytes")
                .field("len", &data.len())
                .field("content_type", content_type)
                .finish(),
            JobOutput::File { path, content_type } => f
                .debug_struct("File")
                .field("path", &path.display())
                .field("content_type", content_type)
                .finish(),
            JobOutput::Remote { url } => f.debug_struct("Remote").field("url", url).finish(),
        }
    }
}
