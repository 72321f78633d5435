//! Turns a [`JobOutput`] into the HTTP response.

use axum::body::Body;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE, LAST_MODIFIED};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tempfile::TempPath;
use tokio_util::io::ReaderStream;
use tracing::debug;

use super::error::ApiError;
use super::utils::http_date;
use crate::handlers::{CONTENT_TYPE_JSON, JobOutput};

pub async fn encode(output: JobOutput, http: &reqwest::Client) -> Result<Response, ApiError> {
    match output {
        JobOutput::Json(payload) => {
            let body = payload
                .to_json()
                .map_err(|e| ApiError::Encode(format!("encode job result error, {e}")))?;
            Ok(([(CONTENT_TYPE, CONTENT_TYPE_JSON)], body).into_response())
        }
        JobOutput::Bytes { data, content_type } => {
            let mut response = Response::new(Body::from(data));
            set_content_type(&mut response, &content_type);
            Ok(response)
        }
        JobOutput::File { path, content_type } => {
            let file = tokio::fs::File::open(&path)
                .await
                .map_err(|e| ApiError::Encode(format!("open job result file error, {e}")))?;
            let length = file.metadata().await.ok().map(|meta| meta.len());

            let stream = TempFileStream {
                inner: ReaderStream::new(file),
                _path: path,
            };

            let mut response = Response::new(Body::from_stream(stream));
            set_content_type(&mut response, &content_type);
            if let Some(length) = length {
                response
                    .headers_mut()
                    .insert(CONTENT_LENGTH, HeaderValue::from(length));
            }
            Ok(response)
        }
        JobOutput::Remote { url } => proxy_remote(&url, http).await,
    }
}

async fn proxy_remote(url: &str, http: &reqwest::Client) -> Result<Response, ApiError> {
    let upstream = http
        .get(url)
        .send()
        .await
        .map_err(|e| ApiError::Encode(format!("fetch job result error, {e}")))?;

    let status = upstream.status();
    if !status.is_success() {
        return Err(ApiError::Encode(format!("fetch job result error, {status}")));
    }
    debug!(url, %status, "Proxying remote job result");

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(LAST_MODIFIED, http_date(chrono::Utc::now()));
    for name in [CONTENT_TYPE, CONTENT_LENGTH] {
        if let Some(value) = upstream.headers().get(&name) {
            builder = builder.header(name, value.clone());
        }
    }

    builder
        .body(Body::from_stream(upstream.bytes_stream()))
        .map_err(|e| ApiError::Encode(format!("write job result error, {e}")))
}

/// Body of a `File` result; the file is removed when the stream is dropped,
/// whether or not it was read to the end.
struct TempFileStream {
    inner: ReaderStream<tokio::fs::File>,
    _path: TempPath,
}

impl Stream for TempFileStream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

fn set_content_type(response: &mut Response, content_type: &str) {
    if content_type.is_empty() {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(content_type) {
        response.headers_mut().insert(CONTENT_TYPE, value);
    }
}
