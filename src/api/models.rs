//! Wire types of the `/handler` endpoint.
//!
//! A job is requested with two parameters, sent in the query string or as an
//! `application/x-www-form-urlencoded` body:
//!
//! ```text
//! POST /handler?cmd=archive/bucket/bXktYnVja2V0/prefix/cGhvdG9zLw==&url=https://cdn.example.com/photos.zip
//! ```
//!
//! Failures are answered with a single-field JSON document:
//!
//! ```json
//! {"error": "archive entries count exceeds the limit"}
//! ```

use serde::{Deserialize, Serialize};

/// `cmd` and `url` as found in one parameter source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct JobParams {
    #[serde(default)]
    pub cmd: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl JobParams {
    /// Fill the fields missing from `self` with those of `fallback`.
    pub fn or(self, fallback: JobParams) -> JobParams {
        JobParams {
            cmd: self.cmd.or(fallback.cmd),
            url: self.url.or(fallback.url),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
