//! Outbound HTTP client shared by job sources and remote results

use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

use crate::config::HttpClientConfig;

#[derive(Debug, Error)]
#[error("HTTP client setup failed: {0}")]
pub struct HttpClientError(String);

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpClientConfig::default().into()
    }
}

impl From<HttpClientConfig> for HttpConfig {
    fn from(config: HttpClientConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            user_agent: config.user_agent,
        }
    }
}

/// Build the client. There is no overall request timeout: archives may take
/// as long as they take to download.
pub fn build_client(config: &HttpConfig) -> Result<Client, HttpClientError> {
    Client::builder()
        .connect_timeout(config.connect_timeout)
        .user_agent(&config.user_agent)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| HttpClientError(e.to_string()))
}
