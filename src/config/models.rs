use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub http: HttpClientConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Operation name to handler settings, e.g. `[handlers.archive]`
    #[serde(default)]
    pub handlers: BTreeMap<String, HandlerConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_host")]
    pub listen_host: String,
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    /// Upper bound for receiving a request body, in seconds
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    /// Largest urlencoded form body accepted on `/handler`
    #[serde(default = "default_max_form_bytes")]
    pub max_form_bytes: ByteSize,
    /// Prepended to every operation name, e.g. `qn-` registers `qn-archive`
    #[serde(default)]
    pub op_prefix: String,
    /// Directory for spooled archives and entries (system temp dir if unset)
    #[serde(default)]
    pub spool_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_host: default_listen_host(),
            listen_port: default_listen_port(),
            read_timeout_secs: default_read_timeout_secs(),
            max_form_bytes: default_max_form_bytes(),
            op_prefix: String::new(),
            spool_dir: None,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }

    pub fn spool_dir(&self) -> PathBuf {
        self.spool_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

fn default_listen_host() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    9100
}

fn default_read_timeout_secs() -> u64 {
    1800
}

fn default_max_form_bytes() -> ByteSize {
    ByteSize::mib(1)
}

/// Outbound HTTP client used to fetch job sources
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpClientConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("fopbox/{}", env!("CARGO_PKG_VERSION"))
}

/// Storage provider type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    /// Buckets are directories under `root`
    #[default]
    Local,
    /// Buckets live in process memory
    Memory,
}

/// Object storage the operations write to, and the key pair it trusts
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub provider: StorageProvider,
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    #[serde(default)]
    pub access_key: String,
    #[serde(default, skip_serializing)]
    pub secret_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::default(),
            root: default_storage_root(),
            access_key: String::new(),
            secret_key: String::new(),
        }
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("data/buckets")
}

/// Per-operation settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HandlerConfig {
    /// Operation-specific config file handed to the handler's `configure`
    pub config: PathBuf,
}
