use super::models::Config;
use config::{ConfigError, Environment, File, FileFormat};
use std::path::Path;

const ENV_PREFIX: &str = "FOPBOX";
const ENV_SEPARATOR: &str = "__";

/// Load configuration with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file at `config_path` (required)
/// 3. Environment variables, `.env` included (highest priority)
pub fn load(config_path: &Path) -> Result<Config, ConfigError> {
    // .env is optional
    let _ = dotenvy::dotenv();
    load_from_sources(config_path)
}

/// Load configuration from a specific path and the process environment
pub fn load_from_sources(config_path: &Path) -> Result<Config, ConfigError> {
    tracing::info!("Loading configuration from: {}", config_path.display());

    // FOPBOX__SERVER__LISTEN_PORT -> server.listen_port
    let config = config::Config::builder()
        .add_source(
            File::from(config_path)
                .format(FileFormat::Toml)
                .required(true),
        )
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        )
        .build()?;

    config.try_deserialize()
}
