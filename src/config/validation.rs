use super::models::{Config, StorageProvider};
use crate::handlers::archive;
use thiserror::Error;

/// Operations this build knows how to register.
pub const KNOWN_HANDLERS: &[&str] = &[archive::OP_NAME];

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("No handlers configured (add at least one [handlers.<name>] section)")]
    NoHandlersConfigured,

    #[error("Unknown handler '{name}', expected one of: {known}")]
    UnknownHandler { name: String, known: String },

    #[error("Operation prefix '{prefix}' must not contain '/'")]
    InvalidOpPrefix { prefix: String },

    #[error("Read timeout must be positive")]
    InvalidReadTimeout,

    #[error("max_form_bytes must be positive")]
    InvalidFormLimit,

    #[error("Storage is missing credentials (access_key or secret_key)")]
    MissingStorageCredentials,

    #[error("Local storage provider needs a root directory")]
    MissingStorageRoot,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_handlers(config)?;
    validate_server(config)?;
    validate_storage(config)?;
    Ok(())
}

fn validate_handlers(config: &Config) -> Result<(), ValidationError> {
    if config.handlers.is_empty() {
        return Err(ValidationError::NoHandlersConfigured);
    }

    if let Some(name) = config
        .handlers
        .keys()
        .find(|name| !KNOWN_HANDLERS.contains(&name.as_str()))
    {
        return Err(ValidationError::UnknownHandler {
            name: name.clone(),
            known: KNOWN_HANDLERS.join(", "),
        });
    }

    Ok(())
}

fn validate_server(config: &Config) -> Result<(), ValidationError> {
    if config.server.op_prefix.contains('/') {
        return Err(ValidationError::InvalidOpPrefix {
            prefix: config.server.op_prefix.clone(),
        });
    }
    if config.server.read_timeout_secs == 0 {
        return Err(ValidationError::InvalidReadTimeout);
    }
    if config.server.max_form_bytes.is_zero() {
        return Err(ValidationError::InvalidFormLimit);
    }
    Ok(())
}

fn validate_storage(config: &Config) -> Result<(), ValidationError> {
    if config.storage.access_key.is_empty() || config.storage.secret_key.is_empty() {
        return Err(ValidationError::MissingStorageCredentials);
    }
    if config.storage.provider == StorageProvider::Local
        && config.storage.root.as_os_str().is_empty()
    {
        return Err(ValidationError::MissingStorageRoot);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::HandlerConfig;
    use crate::humanize::ByteSize;
    use std::path::PathBuf;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.storage.access_key = "ak".to_string();
        config.storage.secret_key = "sk".to_string();
        config.handlers.insert(
            "archive".to_string(),
            HandlerConfig {
                config: PathBuf::from("archive.conf"),
            },
        );
        config
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_requires_known_handlers() {
        let mut config = valid_config();
        config.handlers.clear();
        assert!(matches!(
            validate(&config),
            Err(ValidationError::NoHandlersConfigured)
        ));

        let mut config = valid_config();
        config.handlers.insert(
            "resize".to_string(),
            HandlerConfig {
                config: PathBuf::from("resize.conf"),
            },
        );
        let err = validate(&config).unwrap_err();
        assert!(matches!(err, ValidationError::UnknownHandler { ref name, .. } if name == "resize"));
    }

    #[test]
    fn test_server_limits() {
        let mut config = valid_config();
        config.server.op_prefix = "qn/".to_string();
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidOpPrefix { .. })
        ));

        let mut config = valid_config();
        config.server.read_timeout_secs = 0;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidReadTimeout)
        ));

        let mut config = valid_config();
        config.server.max_form_bytes = ByteSize(0);
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidFormLimit)
        ));
    }

    #[test]
    fn test_storage_credentials_required() {
        let mut config = valid_config();
        config.storage.secret_key.clear();
        assert!(matches!(
            validate(&config),
            Err(ValidationError::MissingStorageCredentials)
        ));

        let mut config = valid_config();
        config.storage.provider = StorageProvider::Memory;
        config.storage.root = PathBuf::new();
        assert!(validate(&config).is_ok());
    }
}
