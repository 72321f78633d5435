//! `archive/bucket/<bucket>/prefix/<prefix>/overwrite/<0|1>`
//!
//! Bucket and prefix are URL-safe base64 (padding optional); prefix and
//! overwrite may be left out.

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use regex::Regex;
use std::sync::LazyLock;

use super::OP_NAME;
use crate::handlers::JobError;
use crate::storage::PutScope;

const PARAM_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

static COMMAND_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^{OP_NAME}/bucket/([0-9A-Za-z_=-]+)(?:/prefix/([0-9A-Za-z_=-]+))?(?:/overwrite/(0|1))?$"
    ))
    .expect("archive command pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveCommand {
    pub bucket: String,
    pub prefix: String,
    pub overwrite: bool,
}

impl ArchiveCommand {
    pub fn parse(command: &str) -> Result<Self, JobError> {
        let captures = COMMAND_PATTERN.captures(command).ok_or_else(|| {
            JobError::CommandFormat(format!("invalid {OP_NAME} command format"))
        })?;

        let bucket = decode_param(&captures[1], "bucket")?;
        let prefix = match captures.get(2) {
            Some(raw) => decode_param(raw.as_str(), "prefix")?,
            None => String::new(),
        };
        let overwrite = captures.get(3).is_some_and(|flag| flag.as_str() == "1");

        Ok(Self {
            bucket,
            prefix,
            overwrite,
        })
    }

    /// Build the command string a caller would send for these parameters.
    pub fn encode(&self) -> String {
        let mut command = format!("{OP_NAME}/bucket/{}", PARAM_ENGINE.encode(&self.bucket));
        if !self.prefix.is_empty() {
            command.push_str("/prefix/");
            command.push_str(&PARAM_ENGINE.encode(&self.prefix));
        }
        if self.overwrite {
            command.push_str("/overwrite/1");
        }
        command
    }

    pub fn key_for(&self, entry_name: &str) -> String {
        format!("{}{}", self.prefix, entry_name)
    }

    /// Token scope for `key`: the single key when overwriting, else the bucket.
    pub fn scope_for(&self, key: &str) -> PutScope {
        if self.overwrite {
            PutScope::Key {
                bucket: self.bucket.clone(),
                key: key.to_string(),
            }
        } else {
            PutScope::Bucket(self.bucket.clone())
        }
    }
}

fn decode_param(raw: &str, name: &str) -> Result<String, JobError> {
    let invalid = || JobError::CommandFormat(format!("invalid {OP_NAME} parameter '{name}'"));
    let bytes = PARAM_ENGINE.decode(raw).map_err(|_| invalid())?;
    String::from_utf8(bytes).map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format_error(command: &str) -> String {
        match ArchiveCommand::parse(command) {
            Err(JobError::CommandFormat(msg)) => msg,
            other => panic!("expected format error for {command}, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_full_command() {
        let command =
            ArchiveCommand::parse("archive/bucket/bXktYnVja2V0/prefix/cGhvdG9zLw==/overwrite/1")
                .unwrap();

        assert_eq!(command.bucket, "my-bucket");
        assert_eq!(command.prefix, "photos/");
        assert!(command.overwrite);
    }

    #[test]
    fn test_optional_parts_default() {
        let command = ArchiveCommand::parse("archive/bucket/bXktYnVja2V0").unwrap();
        assert_eq!(command.prefix, "");
        assert!(!command.overwrite);

        let command = ArchiveCommand::parse("archive/bucket/bXktYnVja2V0/overwrite/0").unwrap();
        assert!(!command.overwrite);

        // padding may be dropped
        let command = ArchiveCommand::parse("archive/bucket/bXktYnVja2V0/prefix/cGhvdG9zLw").unwrap();
        assert_eq!(command.prefix, "photos/");
    }

    #[test]
    fn test_encode_parse_roundtrip() {
        for (bucket, prefix, overwrite) in [
            ("media", "", false),
            ("my-bucket", "2024/05/01/", true),
            ("b", "目录/", false),
        ] {
            let command = ArchiveCommand {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
                overwrite,
            };
            assert_eq!(ArchiveCommand::parse(&command.encode()).unwrap(), command);
        }
    }

    #[test]
    fn test_grammar_mismatch() {
        for command in [
            "",
            "archive",
            "archive/bucket/",
            "unzip/bucket/bXktYnVja2V0",
            "archive/bucket/bXk+YnVja2V0",
            "archive/bucket/bXktYnVja2V0/overwrite/2",
            "archive/bucket/bXktYnVja2V0/overwrite/1/prefix/cGhvdG9zLw==",
            "archive/bucket/bXktYnVja2V0/prefix/cGhvdG9zLw==/extra",
        ] {
            assert_eq!(format_error(command), "invalid archive command format");
        }
    }

    #[test]
    fn test_undecodable_parameters() {
        assert_eq!(
            format_error("archive/bucket/b=X"),
            "invalid archive parameter 'bucket'"
        );

        let not_utf8 = PARAM_ENGINE.encode([0xff, 0xfe, 0xfd]);
        assert_eq!(
            format_error(&format!("archive/bucket/bXktYnVja2V0/prefix/{not_utf8}")),
            "invalid archive parameter 'prefix'"
        );
    }

    #[test]
    fn test_scope_follows_overwrite_flag() {
        let mut command = ArchiveCommand::parse("archive/bucket/bXktYnVja2V0").unwrap();
        assert_eq!(
            command.scope_for("a.txt"),
            PutScope::Bucket("my-bucket".to_string())
        );

        command.overwrite = true;
        assert_eq!(command.scope_for("a.txt").to_string(), "my-bucket:a.txt");
        assert_eq!(command.key_for("a.txt"), "a.txt");
    }
}
