//! Request identifiers
//!
//! An id is the URL-safe base64 of the process id (u32, little endian)
//! followed by the current unix time in nanoseconds (u64, little endian).
//! Nothing is shared between calls, so one generator can serve every
//! connection without synchronization.

use base64::prelude::*;
use std::time::{SystemTime, UNIX_EPOCH};

const ID_LEN: usize = 12;

#[derive(Debug, Clone)]
pub struct RequestIdGenerator {
    pid: u32,
}

impl RequestIdGenerator {
    pub fn new() -> Self {
        Self::with_pid(std::process::id())
    }

    pub fn with_pid(pid: u32) -> Self {
        Self { pid }
    }

    pub fn next_id(&self) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        encode(self.pid, nanos)
    }
}

impl Default for RequestIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn encode(pid: u32, nanos: u64) -> String {
    let mut bytes = [0u8; ID_LEN];
    bytes[..4].copy_from_slice(&pid.to_le_bytes());
    bytes[4..].copy_from_slice(&nanos.to_le_bytes());
    BASE64_URL_SAFE.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(id: &str) -> Option<(u32, u64)> {
        let bytes = BASE64_URL_SAFE.decode(id).ok()?;
        if bytes.len() != ID_LEN {
            return None;
        }
        let pid = u32::from_le_bytes(bytes[..4].try_into().ok()?);
        let nanos = u64::from_le_bytes(bytes[4..].try_into().ok()?);
        Some((pid, nanos))
    }

    #[test]
    fn test_id_roundtrips_pid_and_clock() {
        let generator = RequestIdGenerator::with_pid(4242);
        let before = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos() as u64;

        let id = generator.next_id();
        let (pid, nanos) = decode(&id).unwrap();

        assert_eq!(id.len(), 16);
        assert_eq!(pid, 4242);
        assert!(nanos >= before);
    }

    #[test]
    fn test_ids_are_url_safe() {
        let id = encode(u32::MAX, u64::MAX);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_decode_rejects_foreign_values() {
        assert!(decode("not base64!").is_none());
        assert!(decode("AAAA").is_none());
    }
}
