//! Small helpers shared across the crate.

use crate::config::LoggingConfig;
use crate::error::{TaskModelError, TaskModelResult};
use std::fmt::Write;

/// Number of random bytes in a task id.
pub const TASK_ID_BYTES: usize = 12;

/// Generate a new task id: 12 random bytes, lower-case hex.
pub fn random_task_id() -> String {
    let bytes: [u8; TASK_ID_BYTES] = rand::random();
    hex_encode(&bytes)
}

/// Lower-case hex encoding.
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut out, byte| {
            let _ = write!(out, "{:02x}", byte);
            out
        })
}

/// Retry hint in whole seconds for a remaining-time estimate in milliseconds.
pub fn retry_after_secs(remaining_time_ms: u64) -> u64 {
    remaining_time_ms.div_ceil(1000)
}

/// Install a global `tracing` subscriber honouring the logging configuration.
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> TaskModelResult<()> {
    let level: tracing::Level = config.level.into();
    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(config.include_targets);

    let result = match (config.json_format, config.include_timestamps) {
        (true, true) => builder.json().try_init(),
        (true, false) => builder.json().without_time().try_init(),
        (false, true) => builder.with_ansi(config.colored).try_init(),
        (false, false) => builder.with_ansi(config.colored).without_time().try_init(),
    };

    result.map_err(|e| TaskModelError::config(format!("Failed to install subscriber: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_hex_encode() {
        assert_eq!(hex_encode(&[0x00, 0x0f, 0xab, 0xff]), "000fabff");
        assert_eq!(hex_encode(&[]), "");
    }

    #[test]
    fn test_random_task_id_shape() {
        let id = random_task_id();
        assert_eq!(id.len(), TASK_ID_BYTES * 2);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_random_task_ids_are_distinct() {
        let ids: HashSet<String> = (0..1000).map(|_| random_task_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        assert_eq!(retry_after_secs(5000), 5);
        assert_eq!(retry_after_secs(4500), 5);
        assert_eq!(retry_after_secs(1), 1);
        assert_eq!(retry_after_secs(0), 0);
    }

    #[test]
    fn test_init_tracing_twice_fails() {
        let config = LoggingConfig::default();
        // the first call may race with other tests, the second one never succeeds
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}
