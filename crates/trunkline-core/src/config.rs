//! Client configuration with file and environment variable layers.
//!
//! Loading flow:
//! 1. Start with compiled [`ClientConfig::default()`]
//! 2. If `~/.trunkline/config.json` exists, its keys override defaults
//!    (missing keys keep their default values)
//! 3. Apply environment variable overrides (highest priority)
//!
//! The loaded value is a plain record handed to the stream at construction.
//! There is no global configuration state.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Behavior switches for the streaming client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    /// Whether wildcard listeners receive every inbound frame.
    pub wildcard_event_enabled: bool,
    /// Whether payload-carrying debug logs are emitted.
    pub debug_log_enabled: bool,
    /// Authorization polling interval in milliseconds.
    pub polling_interval_ms: u64,
    /// How long `disconnect` waits for close confirmation, in milliseconds.
    pub disconnect_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            wildcard_event_enabled: false,
            debug_log_enabled: false,
            polling_interval_ms: 1_000,
            disconnect_timeout_ms: 5_000,
        }
    }
}

impl ClientConfig {
    /// Authorization polling interval as a [`Duration`].
    #[must_use]
    pub const fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }

    /// Disconnect confirmation deadline as a [`Duration`].
    #[must_use]
    pub const fn disconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.disconnect_timeout_ms)
    }
}

/// Errors that can occur when loading the client configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file from disk.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse JSON in the config file.
    #[error("failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Resolve the path to the config file (`~/.trunkline/config.json`).
#[must_use]
pub fn config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".trunkline").join("config.json")
}

/// Load configuration from the default path with env var overrides.
///
/// # Errors
///
/// Returns [`ConfigError`] if the file exists but cannot be read or parsed.
pub fn load_config() -> Result<ClientConfig, ConfigError> {
    load_config_from_path(&config_path())
}

/// Load configuration from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. Keys absent from the file
/// keep their default values.
///
/// # Errors
///
/// Returns [`ConfigError`] if the file exists but cannot be read or parsed.
pub fn load_config_from_path(path: &Path) -> Result<ClientConfig, ConfigError> {
    let mut config = if path.exists() {
        debug!(?path, "loading config from file");
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)?
    } else {
        debug!(?path, "config file not found, using defaults");
        ClientConfig::default()
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Apply environment variable overrides to a loaded configuration.
///
/// Each env var has strict parsing rules:
/// - Integers must be valid and within the specified range
/// - Booleans accept: `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`
/// - Invalid values are ignored with a warning (fall back to file/default)
pub fn apply_env_overrides(config: &mut ClientConfig) {
    apply_env_overrides_from(config, |name| std::env::var(name).ok());
}

/// Override application with an injectable variable source.
fn apply_env_overrides_from(config: &mut ClientConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = read_env_bool(&lookup, "TRUNKLINE_WILDCARD_EVENTS") {
        config.wildcard_event_enabled = v;
    }
    if let Some(v) = read_env_bool(&lookup, "TRUNKLINE_DEBUG_LOG") {
        config.debug_log_enabled = v;
    }
    if let Some(v) = read_env_u64(&lookup, "TRUNKLINE_POLLING_INTERVAL_MS", 100, 600_000) {
        config.polling_interval_ms = v;
    }
    if let Some(v) = read_env_u64(&lookup, "TRUNKLINE_DISCONNECT_TIMEOUT_MS", 100, 600_000) {
        config.disconnect_timeout_ms = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
#[must_use]
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
#[must_use]
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_bool(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<bool> {
    let val = lookup(name)?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u64(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    min: u64,
    max: u64,
) -> Option<u64> {
    let val = lookup(name)?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── defaults ────────────────────────────────────────────────────

    #[test]
    fn defaults_match_documented_values() {
        let config = ClientConfig::default();
        assert!(!config.wildcard_event_enabled);
        assert!(!config.debug_log_enabled);
        assert_eq!(config.polling_interval_ms, 1_000);
        assert_eq!(config.disconnect_timeout_ms, 5_000);
    }

    #[test]
    fn duration_accessors() {
        let config = ClientConfig {
            polling_interval_ms: 250,
            disconnect_timeout_ms: 1_500,
            ..ClientConfig::default()
        };
        assert_eq!(config.polling_interval(), Duration::from_millis(250));
        assert_eq!(config.disconnect_timeout(), Duration::from_millis(1_500));
    }

    // ── load_config_from_path ───────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let path = Path::new("/nonexistent/trunkline/config.json");
        let config = load_config_from_path(path).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn load_empty_json_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{}").unwrap();

        let config = load_config_from_path(&path).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"wildcardEventEnabled": true, "pollingIntervalMs": 500}"#,
        )
        .unwrap();

        let config = load_config_from_path(&path).unwrap();
        assert!(config.wildcard_event_enabled);
        assert_eq!(config.polling_interval_ms, 500);
        assert!(!config.debug_log_enabled);
        assert_eq!(config.disconnect_timeout_ms, 5_000);
    }

    #[test]
    fn load_unknown_keys_are_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"debugLogEnabled": true, "futureKnob": 7}"#).unwrap();

        let config = load_config_from_path(&path).unwrap();
        assert!(config.debug_log_enabled);
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_config_from_path(&path);
        assert!(matches!(result, Err(ConfigError::Json(_))));
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = ClientConfig {
            wildcard_event_enabled: true,
            debug_log_enabled: true,
            polling_interval_ms: 2_000,
            disconnect_timeout_ms: 10_000,
        };
        let text = serde_json::to_string(&config).unwrap();
        assert!(text.contains("wildcardEventEnabled"));
        let back: ClientConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back, config);
    }

    // ── env overrides ───────────────────────────────────────────────

    #[test]
    fn env_layer_overrides_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"wildcardEventEnabled": true, "pollingIntervalMs": 500}"#,
        )
        .unwrap();

        let mut config = load_config_from_path(&path).unwrap();
        apply_env_overrides_from(&mut config, |name| match name {
            "TRUNKLINE_WILDCARD_EVENTS" => Some("false".to_string()),
            "TRUNKLINE_DISCONNECT_TIMEOUT_MS" => Some("9000".to_string()),
            _ => None,
        });

        assert!(!config.wildcard_event_enabled, "env value beats file value");
        assert_eq!(config.disconnect_timeout_ms, 9_000, "env value beats default");
        assert_eq!(config.polling_interval_ms, 500, "unset vars keep the file value");
    }

    #[test]
    fn env_layer_sets_every_field() {
        let mut config = ClientConfig::default();
        apply_env_overrides_from(&mut config, |name| match name {
            "TRUNKLINE_WILDCARD_EVENTS" => Some("yes".to_string()),
            "TRUNKLINE_DEBUG_LOG" => Some("1".to_string()),
            "TRUNKLINE_POLLING_INTERVAL_MS" => Some("250".to_string()),
            "TRUNKLINE_DISCONNECT_TIMEOUT_MS" => Some("600000".to_string()),
            _ => None,
        });

        assert!(config.wildcard_event_enabled);
        assert!(config.debug_log_enabled);
        assert_eq!(config.polling_interval_ms, 250);
        assert_eq!(config.disconnect_timeout_ms, 600_000);
    }

    #[test]
    fn env_layer_ignores_invalid_values() {
        let mut config = ClientConfig {
            debug_log_enabled: true,
            polling_interval_ms: 2_000,
            ..ClientConfig::default()
        };
        apply_env_overrides_from(&mut config, |name| match name {
            "TRUNKLINE_DEBUG_LOG" => Some("definitely".to_string()),
            "TRUNKLINE_POLLING_INTERVAL_MS" => Some("99".to_string()),
            "TRUNKLINE_DISCONNECT_TIMEOUT_MS" => Some("not-a-number".to_string()),
            _ => None,
        });

        assert!(config.debug_log_enabled, "unparseable boolean keeps prior value");
        assert_eq!(config.polling_interval_ms, 2_000, "out-of-range integer keeps prior value");
        assert_eq!(config.disconnect_timeout_ms, 5_000);
    }

    // ── parse_bool ──────────────────────────────────────────────────

    #[test]
    fn parse_bool_true_variants() {
        for val in &["true", "1", "yes", "on", "TRUE", "Yes", "ON"] {
            assert_eq!(parse_bool(val), Some(true), "failed for {val}");
        }
    }

    #[test]
    fn parse_bool_false_variants() {
        for val in &["false", "0", "no", "off", "FALSE", "No", "OFF"] {
            assert_eq!(parse_bool(val), Some(false), "failed for {val}");
        }
    }

    #[test]
    fn parse_bool_invalid() {
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
        assert_eq!(parse_bool("2"), None);
    }

    // ── parse_u64_range ─────────────────────────────────────────────

    #[test]
    fn parse_u64_valid() {
        assert_eq!(parse_u64_range("5000", 100, 600_000), Some(5_000));
        assert_eq!(parse_u64_range("100", 100, 600_000), Some(100));
        assert_eq!(parse_u64_range("600000", 100, 600_000), Some(600_000));
    }

    #[test]
    fn parse_u64_out_of_range() {
        assert_eq!(parse_u64_range("99", 100, 600_000), None);
        assert_eq!(parse_u64_range("600001", 100, 600_000), None);
    }

    #[test]
    fn parse_u64_invalid() {
        assert_eq!(parse_u64_range("abc", 100, 600_000), None);
        assert_eq!(parse_u64_range("", 100, 600_000), None);
        assert_eq!(parse_u64_range("-5", 100, 600_000), None);
    }

    // ── error display ───────────────────────────────────────────────

    #[test]
    fn io_error_display() {
        let err = ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "not found",
        ));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn json_error_display() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err = ConfigError::Json(json_err);
        assert!(err.to_string().contains("parse config JSON"));
    }
}
