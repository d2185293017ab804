//! Runtime configuration for the lab workspace core.
//!
//! # Responsibility
//! - Load settings from JSON or process environment.
//! - Derive the engine settings injected into `LabEngine`.
//!
//! # Invariants
//! - `validate()` must pass before a config is used to build remotes.
//! - Search limit is clamped into `1..=SEARCH_LIMIT_MAX`.

use crate::search::SEARCH_LIMIT_MAX;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

const ENV_API_URL: &str = "LABSPACE_API_URL";
const ENV_REQUEST_TIMEOUT_MS: &str = "LABSPACE_REQUEST_TIMEOUT_MS";
const ENV_UNDO_WINDOW_MS: &str = "LABSPACE_UNDO_WINDOW_MS";
const ENV_REJECT_OVERLAPPING: &str = "LABSPACE_REJECT_OVERLAPPING";

/// Configuration load/validation errors.
#[derive(Debug)]
pub enum ConfigError {
    Parse(serde_json::Error),
    InvalidValue { key: &'static str, message: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "invalid config json: {err}"),
            Self::InvalidValue { key, message } => write!(f, "invalid config `{key}`: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::InvalidValue { .. } => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LabspaceConfig {
    pub api_base_url: String,
    pub request_timeout_ms: u64,
    pub search_limit: u32,
    pub search_display_limit: usize,
    pub undo_window_ms: u64,
    pub success_toast_ms: u64,
    pub error_toast_ms: u64,
    pub reject_overlapping_mutations: bool,
}

impl Default for LabspaceConfig {
    fn default() -> Self {
        Self {
            api_base_url: String::new(),
            request_timeout_ms: 15_000,
            search_limit: SEARCH_LIMIT_MAX,
            search_display_limit: 10,
            undo_window_ms: 8_000,
            success_toast_ms: 3_000,
            error_toast_ms: 5_000,
            reject_overlapping_mutations: false,
        }
    }
}

impl LabspaceConfig {
    /// Parses a camelCase JSON document; missing keys take defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `LABSPACE_*` environment variables over the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`LabspaceConfig::from_env`] with an injectable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(url) = lookup(ENV_API_URL) {
            config.api_base_url = url.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_REQUEST_TIMEOUT_MS) {
            config.request_timeout_ms = parse_u64("requestTimeoutMs", &raw)?;
        }
        if let Some(raw) = lookup(ENV_UNDO_WINDOW_MS) {
            config.undo_window_ms = parse_u64("undoWindowMs", &raw)?;
        }
        if let Some(raw) = lookup(ENV_REJECT_OVERLAPPING) {
            config.reject_overlapping_mutations =
                matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges; an empty `api_base_url` is allowed for
    /// in-process remotes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.api_base_url.trim();
        if !url.is_empty() && !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                key: "apiBaseUrl",
                message: format!("expected absolute http(s) url, got `{url}`"),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "requestTimeoutMs",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.undo_window_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "undoWindowMs",
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Effective remote search ceiling.
    pub fn effective_search_limit(&self) -> u32 {
        self.search_limit.clamp(1, SEARCH_LIMIT_MAX)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            undo_window: Duration::from_millis(self.undo_window_ms),
            success_toast_ms: self.success_toast_ms,
            error_toast_ms: self.error_toast_ms,
            reject_overlapping_mutations: self.reject_overlapping_mutations,
        }
    }
}

/// Settings consumed by the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// How long a removed subject can be restored locally.
    pub undo_window: Duration,
    pub success_toast_ms: u64,
    pub error_toast_ms: u64,
    /// Reject a mutation whose subject/category already has one in flight.
    pub reject_overlapping_mutations: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        LabspaceConfig::default().engine_settings()
    }
}

fn parse_u64(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|err| ConfigError::InvalidValue {
            key,
            message: format!("`{}` is not a number: {err}", raw.trim()),
        })
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, LabspaceConfig};
    use std::collections::HashMap;

    #[test]
    fn json_fills_missing_keys_with_defaults() {
        let config =
            LabspaceConfig::from_json_str(r#"{"apiBaseUrl":"https://api.example.test"}"#).unwrap();
        assert_eq!(config.api_base_url, "https://api.example.test");
        assert_eq!(config.search_display_limit, 10);
        assert!(!config.reject_overlapping_mutations);
    }

    #[test]
    fn rejects_relative_url() {
        let err = LabspaceConfig::from_json_str(r#"{"apiBaseUrl":"api/v1"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "apiBaseUrl", .. }));
    }

    #[test]
    fn env_lookup_overrides_defaults() {
        let env = HashMap::from([
            ("LABSPACE_API_URL", "http://localhost:8080"),
            ("LABSPACE_UNDO_WINDOW_MS", "1500"),
            ("LABSPACE_REJECT_OVERLAPPING", "true"),
        ]);
        let config =
            LabspaceConfig::from_lookup(|key| env.get(key).map(|value| value.to_string())).unwrap();
        assert_eq!(config.undo_window_ms, 1500);
        assert!(config.engine_settings().reject_overlapping_mutations);
    }

    #[test]
    fn env_lookup_rejects_non_numeric_timeout() {
        let err = LabspaceConfig::from_lookup(|key| {
            (key == "LABSPACE_REQUEST_TIMEOUT_MS").then(|| "soon".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("requestTimeoutMs"));
    }

    #[test]
    fn search_limit_is_clamped() {
        let config = LabspaceConfig {
            search_limit: 5_000,
            ..LabspaceConfig::default()
        };
        assert_eq!(config.effective_search_limit(), 300);
    }
}
