//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILNORM_CONFIG` (environment variable)
//! 2. `~/.config/mailnorm/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailnorm\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Body and address size policy.
    pub limits: LimitsConfig,
    /// Mail-store diagnostics handling.
    pub store: StoreConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
}

/// Size policy applied while building a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest decoded `text/plain` part promoted to the body.
    pub text_body_max_bytes: usize,
    /// Largest decoded `text/html` part promoted to the body.
    pub html_body_max_bytes: usize,
    /// Extracted addresses are cut to this many characters.
    pub address_max_chars: usize,
}

/// Mail-store diagnostics handling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Diagnostics containing any of these (case-insensitive) never fail a fetch.
    pub benign_warnings: Vec<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            cache_dir: None,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            text_body_max_bytes: 5_000,
            html_body_max_bytes: 10_000,
            address_max_chars: crate::parser::address::MAX_ADDRESS_CHARS,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            benign_warnings: vec!["Unexpected characters at end of address".to_string()],
        }
    }
}

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILNORM_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("mailnorm").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailnorm")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.general.log_level, "warn");
        assert_eq!(cfg.limits.text_body_max_bytes, 5_000);
        assert_eq!(cfg.limits.html_body_max_bytes, 10_000);
        assert_eq!(cfg.limits.address_max_chars, 64);
        assert_eq!(cfg.store.benign_warnings.len(), 1);
    }

    #[test]
    fn test_serialize_deserialize_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial = r#"
[limits]
text_body_max_bytes = 100

[store]
benign_warnings = []
"#;
        let cfg: Config = toml::from_str(partial).expect("parse partial");
        assert_eq!(cfg.limits.text_body_max_bytes, 100);
        assert_eq!(cfg.limits.html_body_max_bytes, 10_000);
        assert!(cfg.store.benign_warnings.is_empty());
        assert_eq!(cfg.general.log_level, "warn");
    }

    #[test]
    fn test_cache_dir_override() {
        let mut cfg = Config::default();
        cfg.general.cache_dir = Some(PathBuf::from("/tmp/mailnorm-test"));
        assert_eq!(cache_dir(&cfg), PathBuf::from("/tmp/mailnorm-test"));
    }
}
