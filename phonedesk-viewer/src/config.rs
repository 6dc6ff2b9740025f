//! Viewer configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level configuration for the viewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Admin-console API settings.
    pub api: ApiConfig,
    /// Decode-sink settings.
    pub sink: SinkConfig,
    /// Stream tuning.
    pub stream: StreamConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Admin-console API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API base URL (http/https; converted to ws/wss for streaming).
    pub base_url: String,
    /// Bearer token for the streaming endpoint. Empty = none.
    pub token: String,
}

/// Decode-sink settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// External player command for the primary backend. Empty
    /// disables it and forces the spool fallback.
    pub player: String,
    /// Spool directory for the fallback backend. Empty = system
    /// temp directory.
    pub spool_dir: String,
}

/// Stream tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Log first-frame bytes and NAL-type statistics.
    pub debug_stats: bool,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            sink: SinkConfig::default(),
            stream: StreamConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".into(),
            token: String::new(),
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            player: "ffplay".into(),
            spool_dir: String::new(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self { debug_stats: false }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ViewerConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// The spool directory, resolved against the system temp dir
    /// when unset.
    pub fn spool_dir(&self) -> PathBuf {
        if self.sink.spool_dir.is_empty() {
            std::env::temp_dir().join("phonedesk")
        } else {
            PathBuf::from(&self.sink.spool_dir)
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let cfg = ViewerConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert!(text.contains("base_url"));
        assert!(text.contains("player"));
    }

    #[test]
    fn roundtrip_config() {
        let cfg = ViewerConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let parsed: ViewerConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.api.base_url, "http://127.0.0.1:8080");
        assert_eq!(parsed.sink.player, "ffplay");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let parsed: ViewerConfig = toml::from_str("[api]\nbase_url = \"https://desk\"\n").unwrap();
        assert_eq!(parsed.api.base_url, "https://desk");
        assert_eq!(parsed.logging.level, "info");
    }

    #[test]
    fn empty_spool_dir_resolves_to_temp() {
        let cfg = ViewerConfig::default();
        assert!(cfg.spool_dir().starts_with(std::env::temp_dir()));
    }
}
