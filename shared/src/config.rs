use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable overriding the configured service base URL.
pub const BASE_URL_ENV: &str = "CONSULT_API_BASE_URL";

const DEFAULT_BASE_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub audio: AudioConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub device: Option<String>,
    pub sample_rate: u32,
    pub channels: u16,
    pub buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            audio: AudioConfig::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            // Uploads can be large; give the service a full minute.
            timeout_seconds: 60,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None, // Use default device
            sample_rate: 16000,
            channels: 1,
            buffer_size: 1024,
        }
    }
}

impl Config {
    /// Load from the config file if one exists, then apply the environment
    /// override for the base URL.
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                serde_yaml::from_str(&raw)
                    .with_context(|| format!("invalid config file {}", path.display()))?
            }
            _ => Self::default(),
        };
        config.apply_base_url_override(std::env::var(BASE_URL_ENV).ok());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path().context("no config directory available")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        std::fs::write(&path, serde_yaml::to_string(self)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("consult").join("config.yaml"))
    }

    /// Apply a base URL from the environment or a CLI flag. Empty values are
    /// ignored; a trailing slash is trimmed so endpoint paths join cleanly.
    pub fn apply_base_url_override(&mut self, base_url: Option<String>) {
        if let Some(url) = base_url.filter(|url| !url.trim().is_empty()) {
            self.api.base_url = url.trim().trim_end_matches('/').to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_service() {
        let config = Config::default();
        assert_eq!(config.api.base_url, "http://localhost:8000");
        assert_eq!(config.api.timeout_seconds, 60);
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.channels, 1);
        assert_eq!(config.audio.device, None);
    }

    #[test]
    fn override_replaces_base_url_and_trims_slash() {
        let mut config = Config::default();
        config.apply_base_url_override(Some("https://consult.example.com/".to_string()));
        assert_eq!(config.api.base_url, "https://consult.example.com");
    }

    #[test]
    fn empty_override_is_ignored() {
        let mut config = Config::default();
        config.apply_base_url_override(Some("  ".to_string()));
        config.apply_base_url_override(None);
        assert_eq!(config.api.base_url, "http://localhost:8000");
    }

    #[test]
    fn partial_config_file_fills_in_defaults() {
        let config: Config = serde_yaml::from_str("api:\n  base_url: http://host:9000\n").unwrap();
        assert_eq!(config.api.base_url, "http://host:9000");
        assert_eq!(config.api.timeout_seconds, 60);
        assert_eq!(config.audio.sample_rate, 16000);
    }

    #[test]
    fn config_round_trips_through_yaml() {
        let config = Config::default();
        let raw = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&raw).unwrap();
        assert_eq!(parsed, config);
    }
}
