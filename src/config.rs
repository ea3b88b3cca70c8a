use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayerConfig {
    #[serde(default = "default_volume")]
    pub initial_volume: f32,
    /// ffmpeg binary used to decode the stream.
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
    #[serde(default = "default_start_timeout")]
    pub start_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            initial_volume: default_volume(),
            ffmpeg: default_ffmpeg(),
            start_timeout_secs: default_start_timeout(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_volume() -> f32 {
    0.5
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_start_timeout() -> u64 {
    15
}

fn default_http_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    concat!("kuasark_tui/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Config {
    /// Load the user config, falling back to defaults when it is missing or broken.
    pub fn load() -> Self {
        let path = Self::config_path();
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("ignoring config at {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kuasark-tui")
            .join("config.toml")
    }
}

/// Directory for the log file.
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("kuasark-tui")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.player.initial_volume, 0.5);
        assert_eq!(config.player.ffmpeg, "ffmpeg");
        assert_eq!(config.player.start_timeout_secs, 15);
        assert_eq!(config.http.timeout_secs, 30);
        assert!(config.http.user_agent.starts_with("kuasark_tui/"));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [player]
            initial_volume = 0.8
            "#,
        )
        .unwrap();
        assert_eq!(config.player.initial_volume, 0.8);
        assert_eq!(config.player.ffmpeg, "ffmpeg");
        assert_eq!(config.http.timeout_secs, 30);
    }

    #[test]
    fn missing_file_is_default() {
        let path = std::env::temp_dir().join("kuasark-tui-test-does-not-exist.toml");
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.player.start_timeout_secs, 15);
    }

    #[test]
    fn broken_file_is_an_error() {
        let path = std::env::temp_dir().join(format!(
            "kuasark-tui-broken-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "[player\ninitial_volume = ").unwrap();
        assert!(Config::load_from(&path).is_err());
        let _ = std::fs::remove_file(&path);
    }
}
