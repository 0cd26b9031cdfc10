use crate::catalog::{Catalog, StationEntry};
use crate::controls::ControlsState;
use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RadiaiConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub tuner: TunerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Catalog override; empty means the built-in stations
    #[serde(default)]
    pub stations: Vec<StationEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:3000".into()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunerConfig {
    #[serde(default = "default_live_url")]
    pub live_url: String,
    #[serde(default = "default_channel")]
    pub channel: f64,
    #[serde(default = "default_volume")]
    pub volume: f64,
    #[serde(default = "default_bass")]
    pub bass: f64,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_live_url() -> String {
    "http://127.0.0.1:3000/live".into()
}

const fn default_channel() -> f64 {
    88.0
}

const fn default_volume() -> f64 {
    0.8
}

const fn default_bass() -> f64 {
    0.5
}

const fn default_fetch_timeout() -> u64 {
    10_000
}

const fn default_max_retries() -> u32 {
    3
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            live_url: default_live_url(),
            channel: default_channel(),
            volume: default_volume(),
            bass: default_bass(),
            fetch_timeout_ms: default_fetch_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl TunerConfig {
    /// Starting control values
    #[must_use]
    pub const fn controls(&self) -> ControlsState {
        ControlsState {
            channel: self.channel,
            volume: self.volume,
            bass: self.bass,
        }
    }

    #[must_use]
    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Also write logs to `~/.config/radiai/<binary>.log`
    #[serde(default)]
    pub enabled: bool,
}

impl RadiaiConfig {
    /// Get the configuration directory path (~/.config/radiai/)
    #[must_use]
    pub fn config_dir() -> PathBuf {
        crate::paths::config_dir()
    }

    /// Get the config file path (~/.config/radiai/config.toml)
    #[must_use]
    pub fn config_path() -> PathBuf {
        crate::paths::config_path()
    }

    /// Load config from the default path or create a template on first run
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigNotFound`] after writing the template, or an
    /// error if the file cannot be read, parsed or validated.
    pub fn load_or_create() -> Result<Self> {
        Self::load_or_create_at(&Self::config_path())
    }

    /// Same as [`Self::load_or_create`] for an explicit path.
    ///
    /// # Errors
    ///
    /// See [`Self::load_or_create`].
    pub fn load_or_create_at(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            if let Some(parent) = config_path.parent() {
                fs::create_dir_all(parent)?;
            }

            fs::write(config_path, CONFIG_TEMPLATE)?;

            return Err(CoreError::ConfigNotFound {
                path: config_path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(config_path)?;
        Self::parse(&content)
    }

    /// Parse and validate config file contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or a value is out of range.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges and the catalog override.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.server.bind.trim().is_empty() {
            return Err(CoreError::ConfigMissingField {
                field: "server.bind".to_string(),
            });
        }
        if self.tuner.live_url.trim().is_empty() {
            return Err(CoreError::ConfigMissingField {
                field: "tuner.live_url".to_string(),
            });
        }
        if !self.tuner.channel.is_finite() {
            return Err(CoreError::ConfigInvalid {
                message: "tuner.channel must be a finite number".to_string(),
            });
        }
        for (field, value) in [("tuner.volume", self.tuner.volume), ("tuner.bass", self.tuner.bass)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(CoreError::ConfigInvalid {
                    message: format!("{field} must be between 0 and 1, got {value}"),
                });
            }
        }
        if self.tuner.fetch_timeout_ms == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "tuner.fetch_timeout_ms must be greater than 0".to_string(),
            });
        }
        if !self.stations.is_empty() {
            self.catalog()?;
        }
        Ok(())
    }

    /// The configured catalog, or the built-in one when no stations are listed.
    ///
    /// # Errors
    ///
    /// Returns an error if a listed station breaks a catalog invariant.
    pub fn catalog(&self) -> Result<Catalog> {
        if self.stations.is_empty() {
            Ok(Catalog::builtin())
        } else {
            Catalog::new(self.stations.clone())
        }
    }
}

/// Template written on first run
pub const CONFIG_TEMPLATE: &str = r##"# Radiai Configuration
# ~/.config/radiai/config.toml

[server]
# Address the /live endpoint listens on
bind = "127.0.0.1:3000"

[tuner]
# Where the tuner fetches live schedules from
live_url = "http://127.0.0.1:3000/live"
# Initial dial position; need not match a station frequency
channel = 88.0
volume = 0.8  # 0.0 - 1.0
bass = 0.5    # 0.0 - 1.0
fetch_timeout_ms = 10000
max_retries = 3

[logging]
# Also write logs to ~/.config/radiai/radiai-server.log / radiai-tuner.log
enabled = false

# Replace the built-in stations by listing your own:
#
# [[stations]]
# frequency = 98
# name = "Ambient"
# songs = [
#   { url = "https://example.com/ambient-1.mp3", duration = 240 },
#   { url = "https://example.com/ambient-2.mp3", duration = 185 },
# ]
"##;
