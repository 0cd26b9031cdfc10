use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    // Configuration errors
    #[error("Config file not found at {path}. A template has been created - edit it and restart to customize the radio.")]
    ConfigNotFound { path: PathBuf },

    #[error("Invalid config: {message}")]
    ConfigInvalid { message: String },

    #[error("Missing required config field: {field}")]
    ConfigMissingField { field: String },

    #[error("Failed to parse config file: {0}")]
    ConfigParseError(#[from] toml::de::Error),

    // Catalog errors
    #[error("Station {name} has no songs")]
    EmptyStation { name: String },

    #[error("Song {url} on station {station} has a zero duration")]
    ZeroDurationSong { station: String, url: String },

    #[error("Station name {name:?} must have at least two characters")]
    InvalidStationName { name: String },

    #[error("Frequency {frequency} is assigned to more than one station")]
    DuplicateFrequency { frequency: u32 },

    #[error("Catalog has no stations")]
    EmptyCatalog,

    #[error("Station not found: {station}")]
    StationNotFound { station: String },

    // Live schedule errors
    #[error("Live schedule fetch failed: {reason}")]
    LiveFetch { reason: String },

    #[error("Live schedule fetch timed out after {timeout_ms}ms")]
    LiveFetchTimeout { timeout_ms: u64 },

    // Playback errors
    #[error("Media playback failed: {reason}")]
    MediaFailed { reason: String },

    #[error("Media element is already bound to an effects graph")]
    EffectsAlreadyBound,

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
