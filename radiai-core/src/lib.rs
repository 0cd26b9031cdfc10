pub mod catalog;
pub mod config;
pub mod controls;
pub mod error;
pub mod live;
pub mod logging;
pub mod paths;
pub mod playback;
pub mod radio;
pub mod schedule;
pub mod time;
pub mod tuning;

pub use catalog::{Catalog, Song, Station, StationEntry};
pub use config::{LoggingConfig, RadiaiConfig, ServerConfig, TunerConfig, CONFIG_TEMPLATE};
pub use controls::{ControlsEvent, ControlsState, RadioControls};
pub use error::{CoreError, Result};
pub use live::{LiveMap, LiveSource, LocalLiveSource, NowPlaying};
pub use paths::{
    config_dir, config_path, log_file_path, CONFIG_DIR_NAME, CONFIG_FILE_NAME, LOG_FILE_EXTENSION,
};
pub use playback::{
    BoundMedia, Coordinator, EffectsGraph, LoadId, MediaBackend, MediaElement, MediaEvent,
    PlaybackPhase, RadioEvent, ResolveTicket, TunedSong,
};
pub use radio::{
    media_event_channel, MediaEventReceiver, MediaEventSender, Radio, RadioCommand, RadioHandle,
};
pub use schedule::{resolve, resolve_all, resolve_station, Airing, Schedule, ScheduleRng};
pub use time::DurationExt;
pub use tuning::{element_volume, nearest_station, offset_volume, EffectParams, Tuned};
