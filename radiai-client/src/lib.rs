//! Live schedule client and simulated playback for the headless tuner.

pub mod http;
pub mod simulated;

pub use http::HttpLiveSource;
pub use simulated::{SimulatedBackend, SimulatedElement};
