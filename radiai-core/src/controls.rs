use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

/// Change notifications published by [`RadioControls`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlsEvent {
    /// The dial moved to a new channel
    ChannelChanged { channel: f64 },
    /// Master volume changed
    VolumeChanged { volume: f64 },
    /// Bass/tone control changed
    BassChanged { bass: f64 },
}

/// Snapshot of the user-facing controls
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlsState {
    /// Requested channel; need not match a station frequency
    pub channel: f64,
    /// Master volume, 0-1
    pub volume: f64,
    /// Bass amount, 0-1
    pub bass: f64,
}

impl Default for ControlsState {
    fn default() -> Self {
        Self {
            channel: 88.0,
            volume: 0.0,
            bass: 0.0,
        }
    }
}

/// Radio controls owned by the UI and observed by the coordinator.
///
/// Setters only publish an event when the stored value actually changes.
pub struct RadioControls {
    state: RwLock<ControlsState>,
    event_tx: broadcast::Sender<ControlsEvent>,
}

impl RadioControls {
    /// Create controls with the given starting values
    #[must_use]
    pub fn new(initial: ControlsState) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(64);

        Arc::new(Self {
            state: RwLock::new(Self::sanitize(initial)),
            event_tx,
        })
    }

    /// Subscribe to control changes
    pub fn subscribe(&self) -> broadcast::Receiver<ControlsEvent> {
        self.event_tx.subscribe()
    }

    /// Current control values
    pub async fn snapshot(&self) -> ControlsState {
        *self.state.read().await
    }

    pub async fn set_channel(&self, channel: f64) {
        if !channel.is_finite() {
            return;
        }
        let mut state = self.state.write().await;
        if (state.channel - channel).abs() > f64::EPSILON {
            state.channel = channel;
            debug!("Channel set to {}", channel);
            let _ = self.event_tx.send(ControlsEvent::ChannelChanged { channel });
        }
    }

    pub async fn set_volume(&self, volume: f64) {
        let volume = unit(volume);
        let mut state = self.state.write().await;
        if (state.volume - volume).abs() > f64::EPSILON {
            state.volume = volume;
            let _ = self.event_tx.send(ControlsEvent::VolumeChanged { volume });
        }
    }

    pub async fn set_bass(&self, bass: f64) {
        let bass = unit(bass);
        let mut state = self.state.write().await;
        if (state.bass - bass).abs() > f64::EPSILON {
            state.bass = bass;
            let _ = self.event_tx.send(ControlsEvent::BassChanged { bass });
        }
    }

    fn sanitize(state: ControlsState) -> ControlsState {
        let defaults = ControlsState::default();
        ControlsState {
            channel: if state.channel.is_finite() {
                state.channel
            } else {
                defaults.channel
            },
            volume: unit(state.volume),
            bass: unit(state.bass),
        }
    }
}

impl Default for RadioControls {
    fn default() -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            state: RwLock::new(ControlsState::default()),
            event_tx,
        }
    }
}

/// Clamp into 0-1, mapping NaN to 0
fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
