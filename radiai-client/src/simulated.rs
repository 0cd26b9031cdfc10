//! Media backend that plays nothing but keeps time like a real one.
//!
//! Elements learn song lengths from the catalog, report metadata after a short
//! load delay and report the end of the song once its remaining time has passed.
//! Volume and effect changes are only logged.

use radiai_core::{
    Catalog, CoreError, EffectParams, EffectsGraph, LoadId, MediaBackend, MediaElement,
    MediaEvent, MediaEventSender, Result,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Default delay before a simulated element reports its metadata
pub const DEFAULT_LOAD_DELAY: Duration = Duration::from_millis(150);

/// Creates [`SimulatedElement`]s that keep time against the tokio clock
pub struct SimulatedBackend {
    durations: Arc<HashMap<String, Duration>>,
    events: MediaEventSender,
    load_delay: Duration,
}

impl SimulatedBackend {
    #[must_use]
    pub fn new(catalog: &Catalog, events: MediaEventSender) -> Self {
        let durations = catalog
            .iter()
            .flat_map(|(_, station)| station.songs())
            .map(|song| (song.url.clone(), Duration::from_secs(u64::from(song.duration))))
            .collect();

        Self {
            durations: Arc::new(durations),
            events,
            load_delay: DEFAULT_LOAD_DELAY,
        }
    }

    #[must_use]
    pub const fn with_load_delay(mut self, load_delay: Duration) -> Self {
        self.load_delay = load_delay;
        self
    }
}

impl MediaBackend for SimulatedBackend {
    type Element = SimulatedElement;

    fn create_element(&mut self, load: LoadId) -> SimulatedElement {
        SimulatedElement {
            load,
            durations: Arc::clone(&self.durations),
            events: self.events.clone(),
            load_delay: self.load_delay,
            duration: None,
            position: Duration::ZERO,
            volume: 1.0,
            bound: false,
            task: None,
        }
    }

    fn bind_effects(&mut self, element: &mut SimulatedElement) -> Result<Box<dyn EffectsGraph>> {
        if element.bound {
            return Err(CoreError::EffectsAlreadyBound);
        }
        element.bound = true;
        Ok(Box::new(LoggedEffects { load: element.load }))
    }
}

/// A pretend audio element
pub struct SimulatedElement {
    load: LoadId,
    durations: Arc<HashMap<String, Duration>>,
    events: MediaEventSender,
    load_delay: Duration,
    duration: Option<Duration>,
    position: Duration,
    volume: f64,
    bound: bool,
    task: Option<JoinHandle<()>>,
}

impl SimulatedElement {
    #[must_use]
    pub const fn volume(&self) -> f64 {
        self.volume
    }

    fn replace_task(&mut self, task: Option<JoinHandle<()>>) {
        if let Some(previous) = std::mem::replace(&mut self.task, task) {
            previous.abort();
        }
    }
}

impl MediaElement for SimulatedElement {
    fn set_source(&mut self, url: &str) {
        self.position = Duration::ZERO;
        self.duration = self.durations.get(url).copied();

        let events = self.events.clone();
        let load = self.load;
        let delay = self.load_delay;
        let event = self.duration.map_or_else(
            || MediaEvent::Failed {
                reason: format!("Unknown media source: {url}"),
            },
            |duration| MediaEvent::MetadataLoaded { duration },
        );

        self.replace_task(Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            events.send(load, event);
        })));
    }

    fn seek(&mut self, position: Duration) {
        self.position = self.duration.map_or(position, |d| position.min(d));
    }

    fn play(&mut self) -> Result<()> {
        let Some(duration) = self.duration else {
            return Err(CoreError::MediaFailed {
                reason: "No source loaded".into(),
            });
        };

        let remaining = duration.saturating_sub(self.position);
        info!(
            "Element {} playing from {:.1}s, {:.1}s left",
            self.load.get(),
            self.position.as_secs_f64(),
            remaining.as_secs_f64()
        );

        let events = self.events.clone();
        let load = self.load;
        self.replace_task(Some(tokio::spawn(async move {
            tokio::time::sleep(remaining).await;
            events.send(load, MediaEvent::Ended);
        })));
        Ok(())
    }

    fn pause(&mut self) {
        debug!("Element {} paused", self.load.get());
        self.replace_task(None);
    }

    fn set_volume(&mut self, volume: f64) {
        self.volume = volume;
        debug!("Element {} volume {:.3}", self.load.get(), volume);
    }
}

impl Drop for SimulatedElement {
    fn drop(&mut self) {
        self.replace_task(None);
    }
}

struct LoggedEffects {
    load: LoadId,
}

impl EffectsGraph for LoggedEffects {
    fn apply(&mut self, params: &EffectParams) {
        debug!(
            "Element {} effects: distortion {:.2}, noise {:.4}, highpass {:.2}",
            self.load.get(),
            params.distortion,
            params.noise,
            params.highpass
        );
    }

    fn set_output_gain(&mut self, gain: f64) {
        debug!("Element {} output gain {:.2}", self.load.get(), gain);
    }
}
