//! Async driver that wires controls, media callbacks and live schedule fetches
//! into a [`Coordinator`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::controls::{ControlsEvent, ControlsState, RadioControls};
use crate::error::{CoreError, Result};
use crate::live::{LiveMap, LiveSource};
use crate::playback::{
    Coordinator, LoadId, MediaBackend, MediaEvent, RadioEvent, ResolveTicket,
};
use crate::time::DurationExt;

/// Default bound on a single live schedule fetch
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Sending half handed to media backends so elements can report back.
#[derive(Debug, Clone)]
pub struct MediaEventSender(mpsc::UnboundedSender<(LoadId, MediaEvent)>);

impl MediaEventSender {
    /// Report an event for the element created with `load`.
    pub fn send(&self, load: LoadId, event: MediaEvent) {
        if self.0.send((load, event)).is_err() {
            debug!("Radio stopped, dropping media event for element {}", load.get());
        }
    }
}

/// Receiving half of [`media_event_channel`]
pub type MediaEventReceiver = mpsc::UnboundedReceiver<(LoadId, MediaEvent)>;

/// Create the channel media elements use to report back to the radio.
#[must_use]
pub fn media_event_channel() -> (MediaEventSender, MediaEventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MediaEventSender(tx), rx)
}

/// Transport commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioCommand {
    Play,
    Stop,
}

/// Handle for sending transport commands to a running [`Radio`]
#[derive(Debug, Clone)]
pub struct RadioHandle {
    command_tx: mpsc::Sender<RadioCommand>,
}

impl RadioHandle {
    pub async fn play(&self) {
        self.send(RadioCommand::Play).await;
    }

    pub async fn stop(&self) {
        self.send(RadioCommand::Stop).await;
    }

    async fn send(&self, command: RadioCommand) {
        if self.command_tx.send(command).await.is_err() {
            warn!("Radio is not running, ignoring {:?}", command);
        }
    }
}

type Resolution = (ResolveTicket, Result<LiveMap>);

/// Tuner that keeps a [`Coordinator`] fed until cancelled
pub struct Radio<B: MediaBackend> {
    coordinator: Coordinator<B>,
    source: Arc<dyn LiveSource>,
    controls: Arc<RadioControls>,
    media_rx: MediaEventReceiver,
    command_rx: mpsc::Receiver<RadioCommand>,
    fetch_timeout: Duration,
    cancel_token: CancellationToken,
}

impl<B: MediaBackend + 'static> Radio<B> {
    /// Create a new radio
    ///
    /// # Arguments
    /// * `backend` - Media backend that creates elements and effects graphs
    /// * `source` - Where live schedule snapshots come from
    /// * `controls` - Controls to follow
    /// * `media_rx` - Receiver paired with the sender given to `backend`
    /// * `cancel_token` - Optional external cancellation token for graceful shutdown
    pub fn new(
        backend: B,
        source: Arc<dyn LiveSource>,
        controls: Arc<RadioControls>,
        media_rx: MediaEventReceiver,
        cancel_token: Option<CancellationToken>,
    ) -> (Self, RadioHandle) {
        let (command_tx, command_rx) = mpsc::channel(16);

        let radio = Self {
            coordinator: Coordinator::new(backend, ControlsState::default()),
            source,
            controls,
            media_rx,
            command_rx,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            cancel_token: cancel_token.unwrap_or_default(),
        };

        (radio, RadioHandle { command_tx })
    }

    /// Bound each live schedule fetch
    #[must_use]
    pub const fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    /// Get a clone of the cancellation token
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Subscribe to playback events
    pub fn subscribe(&self) -> broadcast::Receiver<RadioEvent> {
        self.coordinator.subscribe()
    }

    /// Start the radio in a background task
    #[must_use]
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Tune to the current controls and keep playing until cancelled.
    pub async fn run(mut self) {
        info!("Starting radio with {} live source", self.source.name());

        let mut controls_rx = self.controls.subscribe();
        let (resolved_tx, mut resolved_rx) = mpsc::unbounded_channel::<Resolution>();

        let ticket = self.sync_controls().await;
        self.dispatch(ticket, &resolved_tx);

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!("Radio shutting down");
                    self.coordinator.stop();
                    break;
                }
                event = controls_rx.recv() => {
                    match event {
                        Ok(ControlsEvent::ChannelChanged { channel }) => {
                            let ticket = self.coordinator.set_channel(channel);
                            self.dispatch(ticket, &resolved_tx);
                        }
                        Ok(ControlsEvent::VolumeChanged { volume }) => {
                            self.coordinator.set_volume(volume);
                        }
                        Ok(ControlsEvent::BassChanged { bass }) => {
                            self.coordinator.set_bass(bass);
                        }
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!("Missed {} control changes, resyncing", missed);
                            let ticket = self.sync_controls().await;
                            self.dispatch(ticket, &resolved_tx);
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            break;
                        }
                    }
                }
                Some(command) = self.command_rx.recv() => {
                    match command {
                        RadioCommand::Play => {
                            let ticket = self.coordinator.play();
                            self.dispatch(ticket, &resolved_tx);
                        }
                        RadioCommand::Stop => self.coordinator.stop(),
                    }
                }
                Some((load, event)) = self.media_rx.recv() => {
                    if let Some(ticket) = self.coordinator.on_media_event(load, event, Utc::now()) {
                        self.dispatch(ticket, &resolved_tx);
                    }
                }
                Some((ticket, outcome)) = resolved_rx.recv() => {
                    match outcome {
                        Ok(live) => {
                            self.coordinator.apply_resolution(ticket, Some(live));
                        }
                        Err(e) => self.coordinator.resolution_failed(ticket, &e.to_string()),
                    }
                }
            }
        }
    }

    async fn sync_controls(&mut self) -> ResolveTicket {
        let state = self.controls.snapshot().await;
        self.coordinator.set_volume(state.volume);
        self.coordinator.set_bass(state.bass);
        self.coordinator.set_channel(state.channel)
    }

    /// Apply a ticket straight from the cache, or fetch in the background.
    fn dispatch(&mut self, ticket: ResolveTicket, resolved_tx: &mpsc::UnboundedSender<Resolution>) {
        if !ticket.fetch {
            self.coordinator.apply_resolution(ticket, None);
            return;
        }

        let source = Arc::clone(&self.source);
        let fetch_timeout = self.fetch_timeout;
        let resolved_tx = resolved_tx.clone();

        tokio::spawn(async move {
            debug!("Fetching live schedule from {}", source.name());
            let outcome = tokio::time::timeout(fetch_timeout, source.fetch_live())
                .await
                .unwrap_or_else(|_| {
                    Err(CoreError::LiveFetchTimeout {
                        timeout_ms: fetch_timeout.as_millis_u64(),
                    })
                });
            let _ = resolved_tx.send((ticket, outcome));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::tests::{live_at, Call, FakeBackend};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeSource {
        fetches: AtomicUsize,
        delay: Duration,
    }

    impl FakeSource {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                fetches: AtomicUsize::new(0),
                delay,
            })
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LiveSource for FakeSource {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn fetch_live(&self) -> Result<LiveMap> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(live_at(Utc::now()))
        }
    }

    async fn wait_for(
        rx: &mut broadcast::Receiver<RadioEvent>,
        matches: impl Fn(&RadioEvent) -> bool,
    ) -> RadioEvent {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event = rx.recv().await.unwrap();
                if matches(&event) {
                    return event;
                }
            }
        })
        .await
        .unwrap()
    }

    fn controls(channel: f64) -> Arc<RadioControls> {
        RadioControls::new(ControlsState {
            channel,
            volume: 0.8,
            bass: 0.5,
        })
    }

    #[tokio::test]
    async fn test_radio_follows_controls_and_songs() {
        let backend = FakeBackend::default();
        let recorder = backend.recorder.clone();
        let source = FakeSource::new(Duration::ZERO);
        let controls = controls(88.0);
        let (media_tx, media_rx) = media_event_channel();

        let (radio, _handle) = Radio::new(backend, source.clone(), controls.clone(), media_rx, None);
        let cancel = radio.cancel_token();
        let mut events = radio.subscribe();
        let task = radio.start();

        let loaded = wait_for(&mut events, |e| matches!(e, RadioEvent::SongLoading { .. })).await;
        assert!(matches!(loaded, RadioEvent::SongLoading { frequency: 88, .. }));

        media_tx.send(
            LoadId::new(1),
            MediaEvent::MetadataLoaded {
                duration: Duration::from_secs(120),
            },
        );
        wait_for(&mut events, |e| matches!(e, RadioEvent::Playing { .. })).await;
        assert!(recorder.calls().contains(&Call::Play(1)));

        // Dial changes reuse the cached schedule
        controls.set_channel(94.0).await;
        let loaded = wait_for(&mut events, |e| matches!(e, RadioEvent::SongLoading { .. })).await;
        assert!(matches!(loaded, RadioEvent::SongLoading { frequency: 94, .. }));
        assert_eq!(source.fetches(), 1);

        // Song end always refetches
        media_tx.send(LoadId::new(2), MediaEvent::Ended);
        wait_for(&mut events, |e| matches!(e, RadioEvent::SongLoading { .. })).await;
        assert_eq!(source.fetches(), 2);

        cancel.cancel();
        wait_for(&mut events, |e| matches!(e, RadioEvent::Stopped)).await;
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_times_out() {
        let source = FakeSource::new(Duration::from_secs(60));
        let (_media_tx, media_rx) = media_event_channel();

        let (radio, _handle) = Radio::new(
            FakeBackend::default(),
            source,
            controls(92.0),
            media_rx,
            None,
        );
        let radio = radio.with_fetch_timeout(Duration::from_millis(250));
        let cancel = radio.cancel_token();
        let mut events = radio.subscribe();
        let task = radio.start();

        let failed = wait_for(&mut events, |e| matches!(e, RadioEvent::ResolutionFailed { .. })).await;
        assert!(matches!(
            failed,
            RadioEvent::ResolutionFailed { reason } if reason.contains("250ms")
        ));

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_then_play_refetches() {
        let source = FakeSource::new(Duration::ZERO);
        let (_media_tx, media_rx) = media_event_channel();

        let (radio, handle) = Radio::new(
            FakeBackend::default(),
            source.clone(),
            controls(102.0),
            media_rx,
            None,
        );
        let cancel = radio.cancel_token();
        let mut events = radio.subscribe();
        let task = radio.start();

        wait_for(&mut events, |e| matches!(e, RadioEvent::SongLoading { .. })).await;

        handle.stop().await;
        wait_for(&mut events, |e| matches!(e, RadioEvent::Stopped)).await;

        handle.play().await;
        let loaded = wait_for(&mut events, |e| matches!(e, RadioEvent::SongLoading { .. })).await;
        assert!(matches!(loaded, RadioEvent::SongLoading { frequency: 102, .. }));
        assert_eq!(source.fetches(), 2);

        cancel.cancel();
        task.await.unwrap();
    }
}
