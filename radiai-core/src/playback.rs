//! Tuning/playback coordinator.
//!
//! The [`Coordinator`] is a synchronous state machine. Media callbacks arrive
//! as named [`MediaEvent`]s, channel and transport changes come in through
//! method calls, and every transition has a bounded set of side effects on the
//! injected [`MediaBackend`]. Work that needs a fresh live schedule is handed
//! back to the caller as a [`ResolveTicket`]; the async driver in
//! [`crate::radio`] performs the fetch and feeds the result back.
//!
//! ```text
//! Idle -> Loading -> Seeking -> Playing -> Loading (next song)
//!           |                     |    \-> Idle (stop)
//!           \------> Error <------/
//!                      \-> Idle
//! ```

use crate::controls::ControlsState;
use crate::error::Result;
use crate::live::{LiveMap, NowPlaying};
use crate::time::{clock_skew_secs, DurationExt};
use crate::tuning::{element_volume, nearest_station, EffectParams};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Where the coordinator is in a song's lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPhase {
    /// Nothing loaded or playback stopped
    Idle,
    /// Source set, waiting for the media duration
    Loading,
    /// Duration known, positioning the media
    Seeking,
    /// Audible
    Playing,
    /// Playback failed; the coordinator settles back to `Idle`
    Error,
}

/// Identifies one media element; events from torn-down elements are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoadId(u64);

impl LoadId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Callbacks raised by a media element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEvent {
    /// Metadata is available and the media can be positioned
    MetadataLoaded { duration: Duration },
    /// Playback reached the end of the media
    Ended,
    /// The element could not load or play its source
    Failed { reason: String },
}

/// A media playback element (for example an HTML audio element).
pub trait MediaElement: Send {
    fn set_source(&mut self, url: &str);

    fn seek(&mut self, position: Duration);

    /// Start playback.
    ///
    /// # Errors
    ///
    /// Returns an error if the element refuses to play.
    fn play(&mut self) -> Result<()>;

    fn pause(&mut self);

    fn set_volume(&mut self, volume: f64);
}

/// The static-simulation effects graph fed by a media element.
pub trait EffectsGraph: Send {
    fn apply(&mut self, params: &EffectParams);

    fn set_output_gain(&mut self, gain: f64);
}

/// Factory for media elements and the effects graphs bound to them.
pub trait MediaBackend: Send {
    type Element: MediaElement;

    /// Create a fresh element whose events will be tagged with `load`.
    fn create_element(&mut self, load: LoadId) -> Self::Element;

    /// Route an element through a new effects graph.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EffectsAlreadyBound`](crate::CoreError::EffectsAlreadyBound)
    /// or another error if the element cannot be processed.
    fn bind_effects(&mut self, element: &mut Self::Element) -> Result<Box<dyn EffectsGraph>>;
}

/// A media element together with the effects graph that claimed it.
///
/// Binding consumes the element and there is no way to get it back, so an
/// element is never bound twice. A new song gets a new element and a new graph.
pub struct BoundMedia<E> {
    element: E,
    effects: Option<Box<dyn EffectsGraph>>,
}

impl<E: MediaElement> BoundMedia<E> {
    /// Bind `element` to a new effects graph, falling back to unprocessed
    /// playback if the backend refuses.
    pub fn bind<B>(backend: &mut B, mut element: E) -> Self
    where
        B: MediaBackend<Element = E>,
    {
        let effects = match backend.bind_effects(&mut element) {
            Ok(graph) => Some(graph),
            Err(e) => {
                warn!("Effects unavailable, playing unprocessed audio: {}", e);
                None
            }
        };

        Self { element, effects }
    }

    /// Whether audio runs through the effects graph
    #[must_use]
    pub const fn is_processed(&self) -> bool {
        self.effects.is_some()
    }
}

/// The song picked for the requested channel
#[derive(Debug, Clone, PartialEq)]
pub struct TunedSong {
    /// Frequency of the station actually playing
    pub frequency: u32,
    pub station: String,
    pub url: String,
    /// Catalog duration in seconds
    pub duration: u32,
    /// Seconds already aired when `timestamp` was taken
    pub part: f64,
    pub remaining_time: f64,
    pub timestamp: DateTime<Utc>,
}

impl TunedSong {
    #[must_use]
    pub fn new(frequency: u32, now_playing: &NowPlaying) -> Self {
        Self {
            frequency,
            station: now_playing.station.clone(),
            url: now_playing.song.url.clone(),
            duration: now_playing.total_duration,
            part: now_playing.part,
            remaining_time: now_playing.remaining_time,
            timestamp: now_playing.timestamp,
        }
    }

    /// Where to seek once the media reports `media_duration`, joining the
    /// broadcast as far in as the time elapsed since the position was computed.
    ///
    /// Clamped to `[0, media_duration - 1]` so playback never starts at or past
    /// the end.
    #[must_use]
    pub fn seek_target(&self, media_duration: Duration, now: DateTime<Utc>) -> Duration {
        let position = self.part + clock_skew_secs(self.timestamp, now);
        let last_second = media_duration.as_secs_f64() - 1.0;

        Duration::from_secs_f64_saturating(position.min(last_second).max(0.0))
    }
}

/// Permission to resolve, stamped with the generation it was issued under.
///
/// The caller fetches when `fetch` is set, then passes the ticket back to
/// [`Coordinator::apply_resolution`]. Tickets issued before a later channel
/// change or stop are ignored when they come back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveTicket {
    generation: u64,
    /// A fresh live schedule must be fetched first
    pub fetch: bool,
    force_play: bool,
}

/// Events emitted by the coordinator
#[derive(Debug, Clone, PartialEq)]
pub enum RadioEvent {
    /// The requested channel was matched to a station
    Tuned {
        channel: f64,
        frequency: u32,
        channel_offset: f64,
    },
    /// A new song's source was set
    SongLoading { frequency: u32, station: String, url: String },
    /// Playback started at `position`
    Playing { url: String, position: Duration },
    /// The current song finished
    SongEnded { url: String },
    /// Playback was stopped by the user
    Stopped,
    /// Playback failed and the coordinator returned to idle
    PlaybackFailed { reason: String },
    /// A live schedule could not be fetched; current playback continues
    ResolutionFailed { reason: String },
}

struct CurrentTrack<E> {
    load: LoadId,
    song: TunedSong,
    media: BoundMedia<E>,
}

/// Drives one media element at a time from live schedule snapshots.
pub struct Coordinator<B: MediaBackend> {
    backend: B,
    controls: ControlsState,
    phase: PlaybackPhase,
    generation: u64,
    next_load: u64,
    live: Option<LiveMap>,
    current: Option<CurrentTrack<B::Element>>,
    channel_offset: f64,
    event_tx: broadcast::Sender<RadioEvent>,
}

impl<B: MediaBackend> Coordinator<B> {
    pub fn new(backend: B, controls: ControlsState) -> Self {
        let (event_tx, _) = broadcast::channel(64);

        Self {
            backend,
            controls,
            phase: PlaybackPhase::Idle,
            generation: 0,
            next_load: 0,
            live: None,
            current: None,
            channel_offset: 0.0,
            event_tx,
        }
    }

    /// Subscribe to coordinator events
    pub fn subscribe(&self) -> broadcast::Receiver<RadioEvent> {
        self.event_tx.subscribe()
    }

    #[must_use]
    pub const fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    #[must_use]
    pub const fn controls(&self) -> ControlsState {
        self.controls
    }

    #[must_use]
    pub const fn channel_offset(&self) -> f64 {
        self.channel_offset
    }

    /// Song currently loaded, if any
    #[must_use]
    pub fn current_song(&self) -> Option<&TunedSong> {
        self.current.as_ref().map(|c| &c.song)
    }

    /// Whether the current song runs through the effects graph
    #[must_use]
    pub fn is_processed(&self) -> bool {
        self.current.as_ref().is_some_and(|c| c.media.is_processed())
    }

    /// Last live schedule received, if not dropped by [`Self::stop`]
    #[must_use]
    pub const fn live(&self) -> Option<&LiveMap> {
        self.live.as_ref()
    }

    /// Resolve for the current channel, reusing a cached schedule if present.
    pub fn tune(&mut self) -> ResolveTicket {
        self.generation += 1;
        self.ticket(false, false)
    }

    /// Move the dial. Resolution happens immediately rather than at song end.
    pub fn set_channel(&mut self, channel: f64) -> ResolveTicket {
        self.controls.channel = channel;
        self.tune()
    }

    pub fn set_volume(&mut self, volume: f64) {
        self.controls.volume = volume;
        self.push_levels();
    }

    pub fn set_bass(&mut self, bass: f64) {
        self.controls.bass = bass;
        self.push_levels();
    }

    /// User pressed play: (re)load whatever the channel is airing now.
    pub fn play(&mut self) -> ResolveTicket {
        self.generation += 1;
        self.ticket(false, true)
    }

    /// Stop playback, drop the cached schedule and invalidate pending tickets.
    pub fn stop(&mut self) {
        self.generation += 1;
        self.live = None;
        self.teardown();
        self.phase = PlaybackPhase::Idle;
        info!("Playback stopped");
        let _ = self.event_tx.send(RadioEvent::Stopped);
    }

    /// Apply a resolution. `live` is the freshly fetched schedule, or `None`
    /// to use the cached one.
    ///
    /// Returns `false` if the ticket was superseded or nothing could be tuned.
    pub fn apply_resolution(&mut self, ticket: ResolveTicket, live: Option<LiveMap>) -> bool {
        if ticket.generation != self.generation {
            debug!(
                "Ignoring stale resolution (generation {} < {})",
                ticket.generation, self.generation
            );
            return false;
        }

        if let Some(live) = live {
            self.live = Some(live);
        }

        let channel = self.controls.channel;
        let Some(song) = self.live.as_ref().and_then(|live| {
            nearest_station(live, channel).map(|tuned| {
                (
                    TunedSong::new(tuned.frequency, tuned.value),
                    tuned.channel_offset,
                )
            })
        }) else {
            debug!("No live schedule to tune channel {}", channel);
            self.settle_if_unloaded();
            return false;
        };
        let (song, channel_offset) = song;

        self.channel_offset = channel_offset;
        debug!(
            "Channel {} tuned to {} ({}), offset {:.2}",
            channel, song.frequency, song.station, channel_offset
        );
        let _ = self.event_tx.send(RadioEvent::Tuned {
            channel,
            frequency: song.frequency,
            channel_offset,
        });
        let same_song = self
            .current
            .as_ref()
            .is_some_and(|current| current.song.url == song.url);
        if ticket.force_play || !same_song {
            self.load(song);
        } else {
            self.push_levels();
        }

        true
    }

    /// Record a failed fetch. Playback of the current song continues and no
    /// retry is scheduled; the next song end or channel change tries again.
    pub fn resolution_failed(&mut self, ticket: ResolveTicket, reason: &str) {
        if ticket.generation != self.generation {
            debug!("Ignoring failure of stale resolution: {}", reason);
            return;
        }

        warn!("Failed to resolve live schedule: {}", reason);
        self.settle_if_unloaded();
        let _ = self.event_tx.send(RadioEvent::ResolutionFailed {
            reason: reason.to_string(),
        });
    }

    /// Handle a callback from the element identified by `load`.
    ///
    /// Returns a ticket when the event calls for a new resolution. A song
    /// end always loads the next airing on a new element, even when the
    /// station is airing the same URL again.
    pub fn on_media_event(
        &mut self,
        load: LoadId,
        event: MediaEvent,
        now: DateTime<Utc>,
    ) -> Option<ResolveTicket> {
        let Some(current) = self.current.as_mut().filter(|c| c.load == load) else {
            debug!("Ignoring {:?} from retired media element {}", event, load.get());
            return None;
        };

        match event {
            MediaEvent::MetadataLoaded { duration } => {
                if self.phase != PlaybackPhase::Loading {
                    debug!("Ignoring metadata while {:?}", self.phase);
                    return None;
                }

                self.phase = PlaybackPhase::Seeking;
                let target = current.song.seek_target(duration, now);
                current.media.element.seek(target);

                match current.media.element.play() {
                    Ok(()) => {
                        self.phase = PlaybackPhase::Playing;
                        info!(
                            "Playing {} on {} from {:.1}s",
                            current.song.url,
                            current.song.station,
                            target.as_secs_f64()
                        );
                        let _ = self.event_tx.send(RadioEvent::Playing {
                            url: current.song.url.clone(),
                            position: target,
                        });
                    }
                    Err(e) => self.fail(&e.to_string()),
                }
                None
            }
            MediaEvent::Ended => {
                info!("Song ended: {}", current.song.url);
                let _ = self.event_tx.send(RadioEvent::SongEnded {
                    url: current.song.url.clone(),
                });

                // The finished element is retired; whatever the station airs
                // next, including the same song on a one-song station, gets a
                // new element.
                // The cached schedule still points at the finished song.
                self.live = None;
                self.teardown();
                self.phase = PlaybackPhase::Loading;
                self.generation += 1;
                Some(self.ticket(true, true))
            }
            MediaEvent::Failed { reason } => {
                self.fail(&reason);
                None
            }
        }
    }

    fn ticket(&self, force_fetch: bool, force_play: bool) -> ResolveTicket {
        ResolveTicket {
            generation: self.generation,
            fetch: force_fetch || self.live.is_none(),
            force_play,
        }
    }

    fn load(&mut self, song: TunedSong) {
        self.teardown();

        self.next_load += 1;
        let load = LoadId(self.next_load);
        let element = self.backend.create_element(load);
        let mut media = BoundMedia::bind(&mut self.backend, element);
        media.element.set_source(&song.url);

        info!(
            "Loading {} from {} ({})",
            song.url, song.station, song.frequency
        );
        let _ = self.event_tx.send(RadioEvent::SongLoading {
            frequency: song.frequency,
            station: song.station.clone(),
            url: song.url.clone(),
        });

        self.current = Some(CurrentTrack { load, song, media });
        self.phase = PlaybackPhase::Loading;
        self.push_levels();
    }

    fn push_levels(&mut self) {
        let ControlsState { volume, bass, .. } = self.controls;
        let offset = self.channel_offset;

        if let Some(current) = self.current.as_mut() {
            current.media.element.set_volume(element_volume(offset, volume));
            if let Some(effects) = current.media.effects.as_mut() {
                effects.apply(&EffectParams::for_tuning(offset, bass));
                effects.set_output_gain(volume);
            }
        }
    }

    fn fail(&mut self, reason: &str) {
        self.phase = PlaybackPhase::Error;
        warn!("Playback failed: {}", reason);
        let _ = self.event_tx.send(RadioEvent::PlaybackFailed {
            reason: reason.to_string(),
        });
        self.teardown();
        self.phase = PlaybackPhase::Idle;
    }

    fn settle_if_unloaded(&mut self) {
        if self.current.is_none() {
            self.phase = PlaybackPhase::Idle;
        }
    }

    fn teardown(&mut self) {
        if let Some(mut previous) = self.current.take() {
            previous.media.element.pause();
            debug!("Released media element {}", previous.load.get());
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::catalog::Song;
    use crate::error::CoreError;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        Create(u64),
        Bind(u64),
        Source(u64, String),
        Seek(u64, Duration),
        Play(u64),
        Pause(u64),
        Volume(u64, f64),
        Effects(EffectParams),
        Gain(f64),
    }

    #[derive(Clone, Default)]
    pub struct Recorder(Arc<Mutex<Vec<Call>>>);

    impl Recorder {
        fn push(&self, call: Call) {
            self.0.lock().unwrap().push(call);
        }

        pub fn calls(&self) -> Vec<Call> {
            self.0.lock().unwrap().clone()
        }

        pub fn clear(&self) {
            self.0.lock().unwrap().clear();
        }
    }

    pub struct FakeElement {
        id: u64,
        recorder: Recorder,
        refuse_play: bool,
    }

    impl MediaElement for FakeElement {
        fn set_source(&mut self, url: &str) {
            self.recorder.push(Call::Source(self.id, url.to_string()));
        }

        fn seek(&mut self, position: Duration) {
            self.recorder.push(Call::Seek(self.id, position));
        }

        fn play(&mut self) -> Result<()> {
            if self.refuse_play {
                return Err(CoreError::MediaFailed {
                    reason: "autoplay blocked".into(),
                });
            }
            self.recorder.push(Call::Play(self.id));
            Ok(())
        }

        fn pause(&mut self) {
            self.recorder.push(Call::Pause(self.id));
        }

        fn set_volume(&mut self, volume: f64) {
            self.recorder.push(Call::Volume(self.id, volume));
        }
    }

    struct FakeEffects(Recorder);

    impl EffectsGraph for FakeEffects {
        fn apply(&mut self, params: &EffectParams) {
            self.0.push(Call::Effects(*params));
        }

        fn set_output_gain(&mut self, gain: f64) {
            self.0.push(Call::Gain(gain));
        }
    }

    #[derive(Default)]
    pub struct FakeBackend {
        pub recorder: Recorder,
        pub refuse_effects: bool,
        pub refuse_play: bool,
    }

    impl MediaBackend for FakeBackend {
        type Element = FakeElement;

        fn create_element(&mut self, load: LoadId) -> FakeElement {
            self.recorder.push(Call::Create(load.get()));
            FakeElement {
                id: load.get(),
                recorder: self.recorder.clone(),
                refuse_play: self.refuse_play,
            }
        }

        fn bind_effects(&mut self, element: &mut FakeElement) -> Result<Box<dyn EffectsGraph>> {
            if self.refuse_effects {
                return Err(CoreError::EffectsAlreadyBound);
            }
            self.recorder.push(Call::Bind(element.id));
            Ok(Box::new(FakeEffects(self.recorder.clone())))
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_760_000_000 + secs, 0).unwrap()
    }

    fn now_playing(station: &str, url: &str, part: f64, computed: DateTime<Utc>) -> NowPlaying {
        NowPlaying {
            song: Song::new(url, 120),
            part,
            station: station.into(),
            total_duration: 120,
            remaining_time: 120.0 - part,
            timestamp: computed,
        }
    }

    pub fn live_at(computed: DateTime<Utc>) -> LiveMap {
        [
            (88, now_playing("Lofi Beats", "lofi-1", 10.0, computed)),
            (92, now_playing("Synthwave", "synth-3", 40.0, computed)),
            (94, now_playing("Jazz", "jazz-2", 0.0, computed)),
            (102, now_playing("Hypno", "hypno-1", 100.0, computed)),
        ]
        .into_iter()
        .collect()
    }

    fn controls(channel: f64) -> ControlsState {
        ControlsState {
            channel,
            volume: 0.8,
            bass: 0.5,
        }
    }

    fn coordinator(channel: f64) -> (Coordinator<FakeBackend>, Recorder) {
        let backend = FakeBackend::default();
        let recorder = backend.recorder.clone();
        (Coordinator::new(backend, controls(channel)), recorder)
    }

    fn playing(channel: f64) -> (Coordinator<FakeBackend>, Recorder) {
        let (mut coordinator, recorder) = coordinator(channel);
        let ticket = coordinator.tune();
        assert!(coordinator.apply_resolution(ticket, Some(live_at(at(0)))));
        coordinator.on_media_event(
            LoadId::new(1),
            MediaEvent::MetadataLoaded {
                duration: Duration::from_secs(120),
            },
            at(0),
        );
        assert_eq!(coordinator.phase(), PlaybackPhase::Playing);
        recorder.clear();
        (coordinator, recorder)
    }

    #[test]
    fn test_seek_target_adds_clock_skew() {
        let song = TunedSong::new(88, &now_playing("Lofi Beats", "lofi-1", 10.0, at(0)));
        let target = song.seek_target(Duration::from_secs(120), at(5));
        assert_eq!(target, Duration::from_secs(15));
    }

    #[test]
    fn test_seek_target_is_clamped() {
        let song = TunedSong::new(88, &now_playing("Lofi Beats", "lofi-1", 110.0, at(0)));
        assert_eq!(
            song.seek_target(Duration::from_secs(120), at(30)),
            Duration::from_secs(119)
        );

        // Computing clock ahead of ours
        let song = TunedSong::new(88, &now_playing("Lofi Beats", "lofi-1", 2.0, at(10)));
        assert_eq!(song.seek_target(Duration::from_secs(120), at(0)), Duration::ZERO);

        // Media shorter than a second
        assert_eq!(
            song.seek_target(Duration::from_millis(500), at(10)),
            Duration::ZERO
        );
    }

    #[test]
    fn test_first_tune_requires_fetch() {
        let (mut coordinator, _) = coordinator(88.0);
        let ticket = coordinator.tune();
        assert!(ticket.fetch);
        assert_eq!(coordinator.phase(), PlaybackPhase::Idle);
    }

    #[test]
    fn test_resolution_loads_exact_station() {
        let (mut coordinator, recorder) = coordinator(92.0);
        let ticket = coordinator.tune();

        assert!(coordinator.apply_resolution(ticket, Some(live_at(at(0)))));
        assert_eq!(coordinator.phase(), PlaybackPhase::Loading);
        assert!(coordinator.channel_offset().abs() < f64::EPSILON);

        let song = coordinator.current_song().unwrap();
        assert_eq!(song.frequency, 92);
        assert_eq!(song.url, "synth-3");

        let calls = recorder.calls();
        assert_eq!(calls[0], Call::Create(1));
        assert_eq!(calls[1], Call::Bind(1));
        assert_eq!(calls[2], Call::Source(1, "synth-3".into()));
        assert!(calls.contains(&Call::Volume(1, 0.8 * 0.75)));
        assert!(calls.contains(&Call::Gain(0.8)));
        // Never seek before metadata
        assert!(!calls.iter().any(|c| matches!(c, Call::Seek(..))));
    }

    #[test]
    fn test_metadata_seeks_with_skew_then_plays() {
        let (mut coordinator, recorder) = coordinator(88.0);
        let ticket = coordinator.tune();
        coordinator.apply_resolution(ticket, Some(live_at(at(0))));
        recorder.clear();

        let next = coordinator.on_media_event(
            LoadId::new(1),
            MediaEvent::MetadataLoaded {
                duration: Duration::from_secs(120),
            },
            at(5),
        );

        assert!(next.is_none());
        assert_eq!(coordinator.phase(), PlaybackPhase::Playing);
        assert_eq!(
            recorder.calls(),
            vec![Call::Seek(1, Duration::from_secs(15)), Call::Play(1)]
        );
    }

    #[test]
    fn test_off_tuned_channel_attenuates() {
        let (mut coordinator, recorder) = coordinator(89.0);
        let ticket = coordinator.tune();
        coordinator.apply_resolution(ticket, Some(live_at(at(0))));

        assert_eq!(coordinator.current_song().unwrap().frequency, 88);
        assert!((coordinator.channel_offset() - 1.0).abs() < f64::EPSILON);

        let calls = recorder.calls();
        assert!(calls.contains(&Call::Volume(1, 0.4 * 0.75)));
        assert!(calls.contains(&Call::Effects(EffectParams::for_tuning(1.0, 0.5))));
    }

    #[test]
    fn test_equidistant_channel_tunes_lowest_frequency() {
        let (mut coordinator, _) = coordinator(90.0);
        let ticket = coordinator.tune();
        coordinator.apply_resolution(ticket, Some(live_at(at(0))));
        assert_eq!(coordinator.current_song().unwrap().frequency, 88);
        assert!((coordinator.channel_offset() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_channel_change_uses_cache_and_switches_immediately() {
        let (mut coordinator, recorder) = playing(88.0);

        let ticket = coordinator.set_channel(94.0);
        assert!(!ticket.fetch);
        assert!(coordinator.apply_resolution(ticket, None));

        let calls = recorder.calls();
        assert_eq!(calls[0], Call::Pause(1));
        assert!(calls.contains(&Call::Create(2)));
        assert!(calls.contains(&Call::Bind(2)));
        assert!(calls.contains(&Call::Source(2, "jazz-2".into())));
        assert_eq!(coordinator.phase(), PlaybackPhase::Loading);
    }

    #[test]
    fn test_nudging_dial_on_same_station_keeps_song() {
        let (mut coordinator, recorder) = playing(88.0);

        let ticket = coordinator.set_channel(88.5);
        assert!(coordinator.apply_resolution(ticket, None));

        let calls = recorder.calls();
        assert!(!calls.iter().any(|c| matches!(c, Call::Create(_) | Call::Pause(_))));
        assert!(calls
            .iter()
            .any(|c| matches!(c, Call::Volume(1, v) if (v - 0.45).abs() < 1e-9)));
        assert_eq!(coordinator.phase(), PlaybackPhase::Playing);
    }

    #[test]
    fn test_stale_resolution_is_ignored() {
        let (mut coordinator, _) = coordinator(88.0);
        let first = coordinator.tune();
        let second = coordinator.set_channel(102.0);

        assert!(!coordinator.apply_resolution(first, Some(live_at(at(0)))));
        assert!(coordinator.current_song().is_none());

        assert!(coordinator.apply_resolution(second, Some(live_at(at(0)))));
        assert_eq!(coordinator.current_song().unwrap().frequency, 102);
    }

    #[test]
    fn test_stop_cancels_pending_resolution() {
        let (mut coordinator, recorder) = playing(88.0);
        let pending = coordinator.set_channel(92.0);
        coordinator.stop();

        assert_eq!(coordinator.phase(), PlaybackPhase::Idle);
        assert!(coordinator.live().is_none());
        assert!(recorder.calls().contains(&Call::Pause(1)));

        assert!(!coordinator.apply_resolution(pending, Some(live_at(at(0)))));
        assert!(coordinator.current_song().is_none());
    }

    #[test]
    fn test_song_end_forces_fetch_and_loads_next() {
        let (mut coordinator, recorder) = playing(88.0);
        let mut events = coordinator.subscribe();

        let ticket = coordinator
            .on_media_event(LoadId::new(1), MediaEvent::Ended, at(110))
            .unwrap();
        assert!(ticket.fetch);
        assert_eq!(coordinator.phase(), PlaybackPhase::Loading);
        assert!(matches!(events.try_recv().unwrap(), RadioEvent::SongEnded { url } if url == "lofi-1"));

        let mut next = live_at(at(110));
        next.insert(88, now_playing("Lofi Beats", "lofi-4", 0.0, at(110)));
        assert!(coordinator.apply_resolution(ticket, Some(next)));

        assert_eq!(coordinator.current_song().unwrap().url, "lofi-4");
        assert!(recorder.calls().contains(&Call::Source(2, "lofi-4".into())));
    }

    #[test]
    fn test_channel_change_after_song_end_refetches() {
        let (mut coordinator, recorder) = playing(88.0);

        let ended = coordinator
            .on_media_event(LoadId::new(1), MediaEvent::Ended, at(120))
            .unwrap();
        let ticket = coordinator.set_channel(88.3);
        assert!(ticket.fetch);

        // Without a fresh schedule nothing is reloaded
        assert!(!coordinator.apply_resolution(ticket, None));
        assert!(!recorder.calls().contains(&Call::Source(2, "lofi-1".into())));
        assert!(!coordinator.apply_resolution(ended, None));

        let ticket = coordinator.set_channel(88.3);
        let mut next = live_at(at(120));
        next.insert(88, now_playing("Lofi Beats", "lofi-4", 0.0, at(120)));
        assert!(coordinator.apply_resolution(ticket, Some(next)));
        assert_eq!(coordinator.current_song().unwrap().url, "lofi-4");
    }

    #[test]
    fn test_song_end_replays_same_song_on_new_element() {
        let (mut coordinator, recorder) = playing(88.0);

        let ticket = coordinator
            .on_media_event(LoadId::new(1), MediaEvent::Ended, at(110))
            .unwrap();
        let mut next = live_at(at(110));
        next.insert(88, now_playing("Lofi Beats", "lofi-1", 0.0, at(110)));
        coordinator.apply_resolution(ticket, Some(next));

        let calls = recorder.calls();
        assert!(calls.contains(&Call::Create(2)));
        assert!(calls.contains(&Call::Source(2, "lofi-1".into())));
    }

    #[test]
    fn test_events_from_retired_element_are_ignored() {
        let (mut coordinator, recorder) = playing(88.0);
        let ticket = coordinator.set_channel(92.0);
        coordinator.apply_resolution(ticket, None);
        recorder.clear();

        assert!(coordinator
            .on_media_event(LoadId::new(1), MediaEvent::Ended, at(2))
            .is_none());
        assert_eq!(coordinator.phase(), PlaybackPhase::Loading);
        assert!(recorder.calls().is_empty());
    }

    #[test]
    fn test_media_failure_returns_to_idle_without_retry() {
        let (mut coordinator, recorder) = playing(88.0);
        let mut events = coordinator.subscribe();

        let next = coordinator.on_media_event(
            LoadId::new(1),
            MediaEvent::Failed {
                reason: "decode error".into(),
            },
            at(3),
        );

        assert!(next.is_none());
        assert_eq!(coordinator.phase(), PlaybackPhase::Idle);
        assert!(coordinator.current_song().is_none());
        assert_eq!(recorder.calls(), vec![Call::Pause(1)]);
        assert!(matches!(
            events.try_recv().unwrap(),
            RadioEvent::PlaybackFailed { reason } if reason == "decode error"
        ));
    }

    #[test]
    fn test_refused_play_is_a_failure() {
        let backend = FakeBackend {
            refuse_play: true,
            ..FakeBackend::default()
        };
        let mut coordinator = Coordinator::new(backend, controls(88.0));
        let ticket = coordinator.tune();
        coordinator.apply_resolution(ticket, Some(live_at(at(0))));
        coordinator.on_media_event(
            LoadId::new(1),
            MediaEvent::MetadataLoaded {
                duration: Duration::from_secs(120),
            },
            at(0),
        );
        assert_eq!(coordinator.phase(), PlaybackPhase::Idle);
    }

    #[test]
    fn test_effects_conflict_falls_back_to_unprocessed() {
        let backend = FakeBackend {
            refuse_effects: true,
            ..FakeBackend::default()
        };
        let recorder = backend.recorder.clone();
        let mut coordinator = Coordinator::new(backend, controls(88.0));
        let ticket = coordinator.tune();
        coordinator.apply_resolution(ticket, Some(live_at(at(0))));

        assert!(!coordinator.is_processed());
        let calls = recorder.calls();
        assert!(calls.contains(&Call::Source(1, "lofi-1".into())));
        assert!(!calls.iter().any(|c| matches!(c, Call::Effects(_) | Call::Gain(_))));

        coordinator.on_media_event(
            LoadId::new(1),
            MediaEvent::MetadataLoaded {
                duration: Duration::from_secs(120),
            },
            at(0),
        );
        assert_eq!(coordinator.phase(), PlaybackPhase::Playing);
    }

    #[test]
    fn test_resolution_failure_keeps_playing() {
        let (mut coordinator, recorder) = playing(88.0);
        let mut events = coordinator.subscribe();

        let ticket = coordinator.play();
        coordinator.resolution_failed(ticket, "connection refused");

        assert_eq!(coordinator.phase(), PlaybackPhase::Playing);
        assert!(recorder.calls().is_empty());
        assert!(matches!(
            events.try_recv().unwrap(),
            RadioEvent::ResolutionFailed { .. }
        ));
    }

    #[test]
    fn test_failed_fetch_after_song_end_settles_idle() {
        let (mut coordinator, _) = playing(88.0);
        let ticket = coordinator
            .on_media_event(LoadId::new(1), MediaEvent::Ended, at(110))
            .unwrap();
        coordinator.resolution_failed(ticket, "timeout");
        assert_eq!(coordinator.phase(), PlaybackPhase::Idle);
    }

    #[test]
    fn test_play_reloads_current_song() {
        let (mut coordinator, recorder) = playing(88.0);
        let ticket = coordinator.play();
        assert!(!ticket.fetch);
        coordinator.apply_resolution(ticket, None);
        assert!(recorder.calls().contains(&Call::Create(2)));
    }

    #[test]
    fn test_volume_and_bass_update_levels() {
        let (mut coordinator, recorder) = playing(88.0);
        coordinator.set_volume(0.5);
        coordinator.set_bass(1.0);

        let calls = recorder.calls();
        assert!(calls.contains(&Call::Volume(1, 0.5 * 0.75)));
        assert!(calls.contains(&Call::Gain(0.5)));
        assert!(calls.contains(&Call::Effects(EffectParams::for_tuning(0.0, 1.0))));
    }

    #[test]
    fn test_duplicate_metadata_is_ignored() {
        let (mut coordinator, recorder) = playing(88.0);
        coordinator.on_media_event(
            LoadId::new(1),
            MediaEvent::MetadataLoaded {
                duration: Duration::from_secs(120),
            },
            at(50),
        );
        assert!(recorder.calls().is_empty());
    }
}
