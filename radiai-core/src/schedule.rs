//! Deterministic station playlist scheduler.
//!
//! Every station behaves as if it had been on air since local midnight, drawing
//! songs from a linear congruential generator seeded from the day and the
//! station name. Nothing is stored between calls: any process that resolves
//! the same station at the same elapsed time gets the same song and offset.
//!
//! The generator constants and the seed derivation must match bit for bit
//! across every client that resolves schedules.

use crate::catalog::{Catalog, Song, Station};
use crate::error::Result;
use crate::live::{LiveMap, NowPlaying};
use chrono::{DateTime, Utc};

/// Seconds in a day; the schedule is reseeded once per day.
pub const SECONDS_PER_DAY: f64 = 86_400.0;

const LCG_MULTIPLIER: u64 = 9301;
const LCG_INCREMENT: u64 = 49_297;
const LCG_MODULUS: u64 = 233_280;
const SEED_MODULUS: u64 = 1_000_000;

/// Per-resolution pseudo-random generator.
///
/// Each resolution owns a freshly seeded instance; state is never shared
/// between calls or threads.
#[derive(Debug, Clone)]
pub struct ScheduleRng {
    state: u64,
}

impl ScheduleRng {
    /// Seed for `day` (days since the start of the simulated broadcast) and a
    /// station's name seed.
    #[must_use]
    pub const fn new(day: u64, station_seed: u64) -> Self {
        Self {
            // (day * 1000) mod 1e6 only depends on day mod 1000
            state: ((day % 1000) * 1000 + station_seed % SEED_MODULUS) % SEED_MODULUS,
        }
    }

    /// Next value in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        self.state = (self.state * LCG_MULTIPLIER + LCG_INCREMENT) % LCG_MODULUS;
        // state < 233_280 so both conversions are exact
        #[allow(clippy::cast_precision_loss)]
        let value = self.state as f64 / LCG_MODULUS as f64;
        value
    }

    /// Uniform index into a list of `len` items. `len` must be non-zero.
    pub fn next_index(&mut self, len: usize) -> usize {
        #[allow(
            clippy::cast_precision_loss,
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss
        )]
        let index = (self.next_f64() * len as f64).floor() as usize;
        index.min(len.saturating_sub(1))
    }
}

/// One song's slot in a station's simulated broadcast.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Airing<'a> {
    /// Index into the station's song list
    pub index: usize,
    /// Seconds from the start of the day at which the song started
    pub start: f64,
    pub song: &'a Song,
}

impl Airing<'_> {
    /// Seconds from the start of the day at which the song ends.
    #[must_use]
    pub fn end(&self) -> f64 {
        self.start + f64::from(self.song.duration)
    }
}

/// Endless iterator over a station's broadcast for one day.
///
/// Consecutive airings never share an index when the station has more than one
/// song: a draw equal to the previous index is bumped to the next song
/// (wrapping) rather than redrawn, which keeps the sequence reproducible.
#[derive(Debug, Clone)]
pub struct Schedule<'a> {
    station: &'a Station,
    rng: ScheduleRng,
    accumulated: f64,
    previous: Option<usize>,
}

impl<'a> Schedule<'a> {
    #[must_use]
    pub fn for_day(station: &'a Station, day: u64) -> Self {
        Self {
            station,
            rng: ScheduleRng::new(day, station.seed()),
            accumulated: 0.0,
            previous: None,
        }
    }

    /// Schedule of the day that `elapsed_secs` falls in.
    #[must_use]
    pub fn containing(station: &'a Station, elapsed_secs: f64) -> Self {
        Self::for_day(station, day_of(elapsed_secs))
    }

    /// Draw the next song and advance the clock past it.
    pub fn next_airing(&mut self) -> Airing<'a> {
        let songs = self.station.songs();
        let mut index = self.rng.next_index(songs.len());

        if songs.len() > 1 && Some(index) == self.previous {
            index = (index + 1) % songs.len();
        }

        // Stations are never empty and next_index stays below len
        let song = &songs[index];
        let airing = Airing {
            index,
            start: self.accumulated,
            song,
        };

        self.previous = Some(index);
        self.accumulated += f64::from(song.duration);

        airing
    }
}

impl<'a> Iterator for Schedule<'a> {
    type Item = Airing<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_airing())
    }
}

/// Find the song airing on `station` at `elapsed_secs` seconds since midnight.
///
/// Negative or non-finite inputs are treated as midnight. `timestamp` is the
/// wall-clock instant of the computation, carried so consumers can correct for
/// the time that passes before playback starts.
#[must_use]
pub fn resolve(station: &Station, elapsed_secs: f64, timestamp: DateTime<Utc>) -> NowPlaying {
    let elapsed = sanitize_elapsed(elapsed_secs);

    // Durations are positive, so the airing containing `elapsed` is reached
    // after at most elapsed / min_duration + 1 draws.
    let mut schedule = Schedule::containing(station, elapsed);
    let airing = loop {
        let airing = schedule.next_airing();
        if airing.end() > elapsed {
            break airing;
        }
    };

    let part = elapsed - airing.start;
    let duration = airing.song.duration;

    NowPlaying {
        song: airing.song.clone(),
        part,
        station: station.name().to_string(),
        total_duration: duration,
        remaining_time: f64::from(duration) - part,
        timestamp,
    }
}

/// Resolve the station whose frequency key is `key` (e.g. `"88"`).
///
/// # Errors
///
/// Returns [`CoreError::StationNotFound`](crate::CoreError::StationNotFound) if
/// the key does not name a station in the catalog.
pub fn resolve_station(
    catalog: &Catalog,
    key: &str,
    elapsed_secs: f64,
    timestamp: DateTime<Utc>,
) -> Result<NowPlaying> {
    let (_, station) = catalog.lookup(key)?;
    Ok(resolve(station, elapsed_secs, timestamp))
}

/// Resolve every station independently at the same instant.
#[must_use]
pub fn resolve_all(catalog: &Catalog, elapsed_secs: f64, timestamp: DateTime<Utc>) -> LiveMap {
    catalog
        .iter()
        .map(|(frequency, station)| (*frequency, resolve(station, elapsed_secs, timestamp)))
        .collect()
}

fn sanitize_elapsed(elapsed_secs: f64) -> f64 {
    if elapsed_secs.is_finite() && elapsed_secs > 0.0 {
        elapsed_secs
    } else {
        0.0
    }
}

fn day_of(elapsed_secs: f64) -> u64 {
    // Non-negative and finite; huge inputs saturate at u64::MAX
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let day = (sanitize_elapsed(elapsed_secs) / SECONDS_PER_DAY).floor() as u64;
    day
}
