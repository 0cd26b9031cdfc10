//! Station catalog: songs, stations and the frequency dial they are tuned by.
//!
//! A [`Catalog`] is immutable once built. Every station it holds has a name of
//! at least two characters and a non-empty list of songs with positive
//! durations, so the resolver never has to check those preconditions.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::BTreeMap;

/// A pre-recorded track that a station can air.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Song {
    /// Where the audio can be fetched from
    pub url: String,
    /// Track length in whole seconds
    pub duration: u32,
}

impl Song {
    pub fn new(url: impl Into<String>, duration: u32) -> Self {
        Self {
            url: url.into(),
            duration,
        }
    }
}

/// A named station with an ordered playlist.
///
/// Song order matters: the scheduler draws indices into this list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Station {
    name: String,
    songs: Vec<Song>,
}

impl Station {
    /// Build a station, checking the invariants the scheduler relies on.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is shorter than two characters, the song
    /// list is empty, or any song has a zero duration.
    pub fn new(name: impl Into<String>, songs: Vec<Song>) -> Result<Self> {
        let name = name.into();

        if name.encode_utf16().count() < 2 {
            return Err(CoreError::InvalidStationName { name });
        }
        if songs.is_empty() {
            return Err(CoreError::EmptyStation { name });
        }
        if let Some(song) = songs.iter().find(|s| s.duration == 0) {
            return Err(CoreError::ZeroDurationSong {
                station: name,
                url: song.url.clone(),
            });
        }

        Ok(Self { name, songs })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn songs(&self) -> &[Song] {
        &self.songs
    }

    /// Seed contribution of this station: the sum of the UTF-16 code units of
    /// the first two characters of its name.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.name.encode_utf16().take(2).map(u64::from).sum()
    }
}

/// Station as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationEntry {
    /// Dial position the station is tuned at (e.g. 88, 102)
    pub frequency: u32,
    pub name: String,
    pub songs: Vec<Song>,
}

/// All stations on the dial, ordered by frequency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    stations: BTreeMap<u32, Station>,
}

impl Catalog {
    /// Build a catalog from config entries.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no entries, a frequency is used twice, or
    /// any station fails validation.
    pub fn new(entries: Vec<StationEntry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(CoreError::EmptyCatalog);
        }

        let mut stations = BTreeMap::new();
        for entry in entries {
            let station = Station::new(entry.name, entry.songs)?;
            if stations.insert(entry.frequency, station).is_some() {
                return Err(CoreError::DuplicateFrequency {
                    frequency: entry.frequency,
                });
            }
        }

        Ok(Self { stations })
    }

    /// The four stations the radio ships with.
    #[must_use]
    pub fn builtin() -> Self {
        let stations = BUILTIN_STATIONS
            .iter()
            .map(|(frequency, name, files)| {
                let songs = files
                    .iter()
                    .map(|(file_id, duration)| Song::new(builtin_song_url(file_id), *duration))
                    .collect();
                (
                    *frequency,
                    Station {
                        name: (*name).to_string(),
                        songs,
                    },
                )
            })
            .collect();

        Self { stations }
    }

    #[must_use]
    pub fn get(&self, frequency: u32) -> Option<&Station> {
        self.stations.get(&frequency)
    }

    /// Look up a station by the textual key a client sent.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StationNotFound`] if the key is not a known frequency.
    pub fn lookup(&self, key: &str) -> Result<(u32, &Station)> {
        key.trim()
            .parse::<u32>()
            .ok()
            .and_then(|frequency| self.get(frequency).map(|station| (frequency, station)))
            .ok_or_else(|| CoreError::StationNotFound {
                station: key.to_string(),
            })
    }

    /// Stations in ascending frequency order.
    pub fn iter(&self) -> btree_map::Iter<'_, u32, Station> {
        self.stations.iter()
    }

    pub fn frequencies(&self) -> impl Iterator<Item = u32> + '_ {
        self.stations.keys().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = (&'a u32, &'a Station);
    type IntoIter = btree_map::Iter<'a, u32, Station>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

const BUILTIN_STORAGE_URL: &str =
    "https://nyc.cloud.appwrite.io/v1/storage/buckets/68c46caa002b1e735ffb/files";

fn builtin_song_url(file_id: &str) -> String {
    format!("{BUILTIN_STORAGE_URL}/{file_id}/view?project=radiai")
}

type BuiltinStation = (u32, &'static str, &'static [(&'static str, u32)]);

const BUILTIN_STATIONS: &[BuiltinStation] = &[
    (
        88,
        "Lofi Beats",
        &[
            ("68c470bd00000762e7a4", 120),
            ("68c470c300342e69e210", 120),
            ("68c470c80037fa8cf2c2", 120),
            ("68c470af001be60aee0e", 120),
            ("68c48541001750439980", 105),
            ("68c485450034091496fe", 95),
            ("68c4854b000339dc7639", 95),
        ],
    ),
    (
        92,
        "Synthwave",
        &[
            ("68c471c2001e62fa780d", 120),
            ("68c471c600319256012e", 120),
            ("68c471cc0009781c6ff6", 120),
            ("68c485580029590359cb", 120),
            ("68c485720022b1f38f0b", 94),
            ("68c48578000e7aa3045e", 110),
        ],
    ),
    (
        94,
        "Jazz",
        &[
            ("68c485800019677797a2", 92),
            ("68c485850010ec3ee917", 105),
            ("68c4858a002040274b8a", 120),
            ("68c48597003446f01f83", 87),
            ("68c485a20011b9d39a07", 108),
            ("68c485a9001b3b4bdfe0", 108),
        ],
    ),
    (
        102,
        "Hypno",
        &[
            ("68c485de001d91a608bc", 130),
            ("68c485f3003e25e32481", 96),
            ("68c485fc00117b721d39", 96),
        ],
    ),
];
