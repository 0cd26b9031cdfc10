//! What is on air right now, and where the coordinator gets it from.

use crate::catalog::{Catalog, Song};
use crate::error::Result;
use crate::schedule::resolve_all;
use crate::time::seconds_since_midnight;
use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A station's current song as computed by the resolver.
///
/// Produced fresh on every resolution and never stored. `timestamp` records
/// when the position was computed so consumers can account for the time that
/// passed before they act on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NowPlaying {
    pub song: Song,
    /// Seconds of the song already aired
    pub part: f64,
    /// Station name
    pub station: String,
    /// Song length in seconds
    pub total_duration: u32,
    /// Seconds until the song ends
    pub remaining_time: f64,
    pub timestamp: DateTime<Utc>,
}

/// Every station's [`NowPlaying`], keyed and ordered by frequency.
pub type LiveMap = BTreeMap<u32, NowPlaying>;

/// Source of live schedule snapshots for the coordinator.
///
/// The HTTP client in `radiai-client` fetches `/live` from a server;
/// [`LocalLiveSource`] resolves in-process.
#[async_trait]
pub trait LiveSource: Send + Sync {
    /// Human-readable name used in logs.
    fn name(&self) -> &'static str;

    /// Fetch a snapshot of every station.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be obtained.
    async fn fetch_live(&self) -> Result<LiveMap>;
}

/// Resolves the catalog against the local wall clock.
pub struct LocalLiveSource {
    catalog: Arc<Catalog>,
}

impl LocalLiveSource {
    pub const fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    /// Snapshot at a given local instant.
    #[must_use]
    pub fn snapshot_at(&self, now: DateTime<Local>) -> LiveMap {
        resolve_all(
            &self.catalog,
            seconds_since_midnight(&now),
            now.with_timezone(&Utc),
        )
    }
}

#[async_trait]
impl LiveSource for LocalLiveSource {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn fetch_live(&self) -> Result<LiveMap> {
        Ok(self.snapshot_at(Local::now()))
    }
}
