//! Route handlers.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Local, Utc};
use radiai_core::schedule::{resolve_all, resolve_station};
use radiai_core::time::seconds_since_midnight;
use radiai_core::{Catalog, CoreError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Source of the local wall-clock time used to resolve schedules
pub type Clock = Arc<dyn Fn() -> DateTime<Local> + Send + Sync>;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    catalog: Arc<Catalog>,
    clock: Clock,
}

impl AppState {
    /// State resolving against the system clock
    #[must_use]
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self::with_clock(catalog, Arc::new(Local::now))
    }

    #[must_use]
    pub fn with_clock(catalog: Arc<Catalog>, clock: Clock) -> Self {
        Self { catalog, clock }
    }

    /// Elapsed seconds since local midnight and the instant they were taken at
    fn now(&self) -> (f64, DateTime<Utc>) {
        let now = (self.clock)();
        (seconds_since_midnight(&now), now.with_timezone(&Utc))
    }
}

// ============ Error handling ============

struct AppError(CoreError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self.0 {
            CoreError::StationNotFound { .. } => {
                (StatusCode::NOT_FOUND, "Station not found".to_string())
            }
            other => {
                warn!("Request failed: {}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

/// Build the router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/live", get(get_live))
        .route("/api/live", get(get_live))
        .route("/stations", get(get_stations))
        .route("/health", get(health))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct LiveParams {
    station: Option<String>,
}

/// GET /live[?station=<frequency>]
/// Every station's current song, or one station's
async fn get_live(
    State(state): State<AppState>,
    Query(params): Query<LiveParams>,
) -> Result<Response, AppError> {
    let (elapsed, timestamp) = state.now();

    let body = match params.station.as_deref().filter(|s| !s.is_empty()) {
        Some(key) => {
            debug!("Resolving station {} at {}s", key, elapsed);
            let now_playing = resolve_station(&state.catalog, key, elapsed, timestamp)?;
            serde_json::to_value(now_playing).map_err(CoreError::from)?
        }
        None => {
            debug!("Resolving all stations at {}s", elapsed);
            let live = resolve_all(&state.catalog, elapsed, timestamp);
            serde_json::to_value(live).map_err(CoreError::from)?
        }
    };

    Ok(([(header::CACHE_CONTROL, "no-cache")], Json(body)).into_response())
}

/// A catalog entry as listed by `/stations`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationSummary {
    pub frequency: u32,
    pub name: String,
    pub songs: usize,
}

/// GET /stations
async fn get_stations(State(state): State<AppState>) -> Json<Vec<StationSummary>> {
    Json(
        state
            .catalog
            .iter()
            .map(|(frequency, station)| StationSummary {
                frequency: *frequency,
                name: station.name().to_string(),
                songs: station.songs().len(),
            })
            .collect(),
    )
}

/// GET /health
async fn health() -> &'static str {
    "OK"
}
