//! HTTP service exposing what every station is airing right now.

pub mod api;
pub mod error;

pub use api::{create_router, AppState, Clock, StationSummary};
pub use error::ServerError;

use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Bind `addr` and serve until `cancel_token` is cancelled.
///
/// # Errors
///
/// Returns an error if the address is invalid, cannot be bound, or the server
/// fails while running.
pub async fn serve(
    addr: &str,
    state: AppState,
    cancel_token: CancellationToken,
) -> Result<(), ServerError> {
    let addr: SocketAddr = addr.parse().map_err(|e: std::net::AddrParseError| {
        ServerError::InvalidBindAddress {
            addr: addr.to_string(),
            reason: e.to_string(),
        }
    })?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;

    info!("Radio schedule listening on http://{}/live", addr);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move { cancel_token.cancelled().await })
        .await
        .map_err(ServerError::Serve)?;

    info!("Server stopped");
    Ok(())
}
