use radiai_core::{logging, CoreError, RadiaiConfig};
use radiai_server::{serve, AppState};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let loaded = RadiaiConfig::load_or_create();
    logging::init_tracing("radiai-server", loaded.as_ref().is_ok_and(|c| c.logging.enabled));

    let config = match loaded {
        Ok(config) => config,
        Err(CoreError::ConfigNotFound { path }) => {
            warn!(
                "Config file not found, created a template at {}. Using defaults.",
                path.display()
            );
            RadiaiConfig::default()
        }
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let catalog = match config.catalog() {
        Ok(catalog) => Arc::new(catalog),
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };
    let frequencies: Vec<_> = catalog.frequencies().collect();
    info!("Loaded {} stations: {:?}", catalog.len(), frequencies);

    // Create shared cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();

    // Set up Ctrl+C handler to trigger graceful shutdown
    let ctrlc_token = cancel_token.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received Ctrl+C, shutting down gracefully...");
        ctrlc_token.cancel();
    }) {
        error!("Failed to set Ctrl+C handler: {}", e);
    }

    if let Err(e) = serve(&config.server.bind, AppState::new(catalog), cancel_token).await {
        error!("{e}");
        std::process::exit(1);
    }
}
