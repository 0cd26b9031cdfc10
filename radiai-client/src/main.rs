use radiai_client::{HttpLiveSource, SimulatedBackend};
use radiai_core::{
    logging, media_event_channel, CoreError, RadiaiConfig, Radio, RadioControls, RadioEvent,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let loaded = RadiaiConfig::load_or_create();
    logging::init_tracing("radiai-tuner", loaded.as_ref().is_ok_and(|c| c.logging.enabled));

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
        Ok(catalog) => catalog,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let source = match HttpLiveSource::from_config(&config.tuner) {
        Ok(source) => Arc::new(source),
        Err(e) => {
            error!("Failed to create live schedule client: {e}");
            std::process::exit(1);
        }
    };
    info!("Tuning in via {}", source.url());

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

    let controls = RadioControls::new(config.tuner.controls());
    let (media_tx, media_rx) = media_event_channel();
    let backend = SimulatedBackend::new(&catalog, media_tx);

    let (radio, _handle) = Radio::new(
        backend,
        source,
        controls,
        media_rx,
        Some(cancel_token.clone()),
    );
    let radio = radio.with_fetch_timeout(config.tuner.fetch_timeout());

    tokio::spawn(log_radio_events(radio.subscribe()));
    radio.run().await;

    info!("Tuner stopped");
}

async fn log_radio_events(mut rx: broadcast::Receiver<RadioEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => match &event {
                RadioEvent::Tuned {
                    channel,
                    frequency,
                    channel_offset,
                } => {
                    info!(
                        "Dial at {} tuned to {} (offset {:.2})",
                        channel, frequency, channel_offset
                    );
                }
                RadioEvent::SongLoading {
                    frequency,
                    station,
                    url,
                } => {
                    info!("Now on {} {}: {}", frequency, station, url);
                }
                RadioEvent::Playing { position, .. } => {
                    info!("Joined broadcast at {:?}", position);
                }
                RadioEvent::SongEnded { url } => {
                    info!("Finished {}", url);
                }
                RadioEvent::Stopped => {
                    info!("Playback stopped");
                }
                RadioEvent::PlaybackFailed { reason } => {
                    warn!("Playback failed: {}", reason);
                }
                RadioEvent::ResolutionFailed { reason } => {
                    warn!("Could not reach the station schedule: {}", reason);
                }
            },
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Event logger lagged, missed {} events", n);
            }
            Err(broadcast::error::RecvError::Closed) => {
                break;
            }
        }
    }
}
