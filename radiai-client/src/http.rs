use async_trait::async_trait;
use radiai_core::{CoreError, DurationExt, LiveMap, LiveSource, TunerConfig};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Default timeout for HTTP requests (10 seconds)
const DEFAULT_TIMEOUT_SECS: u64 = 10;
/// Default number of retry attempts
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Fetches live schedules from a radiai server's `/live` endpoint
pub struct HttpLiveSource {
    client: ClientWithMiddleware,
    url: Url,
    timeout: Duration,
}

impl HttpLiveSource {
    /// Create a source with the default 10-second timeout and 3 retries.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client cannot be created.
    pub fn new(url: &str) -> Result<Self, CoreError> {
        Self::with_options(
            url,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            DEFAULT_MAX_RETRIES,
        )
    }

    /// Create a source from the `[tuner]` config section.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client cannot be created.
    pub fn from_config(config: &TunerConfig) -> Result<Self, CoreError> {
        Self::with_options(&config.live_url, config.fetch_timeout(), config.max_retries)
    }

    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client cannot be created.
    pub fn with_options(url: &str, timeout: Duration, max_retries: u32) -> Result<Self, CoreError> {
        let url = Url::parse(url).map_err(|e| CoreError::ConfigInvalid {
            message: format!("Invalid live URL {url}: {e}"),
        })?;

        // The whole fetch, retries included, is bounded in `fetch_live`
        let base_client = reqwest::Client::builder()
            .connect_timeout(timeout.min(Duration::from_secs(5)))
            .user_agent("Radiai/0.1")
            .build()
            .map_err(|e| CoreError::LiveFetch {
                reason: format!("Failed to create HTTP client: {e}"),
            })?;

        // Wrap with retry middleware (exponential backoff)
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);
        let client = ClientBuilder::new(base_client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            client,
            url,
            timeout,
        })
    }

    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    fn timeout_error(&self) -> CoreError {
        CoreError::LiveFetchTimeout {
            timeout_ms: self.timeout.as_millis_u64(),
        }
    }

    fn request_error(&self, e: &(dyn std::error::Error + 'static)) -> CoreError {
        if is_timeout(e) {
            self.timeout_error()
        } else {
            CoreError::LiveFetch {
                reason: e.to_string(),
            }
        }
    }

    async fn request(&self) -> Result<LiveMap, CoreError> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| match e {
                reqwest_middleware::Error::Reqwest(e) => self.request_error(&e),
                reqwest_middleware::Error::Middleware(e) => self.request_error(&*e),
            })?;

        if !response.status().is_success() {
            warn!("Live schedule returned status: {}", response.status());
            return Err(CoreError::LiveFetch {
                reason: format!("{} returned status: {}", self.url, response.status()),
            });
        }

        response.json().await.map_err(|e| self.request_error(&e))
    }
}

/// Whether `e` or anything in its source chain is a timeout.
fn is_timeout(e: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(e);
    while let Some(err) = current {
        if let Some(e) = err.downcast_ref::<reqwest::Error>() {
            if e.is_timeout() {
                return true;
            }
        }
        if let Some(e) = err.downcast_ref::<std::io::Error>() {
            if e.kind() == std::io::ErrorKind::TimedOut {
                return true;
            }
        }
        current = err.source();
    }
    false
}

#[async_trait]
impl LiveSource for HttpLiveSource {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch_live(&self) -> Result<LiveMap, CoreError> {
        debug!("GET {}", self.url);

        let live = tokio::time::timeout(self.timeout, self.request())
            .await
            .map_err(|_| self.timeout_error())??;
        debug!("Live schedule has {} stations", live.len());
        Ok(live)
    }
}
