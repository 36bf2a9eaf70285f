use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use std::time::Duration;

/// Instance metadata and health probes.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
/// Scraping the exposition endpoint.
pub const SCRAPE_TIMEOUT: Duration = Duration::from_secs(10);
/// Ingestion calls and token requests.
pub const FORWARD_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpClientFactory;

impl HttpClientFactory {
    /// Plain client: exactly one request per call, bounded by `timeout`
    pub fn create_client(timeout: Duration) -> Client {
        Client::builder()
            .pool_max_idle_per_host(5)
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()
            .unwrap_or_else(|_| Client::new())
    }

    /// Client with retry middleware, for idempotent token requests
    pub fn create_retrying_client(timeout: Duration) -> ClientWithMiddleware {
        // Retry policy:
        // - Exponential backoff
        // - Max 2 retries
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(2);

        ClientBuilder::new(Self::create_client(timeout))
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build()
    }
}
