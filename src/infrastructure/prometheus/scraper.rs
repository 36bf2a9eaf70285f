use crate::domain::errors::ScrapeError;
use crate::domain::ports::MetricsSource;
use crate::infrastructure::core::http_client_factory::{
    HttpClientFactory, PROBE_TIMEOUT, SCRAPE_TIMEOUT,
};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, warn};

/// Default exporter endpoint (nginx-prometheus-exporter)
pub const DEFAULT_PROMETHEUS_URL: &str = "http://localhost:9113/metrics";

/// Scrapes a Prometheus text endpoint over plain HTTP GET, no auth.
pub struct PrometheusScraper {
    client: Client,
    url: String,
}

impl PrometheusScraper {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: HttpClientFactory::create_client(SCRAPE_TIMEOUT),
            url: url.into(),
        }
    }
}

#[async_trait]
impl MetricsSource for PrometheusScraper {
    async fn scrape(&self) -> Result<String, ScrapeError> {
        debug!("PrometheusScraper: scraping {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| ScrapeError::Unreachable {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| ScrapeError::Body {
            reason: e.to_string(),
        })?;

        info!(
            "PrometheusScraper: scraped {} bytes from {}",
            body.len(),
            self.url
        );
        Ok(body)
    }

    async fn probe(&self) -> bool {
        match self
            .client
            .get(&self.url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().as_u16() == 200,
            Err(e) => {
                warn!("PrometheusScraper: health check failed for {}: {}", self.url, e);
                false
            }
        }
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}
