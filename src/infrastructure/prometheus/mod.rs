//! Prometheus text exposition scrape source.

pub mod scraper;

pub use scraper::{DEFAULT_PROMETHEUS_URL, PrometheusScraper};
