//! Scrape payload processing: parsing, flattening and rate derivation.

pub mod collector;
pub mod parser;
pub mod rate_deriver;

pub use collector::MetricsCollector;
pub use parser::MetricSampleParser;
pub use rate_deriver::{RateDeriver, RateRule};
