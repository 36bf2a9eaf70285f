//! Push-based observability for the forwarder
//!
//! The loop's own counters live in a Prometheus registry and are only ever
//! written to the log as structured JSON. There is no HTTP server.

pub mod metrics;
pub mod reporter;

pub use metrics::Metrics;
pub use reporter::MetricsReporter;
