//! Publishing metric sets to Azure Monitor.

pub mod forwarder;

pub use forwarder::{ACCEPTED_STATUSES, DEFAULT_INGESTION_HOST, ForwardReport, MetricsForwarder};
