use thiserror::Error;

/// Errors raised while fetching the exposition payload
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Scrape source unreachable: {reason}")]
    Unreachable { reason: String },

    #[error("Scrape source returned HTTP {status}")]
    Status { status: u16 },

    #[error("Failed to read scrape body: {reason}")]
    Body { reason: String },
}

/// Errors raised while querying the instance metadata service
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Unable to reach instance metadata service: {reason}")]
    Unreachable { reason: String },

    #[error("Instance metadata service returned HTTP {status}")]
    Status { status: u16 },

    #[error("Invalid instance metadata response: {reason}")]
    Malformed { reason: String },
}

/// Errors raised by a token credential
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Token request failed: {reason}")]
    Request { reason: String },

    #[error("Token endpoint returned HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid token response: {reason}")]
    Malformed { reason: String },

    #[error("Credential not configured: {reason}")]
    NotConfigured { reason: String },
}

/// Transport-level failure talking to the ingestion API
#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("Ingestion request failed: {reason}")]
    Transport { reason: String },

    #[error("Ingestion request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Errors that abort a whole forwarding batch
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("Invalid ingestion endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
}
