// Scraped samples, forwarding outcomes and cycle results
pub mod metrics;

// Azure resource identity and URI building
pub mod identity;

// Port interfaces
pub mod ports;

// Domain-specific error types
pub mod errors;
