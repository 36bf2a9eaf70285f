// Component wiring
pub mod bootstrap;

// Payload parsing and rate derivation
pub mod collection;

// Publishing to Azure Monitor
pub mod forwarding;

// Resource identity resolution
pub mod identity;

// Supervising loop
pub mod monitoring;

// Application orchestrator and shutdown handling
pub mod system;
