//! Configuration module for the forwarder.
//!
//! Configuration is loaded from environment variables (optionally seeded
//! from a `.env` file) and split by concern: Azure identity and credentials,
//! and the monitor loop itself. Command line flags are applied on top by the
//! binaries.

mod azure_config;
mod monitor_config;

pub use azure_config::{AzureEnvConfig, CredentialMode};
pub use monitor_config::{
    DEFAULT_NAMESPACE, DEFAULT_RATE_COUNTERS, MonitorEnvConfig, parse_rate_rules,
};

use anyhow::{Context, Result, bail};
use std::env;
use std::str::FromStr;

/// Variable lookup; the process environment outside of tests.
pub(crate) type Lookup<'a> = dyn Fn(&str) -> Option<String> + 'a;

/// Main application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub azure: AzureEnvConfig,
    pub monitor: MonitorEnvConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: &Lookup<'_>) -> Result<Self> {
        let azure = AzureEnvConfig::from_lookup(lookup).context("Failed to load Azure config")?;
        let monitor =
            MonitorEnvConfig::from_lookup(lookup).context("Failed to load monitor config")?;
        Ok(Self { azure, monitor })
    }
}

pub(crate) fn parse_number<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("Invalid {}: '{}'", key, raw))
}

pub(crate) fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => bail!("Invalid {}: '{}'. Must be true or false", key, raw),
    }
}
