use anyhow::Context;
use azmon_forwarder::application::system::Application;
use azmon_forwarder::config::Config;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::prelude::*;

/// Scrape a Prometheus endpoint and forward the metrics to Azure Monitor.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Prometheus metrics endpoint (overrides PROMETHEUS_URL)
    #[arg(long)]
    prometheus_url: Option<String>,

    /// Seconds between cycles (overrides SCRAPE_INTERVAL_SECONDS)
    #[arg(long)]
    interval: Option<u64>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Authenticate with the managed identity even if a service principal is configured
    #[arg(long)]
    managed_identity: bool,

    /// Check the metrics endpoint and Azure Monitor, then exit
    #[arg(long)]
    health_check: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Load environment variables from this file instead of ./.env
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Azure Monitor metric namespace (overrides METRICS_NAMESPACE)
    #[arg(long)]
    namespace: Option<String>,

    /// Consecutive failed cycles before exiting (overrides MAX_CONSECUTIVE_FAILURES)
    #[arg(long)]
    max_failures: Option<usize>,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = Config::from_env()?;

    if let Some(url) = &cli.prometheus_url {
        config.monitor.prometheus_url = url.clone();
    }
    if let Some(interval) = cli.interval {
        if interval == 0 {
            anyhow::bail!("--interval must be at least 1 second");
        }
        config.monitor.scrape_interval = Duration::from_secs(interval);
    }
    if let Some(namespace) = &cli.namespace {
        config.monitor.namespace = namespace.clone();
    }
    if let Some(max_failures) = cli.max_failures {
        if max_failures == 0 {
            anyhow::bail!("--max-failures must be at least 1");
        }
        config.monitor.max_consecutive_failures = max_failures;
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Environment first so RUST_LOG from the file is honoured
    match &cli.env_file {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("Failed to load env file {}", path.display()))?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    init_tracing(cli.verbose);

    let config = load_config(&cli).context("Invalid configuration")?;
    let mut app = Application::build(config, cli.managed_identity)?;

    if cli.health_check {
        let healthy = app.health_check().await;
        if healthy {
            info!("Health check passed");
            return Ok(ExitCode::SUCCESS);
        }
        error!("Health check failed");
        return Ok(ExitCode::from(1));
    }

    let exit = if cli.once {
        app.run_once().await
    } else {
        app.run().await
    };

    info!("azmon-forwarder exiting: {:?}", exit);
    Ok(ExitCode::from(exit.exit_code()))
}
