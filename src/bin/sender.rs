use anyhow::Context;
use azmon_forwarder::application::bootstrap::services::ServicesBootstrap;
use azmon_forwarder::application::forwarding::MetricsForwarder;
use azmon_forwarder::application::identity::{Resolution, ResourceIdentityResolver};
use azmon_forwarder::config::{AzureEnvConfig, Config, CredentialMode, DEFAULT_NAMESPACE};
use azmon_forwarder::domain::metrics::MetricSet;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

/// Manual test tool for the Azure Monitor forwarding path.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Load environment variables from this file instead of ./.env
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Authenticate with the managed identity even if a service principal is configured
    #[arg(long, global = true)]
    managed_identity: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the resolved configuration without sending anything
    ConfigCheck,
    /// Verify that a token for Azure Monitor can be acquired
    HealthCheck,
    /// Health check, then send sample NGINX metrics (default)
    SendTest,
    /// Send a single custom metric
    CustomMetric {
        name: String,
        value: f64,
        #[arg(long, default_value = "Custom/Test")]
        namespace: String,
    },
}

fn sample_metrics() -> MetricSet {
    [
        ("nginx_connections_active", 10.0),
        ("nginx_http_requests_total", 1000.0),
        ("nginx_requests_per_second", 5.5),
    ]
    .into_iter()
    .map(|(name, value)| (name.to_string(), value))
    .collect()
}

async fn config_check(
    azure: &AzureEnvConfig,
    resolver: &ResourceIdentityResolver,
    force_managed_identity: bool,
) -> bool {
    info!("Sender: checking configuration...");
    match azure.credential_mode(force_managed_identity) {
        CredentialMode::ManagedIdentity { client_id } => info!(
            "Sender: credential: managed identity ({})",
            client_id.as_deref().unwrap_or("system-assigned")
        ),
        CredentialMode::ServicePrincipal { tenant_id, .. } => {
            info!("Sender: credential: service principal (tenant {})", tenant_id)
        }
    }

    match resolver.resolve().await {
        Resolution::Resolved(identity) => {
            info!("Sender: resource: {}", identity.resource_uri());
            info!("Sender: region: {}", identity.region);
            info!(
                "Sender: endpoint: {}",
                identity.metrics_endpoint(&azure.ingestion_host)
            );
            if let Some(instance) = identity.instance_id() {
                info!("Sender: scale set instance: {}", instance);
            }
            true
        }
        Resolution::Unconfigured { missing } => {
            error!("Sender: missing configuration: {}", missing.join(", "));
            for field in missing {
                warn!("Sender: set AZURE_{}='your-value'", field.to_uppercase());
            }
            false
        }
    }
}

async fn send(
    forwarder: &MetricsForwarder,
    resolver: &ResourceIdentityResolver,
    metrics: &MetricSet,
    namespace: &str,
) -> anyhow::Result<bool> {
    info!(
        "Sender: sending {} metrics to namespace '{}'...",
        metrics.len(),
        namespace
    );
    let report = forwarder
        .forward(metrics, resolver.resolve().await.identity(), namespace)
        .await?;

    for outcome in &report.outcomes {
        match (&outcome.error, outcome.http_status) {
            (None, status) => info!("Sender: {} accepted ({:?})", outcome.metric_name, status),
            (Some(e), _) => error!("Sender: {} rejected: {}", outcome.metric_name, e),
        }
    }
    Ok(report.result.success)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let cli = Cli::parse();
    match &cli.env_file {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("Failed to load env file {}", path.display()))?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    let config = Config::from_env().context("Invalid configuration")?;
    let resolver = ServicesBootstrap::resolver(&config.azure);
    let forwarder = ServicesBootstrap::forwarder(&config.azure, cli.managed_identity);

    let ok = match cli.command.unwrap_or(Commands::SendTest) {
        Commands::ConfigCheck => config_check(&config.azure, &resolver, cli.managed_identity).await,
        Commands::HealthCheck => forwarder.probe(resolver.resolve().await.identity()).await,
        Commands::SendTest => {
            if !config_check(&config.azure, &resolver, cli.managed_identity).await {
                return Ok(ExitCode::from(1));
            }
            forwarder.probe(resolver.resolve().await.identity()).await
                && send(&forwarder, &resolver, &sample_metrics(), DEFAULT_NAMESPACE).await?
        }
        Commands::CustomMetric {
            name,
            value,
            namespace,
        } => {
            let metrics: MetricSet = [(name, value)].into_iter().collect();
            send(&forwarder, &resolver, &metrics, &namespace).await?
        }
    };

    if ok {
        info!("Sender: done");
        Ok(ExitCode::SUCCESS)
    } else {
        error!("Sender: failed");
        Ok(ExitCode::from(1))
    }
}
