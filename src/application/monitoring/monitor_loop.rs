use crate::application::collection::{MetricsCollector, RateRule};
use crate::application::forwarding::MetricsForwarder;
use crate::application::identity::ResourceIdentityResolver;
use crate::application::system::shutdown_service::ShutdownSignal;
use crate::config::{DEFAULT_NAMESPACE, MonitorEnvConfig};
use crate::domain::errors::ForwardError;
use crate::domain::metrics::{CycleResult, MetricSet};
use crate::domain::ports::MetricsSource;
use crate::infrastructure::core::{CircuitBreaker, CircuitState};
use crate::infrastructure::observability::{Metrics, MetricsReporter};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Metrics summarised in the log after every successful cycle.
const KEY_METRICS: [(&str, &str); 3] = [
    ("nginx_connections_active", "Active connections"),
    ("nginx_http_requests_total", "Total requests"),
    ("nginx_requests_per_second", "Requests/sec"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// Shutdown was requested.
    Shutdown,
    /// Startup health check failed, no cycle ran.
    ProbeFailed,
    /// Too many failed cycles in a row.
    FailureThreshold { consecutive_failures: usize },
    /// Single-cycle mode finished.
    SingleCycle { success: bool },
}

impl LoopExit {
    pub fn exit_code(&self) -> u8 {
        match self {
            LoopExit::Shutdown => 0,
            LoopExit::SingleCycle { success: true } => 0,
            LoopExit::ProbeFailed
            | LoopExit::FailureThreshold { .. }
            | LoopExit::SingleCycle { success: false } => 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub interval: Duration,
    /// Granularity of inter-cycle waits; the shutdown flag is checked
    /// once per tick.
    pub tick: Duration,
    pub error_backoff: Duration,
    pub max_consecutive_failures: usize,
    pub namespace: String,
    pub rate_rules: Vec<RateRule>,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from(&MonitorEnvConfig::default())
    }
}

impl From<&MonitorEnvConfig> for LoopSettings {
    fn from(config: &MonitorEnvConfig) -> Self {
        Self {
            interval: config.scrape_interval,
            tick: Duration::from_secs(1),
            error_backoff: config.error_backoff,
            max_consecutive_failures: config.max_consecutive_failures,
            namespace: if config.namespace.is_empty() {
                DEFAULT_NAMESPACE.to_string()
            } else {
                config.namespace.clone()
            },
            rate_rules: config.rate_rules.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleStatus {
    Succeeded,
    Failed,
    Errored,
}

impl CycleStatus {
    fn label(&self) -> &'static str {
        match self {
            CycleStatus::Succeeded => "success",
            CycleStatus::Failed => "failure",
            CycleStatus::Errored => "error",
        }
    }
}

/// Drives scrape/forward cycles at a fixed interval.
///
/// Cycles run strictly one after another on the calling task. The loop owns
/// the rate state, the identity cache and the failure counter; the only
/// thing shared with other tasks is the shutdown flag.
pub struct MonitorLoop {
    source: Arc<dyn MetricsSource>,
    resolver: ResourceIdentityResolver,
    forwarder: MetricsForwarder,
    collector: MetricsCollector,
    settings: LoopSettings,
    breaker: CircuitBreaker,
    shutdown: ShutdownSignal,
    metrics: Metrics,
    reporter: MetricsReporter,
    state: LoopState,
}

impl MonitorLoop {
    pub fn new(
        source: Arc<dyn MetricsSource>,
        resolver: ResourceIdentityResolver,
        forwarder: MetricsForwarder,
        settings: LoopSettings,
        shutdown: ShutdownSignal,
        metrics: Metrics,
    ) -> Self {
        Self {
            source,
            resolver,
            forwarder,
            collector: MetricsCollector::new(settings.rate_rules.clone()),
            breaker: CircuitBreaker::new("monitor", settings.max_consecutive_failures),
            settings,
            shutdown,
            reporter: MetricsReporter::new(metrics.clone()),
            metrics,
            state: LoopState::Idle,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn consecutive_failures(&self) -> usize {
        self.breaker.consecutive_failures()
    }

    /// Check the scrape source and the forwarding path. Both are checked
    /// even when the first fails so the log shows every problem at once.
    pub async fn health_check(&self) -> bool {
        info!("MonitorLoop: performing health check...");

        let source_ok = self.source.probe().await;
        if source_ok {
            info!("MonitorLoop: metrics endpoint {} is healthy", self.source.describe());
        } else {
            error!(
                "MonitorLoop: metrics endpoint {} is not reachable",
                self.source.describe()
            );
        }

        let identity = self.resolver.resolve().await.identity();
        let forward_ok = self.forwarder.probe(identity).await;
        if forward_ok {
            info!("MonitorLoop: Azure Monitor connection is healthy");
        } else {
            error!("MonitorLoop: Azure Monitor connection is not healthy");
        }

        source_ok && forward_ok
    }

    /// Run cycles until shutdown is requested or the failure threshold is
    /// reached.
    pub async fn run(&mut self) -> LoopExit {
        if !self.health_check().await {
            error!("MonitorLoop: health check failed, exiting");
            self.state = LoopState::Stopped;
            return LoopExit::ProbeFailed;
        }

        info!(
            "MonitorLoop: starting, interval {}s, failure threshold {}",
            self.settings.interval.as_secs(),
            self.breaker.failure_threshold()
        );
        self.state = LoopState::Running;

        let exit = loop {
            if self.shutdown.is_triggered() {
                break LoopExit::Shutdown;
            }

            let status = self.guarded_cycle().await;
            if let Some(exit) = self.account(status) {
                break exit;
            }

            let pause = match status {
                CycleStatus::Errored => self.settings.error_backoff,
                CycleStatus::Succeeded | CycleStatus::Failed => self.settings.interval,
            };
            if !self.shutdown.wait(pause, self.settings.tick).await {
                break LoopExit::Shutdown;
            }
        };

        self.stop(exit);
        exit
    }

    /// Health check followed by exactly one cycle.
    pub async fn run_once(&mut self) -> LoopExit {
        if !self.health_check().await {
            error!("MonitorLoop: health check failed, exiting");
            self.state = LoopState::Stopped;
            return LoopExit::ProbeFailed;
        }

        self.state = LoopState::Running;
        let status = self.guarded_cycle().await;
        self.account(status);

        let exit = LoopExit::SingleCycle {
            success: status == CycleStatus::Succeeded,
        };
        self.stop(exit);
        exit
    }

    /// One scrape → parse → derive → forward pass.
    ///
    /// An unreachable source or an empty scrape yields an empty, failed
    /// result; only a batch that cannot be forwarded at all is an error.
    pub async fn run_cycle(&mut self, now: Instant) -> Result<CycleResult, ForwardError> {
        let _timer = self.metrics.cycle_duration_seconds.start_timer();

        let payload = match self.source.scrape().await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(
                    "MonitorLoop: failed to scrape {}: {}",
                    self.source.describe(),
                    e
                );
                self.metrics.scraped_metrics.set(0.0);
                return Ok(CycleResult::empty());
            }
        };

        let metrics = self.collector.collect(&payload, now);
        self.metrics.scraped_metrics.set(metrics.len() as f64);
        if metrics.is_empty() {
            warn!("MonitorLoop: no metrics collected");
            return Ok(CycleResult::empty());
        }

        let identity = self.resolver.resolve().await.identity();
        let report = self
            .forwarder
            .forward(&metrics, identity, &self.settings.namespace)
            .await?;
        self.metrics.record_forward(&report.outcomes);

        if report.result.success {
            info!(
                "MonitorLoop: successfully sent {} metrics to Azure Monitor",
                report.result.metrics_accepted
            );
            log_key_metrics(&metrics);
        } else {
            warn!("MonitorLoop: failed to send some metrics to Azure Monitor");
        }

        Ok(report.result)
    }

    /// Run a cycle, containing both errors and panics.
    async fn guarded_cycle(&mut self) -> CycleStatus {
        let outcome = AssertUnwindSafe(self.run_cycle(Instant::now()))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(result)) if result.success => CycleStatus::Succeeded,
            Ok(Ok(_)) => CycleStatus::Failed,
            Ok(Err(e)) => {
                error!("MonitorLoop: unexpected error in monitoring loop: {}", e);
                CycleStatus::Errored
            }
            Err(panic) => {
                error!(
                    "MonitorLoop: unexpected error in monitoring loop: {}",
                    panic_message(panic.as_ref())
                );
                CycleStatus::Errored
            }
        }
    }

    /// Update counters for a finished cycle. Returns an exit when the
    /// failure threshold is reached.
    fn account(&mut self, status: CycleStatus) -> Option<LoopExit> {
        self.metrics.inc_cycle(status.label());

        let opened = match status {
            CycleStatus::Succeeded => {
                self.breaker.record_success();
                false
            }
            CycleStatus::Failed | CycleStatus::Errored => {
                self.breaker.record_failure() == CircuitState::Open
            }
        };
        self.metrics
            .consecutive_failures
            .set(self.breaker.consecutive_failures() as f64);

        if opened {
            error!(
                "MonitorLoop: too many consecutive failures ({}), stopping",
                self.breaker.consecutive_failures()
            );
            return Some(LoopExit::FailureThreshold {
                consecutive_failures: self.breaker.consecutive_failures(),
            });
        }
        None
    }

    fn stop(&mut self, exit: LoopExit) {
        self.state = LoopState::Stopping;
        info!("MonitorLoop: stopping ({:?})", exit);
        self.reporter.report();
        self.state = LoopState::Stopped;
        info!("MonitorLoop: stopped");
    }
}

fn log_key_metrics(metrics: &MetricSet) {
    let parts: Vec<String> = KEY_METRICS
        .iter()
        .filter_map(|(name, label)| {
            metrics.get(*name).map(|value| {
                if name.ends_with("_per_second") {
                    format!("{}: {:.2}", label, value)
                } else {
                    format!("{}: {}", label, value)
                }
            })
        })
        .collect();

    if !parts.is_empty() {
        info!("MonitorLoop: {}", parts.join(", "));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::forwarding::DEFAULT_INGESTION_HOST;
    use crate::domain::identity::{Membership, PartialIdentity};
    use crate::infrastructure::mock::{
        MockIngestionClient, MockMetadataService, MockMetricsSource, StaticTokenCredential,
    };

    const PAYLOAD: &str = "\
# HELP nginx_connections_active Active client connections
# TYPE nginx_connections_active gauge
nginx_connections_active 3
nginx_http_requests_total 1000
";

    fn settings(max_failures: usize) -> LoopSettings {
        LoopSettings {
            interval: Duration::from_millis(10),
            tick: Duration::from_millis(1),
            error_backoff: Duration::from_millis(10),
            max_consecutive_failures: max_failures,
            ..LoopSettings::default()
        }
    }

    fn overrides() -> PartialIdentity {
        PartialIdentity {
            subscription_id: Some("sub".to_string()),
            resource_group: Some("rg".to_string()),
            name: Some("vm-1".to_string()),
            region: Some("westeurope".to_string()),
            membership: Some(Membership::Standalone),
        }
    }

    fn build(
        source: MockMetricsSource,
        client: Arc<MockIngestionClient>,
        settings: LoopSettings,
        shutdown: ShutdownSignal,
    ) -> (MonitorLoop, Arc<MockMetricsSource>) {
        let source = Arc::new(source);
        let resolver = ResourceIdentityResolver::with_metadata(
            overrides(),
            Arc::new(MockMetadataService::unreachable()),
        );
        let forwarder = MetricsForwarder::new(
            Arc::new(StaticTokenCredential::new("tok")),
            client,
            DEFAULT_INGESTION_HOST,
        );
        let monitor = MonitorLoop::new(
            source.clone(),
            resolver,
            forwarder,
            settings,
            shutdown,
            Metrics::new().expect("metrics"),
        );
        (monitor, source)
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(LoopExit::Shutdown.exit_code(), 0);
        assert_eq!(LoopExit::ProbeFailed.exit_code(), 1);
        assert_eq!(
            LoopExit::FailureThreshold {
                consecutive_failures: 5
            }
            .exit_code(),
            1
        );
        assert_eq!(LoopExit::SingleCycle { success: true }.exit_code(), 0);
        assert_eq!(LoopExit::SingleCycle { success: false }.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_probe_failure_runs_no_cycle() {
        let (mut monitor, source) = build(
            MockMetricsSource::always(PAYLOAD).unhealthy(),
            Arc::new(MockIngestionClient::always(200)),
            settings(5),
            ShutdownSignal::new(),
        );

        assert_eq!(monitor.run().await, LoopExit::ProbeFailed);
        assert_eq!(source.scrapes(), 0);
        assert_eq!(monitor.state(), LoopState::Stopped);
    }

    #[tokio::test]
    async fn test_empty_scrapes_reach_threshold() {
        let (mut monitor, source) = build(
            MockMetricsSource::always(""),
            Arc::new(MockIngestionClient::always(200)),
            settings(3),
            ShutdownSignal::new(),
        );

        let exit = monitor.run().await;

        assert_eq!(
            exit,
            LoopExit::FailureThreshold {
                consecutive_failures: 3
            }
        );
        assert_eq!(source.scrapes(), 3);
        assert_eq!(monitor.metrics().cycles("failure"), 3.0);
        assert_eq!(monitor.state(), LoopState::Stopped);
    }

    #[tokio::test]
    async fn test_shutdown_stops_cleanly() {
        let shutdown = ShutdownSignal::new();
        let client = Arc::new(MockIngestionClient::always(202));
        let (mut monitor, source) = build(
            MockMetricsSource::always(PAYLOAD).shutdown_after(2, shutdown.clone()),
            client.clone(),
            settings(5),
            shutdown,
        );

        let exit = monitor.run().await;

        assert_eq!(exit, LoopExit::Shutdown);
        assert_eq!(exit.exit_code(), 0);
        assert_eq!(source.scrapes(), 2);
        assert_eq!(monitor.metrics().cycles("success"), 2.0);
        assert!(!client.published().is_empty());
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let shutdown = ShutdownSignal::new();
        let source = MockMetricsSource::scripted(vec![
            Some(""),
            Some(""),
            Some(PAYLOAD),
            Some(""),
            Some(""),
        ])
        .shutdown_after(5, shutdown.clone());
        let (mut monitor, _) = build(
            source,
            Arc::new(MockIngestionClient::always(200)),
            settings(3),
            shutdown,
        );

        assert_eq!(monitor.run().await, LoopExit::Shutdown);
        assert_eq!(monitor.consecutive_failures(), 2);
    }

    #[tokio::test]
    async fn test_panicking_cycle_is_contained() {
        let (mut monitor, source) = build(
            MockMetricsSource::panicking(),
            Arc::new(MockIngestionClient::always(200)),
            settings(2),
            ShutdownSignal::new(),
        );

        let exit = monitor.run().await;

        assert_eq!(
            exit,
            LoopExit::FailureThreshold {
                consecutive_failures: 2
            }
        );
        assert_eq!(source.scrapes(), 2);
        assert_eq!(monitor.metrics().cycles("error"), 2.0);
    }

    #[tokio::test]
    async fn test_errored_cycle_waits_error_backoff() {
        let backoff = Duration::from_millis(200);
        let spaced = LoopSettings {
            interval: Duration::from_millis(1),
            error_backoff: backoff,
            ..settings(2)
        };

        let (mut errored, _) = build(
            MockMetricsSource::panicking(),
            Arc::new(MockIngestionClient::always(200)),
            spaced.clone(),
            ShutdownSignal::new(),
        );
        let started = Instant::now();
        errored.run().await;
        assert!(started.elapsed() >= backoff);

        let (mut failed, _) = build(
            MockMetricsSource::scripted(vec![None]),
            Arc::new(MockIngestionClient::always(200)),
            spaced,
            ShutdownSignal::new(),
        );
        let started = Instant::now();
        let exit = failed.run().await;
        assert_eq!(
            exit,
            LoopExit::FailureThreshold {
                consecutive_failures: 2
            }
        );
        assert!(started.elapsed() < backoff / 2);
    }

    #[tokio::test]
    async fn test_unreachable_source_counts_as_failure() {
        let (mut monitor, _) = build(
            MockMetricsSource::scripted(vec![None]),
            Arc::new(MockIngestionClient::always(200)),
            settings(2),
            ShutdownSignal::new(),
        );

        let exit = monitor.run().await;

        assert_eq!(
            exit,
            LoopExit::FailureThreshold {
                consecutive_failures: 2
            }
        );
        assert_eq!(monitor.metrics().cycles("failure"), 2.0);
    }

    #[tokio::test]
    async fn test_run_once() {
        let (mut monitor, source) = build(
            MockMetricsSource::always(PAYLOAD),
            Arc::new(MockIngestionClient::always(200)),
            settings(5),
            ShutdownSignal::new(),
        );

        assert_eq!(monitor.run_once().await, LoopExit::SingleCycle { success: true });
        assert_eq!(source.scrapes(), 1);
    }

    #[tokio::test]
    async fn test_rate_forwarded_on_second_cycle() {
        let client = Arc::new(MockIngestionClient::always(200));
        let (mut monitor, _) = build(
            MockMetricsSource::scripted(vec![
                Some("nginx_http_requests_total 1000\n"),
                Some("nginx_http_requests_total 1050\n"),
            ]),
            client.clone(),
            settings(5),
            ShutdownSignal::new(),
        );

        let t0 = Instant::now();
        let first = monitor.run_cycle(t0).await.expect("cycle");
        assert_eq!(first.metrics_attempted, 1);

        let second = monitor
            .run_cycle(t0 + Duration::from_secs(10))
            .await
            .expect("cycle");
        assert_eq!(second.metrics_attempted, 2);

        let rate = client
            .published()
            .into_iter()
            .find(|(_, point)| point.metric == "nginx_requests_per_second")
            .map(|(_, point)| point.value);
        assert_eq!(rate, Some(5.0));
    }

    #[test]
    fn test_panic_message_variants() {
        let text: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(text.as_ref()), "boom");

        let owned: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(owned.as_ref()), "bang");

        let other: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }
}
