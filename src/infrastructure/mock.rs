//! In-process implementations of every port, for tests and dry runs.

use crate::application::system::shutdown_service::ShutdownSignal;
use crate::domain::errors::{CredentialError, IngestionError, MetadataError, ScrapeError};
use crate::domain::identity::PartialIdentity;
use crate::domain::metrics::MetricPoint;
use crate::domain::ports::{
    AccessToken, IngestionClient, IngestionResponse, MetadataService, MetricsSource,
    TokenCredential,
};
use crate::infrastructure::azure::parse_compute_metadata;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Scrape source replaying a script of payloads.
///
/// `None` entries simulate an unreachable endpoint. Once the script is
/// exhausted the last entry is repeated.
pub struct MockMetricsSource {
    script: Mutex<VecDeque<Option<String>>>,
    last: Mutex<Option<String>>,
    healthy: bool,
    panics: bool,
    scrapes: AtomicUsize,
    shutdown_after: Option<(usize, ShutdownSignal)>,
}

impl MockMetricsSource {
    pub fn scripted(script: Vec<Option<&str>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().map(|p| p.map(str::to_string)).collect()),
            last: Mutex::new(None),
            healthy: true,
            panics: false,
            scrapes: AtomicUsize::new(0),
            shutdown_after: None,
        }
    }

    pub fn always(payload: &str) -> Self {
        Self::scripted(vec![Some(payload)])
    }

    /// Source whose scrape panics, to exercise panic containment.
    pub fn panicking() -> Self {
        Self {
            panics: true,
            ..Self::scripted(Vec::new())
        }
    }

    /// Probe reports the endpoint as down.
    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    /// Trigger `signal` once `scrapes` scrapes have been served.
    pub fn shutdown_after(mut self, scrapes: usize, signal: ShutdownSignal) -> Self {
        self.shutdown_after = Some((scrapes, signal));
        self
    }

    pub fn scrapes(&self) -> usize {
        self.scrapes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetricsSource for MockMetricsSource {
    async fn scrape(&self) -> Result<String, ScrapeError> {
        let served = self.scrapes.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((after, signal)) = &self.shutdown_after
            && served >= *after
        {
            signal.trigger();
        }
        if self.panics {
            panic!("mock scrape source exploded");
        }

        let next = lock(&self.script).pop_front();
        let entry = match next {
            Some(entry) => {
                *lock(&self.last) = entry.clone();
                entry
            }
            None => lock(&self.last).clone(),
        };

        entry.ok_or_else(|| ScrapeError::Unreachable {
            reason: "connection refused".to_string(),
        })
    }

    async fn probe(&self) -> bool {
        self.healthy
    }

    fn describe(&self) -> String {
        "mock://metrics".to_string()
    }
}

/// Metadata service answering from a fixed IMDS compute document.
pub struct MockMetadataService {
    document: Option<serde_json::Value>,
    calls: AtomicUsize,
}

impl MockMetadataService {
    pub fn from_document(document: serde_json::Value) -> Self {
        Self {
            document: Some(document),
            calls: AtomicUsize::new(0),
        }
    }

    /// Host where IMDS is unreachable (not running on Azure).
    pub fn unreachable() -> Self {
        Self {
            document: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataService for MockMetadataService {
    async fn instance_identity(&self) -> Result<PartialIdentity, MetadataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.document {
            Some(document) => parse_compute_metadata(document),
            None => Err(MetadataError::Unreachable {
                reason: "no route to host".to_string(),
            }),
        }
    }
}

/// Credential handing out a fixed token, or always failing.
pub struct StaticTokenCredential {
    token: Option<String>,
    delay: Option<std::time::Duration>,
    calls: AtomicUsize,
}

impl StaticTokenCredential {
    pub fn new(token: &str) -> Self {
        Self {
            token: Some(token.to_string()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            token: None,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Hand out the token only after `delay`, like an unreachable token endpoint.
    pub fn slow(token: &str, delay: std::time::Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new(token)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenCredential for StaticTokenCredential {
    async fn get_token(&self, _scope: &str) -> Result<AccessToken, CredentialError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.token {
            Some(token) => Ok(AccessToken {
                token: token.clone(),
                expires_on: Utc::now() + Duration::hours(1),
            }),
            None => Err(CredentialError::Rejected {
                status: 401,
                body: "invalid_client".to_string(),
            }),
        }
    }
}

/// Ingestion API answering from a script of statuses.
///
/// `None` entries simulate a transport failure. After the script runs out
/// every call gets the fallback status. All calls are recorded.
pub struct MockIngestionClient {
    script: Mutex<VecDeque<Option<u16>>>,
    fallback: u16,
    published: Mutex<Vec<(String, MetricPoint)>>,
}

impl MockIngestionClient {
    fn new(script: Vec<Option<u16>>, fallback: u16) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            published: Mutex::new(Vec::new()),
        }
    }

    pub fn always(status: u16) -> Self {
        Self::new(Vec::new(), status)
    }

    /// Accept the first `accepted` calls, answer `reject_status` afterwards.
    pub fn accept_first(accepted: usize, reject_status: u16) -> Self {
        Self::new(vec![Some(200); accepted], reject_status)
    }

    pub fn scripted(script: Vec<Option<u16>>) -> Self {
        Self::new(script, 200)
    }

    pub fn published(&self) -> Vec<(String, MetricPoint)> {
        lock(&self.published).clone()
    }
}

#[async_trait]
impl IngestionClient for MockIngestionClient {
    async fn publish(
        &self,
        endpoint: &str,
        _token: &AccessToken,
        point: &MetricPoint,
    ) -> Result<IngestionResponse, IngestionError> {
        lock(&self.published).push((endpoint.to_string(), point.clone()));

        let next = lock(&self.script).pop_front().unwrap_or(Some(self.fallback));
        match next {
            Some(status) => Ok(IngestionResponse {
                status,
                body: String::new(),
            }),
            None => Err(IngestionError::Transport {
                reason: "connection reset by peer".to_string(),
            }),
        }
    }
}
