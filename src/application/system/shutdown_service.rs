use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Cooperative shutdown flag shared between the signal listener and the
/// monitor loop. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Spawn a task that sets the flag on SIGINT or SIGTERM.
    ///
    /// Nothing is interrupted: an in-flight cycle runs to completion and the
    /// loop notices the flag at its next tick.
    pub fn install(&self) -> JoinHandle<()> {
        let signal = self.clone();
        tokio::spawn(async move {
            match wait_for_os_signal().await {
                Ok(name) => {
                    info!("ShutdownSignal: received {}, shutting down gracefully...", name);
                    signal.trigger();
                }
                Err(e) => {
                    error!("ShutdownSignal: unable to listen for shutdown signal: {}", e);
                }
            }
        })
    }

    /// Sleep for `total` in steps of `tick`, checking the flag before each
    /// step. Returns `false` as soon as shutdown was requested.
    pub async fn wait(&self, total: Duration, tick: Duration) -> bool {
        let tick = tick.max(Duration::from_millis(1));
        let mut remaining = total;

        while !remaining.is_zero() {
            if self.is_triggered() {
                return false;
            }
            let step = remaining.min(tick);
            tokio::time::sleep(step).await;
            remaining = remaining.saturating_sub(step);
        }

        !self.is_triggered()
    }
}

#[cfg(unix)]
async fn wait_for_os_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|_| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_os_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|_| "Ctrl+C")
}
