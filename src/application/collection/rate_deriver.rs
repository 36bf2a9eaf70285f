use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Intervals shorter than this are not eligible for a rate.
pub const MIN_RATE_INTERVAL: Duration = Duration::from_millis(1);

/// Last observation of a monotonic counter
#[derive(Debug, Clone, Copy)]
struct RateState {
    last_value: f64,
    last_timestamp: Instant,
}

/// Which counter to derive a rate from, and the name of the derived metric
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateRule {
    pub counter: String,
    pub rate_metric: String,
}

impl RateRule {
    pub fn new(counter: impl Into<String>, rate_metric: impl Into<String>) -> Self {
        Self {
            counter: counter.into(),
            rate_metric: rate_metric.into(),
        }
    }
}

/// Derives per-second rates from monotonic counters.
///
/// Holds the previous sample for each counter it has seen. Entries are
/// created on first observation and overwritten afterwards, never removed.
#[derive(Debug, Default)]
pub struct RateDeriver {
    state: HashMap<String, RateState>,
}

impl RateDeriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the current counter value and get the rate since the previous call.
    ///
    /// Returns `None` on the first observation and when less than
    /// [`MIN_RATE_INTERVAL`] has elapsed (the previous baseline is kept in
    /// that case). A counter going backwards yields `0.0`, never a negative
    /// rate.
    pub fn derive(&mut self, counter: &str, current: f64, now: Instant) -> Option<f64> {
        let Some(previous) = self.state.get(counter).copied() else {
            debug!("RateDeriver: first observation of {} ({})", counter, current);
            self.state.insert(
                counter.to_string(),
                RateState {
                    last_value: current,
                    last_timestamp: now,
                },
            );
            return None;
        };

        let elapsed = now.saturating_duration_since(previous.last_timestamp);
        if elapsed < MIN_RATE_INTERVAL {
            debug!(
                "RateDeriver: interval for {} too short ({:?}), keeping baseline",
                counter, elapsed
            );
            return None;
        }

        let delta = current - previous.last_value;
        if delta < 0.0 {
            debug!(
                "RateDeriver: {} went backwards ({} -> {}), treating as reset",
                counter, previous.last_value, current
            );
        }
        let rate = (delta / elapsed.as_secs_f64()).max(0.0);

        self.state.insert(
            counter.to_string(),
            RateState {
                last_value: current,
                last_timestamp: now,
            },
        );

        Some(rate)
    }

    /// Number of counters with a recorded baseline.
    pub fn tracked(&self) -> usize {
        self.state.len()
    }
}
