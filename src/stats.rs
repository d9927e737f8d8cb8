use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;

/// Sink for per-attempt measurements.
///
/// Recording must be cheap enough not to perturb the schedule; aggregation
/// and formatting happen on the reporting side.
pub trait StatsSink: Send + Sync + 'static {
    /// Records the wall-clock latency of one successful attempt.
    fn record_latency(&self, latency: Duration);

    /// Counts one failed attempt.
    fn record_error(&self);
}

/// Aggregated write-attempt outcomes, shared between the attempts that record
/// into it and the periodic reporter that reads it.
#[derive(Debug)]
pub struct RunStats {
    ok: AtomicU64,
    errors: AtomicU64,
    latency_us: Mutex<Histogram<u64>>,
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            ok: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            // 1us up to one hour, 3 significant digits.
            latency_us: Mutex::new(
                Histogram::new_with_bounds(1, 3_600_000_000, 3)
                    .expect("histogram bounds are static and valid"),
            ),
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let histogram = self.latency_us.lock();
        let ok = self.ok.load(Ordering::Acquire);
        let errors = self.errors.load(Ordering::Acquire);

        StatsSnapshot {
            ok,
            errors,
            total: ok + errors,
            p50_us: histogram.value_at_quantile(0.50),
            p95_us: histogram.value_at_quantile(0.95),
            p99_us: histogram.value_at_quantile(0.99),
            max_us: histogram.max(),
            mean_us: histogram.mean(),
        }
    }
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsSink for RunStats {
    fn record_latency(&self, latency: Duration) {
        self.latency_us
            .lock()
            .saturating_record(latency.as_micros() as u64);
        self.ok.fetch_add(1, Ordering::AcqRel);
    }

    fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::AcqRel);
    }
}

/// Point-in-time view of [`RunStats`], safe to format without holding locks.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatsSnapshot {
    pub ok: u64,
    pub errors: u64,
    pub total: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
    pub mean_us: f64,
}
