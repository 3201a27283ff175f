//! Request metrics: atomic counters plus a bounded latency reservoir.
//!
//! The hot path (`record_success` / `record_failure`) is one mutex-free
//! counter update plus a brief mutex for the windowed state. P99 comes from
//! a fixed-capacity reservoir of success latencies; once the reservoir is
//! full new samples are dropped, which biases the percentile toward early
//! samples but keeps memory bounded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

const MAX_LATENCY_SAMPLES: usize = 1000;

struct Window {
    requests: u64,
    last_reset: Instant,
    latencies: Vec<Duration>,
}

/// Aggregated request metrics for one load-generation run.
pub struct Metrics {
    total: AtomicU64,
    success: AtomicU64,
    failed: AtomicU64,
    total_latency_ns: AtomicU64,
    started_at: Instant,
    window: Mutex<Window>,
}

impl Metrics {
    /// Create a fresh metrics aggregator anchored at now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            total: AtomicU64::new(0),
            success: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            total_latency_ns: AtomicU64::new(0),
            started_at: now,
            window: Mutex::new(Window {
                requests: 0,
                last_reset: now,
                latencies: Vec::with_capacity(MAX_LATENCY_SAMPLES),
            }),
        }
    }

    /// Record a successful request and its latency.
    pub fn record_success(&self, latency: Duration) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.success.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ns
            .fetch_add(latency.as_nanos() as u64, Ordering::Relaxed);

        let mut window = self.window.lock();
        window.requests += 1;
        if window.latencies.len() < MAX_LATENCY_SAMPLES {
            window.latencies.push(latency);
        }
    }

    /// Record a failed request and its latency. Failures do not feed the
    /// P99 reservoir.
    pub fn record_failure(&self, latency: Duration) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ns
            .fetch_add(latency.as_nanos() as u64, Ordering::Relaxed);

        self.window.lock().requests += 1;
    }

    /// Total requests observed.
    pub fn total_requests(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Successful requests observed.
    pub fn success_requests(&self) -> u64 {
        self.success.load(Ordering::Relaxed)
    }

    /// Failed requests observed.
    pub fn failed_requests(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Requests per second since the last [`reset`](Self::reset).
    pub fn rps(&self) -> f64 {
        let window = self.window.lock();
        let elapsed = window.last_reset.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        window.requests as f64 / elapsed
    }

    /// Requests per second since construction.
    pub fn overall_rps(&self) -> f64 {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.total.load(Ordering::Relaxed) as f64 / elapsed
    }

    /// Mean latency over all requests.
    pub fn average_latency(&self) -> Duration {
        let total = self.total.load(Ordering::Relaxed);
        if total == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.total_latency_ns.load(Ordering::Relaxed) / total)
    }

    /// P99 latency over the sampled successes; zero when no samples exist.
    pub fn p99_latency(&self) -> Duration {
        let window = self.window.lock();
        if window.latencies.is_empty() {
            return Duration::ZERO;
        }

        let mut sorted = window.latencies.clone();
        drop(window);
        sorted.sort_unstable();

        let idx = ((sorted.len() as f64) * 0.99) as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    /// Failed / total, in `[0.0, 1.0]`. Zero when nothing was recorded.
    pub fn error_rate(&self) -> f64 {
        let total = self.total.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        self.failed.load(Ordering::Relaxed) as f64 / total as f64
    }

    /// Reset the RPS window and the latency reservoir. Totals are kept.
    pub fn reset(&self) {
        let mut window = self.window.lock();
        window.requests = 0;
        window.last_reset = Instant::now();
        window.latencies.clear();
    }

    /// Point-in-time copy of every derived metric.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests(),
            success_requests: self.success_requests(),
            failed_requests: self.failed_requests(),
            rps: self.rps(),
            overall_rps: self.overall_rps(),
            average_latency: self.average_latency(),
            p99_latency: self.p99_latency(),
            error_rate: self.error_rate(),
            elapsed: self.started_at.elapsed(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy of all derived metrics at one point in time.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Total requests observed.
    pub total_requests: u64,
    /// Successful requests observed.
    pub success_requests: u64,
    /// Failed requests observed.
    pub failed_requests: u64,
    /// Windowed requests per second.
    pub rps: f64,
    /// Requests per second since construction.
    pub overall_rps: f64,
    /// Mean latency over all requests.
    #[serde(with = "humantime_serde")]
    pub average_latency: Duration,
    /// P99 latency over the sampled successes.
    #[serde(with = "humantime_serde")]
    pub p99_latency: Duration,
    /// Failed / total.
    pub error_rate: f64,
    /// Time since the metrics were created.
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
}
