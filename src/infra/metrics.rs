// ============================================================
// Layer 6 - Service Metrics
// ============================================================
// Process-wide instruments for the inference service:
//
//   predict_request_count_total   counter, +1 per /predict call
//   predict_latency_seconds       histogram of call duration
//
// Both only ever grow; there is no reset. All updates are
// lock-free atomics so concurrent handlers can record without
// coordination.
//
// Histogram storage keeps one non-cumulative slot per bucket
// plus an overflow slot. render() turns them into the
// cumulative `le` series of the Prometheus text format, with
// `_count` derived from the same slots so the +Inf bucket and
// the count always agree inside one snapshot.

use std::{
    fmt::Write as _,
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

const BUCKET_COUNT: usize = 14;

/// Upper bounds (seconds) of the latency buckets.
pub const LATENCY_BUCKETS: [f64; BUCKET_COUNT] = [
    0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5, 10.0,
];

const REQUEST_COUNTER: &str = "predict_request_count";
const LATENCY_HISTOGRAM: &str = "predict_latency_seconds";

/// Counter and latency histogram for /predict.
#[derive(Debug)]
pub struct ServiceMetrics {
    requests:       AtomicU64,
    /// One slot per bucket followed by the overflow slot
    slots:          [AtomicU64; BUCKET_COUNT + 1],
    latency_sum_ns: AtomicU64,
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of all instruments.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub requests:      u64,
    /// Cumulative counts, aligned with LATENCY_BUCKETS
    pub buckets:       Vec<u64>,
    pub latency_count: u64,
    pub latency_sum:   f64,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            requests:       AtomicU64::new(0),
            slots:          std::array::from_fn(|_| AtomicU64::new(0)),
            latency_sum_ns: AtomicU64::new(0),
        }
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe_latency(&self, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        let slot = LATENCY_BUCKETS
            .iter()
            .position(|&upper| secs <= upper)
            .unwrap_or(BUCKET_COUNT);
        self.slots[slot].fetch_add(1, Ordering::Relaxed);

        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.latency_sum_ns.fetch_add(nanos, Ordering::Relaxed);
    }

    /// Observes the elapsed time when dropped, so a call that
    /// returns early or panics is still timed exactly once.
    pub fn start_timer(&self) -> LatencyTimer<'_> {
        LatencyTimer { metrics: self, started: Instant::now() }
    }

    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut buckets = Vec::with_capacity(BUCKET_COUNT);
        let mut cumulative = 0u64;
        for slot in &self.slots[..BUCKET_COUNT] {
            cumulative += slot.load(Ordering::Relaxed);
            buckets.push(cumulative);
        }
        let latency_count = cumulative + self.slots[BUCKET_COUNT].load(Ordering::Relaxed);

        MetricsSnapshot {
            requests: self.request_count(),
            buckets,
            latency_count,
            latency_sum: self.latency_sum_ns.load(Ordering::Relaxed) as f64 / 1e9,
        }
    }

    /// Prometheus text exposition of the current snapshot.
    pub fn render(&self) -> String {
        let snap = self.snapshot();
        let mut out = String::new();

        // write! into a String cannot fail
        let _ = writeln!(out, "# HELP {REQUEST_COUNTER}_total Total number of requests to the predict endpoint");
        let _ = writeln!(out, "# TYPE {REQUEST_COUNTER}_total counter");
        let _ = writeln!(out, "{REQUEST_COUNTER}_total {}", snap.requests);

        let _ = writeln!(out, "# HELP {LATENCY_HISTOGRAM} Time taken to make predictions");
        let _ = writeln!(out, "# TYPE {LATENCY_HISTOGRAM} histogram");
        for (upper, count) in LATENCY_BUCKETS.iter().zip(&snap.buckets) {
            let _ = writeln!(out, "{LATENCY_HISTOGRAM}_bucket{{le=\"{upper:?}\"}} {count}");
        }
        let _ = writeln!(out, "{LATENCY_HISTOGRAM}_bucket{{le=\"+Inf\"}} {}", snap.latency_count);
        let _ = writeln!(out, "{LATENCY_HISTOGRAM}_sum {:?}", snap.latency_sum);
        let _ = writeln!(out, "{LATENCY_HISTOGRAM}_count {}", snap.latency_count);
        out
    }
}

pub struct LatencyTimer<'a> {
    metrics: &'a ServiceMetrics,
    started: Instant,
}

impl Drop for LatencyTimer<'_> {
    fn drop(&mut self) {
        self.metrics.observe_latency(self.started.elapsed());
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread};

    #[test]
    fn test_counter_and_buckets() {
        let m = ServiceMetrics::new();
        m.record_request();
        m.record_request();
        m.observe_latency(Duration::from_millis(3));   // ≤ 0.005
        m.observe_latency(Duration::from_millis(60));  // ≤ 0.075
        m.observe_latency(Duration::from_secs(30));    // overflow

        let snap = m.snapshot();
        assert_eq!(snap.requests, 2);
        assert_eq!(snap.buckets[0], 1);
        assert_eq!(snap.buckets[3], 1); // 0.05 bucket excludes 60ms
        assert_eq!(snap.buckets[4], 2);
        assert_eq!(*snap.buckets.last().unwrap(), 2);
        assert_eq!(snap.latency_count, 3);
        assert!((snap.latency_sum - 30.063).abs() < 1e-9);
    }

    #[test]
    fn test_render_is_idempotent_and_parsable() {
        let m = ServiceMetrics::new();
        m.record_request();
        m.observe_latency(Duration::from_millis(12));

        let first = m.render();
        assert_eq!(first, m.render());
        assert!(first.contains("predict_request_count_total 1\n"));
        assert!(first.contains("predict_latency_seconds_bucket{le=\"0.025\"} 1\n"));
        assert!(first.contains("predict_latency_seconds_bucket{le=\"0.01\"} 0\n"));
        assert!(first.contains("predict_latency_seconds_bucket{le=\"+Inf\"} 1\n"));
        assert!(first.contains("predict_latency_seconds_count 1\n"));

        // Every sample line is `name value`
        for line in first.lines().filter(|l| !l.starts_with('#')) {
            let (_, value) = line.rsplit_once(' ').unwrap();
            value.parse::<f64>().unwrap();
        }
    }

    #[test]
    fn test_timer_observes_once_on_drop() {
        let m = ServiceMetrics::new();
        {
            let _timer = m.start_timer();
        }
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _timer = m.start_timer();
            panic!("forward pass failed");
        }));
        assert!(result.is_err());
        assert_eq!(m.snapshot().latency_count, 2);
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let m = Arc::new(ServiceMetrics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = Arc::clone(&m);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        m.record_request();
                        m.observe_latency(Duration::from_micros(100));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let snap = m.snapshot();
        assert_eq!(snap.requests, 8000);
        assert_eq!(snap.latency_count, 8000);
    }
}
