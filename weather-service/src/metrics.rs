//! Cache effectiveness counters and latency histograms, exported in
//! Prometheus text format.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// Upper bounds in seconds, matching the Prometheus client defaults.
pub const DEFAULT_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Fixed-bucket latency histogram.
#[derive(Debug)]
pub struct Histogram {
    bounds: &'static [f64],
    buckets: Vec<AtomicU64>,
    count: AtomicU64,
    sum_micros: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new(&DEFAULT_BUCKETS)
    }
}

impl Histogram {
    pub fn new(bounds: &'static [f64]) -> Self {
        Self {
            bounds,
            buckets: bounds.iter().map(|_| AtomicU64::new(0)).collect(),
            count: AtomicU64::new(0),
            sum_micros: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, value: Duration) {
        let secs = value.as_secs_f64();
        if let Some(slot) = self.bounds.iter().position(|bound| secs <= *bound) {
            self.buckets[slot].fetch_add(1, Ordering::Relaxed);
        }
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_micros
            .fetch_add(value.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> Duration {
        Duration::from_micros(self.sum_micros.load(Ordering::Relaxed))
    }

    /// `(upper bound, observations <= bound)` pairs, excluding `+Inf`.
    pub fn cumulative(&self) -> Vec<(f64, u64)> {
        let mut running = 0;
        self.bounds
            .iter()
            .zip(&self.buckets)
            .map(|(bound, bucket)| {
                running += bucket.load(Ordering::Relaxed);
                (*bound, running)
            })
            .collect()
    }

    /// Append the `_bucket`, `_sum` and `_count` series; `labels` is either
    /// empty or a comma separated `key="value"` list.
    fn render_series(&self, out: &mut String, name: &str, labels: &str) {
        let sep = if labels.is_empty() { "" } else { "," };
        for (bound, count) in self.cumulative() {
            let _ = writeln!(out, "{name}_bucket{{{labels}{sep}le=\"{bound}\"}} {count}");
        }
        let _ = writeln!(out, "{name}_bucket{{{labels}{sep}le=\"+Inf\"}} {}", self.count());

        let braces = if labels.is_empty() {
            String::new()
        } else {
            format!("{{{labels}}}")
        };
        let _ = writeln!(out, "{name}_sum{braces} {}", self.sum().as_secs_f64());
        let _ = writeln!(out, "{name}_count{braces} {}", self.count());
    }
}

#[derive(Debug, Default)]
pub struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    degraded: AtomicU64,
    lock_waits: AtomicU64,
    lock_wait_seconds: Histogram,
    upstream_fetches: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub degraded: u64,
    pub lock_waits: u64,
    pub upstream_fetches: u64,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Lookup served straight from the providers because the store failed.
    pub fn record_degraded(&self) {
        self.degraded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lock_wait(&self, waited: Duration) {
        self.lock_waits.fetch_add(1, Ordering::Relaxed);
        self.lock_wait_seconds.observe(waited);
    }

    pub fn record_upstream_fetch(&self) {
        self.upstream_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn lock_wait_histogram(&self) -> &Histogram {
        &self.lock_wait_seconds
    }

    pub fn snapshot(&self) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            degraded: self.degraded.load(Ordering::Relaxed),
            lock_waits: self.lock_waits.load(Ordering::Relaxed),
            upstream_fetches: self.upstream_fetches.load(Ordering::Relaxed),
        }
    }

    pub fn render_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let counters = [
            ("weather_cache_hit_total", "Number of cache hits", snapshot.hits),
            ("weather_cache_miss_total", "Number of cache misses", snapshot.misses),
            (
                "weather_cache_degraded_total",
                "Lookups that bypassed an unavailable cache",
                snapshot.degraded,
            ),
            (
                "weather_cache_lock_wait_total",
                "Number of times a request waited for a cache lock",
                snapshot.lock_waits,
            ),
            (
                "weather_upstream_fetch_total",
                "Number of provider chain invocations",
                snapshot.upstream_fetches,
            ),
        ];

        let mut out = String::new();
        for (name, help, value) in counters {
            let _ = write!(
                out,
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n"
            );
        }

        let name = "weather_cache_lock_wait_seconds";
        let _ = write!(
            out,
            "# HELP {name} Time spent waiting for a cache lock\n# TYPE {name} histogram\n"
        );
        self.lock_wait_seconds.render_series(&mut out, name, "");
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct RequestSeries {
    method: String,
    route: String,
    status: u16,
}

/// HTTP handler latency, one histogram per method, route and status.
#[derive(Debug, Default)]
pub struct HttpMetrics {
    series: RwLock<BTreeMap<RequestSeries, Histogram>>,
}

impl HttpMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn observe(&self, method: &str, route: &str, status: u16, elapsed: Duration) {
        let key = RequestSeries {
            method: method.to_string(),
            route: route.to_string(),
            status,
        };

        if let Some(histogram) = self.series.read().await.get(&key) {
            histogram.observe(elapsed);
            return;
        }

        let mut series = self.series.write().await;
        series.entry(key).or_default().observe(elapsed);
    }

    /// Observation count for one series, zero if it was never recorded.
    pub async fn count(&self, method: &str, route: &str, status: u16) -> u64 {
        let key = RequestSeries {
            method: method.to_string(),
            route: route.to_string(),
            status,
        };
        self.series
            .read()
            .await
            .get(&key)
            .map_or(0, Histogram::count)
    }

    pub async fn render_prometheus(&self) -> String {
        let name = "http_requests_duration_seconds";
        let mut out = String::new();
        let _ = write!(
            out,
            "# HELP {name} Histogram of response time for handler\n# TYPE {name} histogram\n"
        );

        for (key, histogram) in self.series.read().await.iter() {
            let labels = format!(
                "method=\"{}\",route=\"{}\",status=\"{}\"",
                key.method, key.route, key.status
            );
            histogram.render_series(&mut out, name, &labels);
        }
        out
    }
}
