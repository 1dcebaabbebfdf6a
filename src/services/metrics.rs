use dashmap::DashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Receives one outcome per store call made through the resilient executor
pub trait MetricsSink: Send + Sync {
    fn record_request(&self, resource: &str, success: bool);
}

/// Sink that drops every sample
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_request(&self, _resource: &str, _success: bool) {}
}

#[derive(Debug, Default)]
struct RequestCounters {
    successes: AtomicU64,
    failures: AtomicU64,
}

/// Point-in-time counters for one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestSnapshot {
    pub successes: u64,
    pub failures: u64,
}

impl RequestSnapshot {
    pub fn total(&self) -> u64 {
        self.successes + self.failures
    }
}

/// In-process request counters keyed by protected resource
#[derive(Debug, Default)]
pub struct StoreMetrics {
    requests: DashMap<String, RequestCounters>,
}

impl StoreMetrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters for a resource, `None` if it was never called
    pub fn snapshot(&self, resource: &str) -> Option<RequestSnapshot> {
        self.requests.get(resource).map(|c| RequestSnapshot {
            successes: c.successes.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
        })
    }

    /// Export metrics in Prometheus format
    pub fn prometheus(&self) -> String {
        let mut rows: Vec<(String, RequestSnapshot)> = self
            .requests
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    RequestSnapshot {
                        successes: entry.successes.load(Ordering::Relaxed),
                        failures: entry.failures.load(Ordering::Relaxed),
                    },
                )
            })
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));

        let mut out = String::from(
            "# HELP tradectl_store_requests_total Store calls made through the resilient executor\n\
             # TYPE tradectl_store_requests_total counter\n",
        );
        for (resource, snap) in rows {
            let _ = writeln!(
                out,
                "tradectl_store_requests_total{{resource=\"{}\",outcome=\"success\"}} {}",
                resource, snap.successes
            );
            let _ = writeln!(
                out,
                "tradectl_store_requests_total{{resource=\"{}\",outcome=\"failure\"}} {}",
                resource, snap.failures
            );
        }
        out
    }

    /// Log periodic status
    pub fn log_status(&self) {
        for entry in self.requests.iter() {
            info!(
                resource = %entry.key(),
                successes = entry.successes.load(Ordering::Relaxed),
                failures = entry.failures.load(Ordering::Relaxed),
                "store request counters"
            );
        }
    }
}

impl MetricsSink for StoreMetrics {
    fn record_request(&self, resource: &str, success: bool) {
        let counters = self.requests.entry(resource.to_string()).or_default();
        if success {
            counters.successes.fetch_add(1, Ordering::Relaxed);
        } else {
            counters.failures.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_per_resource() {
        let metrics = StoreMetrics::new();
        metrics.record_request("postgres", true);
        metrics.record_request("postgres", true);
        metrics.record_request("postgres", false);
        metrics.record_request("replica", false);

        assert_eq!(
            metrics.snapshot("postgres"),
            Some(RequestSnapshot {
                successes: 2,
                failures: 1
            })
        );
        assert_eq!(metrics.snapshot("replica").unwrap().total(), 1);
        assert!(metrics.snapshot("unknown").is_none());
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = StoreMetrics::new();
        metrics.record_request("postgres", true);
        metrics.record_request("postgres", false);

        let text = metrics.prometheus();
        assert!(text.contains("# TYPE tradectl_store_requests_total counter"));
        assert!(text
            .contains("tradectl_store_requests_total{resource=\"postgres\",outcome=\"success\"} 1"));
        assert!(text
            .contains("tradectl_store_requests_total{resource=\"postgres\",outcome=\"failure\"} 1"));
    }
}
