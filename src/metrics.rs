use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of the service counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub balance_lookups: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub coalesced: u64,
    pub upstream_calls: u64,
    pub upstream_failures: u64,
    pub canceled: u64,
    pub invalid_keys: u64,
    pub admitted_requests: u64,
    pub throttled_requests: u64,
}

#[derive(Debug, Default)]
pub struct MetricsCollector {
    balance_lookups: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    coalesced: AtomicU64,
    upstream_calls: AtomicU64,
    upstream_failures: AtomicU64,
    canceled: AtomicU64,
    invalid_keys: AtomicU64,
    admitted_requests: AtomicU64,
    throttled_requests: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_lookup(&self) {
        self.balance_lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache(&self, hit: bool) {
        if hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// A waiter found the value another task stored while it held the key lock.
    pub fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream(&self, ok: bool) {
        self.upstream_calls.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.upstream_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_canceled(&self) {
        self.canceled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalid_key(&self) {
        self.invalid_keys.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_admission(&self, allowed: bool) {
        if allowed {
            self.admitted_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.throttled_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            balance_lookups: self.balance_lookups.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            upstream_calls: self.upstream_calls.load(Ordering::Relaxed),
            upstream_failures: self.upstream_failures.load(Ordering::Relaxed),
            canceled: self.canceled.load(Ordering::Relaxed),
            invalid_keys: self.invalid_keys.load(Ordering::Relaxed),
            admitted_requests: self.admitted_requests.load(Ordering::Relaxed),
            throttled_requests: self.throttled_requests.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_recorded_events() {
        let metrics = MetricsCollector::new();
        metrics.record_cache(true);
        metrics.record_cache(false);
        metrics.record_upstream(true);
        metrics.record_upstream(false);
        metrics.record_admission(false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.cache_misses, 1);
        assert_eq!(snapshot.upstream_calls, 2);
        assert_eq!(snapshot.upstream_failures, 1);
        assert_eq!(snapshot.throttled_requests, 1);
        assert_eq!(snapshot.admitted_requests, 0);
    }
}
