use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;

/// Outcome of a single admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// How long until the oldest request in the window ages out. Zero when allowed.
    pub retry_after: Duration,
}

/// Sliding-window request limiter keyed by client identifier.
///
/// Each identifier keeps the timestamps of its accepted requests inside the
/// trailing window. A request is admitted while fewer than `limit` of them
/// remain after trimming.
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        RateLimiter {
            limit,
            window,
            windows: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Record a request for `identifier` if it fits in the window
    pub fn check(&self, identifier: &str) -> RateLimitDecision {
        let now = self.clock.now();
        let mut windows = self.windows();

        let timestamps = windows.entry(identifier.to_string()).or_default();
        trim(timestamps, now, self.window);

        let count = timestamps.len() as u32;
        if count >= self.limit {
            let retry_after = timestamps
                .front()
                .map(|oldest| (*oldest + self.window).saturating_duration_since(now))
                .unwrap_or(self.window);

            tracing::debug!(identifier, count, limit = self.limit, "request rejected");
            return RateLimitDecision {
                allowed: false,
                limit: self.limit,
                remaining: 0,
                retry_after,
            };
        }

        timestamps.push_back(now);
        RateLimitDecision {
            allowed: true,
            limit: self.limit,
            remaining: self.limit - count - 1,
            retry_after: Duration::ZERO,
        }
    }

    pub fn allow(&self, identifier: &str) -> bool {
        self.check(identifier).allowed
    }

    /// Requests still available to `identifier` without recording one
    pub fn remaining(&self, identifier: &str) -> u32 {
        let now = self.clock.now();
        let windows = self.windows();

        let live = windows
            .get(identifier)
            .map(|timestamps| {
                timestamps
                    .iter()
                    .filter(|t| now.saturating_duration_since(**t) < self.window)
                    .count() as u32
            })
            .unwrap_or(0);
        self.limit.saturating_sub(live)
    }

    /// Forget all requests recorded for `identifier`
    pub fn reset(&self, identifier: &str) {
        self.windows().remove(identifier);
    }

    /// Trim every window and drop identifiers with nothing left.
    /// Returns how many identifiers were dropped.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut windows = self.windows();

        let initial_count = windows.len();
        windows.retain(|_, timestamps| {
            trim(timestamps, now, self.window);
            !timestamps.is_empty()
        });

        initial_count - windows.len()
    }

    /// Number of identifiers currently tracked
    pub fn tracked(&self) -> usize {
        self.windows().len()
    }

    /// Run [`RateLimiter::sweep`] every `period` until `shutdown` is cancelled
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        period: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!("rate limiter sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = limiter.sweep();
                        if removed > 0 {
                            tracing::debug!(removed, tracked = limiter.tracked(), "swept idle rate limit windows");
                        }
                    }
                }
            }
        })
    }

    fn windows(&self) -> MutexGuard<'_, HashMap<String, VecDeque<Instant>>> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// Timestamps are pushed in order, so expired ones are always at the front.
fn trim(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = timestamps.front() {
        if now.saturating_duration_since(*oldest) >= window {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}
