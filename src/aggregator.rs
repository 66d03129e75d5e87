//! Coalescing balance lookups.
//!
//! Every wallet in a batch is resolved by its own task: cache probe, then the
//! wallet's lock, a second cache probe, and only then the upstream call. The
//! second probe is what collapses concurrent misses for one wallet into a
//! single upstream request.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::cache::TtlCache;
use crate::clock::{Clock, SystemClock};
use crate::error::Error;
use crate::key_lock::KeyedMutex;
use crate::metrics::MetricsCollector;
use crate::upstream::BalanceClient;
use crate::validation::{KeyValidator, WalletAddressValidator};

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Converts lamports to SOL (1 SOL = 1,000,000,000 lamports)
pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceResult {
    pub wallet: String,
    pub balance: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BalanceResult {
    pub fn ok(wallet: String, balance: f64) -> Self {
        Self {
            wallet,
            balance,
            error: None,
        }
    }

    pub fn failed(wallet: String, err: &Error) -> Self {
        Self {
            wallet,
            balance: 0.0,
            error: Some(err.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Clone)]
pub struct BalanceAggregator {
    client: Arc<dyn BalanceClient>,
    validator: Arc<dyn KeyValidator>,
    cache: Arc<TtlCache<String, f64>>,
    locks: Arc<KeyedMutex>,
    metrics: Arc<MetricsCollector>,
    ttl: Duration,
}

impl BalanceAggregator {
    pub fn new(client: Arc<dyn BalanceClient>, ttl: Duration) -> Self {
        Self {
            client,
            validator: Arc::new(WalletAddressValidator),
            cache: Arc::new(TtlCache::new(Arc::new(SystemClock))),
            locks: Arc::new(KeyedMutex::new()),
            metrics: Arc::new(MetricsCollector::new()),
            ttl,
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn KeyValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Replaces the cache's time source. Drops anything cached so far.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.cache = Arc::new(TtlCache::new(clock));
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn cached_wallets(&self) -> usize {
        self.cache.len()
    }

    pub fn locked_wallets(&self) -> usize {
        self.locks.len()
    }

    /// Resolves every wallet concurrently and returns one result per input,
    /// in input order.
    ///
    /// Cancelling `ctx` abandons in-flight upstream calls; their results carry
    /// [`Error::Canceled`]. Dropping the returned future cancels the batch too,
    /// so no unit keeps a wallet lock after the caller has gone away.
    pub async fn fetch_many(&self, ctx: &CancellationToken, wallets: &[String]) -> Vec<BalanceResult> {
        let batch = ctx.child_token();
        let _abandon_on_drop = batch.clone().drop_guard();

        let handles: Vec<_> = wallets
            .iter()
            .map(|wallet| {
                let this = self.clone();
                let ctx = batch.clone();
                let wallet = wallet.clone();
                tokio::spawn(async move { this.fetch(&ctx, wallet).await })
            })
            .collect();

        let mut results = Vec::with_capacity(wallets.len());
        for (wallet, handle) in wallets.iter().zip(handles) {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    tracing::error!(wallet = %wallet, error = %e, "balance task failed");
                    let err = Error::Internal(format!("balance task failed: {}", e));
                    results.push(BalanceResult::failed(wallet.clone(), &err));
                }
            }
        }
        results
    }

    /// Resolves a single wallet on the calling task.
    pub async fn fetch(&self, ctx: &CancellationToken, wallet: String) -> BalanceResult {
        self.metrics.record_lookup();

        if let Err(err) = self.validator.validate(&wallet) {
            self.metrics.record_invalid_key();
            tracing::debug!(wallet = %wallet, error = %err, "rejected wallet");
            return BalanceResult::failed(wallet, &err);
        }

        if let Some(balance) = self.cache.get(&wallet) {
            self.metrics.record_cache(true);
            return BalanceResult::ok(wallet, balance);
        }
        self.metrics.record_cache(false);

        let _guard = tokio::select! {
            biased;
            _ = ctx.cancelled() => return self.canceled(wallet),
            guard = self.locks.lock(&wallet) => guard,
        };

        // Another task may have filled the cache while we waited for the lock.
        if let Some(balance) = self.cache.get(&wallet) {
            self.metrics.record_coalesced();
            return BalanceResult::ok(wallet, balance);
        }

        let outcome = tokio::select! {
            biased;
            _ = ctx.cancelled() => return self.canceled(wallet),
            outcome = self.client.fetch_balance(&wallet) => outcome,
        };

        match outcome {
            Ok(lamports) => {
                self.metrics.record_upstream(true);
                let balance = lamports_to_sol(lamports);
                self.cache.set(wallet.clone(), balance, self.ttl);
                tracing::debug!(wallet = %wallet, lamports, "fetched balance");
                BalanceResult::ok(wallet, balance)
            }
            Err(err) => {
                // Failures are not cached; the next request goes upstream again.
                self.metrics.record_upstream(false);
                tracing::warn!(wallet = %wallet, error = %err, "upstream balance lookup failed");
                BalanceResult::failed(wallet, &err)
            }
        }
    }

    fn canceled(&self, wallet: String) -> BalanceResult {
        self.metrics.record_canceled();
        tracing::debug!(wallet = %wallet, "balance lookup canceled");
        BalanceResult::failed(wallet, &Error::Canceled)
    }
}
