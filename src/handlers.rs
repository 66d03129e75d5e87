use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use validator::Validate;

use crate::aggregator::BalanceAggregator;
use crate::api_keys::{ApiKeyStore, StaticApiKeyStore};
use crate::clock::SystemClock;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::key_generator::KeyGenerator;
use crate::metrics::MetricsCollector;
use crate::rate_limiter::RateLimiter;
use crate::response::{GetBalanceRequest, GetBalanceResponse, HealthResponse};
use crate::upstream::BalanceClient;

/// Shared application state
pub type SharedState = Arc<AppState>;

/// Everything the handlers and middleware need, built once at startup
pub struct AppState {
    pub aggregator: BalanceAggregator,
    pub rate_limiter: Arc<RateLimiter>,
    pub api_keys: Arc<dyn ApiKeyStore>,
    pub key_generator: KeyGenerator,
    pub metrics: Arc<MetricsCollector>,
    pub request_timeout: Duration,
    pub max_wallets: usize,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: &Config, client: Arc<dyn BalanceClient>) -> Result<Self> {
        let metrics = Arc::new(MetricsCollector::new());
        let aggregator =
            BalanceAggregator::new(client, config.cache_ttl).with_metrics(metrics.clone());
        let rate_limiter = Arc::new(RateLimiter::new(
            config.rate_limit,
            config.rate_window,
            Arc::new(SystemClock),
        ));
        let api_keys = StaticApiKeyStore::from_keys(&config.api_keys)?;
        if api_keys.is_empty() {
            tracing::warn!("no API keys configured, balance endpoint is unauthenticated");
        }
        tracing::info!(
            limit = config.rate_limit,
            window = ?config.rate_window,
            key = ?config.rate_limit_by,
            "admission limiter configured"
        );

        Ok(Self {
            aggregator,
            rate_limiter,
            api_keys: Arc::new(api_keys),
            key_generator: KeyGenerator::new(config.rate_limit_by),
            metrics,
            request_timeout: config.request_timeout,
            max_wallets: config.max_wallets,
            started_at: Instant::now(),
        })
    }

    pub fn with_rate_limiter(mut self, rate_limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

}

/// Look up balances for a batch of wallets
pub async fn get_balance(
    State(state): State<SharedState>,
    payload: std::result::Result<Json<GetBalanceRequest>, JsonRejection>,
) -> Result<Json<GetBalanceResponse>> {
    let Json(request) = payload.map_err(|e| Error::InvalidRequest(e.body_text()))?;
    request.validate()?;

    if request.wallets.len() > state.max_wallets {
        return Err(Error::InvalidRequest(format!(
            "at most {} wallets may be requested at once",
            state.max_wallets
        )));
    }

    tracing::info!(wallets = request.wallets.len(), "processing balance request");

    // Cancelled on timeout, and by the guard once this handler finishes or is dropped.
    let ctx = CancellationToken::new();
    let _cancel_on_exit = ctx.clone().drop_guard();
    spawn_deadline(ctx.clone(), state.request_timeout);

    let balances = state.aggregator.fetch_many(&ctx, &request.wallets).await;

    let failed = balances.iter().filter(|b| !b.is_ok()).count();
    if failed > 0 {
        tracing::info!(failed, total = balances.len(), "balance request finished with errors");
    }

    Ok(Json(GetBalanceResponse { balances }))
}

/// Health check endpoint
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        cached_wallets: state.aggregator.cached_wallets(),
        locked_wallets: state.aggregator.locked_wallets(),
        tracked_clients: state.rate_limiter.tracked(),
        metrics: state.metrics.snapshot(),
    })
}

fn spawn_deadline(ctx: CancellationToken, timeout: Duration) {
    tokio::spawn(async move {
        tokio::select! {
            _ = ctx.cancelled() => {}
            _ = tokio::time::sleep(timeout) => {
                tracing::warn!(?timeout, "balance request deadline exceeded");
                ctx.cancel();
            }
        }
    });
}
