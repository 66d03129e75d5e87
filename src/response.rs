use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::aggregator::BalanceResult;
use crate::metrics::MetricsSnapshot;

#[derive(Debug, Deserialize, Validate)]
pub struct GetBalanceRequest {
    #[validate(length(min = 1, message = "no wallets provided"))]
    pub wallets: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetBalanceResponse {
    pub balances: Vec<BalanceResult>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub cached_wallets: usize,
    pub locked_wallets: usize,
    pub tracked_clients: usize,
    pub metrics: MetricsSnapshot,
}
