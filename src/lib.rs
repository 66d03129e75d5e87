pub mod aggregator;
pub mod api_keys;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod handlers;
pub mod key_generator;
pub mod key_lock;
pub mod metrics;
pub mod middleware;
pub mod rate_limiter;
pub mod response;
pub mod server;
pub mod upstream;
pub mod validation;

pub use aggregator::{BalanceAggregator, BalanceResult};
pub use config::Config;
pub use error::{Error, Result};
pub use server::create_app;
