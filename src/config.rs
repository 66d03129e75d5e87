use clap::Parser;
use humantime_serde::re::humantime::parse_duration;
use serde::Serialize;
use std::net::SocketAddr;
use std::time::Duration;
use uuid::Uuid;

use crate::error::Error;
use crate::key_generator::KeyStrategy;

#[derive(Debug, Clone, Parser, Serialize)]
#[command(name = "balance-gate")]
#[command(about = "Cached, rate limited wallet balance API")]
pub struct Config {
    /// Server bind address
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8081")]
    pub bind_addr: SocketAddr,

    /// JSON-RPC endpoint used for balance lookups
    #[arg(long, env = "RPC_URL", default_value = "https://api.mainnet-beta.solana.com")]
    #[serde(skip_serializing)]
    pub rpc_url: String,

    /// Commitment level passed to getBalance
    #[arg(long, env = "RPC_COMMITMENT", default_value = "finalized")]
    pub commitment: String,

    /// How long a fetched balance is served from cache
    #[arg(long, env = "CACHE_TTL", default_value = "10s", value_parser = parse_duration)]
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,

    /// Requests allowed per client within the rate window
    #[arg(long, env = "RATE_LIMIT", default_value_t = 60)]
    pub rate_limit: u32,

    /// Length of the sliding rate window
    #[arg(long, env = "RATE_WINDOW", default_value = "1m", value_parser = parse_duration)]
    #[serde(with = "humantime_serde")]
    pub rate_window: Duration,

    /// What a request's rate window is keyed on: `api-key` (active keys only,
    /// client IP otherwise) or `ip`
    #[arg(long, env = "RATE_LIMIT_BY", value_enum, default_value = "api-key")]
    pub rate_limit_by: KeyStrategy,

    /// How often idle rate windows are swept
    #[arg(long, env = "SWEEP_INTERVAL", default_value = "1m", value_parser = parse_duration)]
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,

    /// Deadline for a whole balance request, upstream calls included
    #[arg(long, env = "REQUEST_TIMEOUT", default_value = "10s", value_parser = parse_duration)]
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Maximum wallets accepted in one request
    #[arg(long, env = "MAX_WALLETS", default_value_t = 100)]
    pub max_wallets: usize,

    /// Accepted API keys, comma separated. Authentication is off when empty.
    #[arg(long, env = "API_KEYS", value_delimiter = ',')]
    #[serde(skip_serializing)]
    pub api_keys: Vec<String>,

    /// Log level for this crate when RUST_LOG is unset
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8081)),
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            commitment: "finalized".to_string(),
            cache_ttl: Duration::from_secs(10),
            rate_limit: 60,
            rate_window: Duration::from_secs(60),
            rate_limit_by: KeyStrategy::ApiKey,
            sweep_interval: Duration::from_secs(60),
            request_timeout: Duration::from_secs(10),
            max_wallets: 100,
            api_keys: Vec::new(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from command line arguments and the environment
    pub fn load() -> Result<Self, Error> {
        let config = Config::parse();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if !self.rpc_url.starts_with("http://") && !self.rpc_url.starts_with("https://") {
            return Err(Error::Configuration(
                "RPC URL must start with 'http://' or 'https://'".to_string(),
            ));
        }

        let valid_commitments = ["processed", "confirmed", "finalized"];
        if !valid_commitments.contains(&self.commitment.as_str()) {
            return Err(Error::Configuration(format!(
                "Invalid commitment '{}'. Must be one of: {:?}",
                self.commitment, valid_commitments
            )));
        }

        if self.rate_limit == 0 {
            return Err(Error::Configuration(
                "Rate limit must be greater than 0".to_string(),
            ));
        }

        if self.max_wallets == 0 {
            return Err(Error::Configuration(
                "Max wallets must be greater than 0".to_string(),
            ));
        }

        for (name, value) in [
            ("cache TTL", self.cache_ttl),
            ("rate window", self.rate_window),
            ("sweep interval", self.sweep_interval),
            ("request timeout", self.request_timeout),
        ] {
            if value.is_zero() {
                return Err(Error::Configuration(format!("{} must be greater than 0", name)));
            }
        }

        for key in &self.api_keys {
            Uuid::parse_str(key.trim()).map_err(|_| {
                Error::Configuration(format!("API key '{}' is not a valid UUID", key))
            })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_parse_from_args() {
        let config = Config::try_parse_from([
            "balance-gate",
            "--cache-ttl",
            "30s",
            "--rate-limit",
            "10",
            "--rate-window",
            "2m",
            "--api-keys",
            "550e8400-e29b-41d4-a716-446655440000,550e8400-e29b-41d4-a716-446655440001",
        ])
        .unwrap();

        assert_eq!(config.cache_ttl, Duration::from_secs(30));
        assert_eq!(config.rate_limit, 10);
        assert_eq!(config.rate_window, Duration::from_secs(120));
        assert_eq!(config.api_keys.len(), 2);
        assert_eq!(config.rate_limit_by, KeyStrategy::ApiKey);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_rate_limit_by_ip() {
        let config = Config::try_parse_from(["balance-gate", "--rate-limit-by", "ip"]).unwrap();
        assert_eq!(config.rate_limit_by, KeyStrategy::IpAddress);

        assert!(Config::try_parse_from(["balance-gate", "--rate-limit-by", "header"]).is_err());
    }

    #[test]
    fn test_invalid_rpc_url() {
        let config = Config {
            rpc_url: "ws://localhost:8900".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_values_rejected() {
        let config = Config {
            rate_limit: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            cache_ttl: Duration::ZERO,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_api_key_rejected() {
        let config = Config {
            api_keys: vec!["not-a-uuid".to_string()],
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_serialization_hides_secrets() {
        let config = Config {
            api_keys: vec!["550e8400-e29b-41d4-a716-446655440000".to_string()],
            ..Config::default()
        };
        let json = serde_json::to_value(&config).unwrap();
        assert!(json.get("rpc_url").is_none());
        assert!(json.get("api_keys").is_none());
        assert_eq!(json["cache_ttl"], "10s");
        assert_eq!(json["rate_limit_by"], "api-key");
    }
}
