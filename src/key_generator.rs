//! Admission identifiers for the rate limiter.

use axum::extract::{ConnectInfo, Request};
use axum::http::HeaderMap;
use clap::ValueEnum;
use serde::Serialize;
use std::net::SocketAddr;

use crate::api_keys::ApiKeyStore;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Strategy for deciding who a request counts against
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyStrategy {
    /// Use client IP address
    #[value(name = "ip")]
    IpAddress,
    /// Use an active API key, falling back to the client IP otherwise
    ApiKey,
}

#[derive(Debug, Clone)]
pub struct KeyGenerator {
    strategy: KeyStrategy,
}

impl KeyGenerator {
    pub fn new(strategy: KeyStrategy) -> Self {
        Self { strategy }
    }

    /// Admission runs before authentication, so only a key the store
    /// recognises may select its own window. Anything else counts against
    /// the client IP.
    pub fn generate_key(&self, request: &Request, keys: &dyn ApiKeyStore) -> String {
        match self.strategy {
            KeyStrategy::ApiKey => {
                match api_key(request.headers()).and_then(|key| keys.resolve(key)) {
                    Some(key) => format!("api:{}", key),
                    None => format!("ip:{}", client_ip(request)),
                }
            }
            KeyStrategy::IpAddress => format!("ip:{}", client_ip(request)),
        }
    }
}

pub fn api_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|key| !key.is_empty())
}

pub fn client_ip(request: &Request) -> String {
    // Try to get real IP from headers first
    if let Some(forwarded) = request.headers().get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            if let Some(first_ip) = forwarded_str.split(',').next() {
                return first_ip.trim().to_string();
            }
        }
    }

    if let Some(real_ip) = request.headers().get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            return ip_str.to_string();
        }
    }

    // Fallback to connection info
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        addr.ip().to_string()
    } else {
        "unknown".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_keys::StaticApiKeyStore;
    use axum::body::Body;
    use axum::http::HeaderValue;

    const KEY: &str = "550e8400-e29b-41d4-a716-446655440000";

    fn request_with(headers: &[(&'static str, &'static str)]) -> Request {
        let mut request = Request::new(Body::empty());
        for (name, value) in headers {
            request
                .headers_mut()
                .insert(*name, HeaderValue::from_static(*value));
        }
        request
    }

    #[test]
    fn test_client_ip_with_forwarded_header() {
        let request = request_with(&[("x-forwarded-for", "192.168.1.1, 10.0.0.1")]);
        assert_eq!(client_ip(&request), "192.168.1.1");
    }

    #[test]
    fn test_client_ip_with_real_ip_header() {
        let request = request_with(&[("x-real-ip", "203.0.113.1")]);
        assert_eq!(client_ip(&request), "203.0.113.1");
    }

    #[test]
    fn test_client_ip_from_connect_info() {
        let mut request = request_with(&[]);
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 1, 2, 3], 4567))));
        assert_eq!(client_ip(&request), "10.1.2.3");
    }

    #[test]
    fn test_client_ip_fallback() {
        assert_eq!(client_ip(&request_with(&[])), "unknown");
    }

    fn store() -> StaticApiKeyStore {
        StaticApiKeyStore::from_keys([KEY]).unwrap()
    }

    #[test]
    fn test_api_key_strategy() {
        let generator = KeyGenerator::new(KeyStrategy::ApiKey);
        let request = request_with(&[("x-api-key", KEY), ("x-real-ip", "203.0.113.1")]);
        assert_eq!(generator.generate_key(&request, &store()), format!("api:{}", KEY));
    }

    #[test]
    fn test_api_key_forms_share_one_identifier() {
        let generator = KeyGenerator::new(KeyStrategy::ApiKey);
        let request = request_with(&[("x-api-key", "550E8400E29B41D4A716446655440000")]);
        assert_eq!(generator.generate_key(&request, &store()), format!("api:{}", KEY));
    }

    #[test]
    fn test_unknown_api_key_falls_back_to_ip() {
        let generator = KeyGenerator::new(KeyStrategy::ApiKey);
        let request = request_with(&[
            ("x-api-key", "550e8400-e29b-41d4-a716-446655440001"),
            ("x-real-ip", "203.0.113.1"),
        ]);
        assert_eq!(generator.generate_key(&request, &store()), "ip:203.0.113.1");

        let request = request_with(&[("x-api-key", "  "), ("x-real-ip", "203.0.113.1")]);
        assert_eq!(generator.generate_key(&request, &store()), "ip:203.0.113.1");
    }

    #[test]
    fn test_api_key_ignored_without_configured_keys() {
        let generator = KeyGenerator::new(KeyStrategy::ApiKey);
        let open = StaticApiKeyStore::default();
        let request = request_with(&[("x-api-key", KEY), ("x-real-ip", "203.0.113.1")]);
        assert_eq!(generator.generate_key(&request, &open), "ip:203.0.113.1");
    }

    #[test]
    fn test_ip_address_strategy_ignores_api_key() {
        let generator = KeyGenerator::new(KeyStrategy::IpAddress);
        let request = request_with(&[("x-api-key", KEY), ("x-real-ip", "203.0.113.1")]);
        assert_eq!(generator.generate_key(&request, &store()), "ip:203.0.113.1");
    }
}
