use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{info, warn};

use crate::error::Error;
use crate::handlers::SharedState;
use crate::key_generator::{api_key, client_ip};

pub const RATE_LIMIT_LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Logging middleware for request/response tracking
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let client_ip = client_ip(&request);

    info!(
        target: "balance_gate::middleware",
        method = %method,
        uri = %uri,
        client_ip = %client_ip,
        "Incoming request"
    );

    let response = next.run(request).await;

    let status = response.status();
    info!(
        target: "balance_gate::middleware",
        method = %method,
        uri = %uri,
        status = %status,
        "Request completed"
    );

    response
}

/// Sliding-window admission in front of the balance endpoint
pub async fn admission_middleware(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    let identifier = state
        .key_generator
        .generate_key(&request, state.api_keys.as_ref());
    let decision = state.rate_limiter.check(&identifier);
    state.metrics.record_admission(decision.allowed);

    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        warn!(
            target: "balance_gate::middleware",
            identifier = %identifier,
            retry_after = ?decision.retry_after,
            "Rate limit exceeded"
        );
        Error::RateLimited {
            retry_after: decision.retry_after,
        }
        .into_response()
    };

    let headers = response.headers_mut();
    headers.insert(RATE_LIMIT_LIMIT_HEADER, HeaderValue::from(decision.limit));
    headers.insert(
        RATE_LIMIT_REMAINING_HEADER,
        HeaderValue::from(decision.remaining),
    );

    response
}

/// Rejects requests without an active API key when keys are configured
pub async fn api_key_middleware(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    if state.api_keys.is_enforced() {
        let authorized = api_key(request.headers())
            .map(|key| state.api_keys.is_active(key))
            .unwrap_or(false);

        if !authorized {
            warn!(
                target: "balance_gate::middleware",
                client_ip = %client_ip(&request),
                "Rejected request without a valid API key"
            );
            return Error::Unauthorized.into_response();
        }
    }

    next.run(request).await
}
