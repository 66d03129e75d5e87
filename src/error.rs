use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("invalid wallet address: {0}")]
    InvalidKey(String),
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("request canceled before the balance was fetched")]
    Canceled,
    #[error("rate limit exceeded")]
    RateLimited { retry_after: Duration },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("missing or unknown API key")]
    Unauthorized,
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::UpstreamUnavailable(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Error::InvalidRequest(err.to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: u16,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, code: u16) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            code,
        }
    }

    pub fn from_error(err: &Error) -> Self {
        let message = err.to_string();
        match err {
            Error::InvalidKey(_) => Self::new("invalid_wallet", &message, 400),
            Error::InvalidRequest(_) => Self::new("bad_request", &message, 400),
            Error::Unauthorized => Self::new("unauthorized", &message, 401),
            Error::RateLimited { .. } => Self::new("rate_limit_exceeded", &message, 429),
            Error::UpstreamUnavailable(_) => Self::new("service_unavailable", &message, 503),
            Error::Canceled => Self::new("gateway_timeout", &message, 504),
            Error::Configuration(_) => Self::new("configuration_error", &message, 500),
            Error::Internal(_) => Self::new("internal_error", &message, 500),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let body = ErrorResponse::from_error(&self);
        let status =
            StatusCode::from_u16(body.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let mut resp = (status, Json(body)).into_response();
        if let Error::RateLimited { retry_after } = self {
            // Round up so clients never retry a fraction of a second too early.
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            resp.headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs.max(1)));
        }
        resp
    }
}
