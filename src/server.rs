use crate::config::Config;
use crate::error::{Error, Result};
use crate::handlers::{get_balance, health_check, AppState, SharedState};
use crate::middleware::{admission_middleware, api_key_middleware, logging_middleware};
use crate::upstream::RpcBalanceClient;
use axum::routing::{get, post};
use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the router: admission runs before authentication, both only on the API route.
pub fn create_app(state: SharedState) -> Router {
    let api = Router::new()
        .route("/api/get-balance", post(get_balance))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            api_key_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            admission_middleware,
        ));

    Router::new()
        .merge(api)
        .route("/health", get(health_check))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(logging_middleware)),
        )
}

pub struct Server {
    config: Config,
    state: SharedState,
    shutdown: CancellationToken,
}

impl Server {
    pub fn new(config: Config) -> Result<Self> {
        let client = RpcBalanceClient::new(
            config.rpc_url.clone(),
            config.commitment.clone(),
            config.request_timeout,
        )?;
        let state = Arc::new(AppState::new(&config, Arc::new(client))?);

        Ok(Self {
            config,
            state,
            shutdown: CancellationToken::new(),
        })
    }

    pub async fn run(self) -> Result<()> {
        let sweeper = self
            .state
            .rate_limiter
            .spawn_sweeper(self.config.sweep_interval, self.shutdown.clone());

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| {
                Error::Configuration(format!("failed to bind {}: {}", self.config.bind_addr, e))
            })?;

        tracing::info!("Balance server listening on {}", self.config.bind_addr);
        tracing::info!("Balance lookups available at POST /api/get-balance");
        tracing::info!("Health check available at /health");

        let app = create_app(self.state.clone());
        let result = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal(self.shutdown.clone()))
        .await;

        self.shutdown.cancel();
        if let Err(e) = sweeper.await {
            tracing::warn!(error = %e, "rate limiter sweeper ended abnormally");
        }

        result.map_err(|e| Error::Internal(format!("server error: {}", e)))
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
        _ = shutdown.cancelled() => {},
    }

    shutdown.cancel();
}
