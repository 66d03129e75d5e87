use anyhow::{Context, Result};
use balance_gate::config::Config;
use balance_gate::server::Server;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let config = Config::load().context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("balance_gate={},tower_http=debug", config.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting balance-gate service");
    tracing::info!(
        "Configuration: {}",
        serde_json::to_string(&config).unwrap_or_default()
    );

    let server = Server::new(config).context("Failed to create server")?;
    server.run().await.context("Server error")?;

    Ok(())
}
