use std::net::SocketAddr;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info};

use product_service::build_app;
use product_service::config::Config;
use product_service::infrastructure::{self, logger::Logger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 不存在时直接使用进程环境
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("invalid configuration")?;
    Logger::init(&config.log_level);
    info!("Starting product service ({:?} backend)", config.backend);

    let repo = match infrastructure::connect(&config).await {
        Ok(repo) => repo,
        Err(err) => {
            error!("Cannot initialize the database: {}", err);
            return Err(err).context("database initialization failed");
        }
    };

    let app = build_app(repo);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind {}", addr))?;

    Logger::banner("PRODUCT SERVICE RUNNING");
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", err);
    }
    info!("Shutdown signal received");
}
