use anyhow::Result;
use runmate_api::run as run_api;
use runmate_core::{Config, RunmateContext};
use runmate_notify::run as run_notify;
use runmate_outbox::run as run_outbox;
use tracing;
use tracing_subscriber;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting RunMate backend");

    let config = Config::from_env();
    let ctx = RunmateContext::new(config).await?;

    tracing::info!("RunMate context initialized");

    let ctx_clone = ctx.clone();
    tokio::spawn(async move {
        if let Err(e) = run_outbox(ctx_clone).await {
            tracing::error!("Outbox poller error: {}", e);
        }
    });

    let ctx_clone = ctx.clone();
    tokio::spawn(async move {
        if let Err(e) = run_notify(ctx_clone).await {
            tracing::error!("Notification consumer error: {}", e);
        }
    });

    tokio::select! {
        result = run_api(ctx) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
