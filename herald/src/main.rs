use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use herald::api::{ApiServer, ApiServerConfig, AppState};
use herald::{Config, app, logging, queue};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("invalid configuration")?;
    let (logging_config, _log_guard) = logging::init_logging(config.app.log_dir.as_deref())?;

    tracing::info!(
        name = %config.app.name,
        version = %config.app.version,
        production = config.app.is_production(),
        "Herald starting..."
    );

    let shutdown = CancellationToken::new();
    logging_config.start_retention_cleanup(shutdown.child_token());

    let handler = Arc::new(app::build_handler(&config)?);
    let (publisher, consumer) = queue::channel(config.queue.capacity);
    let orchestrator = Arc::new(app::build_orchestrator(&config, &publisher)?);

    let consumer_task = tokio::spawn(consumer.run(handler, shutdown.child_token()));

    let state = AppState::new(orchestrator)
        .with_publisher(publisher)
        .with_logging_config(logging_config);
    let server = ApiServer::new(ApiServerConfig::from_app(&config.app), state)
        .with_cancel_token(shutdown.child_token());

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received shutdown signal, stopping gracefully..."),
            Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
        }
        signal_token.cancel();
    });

    let result = server.run().await;
    shutdown.cancel();
    if let Err(e) = consumer_task.await {
        tracing::warn!(error = %e, "Queue consumer did not stop cleanly");
    }
    result.context("API server exited with error")?;

    tracing::info!("Herald stopped.");
    Ok(())
}
