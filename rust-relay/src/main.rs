use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use rust_relay::api::{ApiServer, AppState};
use rust_relay::config::RelayConfig;
use rust_relay::logging::init_logging;
use rust_relay::supervisor::{self, CommandLauncher};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = RelayConfig::from_env_or_default()?;

    // Keep the guard alive so buffered log lines are flushed on exit
    let (logging_config, _log_guard) = init_logging(&config.log_dir)?;

    let shutdown = CancellationToken::new();
    logging_config.start_retention_cleanup(shutdown.child_token());

    if config.supervisor.publish.stream_key.is_empty() {
        warn!("RELAY_STREAM_KEY is not set, the destination will reject the stream");
    }

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("creating upload dir {}", config.upload_dir.display()))?;

    let (supervisor, supervisor_task) = supervisor::spawn(
        config.supervisor.clone(),
        CommandLauncher,
        shutdown.child_token(),
    );

    let state = AppState::new(supervisor, &config.public_dir, &config.upload_dir)
        .with_logging_config(logging_config);
    let server = ApiServer::with_state(config.api.clone(), state);

    let server_token = server.cancel_token();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        info!("Shutdown signal received");
        signal_token.cancel();
        server_token.cancel();
    });

    info!(
        target = %config.supervisor.publish.target_url,
        public_dir = %config.public_dir.display(),
        "rust-relay initialized successfully"
    );

    let result = server.run().await;

    // Stop the supervisor whichever way the server ended; it kills the live pair
    shutdown.cancel();
    if let Err(e) = supervisor_task.await {
        error!(error = %e, "Supervisor task failed");
    }

    result?;
    Ok(())
}
