// Gemini Inspector - live view of Gemini API traffic
//
// Runs a forwarding proxy between a Gemini agent and the API, and serves the
// inspector endpoints that stream every classified call to the UI.
//
// Architecture:
// - Inspector server (axum): /events SSE, /ping, /broadcast, /stats
// - Proxy server (axum): forwards agent calls through an InspectingClient
// - Pipeline: classifies captured bodies and publishes events
// - Emitter: broadcast channel to SSE subscribers, or forwarding to a peer

mod cli;
mod startup;

use anyhow::{Context, Result};
use clap::Parser;
use gemini_inspector::config::Config;
use gemini_inspector::{logging, proxy, server};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // Handle CLI commands first (config --show, --reset, --edit, --path)
    if cli::handle_command(&cli)? {
        return Ok(());
    }

    // Ensure config file exists (creates default on first run)
    Config::ensure_config_exists();

    // Load configuration: flags > env > file > defaults
    let mut config = Config::from_env()?;
    cli.run.apply(&mut config);

    // Keep the guard alive so buffered file logs flush on exit
    let _file_guard = logging::init(&config.logging);

    // Claim the inspector port, or join the instance that already holds it
    let launch = server::launch(&config).await?;

    startup::print_startup(&config, &launch.role);
    startup::log_startup(&config, &launch.role);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let proxy_config = config.clone();
    let inspector = launch.inspector;
    let mut proxy_handle = tokio::spawn(async move {
        proxy::start_proxy(&proxy_config, inspector, shutdown_rx).await
    });

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl+C")?;
            tracing::info!("Shutting down...");

            // If the send fails, the proxy has already shut down (which is fine)
            let _ = shutdown_tx.send(());
            proxy_handle.await.context("Proxy task panicked")??;
        }
        result = &mut proxy_handle => {
            // Proxy stopped on its own: bind failure or server error
            result.context("Proxy task panicked")??;
        }
    }

    // The inspector server task ends with the runtime; open UI streams
    // do not hold up exit
    tracing::info!("Shutdown complete");
    Ok(())
}
