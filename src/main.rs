#![allow(dead_code)]

mod agent;
mod auth;
mod cli;
mod config;
mod conversation;
mod issues;
mod logging;
mod server;
mod sessions;
mod validation;

use clap::Parser;
use tracing::info;

use cli::{Cli, Command, ConfigCommand};
use config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        // No subcommand or explicit `start` both launch the server.
        None | Some(Command::Start) => run_server().await,

        Some(Command::Config(ConfigCommand::Show)) => {
            let config = Config::from_env()?;
            cli::handle_config_show(&config);
            Ok(())
        }
    }
}

/// Run the gateway server.
async fn run_server() -> Result<(), Box<dyn std::error::Error>> {
    init_logging_from_env()?;
    let config = Config::from_env()?;

    let state = server::AppState::from_config(&config)?;
    log_startup_banner(&config, &state);

    let handle = server::run_server_with_config(server::ServerConfig {
        state,
        bind_address: config.bind,
    })
    .await?;

    let reason = await_shutdown_trigger().await;
    info!("Shutdown signal received ({})", reason);
    handle.shutdown().await;
    info!("Gateway shut down");
    Ok(())
}

/// Initialize logging based on the CHIRP_DEV environment variable.
fn init_logging_from_env() -> Result<(), Box<dyn std::error::Error>> {
    let log_config = if config::dev_mode_from_env() {
        logging::LogConfig::development()
    } else {
        logging::LogConfig::production()
    };
    logging::init_logging(log_config)?;
    Ok(())
}

/// Log the startup banner with version, bind info, and collaborator status.
fn log_startup_banner(config: &Config, state: &server::AppState) {
    info!("chirp gateway v{}", env!("CARGO_PKG_VERSION"));
    info!("Listening on http://{}", config.bind);
    if config.gemini.is_some() {
        info!("AI completion: enabled");
    } else {
        info!("AI completion: disabled (chat endpoint will reject requests)");
    }
    if state.pipeline.is_some() {
        info!("Issue tracker: enabled");
    } else {
        info!("Issue tracker: disabled (feedback will not be filed)");
    }
    info!(
        "Trust table: {} domain(s)",
        config.trust_table.domain_count()
    );
}

/// Wait for either Ctrl+C or SIGTERM (Unix only) and return a label for logging.
#[cfg(unix)]
async fn await_shutdown_trigger() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};
    use tracing::warn;

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => "ctrl-c",
                _ = sigterm.recv() => "SIGTERM",
            }
        }
        Err(e) => {
            warn!(
                "Failed to install SIGTERM handler: {}; falling back to Ctrl+C only",
                e
            );
            match tokio::signal::ctrl_c().await {
                Ok(()) => "ctrl-c",
                Err(e) => {
                    panic!("Failed to install Ctrl+C handler: {}", e);
                }
            }
        }
    }
}

/// On non-Unix platforms, only Ctrl+C is available.
#[cfg(not(unix))]
async fn await_shutdown_trigger() -> &'static str {
    match tokio::signal::ctrl_c().await {
        Ok(()) => "ctrl-c",
        Err(e) => {
            panic!("Failed to install Ctrl+C handler: {}", e);
        }
    }
}
