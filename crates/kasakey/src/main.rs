use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use kasakey::Config;
use kasakey::Dispatcher;
use kasakey::LogLevel;
use kasakey::Registry;
use kasakey::api;
use kasakey::format_mapping_error;
use kasakey::input::TerminalKeySource;
use kasakey::kasa::TcpTransport;
use kasakey::logging;

/// Toggle Kasa smart plugs from the keyboard
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    /// Plugs and their trigger keys: <address>:<key>,<address>:<key>
    mapping: String,

    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    logging::init(&config.logging).context("Failed to initialize logging")?;

    let transport = Arc::new(TcpTransport::new(&config.device));
    let registry = match Registry::parse(&cli.mapping, transport) {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            eprint!("{}", format_mapping_error(&cli.mapping, &e));
            return Ok(ExitCode::from(2));
        }
    };

    tracing::info!("kasakey starting with {} plug(s)", registry.len());

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let api_handle = if config.api.enabled {
        let api_config = config.api.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = api::serve(api_config, shutdown_rx).await {
                tracing::error!("HTTP API server failed: {}", e);
            }
        }))
    } else {
        None
    };

    // A plug that cannot be reached at startup is not fatal; it stays
    // unpopulated and can still be toggled.
    if let Err(e) = registry.initialize().await {
        tracing::error!(address = e.address(), "Failed to initialize plugs: {}", e);
    }

    let mut source = TerminalKeySource::new().context("Failed to read from terminal")?;
    let dispatcher = Dispatcher::new(registry, config.device.dispatch);

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Received shutdown signal");
    };

    tokio::select! {
        _ = dispatcher.run(&mut source) => {}
        _ = shutdown_signal => {}
    }
    drop(source);

    if let Some(handle) = api_handle {
        let _ = shutdown_tx.send(());
        if let Err(e) = handle.await {
            tracing::error!("HTTP API task failed: {}", e);
        }
    }

    tracing::info!("kasakey shutdown complete");
    Ok(ExitCode::SUCCESS)
}
