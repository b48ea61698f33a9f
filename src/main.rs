//! `ada` - publish to or subscribe from a hosted MQTT feed
//!
//! ```bash
//! # Publish a reading
//! AIO_USER=pg42819 AIO_KEY=... ada --topic feeds/sensorfeed --message 42
//!
//! # Append everything that arrives in the next minute to a file
//! ada --subscribe --file feed.log --timeout 60
//!
//! # Listen until Ctrl+C
//! ada --subscribe --qos 0
//! ```
//!
//! Exit codes: 0 on success or after a logged broker failure, 1 on an
//! unexpected internal failure, 2 on a usage or configuration error.

use ada_feed::cli::Cli;
use ada_feed::commands::{self, SHUTDOWN_GRACE};
use ada_feed::config::{ConfigError, Defaults};
use ada_feed::observability::init_default_logging;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use std::process::ExitCode;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Exit code when a second interrupt or a stuck shutdown forces the process down
const EXIT_INTERRUPTED: i32 = 130;

fn usage_error(e: &ConfigError) -> ! {
    let kind = match e {
        ConfigError::MissingCredential { .. } => ErrorKind::MissingRequiredArgument,
        _ => ErrorKind::ValueValidation,
    };
    Cli::command().error(kind, e.to_string()).exit()
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_default_logging();

    let file_config = match cli.load_config_file() {
        Ok(config) => config,
        Err(e) => usage_error(&e),
    };
    let config = match cli.resolve(&file_config, &Defaults::default(), |name| {
        std::env::var(name).ok()
    }) {
        Ok(config) => config,
        Err(e) => usage_error(&e),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutdown signal received...");
        let _ = shutdown_tx.send(true);

        // If we don't exit within the grace period, force exit
        tokio::select! {
            _ = tokio::time::sleep(SHUTDOWN_GRACE) => {
                warn!("Graceful shutdown timed out, forcing exit");
            }
            _ = signal::ctrl_c() => {
                warn!("Second interrupt, forcing exit");
            }
        }
        std::process::exit(EXIT_INTERRUPTED);
    });

    match commands::run(config, shutdown_rx).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Command failed: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
