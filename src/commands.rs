//! Mode dispatch for a resolved invocation
//!
//! Runs publish or subscribe against a [`Session`] and closes the session on
//! every path. Broker and protocol failures are logged here with their reason
//! code and swallowed; everything else propagates to `main`.

use crate::cli::{Mode, RunConfig};
use crate::error::{AdaError, MqttError};
use crate::session::Session;
use crate::transport::Transport;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

/// How long a graceful shutdown may take after Ctrl+C before the process is
/// forced down; longer than the transport's own disconnect grace
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Run one invocation over the real MQTT client
pub async fn run(config: RunConfig, shutdown: watch::Receiver<bool>) -> Result<(), AdaError> {
    let mut session = Session::new(config.broker.clone());
    run_with_session(&mut session, &config, shutdown).await
}

/// Run one invocation over any transport; the session is closed before returning
pub async fn run_with_session<T: Transport>(
    session: &mut Session<T>,
    config: &RunConfig,
    shutdown: watch::Receiver<bool>,
) -> Result<(), AdaError> {
    let outcome = dispatch(session, config, shutdown).await;
    session.close().await;

    match outcome {
        Err(AdaError::Mqtt(e)) if e.is_protocol_error() => {
            log_mqtt_error(&e, problem_context(&config.mode));
            Ok(())
        }
        other => other,
    }
}

async fn dispatch<T: Transport>(
    session: &mut Session<T>,
    config: &RunConfig,
    shutdown: watch::Receiver<bool>,
) -> Result<(), AdaError> {
    match &config.mode {
        Mode::Publish {
            message,
            placeholder,
        } => {
            if *placeholder {
                println!("No message was specified with --message, publishing a test message");
            }
            session.connect(&config.client_id).await?;
            session
                .publish(&config.topic, message.clone(), config.qos)
                .await?;
        }
        Mode::Subscribe { output, wait } => {
            let sink = Arc::new(output.open_sink()?);
            println!("Subscribed events written to {output}");

            session.connect(&config.client_id).await?;
            session
                .subscribe(&config.topic, sink, config.qos, *wait, shutdown)
                .await?;
        }
    }
    info!("Command completed");
    Ok(())
}

fn problem_context(mode: &Mode) -> &'static str {
    match mode {
        Mode::Publish { .. } => "Problem with feed publish",
        Mode::Subscribe { .. } => "Problem with feed subscription",
    }
}

/// Structured report of a broker failure: context, reason code and message
pub fn log_mqtt_error(e: &MqttError, context: &str) {
    match std::error::Error::source(e) {
        Some(source) => error!(
            reason_code = e.reason_code(),
            source = %source,
            "{}: {}", context, e
        ),
        None => error!(reason_code = e.reason_code(), "{}: {}", context, e),
    }
}
