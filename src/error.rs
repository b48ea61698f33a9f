//! Error types for feed sessions
//!
//! [`MqttError`] covers everything the broker or the client library can
//! report, each variant mapped to a numeric reason code. [`AdaError`] is the
//! top-level error the command front end deals with and decides exit codes
//! from.

use crate::config::ConfigError;
use thiserror::Error;

/// Numeric reason codes attached to [`MqttError`]
///
/// Codes 1-5 are the broker's CONNACK return codes and 128 is the SUBACK
/// failure code. The 32xxx range is reported by the client side.
pub mod reason {
    pub const CLIENT_EXCEPTION: i32 = 0;
    pub const SUBSCRIBE_FAILED: i32 = 128;
    pub const CLIENT_TIMEOUT: i32 = 32000;
    pub const CLIENT_CONNECTED: i32 = 32100;
    pub const SERVER_CONNECT_ERROR: i32 = 32103;
    pub const CLIENT_NOT_CONNECTED: i32 = 32104;
    pub const CONNECTION_LOST: i32 = 32109;
}

/// Broker and client-library failures
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Connection refused by broker: {reason} (code {code})")]
    ConnectionRefused { code: u8, reason: String },

    #[error("Unable to connect to server")]
    ConnectFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Timed out waiting for the broker during {operation}")]
    Timeout { operation: &'static str },

    #[error("Publishing failed")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Subscription failed")]
    SubscribeFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Broker rejected subscription to '{topic}'")]
    SubscriptionRejected { topic: String },

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Attempted to use the session before connecting")]
    NotConnected,

    #[error("Session is already connected")]
    AlreadyConnected,
}

impl MqttError {
    /// Reason code reported alongside the error message
    pub fn reason_code(&self) -> i32 {
        match self {
            MqttError::ConnectionRefused { code, .. } => i32::from(*code),
            MqttError::ConnectFailed(_) => reason::SERVER_CONNECT_ERROR,
            MqttError::Timeout { .. } => reason::CLIENT_TIMEOUT,
            MqttError::PublishFailed(_) | MqttError::SubscribeFailed(_) => {
                reason::CLIENT_EXCEPTION
            }
            MqttError::SubscriptionRejected { .. } => reason::SUBSCRIBE_FAILED,
            MqttError::ConnectionLost(_) => reason::CONNECTION_LOST,
            MqttError::NotConnected => reason::CLIENT_NOT_CONNECTED,
            MqttError::AlreadyConnected => reason::CLIENT_CONNECTED,
        }
    }

    /// Protocol errors are logged and survived; the rest are local bugs.
    pub fn is_protocol_error(&self) -> bool {
        !matches!(self, MqttError::NotConnected | MqttError::AlreadyConnected)
    }
}

/// Top-level error for a command invocation
#[derive(Debug, Error)]
pub enum AdaError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("MQTT error: {0}")]
    Mqtt(#[from] MqttError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AdaError {
    /// Process exit code for this error
    ///
    /// Usage errors exit with 2 like clap's own, protocol failures have
    /// already been logged and exit cleanly, anything else is fatal.
    pub fn exit_code(&self) -> u8 {
        match self {
            AdaError::Config(_) => 2,
            AdaError::Mqtt(e) if e.is_protocol_error() => 0,
            AdaError::Mqtt(_) | AdaError::Io(_) => 1,
        }
    }
}

/// Result type for session operations
pub type MqttResult<T> = Result<T, MqttError>;
