//! Transport layer between a session and the broker
//!
//! The [`Transport`] trait is the seam that lets [`crate::session::Session`]
//! run against the real `rumqttc` client or against
//! [`crate::testing::MockTransport`].

use crate::config::BrokerAddress;
use crate::error::MqttError;
use crate::sink::MessageSink;
use bytes::Bytes;
use rumqttc::QoS;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub mod mqtt;

/// Parameters for a single connection attempt
#[derive(Clone, PartialEq)]
pub struct ConnectRequest {
    pub address: BrokerAddress,
    pub client_id: String,
    pub username: String,
    pub key: String,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
    pub clean_session: bool,
}

impl fmt::Debug for ConnectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectRequest")
            .field("address", &self.address)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("key", &"***")
            .field("keep_alive", &self.keep_alive)
            .field("connect_timeout", &self.connect_timeout)
            .field("clean_session", &self.clean_session)
            .finish()
    }
}

/// Connection to a broker
///
/// All methods other than `connect` and `disconnect` fail with
/// [`MqttError::NotConnected`] when called without a live connection.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Connect and wait for the broker's acknowledgement
    async fn connect(&mut self, request: &ConnectRequest) -> Result<(), MqttError>;

    /// Send one message; returns once the send is complete for its QoS
    async fn publish(&mut self, topic: &str, payload: Bytes, qos: QoS) -> Result<(), MqttError>;

    /// Register `sink` for incoming messages and subscribe to `topic`
    async fn subscribe(
        &mut self,
        topic: &str,
        qos: QoS,
        sink: Arc<dyn MessageSink>,
    ) -> Result<(), MqttError>;

    /// Resolves when the connection drops, with the cause
    async fn connection_lost(&mut self) -> MqttError;

    /// Disconnect if connected; a no-op otherwise
    async fn disconnect(&mut self) -> Result<(), MqttError>;

    /// Check if transport is currently connected
    fn is_connected(&self) -> bool;
}

