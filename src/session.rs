//! Broker session wrapper
//!
//! A [`Session`] owns the broker parameters and one [`Transport`]. It scopes
//! every topic to the account namespace, enforces the connect-before-use
//! lifecycle, and implements the blocking semantics of `subscribe`.
//!
//! ```rust,no_run
//! use ada_feed::config::{BrokerAddress, BrokerConfig};
//! use ada_feed::session::Session;
//! use rumqttc::QoS;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let broker = BrokerConfig::new(
//!     BrokerAddress::parse("tcp://io.adafruit.com:1883")?,
//!     "pg42819".to_string(),
//!     std::env::var("AIO_KEY")?,
//! );
//! let mut session = Session::new(broker);
//! session.connect("IATA-Publish-Client").await?;
//! let published = session.publish("feeds/sensorfeed", "42", QoS::AtLeastOnce).await;
//! session.close().await;
//! published?;
//! # Ok(())
//! # }
//! ```

use crate::config::{qos_level, BrokerConfig};
use crate::error::MqttError;
use crate::mqtt_span;
use crate::sink::MessageSink;
use crate::topic::FeedTopic;
use crate::transport::{mqtt::MqttClient, ConnectRequest, Transport};
use bytes::Bytes;
use rumqttc::QoS;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn, Instrument};

/// How long `subscribe` keeps listening
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    /// Until shutdown is signalled or the connection drops
    Forever,
    /// For a fixed duration, unless shutdown or connection loss comes first
    For(Duration),
}

impl WaitPolicy {
    /// Zero seconds means wait forever
    pub fn from_secs(secs: u64) -> Self {
        if secs == 0 {
            WaitPolicy::Forever
        } else {
            WaitPolicy::For(Duration::from_secs(secs))
        }
    }
}

impl fmt::Display for WaitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitPolicy::Forever => f.write_str("indefinitely"),
            WaitPolicy::For(duration) => write!(f, "for {} seconds", duration.as_secs()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionState {
    Idle,
    Connected { client_id: String },
    Closed,
}

/// One authenticated connection to the broker
pub struct Session<T: Transport = MqttClient> {
    broker: BrokerConfig,
    transport: T,
    state: SessionState,
}

impl Session<MqttClient> {
    /// Session over the real MQTT client
    pub fn new(broker: BrokerConfig) -> Self {
        Self::with_transport(broker, MqttClient::new())
    }
}

impl<T: Transport> Session<T> {
    pub fn with_transport(broker: BrokerConfig, transport: T) -> Self {
        Self {
            broker,
            transport,
            state: SessionState::Idle,
        }
    }

    /// Namespaced topic for a user-facing topic
    pub fn full_topic(&self, topic: &str) -> FeedTopic {
        FeedTopic::new(&self.broker.username, topic)
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, SessionState::Connected { .. })
    }

    pub fn client_id(&self) -> Option<&str> {
        match &self.state {
            SessionState::Connected { client_id } => Some(client_id),
            _ => None,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Open the connection: clean session, fixed keep-alive and connect timeout
    pub async fn connect(&mut self, client_id: &str) -> Result<(), MqttError> {
        if self.is_connected() {
            return Err(MqttError::AlreadyConnected);
        }

        let request = ConnectRequest {
            address: self.broker.address.clone(),
            client_id: client_id.to_string(),
            username: self.broker.username.clone(),
            key: self.broker.key.clone(),
            keep_alive: self.broker.keep_alive,
            connect_timeout: self.broker.connect_timeout,
            clean_session: true,
        };

        self.transport
            .connect(&request)
            .instrument(mqtt_span!(operation = "connect", client_id = %client_id))
            .await?;

        self.state = SessionState::Connected {
            client_id: client_id.to_string(),
        };
        Ok(())
    }

    fn ensure_connected(&self) -> Result<&str, MqttError> {
        self.client_id().ok_or(MqttError::NotConnected)
    }

    /// Send one message to the namespaced topic
    pub async fn publish(
        &mut self,
        topic: &str,
        payload: impl Into<Bytes>,
        qos: QoS,
    ) -> Result<(), MqttError> {
        let client_id = self.ensure_connected()?.to_string();
        let full_topic = self.full_topic(topic);
        let payload = payload.into();

        info!(
            "Publishing message '{}' to topic '{}' with qos {}",
            String::from_utf8_lossy(&payload),
            full_topic,
            qos_level(qos)
        );
        self.transport
            .publish(full_topic.as_str(), payload, qos)
            .instrument(mqtt_span!(operation = "publish", client_id = %client_id))
            .await?;

        println!("Message published");
        Ok(())
    }

    /// Subscribe `sink` to the namespaced topic, then wait
    ///
    /// Returns `Ok` when the wait elapses or `shutdown` turns true, and
    /// [`MqttError::ConnectionLost`] if the connection drops first. A finite
    /// wait is never cut short by incoming messages.
    pub async fn subscribe(
        &mut self,
        topic: &str,
        sink: Arc<dyn MessageSink>,
        qos: QoS,
        wait: WaitPolicy,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), MqttError> {
        let client_id = self.ensure_connected()?.to_string();
        let full_topic = self.full_topic(topic);
        let span = mqtt_span!(operation = "subscribe", client_id = %client_id);

        info!(
            "Subscribing to topic '{}' with qos {}",
            full_topic,
            qos_level(qos)
        );
        self.transport
            .subscribe(full_topic.as_str(), qos, sink)
            .instrument(span.clone())
            .await?;
        info!(
            "Subscribed to topic '{}' and waiting for messages {}",
            full_topic, wait
        );

        let timer = async {
            match wait {
                WaitPolicy::Forever => std::future::pending::<()>().await,
                WaitPolicy::For(duration) => tokio::time::sleep(duration).await,
            }
        };

        tokio::select! {
            _ = timer => {
                info!("Finished waiting for messages on '{}'", full_topic);
                Ok(())
            }
            _ = wait_for_shutdown(shutdown) => {
                info!("Shutdown requested, ending subscription to '{}'", full_topic);
                Ok(())
            }
            lost = self.transport.connection_lost().instrument(span) => Err(lost),
        }
    }

    /// Release the connection; safe to call any number of times
    pub async fn close(&mut self) {
        let SessionState::Connected { client_id } = &self.state else {
            return;
        };
        let client_id = client_id.clone();

        if let Err(e) = self
            .transport
            .disconnect()
            .instrument(mqtt_span!(operation = "disconnect", client_id = %client_id))
            .await
        {
            warn!(
                reason_code = e.reason_code(),
                "Disconnect from broker did not complete cleanly: {}", e
            );
        }
        self.state = SessionState::Closed;
    }
}

/// Resolves once `shutdown` holds `true`; never, if its sender is gone first
async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
