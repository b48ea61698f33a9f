//! Mock implementations for testing
//!
//! [`MockTransport`] records every call a session makes and can simulate
//! broker refusals, rejected subscriptions, incoming messages and connection
//! loss. [`SharedBuffer`] is an in-memory writer for sink tests.

use crate::error::MqttError;
use crate::sink::MessageSink;
use crate::transport::{ConnectRequest, Transport};
use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::QoS;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A call observed by [`MockTransport`]
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    Connect(ConnectRequest),
    Publish {
        topic: String,
        payload: Bytes,
        qos: QoS,
    },
    Subscribe {
        topic: String,
        qos: QoS,
    },
    Disconnect,
}

/// Shared, cloneable record of transport calls
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<TransportCall>>>);

impl CallLog {
    fn push(&self, call: TransportCall) {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(call);
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn connect_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, TransportCall::Connect(_)))
            .count()
    }

    pub fn disconnect_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, TransportCall::Disconnect))
            .count()
    }

    pub fn published(&self) -> Vec<(String, Bytes, QoS)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::Publish {
                    topic,
                    payload,
                    qos,
                } => Some((topic, payload, qos)),
                _ => None,
            })
            .collect()
    }
}

/// Mock transport for testing
#[derive(Default)]
pub struct MockTransport {
    log: CallLog,
    connected: bool,
    /// CONNACK code to refuse connections with
    pub refuse_with: Option<u8>,
    pub fail_publish: bool,
    pub reject_subscriptions: bool,
    /// Messages delivered to the sink right after a successful subscribe
    pub incoming: Vec<(String, Bytes)>,
    /// When set, the connection drops this long after subscribing
    pub lose_connection_after: Option<(Duration, String)>,
    sink: Option<Arc<dyn MessageSink>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refusing(code: u8) -> Self {
        Self {
            refuse_with: Some(code),
            ..Default::default()
        }
    }

    pub fn with_incoming(messages: Vec<(&str, &str)>) -> Self {
        Self {
            incoming: messages
                .into_iter()
                .map(|(topic, payload)| (topic.to_string(), Bytes::from(payload.to_string())))
                .collect(),
            ..Default::default()
        }
    }

    pub fn losing_connection_after(delay: Duration, cause: &str) -> Self {
        Self {
            lose_connection_after: Some((delay, cause.to_string())),
            ..Default::default()
        }
    }

    /// Handle on the call log that outlives moving the mock into a session
    pub fn call_log(&self) -> CallLog {
        self.log.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self, request: &ConnectRequest) -> Result<(), MqttError> {
        self.log.push(TransportCall::Connect(request.clone()));
        if self.connected {
            return Err(MqttError::AlreadyConnected);
        }
        if let Some(code) = self.refuse_with {
            return Err(MqttError::ConnectionRefused {
                code,
                reason: "mock refusal".to_string(),
            });
        }
        self.connected = true;
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: Bytes, qos: QoS) -> Result<(), MqttError> {
        if !self.connected {
            return Err(MqttError::NotConnected);
        }
        self.log.push(TransportCall::Publish {
            topic: topic.to_string(),
            payload,
            qos,
        });
        if self.fail_publish {
            return Err(MqttError::PublishFailed("Mock publish failure".into()));
        }
        if qos != QoS::AtMostOnce {
            if let Some(sink) = &self.sink {
                sink.delivery_complete(1);
            }
        }
        Ok(())
    }

    async fn subscribe(
        &mut self,
        topic: &str,
        qos: QoS,
        sink: Arc<dyn MessageSink>,
    ) -> Result<(), MqttError> {
        if !self.connected {
            return Err(MqttError::NotConnected);
        }
        self.log.push(TransportCall::Subscribe {
            topic: topic.to_string(),
            qos,
        });
        if self.reject_subscriptions {
            return Err(MqttError::SubscriptionRejected {
                topic: topic.to_string(),
            });
        }

        for (message_id, (incoming_topic, payload)) in self.incoming.iter().enumerate() {
            let message_id = u16::try_from(message_id + 1).unwrap_or(u16::MAX);
            sink.message_arrived(message_id, incoming_topic, payload);
        }
        self.sink = Some(sink);
        Ok(())
    }

    async fn connection_lost(&mut self) -> MqttError {
        if !self.connected {
            return MqttError::NotConnected;
        }
        match self.lose_connection_after.clone() {
            Some((delay, cause)) => {
                tokio::time::sleep(delay).await;
                self.connected = false;
                if let Some(sink) = &self.sink {
                    sink.connection_lost(&cause);
                }
                MqttError::ConnectionLost(cause)
            }
            None => std::future::pending().await,
        }
    }

    async fn disconnect(&mut self) -> Result<(), MqttError> {
        self.log.push(TransportCall::Disconnect);
        self.connected = false;
        self.sink = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// Cloneable in-memory writer; every clone sees the same bytes
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        let bytes = self
            .0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        String::from_utf8_lossy(&bytes).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
