//! Impure I/O operations for the MQTT client
//!
//! `connect` drives the `rumqttc` event loop until the broker's CONNACK, then
//! hands the loop to a spawned task. That task feeds incoming messages and
//! acknowledgements to the registered sink and reports completions back to
//! the client over a channel, which is how `publish` and `subscribe` know when
//! the broker has answered. There is no reconnection: the first event-loop
//! error ends the task.

use super::connection::{
    configure_mqtt_options, connect_failure, handshake_timeout_secs, refused,
    REQUEST_CHANNEL_CAPACITY,
};
use super::message_handler::{EventRoute, MessageHandler};
use crate::error::MqttError;
use crate::sink::MessageSink;
use crate::transport::{ConnectRequest, Transport};
use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, Packet, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How long `disconnect` waits for the event loop to flush the DISCONNECT
pub const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

type SinkSlot = Arc<RwLock<Option<Arc<dyn MessageSink>>>>;

/// Completions reported by the event-loop task
#[derive(Debug, Clone, PartialEq)]
enum SessionEvent {
    PublishWritten(u16),
    DeliveryComplete(u16),
    Subscribed { accepted: bool },
    ConnectionLost(String),
}

struct LiveConnection {
    client_id: String,
    client: AsyncClient,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    sink: SinkSlot,
    closing: Arc<AtomicBool>,
    event_loop_handle: JoinHandle<()>,
    request_timeout: Duration,
    lost: Option<String>,
}

impl LiveConnection {
    /// Wait for the first completion `matcher` accepts, skipping the others
    async fn next_event<T>(
        &mut self,
        operation: &'static str,
        mut matcher: impl FnMut(&SessionEvent) -> Option<T> + Send,
    ) -> Result<T, MqttError> {
        if let Some(cause) = &self.lost {
            return Err(MqttError::ConnectionLost(cause.clone()));
        }

        let events_rx = &mut self.events_rx;
        let lost = &mut self.lost;
        let wait = async {
            while let Some(event) = events_rx.recv().await {
                if let SessionEvent::ConnectionLost(cause) = &event {
                    *lost = Some(cause.clone());
                    return Err(MqttError::ConnectionLost(cause.clone()));
                }
                if let Some(found) = matcher(&event) {
                    return Ok(found);
                }
            }
            Err(MqttError::ConnectionLost("event loop stopped".to_string()))
        };

        match tokio::time::timeout(self.request_timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(MqttError::Timeout { operation }),
        }
    }
}

/// `rumqttc`-backed [`Transport`]
#[derive(Default)]
pub struct MqttClient {
    live: Option<LiveConnection>,
}

impl MqttClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Client id of the live connection, if any
    pub fn client_id(&self) -> Option<&str> {
        self.live.as_ref().map(|live| live.client_id.as_str())
    }

    /// Poll until CONNACK, bounded by the connect timeout
    async fn wait_for_connack(
        event_loop: &mut EventLoop,
        timeout: Duration,
    ) -> Result<(), MqttError> {
        let timeout_result = tokio::time::timeout(timeout, async {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                        return if connack.code == ConnectReturnCode::Success {
                            Ok(())
                        } else {
                            Err(refused(connack.code))
                        };
                    }
                    Ok(event) => {
                        debug!(target: "mqtt_transport", "Event before CONNACK: {:?}", event);
                    }
                    Err(e) => return Err(connect_failure(e)),
                }
            }
        })
        .await;

        match timeout_result {
            Ok(result) => result,
            Err(_) => Err(MqttError::Timeout {
                operation: "connect",
            }),
        }
    }

    fn live_mut(&mut self) -> Result<&mut LiveConnection, MqttError> {
        self.live.as_mut().ok_or(MqttError::NotConnected)
    }
}

fn current_sink(slot: &SinkSlot) -> Option<Arc<dyn MessageSink>> {
    slot.read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

fn report_connection_lost(
    cause: String,
    sink: &SinkSlot,
    events_tx: &mpsc::UnboundedSender<SessionEvent>,
) {
    error!("MQTT connection lost: {}", cause);
    if let Some(sink) = current_sink(sink) {
        sink.connection_lost(&cause);
    }
    let _ = events_tx.send(SessionEvent::ConnectionLost(cause));
}

/// Event-loop task body; returns on the first error or after our DISCONNECT
async fn run_event_loop(
    mut event_loop: EventLoop,
    sink: SinkSlot,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    closing: Arc<AtomicBool>,
) {
    loop {
        let event = match event_loop.poll().await {
            Ok(event) => event,
            Err(e) => {
                if closing.load(Ordering::SeqCst) {
                    debug!(target: "mqtt_transport", "Event loop ended during disconnect: {}", e);
                } else {
                    report_connection_lost(e.to_string(), &sink, &events_tx);
                }
                break;
            }
        };

        match MessageHandler::route_mqtt_event(&event) {
            EventRoute::MessageReceived {
                message_id,
                topic,
                payload,
            } => {
                debug!(target: "mqtt_transport", "Received MQTT message on topic: {}", topic);
                if let Some(sink) = current_sink(&sink) {
                    sink.message_arrived(message_id, &topic, &payload);
                }
            }
            EventRoute::PublishWritten(pkid) => {
                let _ = events_tx.send(SessionEvent::PublishWritten(pkid));
            }
            EventRoute::DeliveryComplete(pkid) => {
                if let Some(sink) = current_sink(&sink) {
                    sink.delivery_complete(pkid);
                }
                let _ = events_tx.send(SessionEvent::DeliveryComplete(pkid));
            }
            EventRoute::SubscriptionAcknowledged { accepted } => {
                let _ = events_tx.send(SessionEvent::Subscribed { accepted });
            }
            EventRoute::DisconnectSent => {
                debug!(target: "mqtt_transport", "DISCONNECT sent, stopping event loop");
                break;
            }
            EventRoute::Disconnected => {
                report_connection_lost(
                    "broker closed the connection".to_string(),
                    &sink,
                    &events_tx,
                );
                break;
            }
            EventRoute::ConnectionAcknowledged => {
                debug!(target: "mqtt_transport", "Unexpected CONNACK on a live connection");
            }
            EventRoute::InfrastructureEvent(event_str) => {
                debug!(target: "mqtt_transport", "MQTT event: {}", event_str);
            }
            EventRoute::OutgoingEvent => {}
        }
    }
}

#[async_trait]
impl Transport for MqttClient {
    async fn connect(&mut self, request: &ConnectRequest) -> Result<(), MqttError> {
        if self.live.is_some() {
            return Err(MqttError::AlreadyConnected);
        }

        let mqtt_options = configure_mqtt_options(request);
        let (client, mut event_loop) = AsyncClient::new(mqtt_options, REQUEST_CHANNEL_CAPACITY);
        // rumqttc bounds TCP connect + CONNACK itself, 5 s unless told otherwise
        event_loop
            .network_options
            .set_connection_timeout(handshake_timeout_secs(request.connect_timeout));

        info!(
            "Connecting to broker: {} with client id: {}",
            request.address, request.client_id
        );
        Self::wait_for_connack(&mut event_loop, request.connect_timeout).await?;
        info!("Successfully connected to {} via MQTT", request.address.host);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let sink = SinkSlot::default();
        let closing = Arc::new(AtomicBool::new(false));
        let event_loop_handle = tokio::spawn(run_event_loop(
            event_loop,
            sink.clone(),
            events_tx,
            closing.clone(),
        ));

        self.live = Some(LiveConnection {
            client_id: request.client_id.clone(),
            client,
            events_rx,
            sink,
            closing,
            event_loop_handle,
            request_timeout: request.connect_timeout,
            lost: None,
        });
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: Bytes, qos: QoS) -> Result<(), MqttError> {
        let live = self.live_mut()?;

        live.client
            .publish_bytes(topic, qos, false, payload)
            .await
            .map_err(|e| MqttError::PublishFailed(Box::new(e)))?;

        let pkid = live
            .next_event("publish", |event| match event {
                SessionEvent::PublishWritten(pkid) => Some(*pkid),
                _ => None,
            })
            .await?;

        if qos == QoS::AtMostOnce {
            return Ok(());
        }

        live.next_event("publish acknowledgement", |event| match event {
            SessionEvent::DeliveryComplete(acked) if *acked == pkid => Some(()),
            _ => None,
        })
        .await
    }

    async fn subscribe(
        &mut self,
        topic: &str,
        qos: QoS,
        sink: Arc<dyn MessageSink>,
    ) -> Result<(), MqttError> {
        let live = self.live_mut()?;

        *live
            .sink
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(sink);

        live.client
            .subscribe(topic, qos)
            .await
            .map_err(|e| MqttError::SubscribeFailed(Box::new(e)))?;

        let accepted = live
            .next_event("subscribe", |event| match event {
                SessionEvent::Subscribed { accepted } => Some(*accepted),
                _ => None,
            })
            .await?;

        if accepted {
            Ok(())
        } else {
            Err(MqttError::SubscriptionRejected {
                topic: topic.to_string(),
            })
        }
    }

    async fn connection_lost(&mut self) -> MqttError {
        let live = match self.live_mut() {
            Ok(live) => live,
            Err(e) => return e,
        };
        if let Some(cause) = &live.lost {
            return MqttError::ConnectionLost(cause.clone());
        }

        loop {
            match live.events_rx.recv().await {
                Some(SessionEvent::ConnectionLost(cause)) => {
                    live.lost = Some(cause.clone());
                    return MqttError::ConnectionLost(cause);
                }
                Some(_) => continue,
                None => return MqttError::ConnectionLost("event loop stopped".to_string()),
            }
        }
    }

    async fn disconnect(&mut self) -> Result<(), MqttError> {
        let Some(mut live) = self.live.take() else {
            return Ok(());
        };

        live.closing.store(true, Ordering::SeqCst);

        let result = if live.lost.is_none() && !live.event_loop_handle.is_finished() {
            live.client
                .disconnect()
                .await
                .map_err(|e| MqttError::ConnectionLost(e.to_string()))
        } else {
            Ok(())
        };

        match tokio::time::timeout(DISCONNECT_GRACE, &mut live.event_loop_handle).await {
            Ok(Ok(())) => debug!(target: "mqtt_transport", "Event loop task shut down gracefully"),
            Ok(Err(e)) if !e.is_cancelled() => {
                warn!("Event loop task ended with error: {}", e);
            }
            Ok(Err(_)) => {}
            Err(_) => {
                warn!("Event loop task didn't shut down gracefully, forcing abort");
                live.event_loop_handle.abort();
            }
        }

        info!("Disconnected from the broker client: {}", live.client_id);
        result
    }

    fn is_connected(&self) -> bool {
        self.live
            .as_ref()
            .is_some_and(|live| live.lost.is_none() && !live.event_loop_handle.is_finished())
    }
}

impl Drop for MqttClient {
    fn drop(&mut self) {
        if let Some(live) = &self.live {
            live.event_loop_handle.abort();
        }
    }
}
