//! Pure routing of `rumqttc` events
//!
//! The event-loop task turns every polled [`Event`] into an [`EventRoute`]
//! and acts on the route; keeping the mapping pure keeps it testable without
//! a broker.

use bytes::Bytes;
use rumqttc::{Event, Outgoing, Packet, SubscribeReasonCode};

/// Pure message routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Route MQTT event to appropriate handler (pure routing decision)
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(_) => EventRoute::ConnectionAcknowledged,
                Packet::Publish(publish) => EventRoute::MessageReceived {
                    message_id: publish.pkid,
                    topic: publish.topic.clone(),
                    payload: publish.payload.clone(),
                },
                // QoS 1 completes on PUBACK, QoS 2 on PUBCOMP
                Packet::PubAck(ack) => EventRoute::DeliveryComplete(ack.pkid),
                Packet::PubComp(comp) => EventRoute::DeliveryComplete(comp.pkid),
                Packet::SubAck(suback) => EventRoute::SubscriptionAcknowledged {
                    accepted: Self::subscription_accepted(&suback.return_codes),
                },
                Packet::Disconnect => EventRoute::Disconnected,
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(Outgoing::Publish(pkid)) => EventRoute::PublishWritten(*pkid),
            Event::Outgoing(Outgoing::Disconnect) => EventRoute::DisconnectSent,
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// True when the broker granted every requested subscription
    pub fn subscription_accepted(return_codes: &[SubscribeReasonCode]) -> bool {
        !return_codes.is_empty()
            && return_codes
                .iter()
                .all(|code| matches!(code, SubscribeReasonCode::Success(_)))
    }
}

/// Routing decisions for MQTT events
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// Connection acknowledged - ready to publish/subscribe
    ConnectionAcknowledged,
    /// Message received on the subscribed topic
    MessageReceived {
        message_id: u16,
        topic: String,
        payload: Bytes,
    },
    /// An outgoing publish was written to the network
    PublishWritten(u16),
    /// Broker acknowledged an outgoing QoS 1/2 publish
    DeliveryComplete(u16),
    /// SUBACK received
    SubscriptionAcknowledged { accepted: bool },
    /// Our DISCONNECT went out; the event loop can stop
    DisconnectSent,
    /// The broker closed the session
    Disconnected,
    /// Pings and other protocol housekeeping
    InfrastructureEvent(String),
    /// Other outgoing packets
    OutgoingEvent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::{ConnAck, ConnectReturnCode, PubAck, PubComp, Publish, QoS, SubAck};

    #[test]
    fn test_route_connack() {
        let event = Event::Incoming(Packet::ConnAck(ConnAck::new(
            ConnectReturnCode::Success,
            false,
        )));
        assert_eq!(
            MessageHandler::route_mqtt_event(&event),
            EventRoute::ConnectionAcknowledged
        );
    }

    #[test]
    fn test_route_incoming_publish() {
        let mut publish = Publish::new("pg42819/feeds/sensorfeed", QoS::AtLeastOnce, "42");
        publish.pkid = 9;
        let event = Event::Incoming(Packet::Publish(publish));

        assert_eq!(
            MessageHandler::route_mqtt_event(&event),
            EventRoute::MessageReceived {
                message_id: 9,
                topic: "pg42819/feeds/sensorfeed".to_string(),
                payload: Bytes::from_static(b"42"),
            }
        );
    }

    #[test]
    fn test_route_delivery_acks() {
        let puback = Event::Incoming(Packet::PubAck(PubAck::new(3)));
        let pubcomp = Event::Incoming(Packet::PubComp(PubComp::new(4)));

        assert_eq!(
            MessageHandler::route_mqtt_event(&puback),
            EventRoute::DeliveryComplete(3)
        );
        assert_eq!(
            MessageHandler::route_mqtt_event(&pubcomp),
            EventRoute::DeliveryComplete(4)
        );
    }

    #[test]
    fn test_route_outgoing() {
        assert_eq!(
            MessageHandler::route_mqtt_event(&Event::Outgoing(Outgoing::Publish(0))),
            EventRoute::PublishWritten(0)
        );
        assert_eq!(
            MessageHandler::route_mqtt_event(&Event::Outgoing(Outgoing::Disconnect)),
            EventRoute::DisconnectSent
        );
        assert_eq!(
            MessageHandler::route_mqtt_event(&Event::Outgoing(Outgoing::PingReq)),
            EventRoute::OutgoingEvent
        );
    }

    #[test]
    fn test_route_suback() {
        let granted = Event::Incoming(Packet::SubAck(SubAck::new(
            1,
            vec![SubscribeReasonCode::Success(QoS::AtLeastOnce)],
        )));
        let rejected = Event::Incoming(Packet::SubAck(SubAck::new(
            2,
            vec![SubscribeReasonCode::Failure],
        )));

        assert_eq!(
            MessageHandler::route_mqtt_event(&granted),
            EventRoute::SubscriptionAcknowledged { accepted: true }
        );
        assert_eq!(
            MessageHandler::route_mqtt_event(&rejected),
            EventRoute::SubscriptionAcknowledged { accepted: false }
        );
    }

    #[test]
    fn test_subscription_accepted_needs_codes() {
        assert!(!MessageHandler::subscription_accepted(&[]));
        assert!(MessageHandler::subscription_accepted(&[
            SubscribeReasonCode::Success(QoS::AtMostOnce),
            SubscribeReasonCode::Success(QoS::ExactlyOnce),
        ]));
    }
}
