//! Pure connection configuration for the MQTT client
//!
//! Builds `rumqttc` options from a [`ConnectRequest`] and turns the broker's
//! CONNACK refusals into [`MqttError`]s.

use crate::error::MqttError;
use crate::transport::ConnectRequest;
use rumqttc::{ConnectReturnCode, MqttOptions, Transport as RumqttcTransport};
use std::time::Duration;

/// Number of requests the client may queue ahead of the event loop
pub const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// Pure function to configure MQTT options from a connect request
pub fn configure_mqtt_options(request: &ConnectRequest) -> MqttOptions {
    let address = &request.address;
    let mut mqtt_options =
        MqttOptions::new(&request.client_id, address.host.as_str(), address.port);

    if address.tls {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    mqtt_options.set_credentials(&request.username, &request.key);
    mqtt_options.set_keep_alive(request.keep_alive);
    mqtt_options.set_clean_session(request.clean_session);

    mqtt_options
}

/// Broker's CONNACK return code as a number
pub fn return_code_value(code: ConnectReturnCode) -> u8 {
    match code {
        ConnectReturnCode::Success => 0,
        ConnectReturnCode::RefusedProtocolVersion => 1,
        ConnectReturnCode::BadClientId => 2,
        ConnectReturnCode::ServiceUnavailable => 3,
        ConnectReturnCode::BadUserNamePassword => 4,
        ConnectReturnCode::NotAuthorized => 5,
    }
}

/// Human-readable text for a CONNACK return code
pub fn return_code_reason(code: ConnectReturnCode) -> &'static str {
    match code {
        ConnectReturnCode::Success => "connection accepted",
        ConnectReturnCode::RefusedProtocolVersion => "unacceptable protocol version",
        ConnectReturnCode::BadClientId => "identifier rejected",
        ConnectReturnCode::ServiceUnavailable => "server unavailable",
        ConnectReturnCode::BadUserNamePassword => "bad user name or password",
        ConnectReturnCode::NotAuthorized => "not authorized",
    }
}

/// Map a refused CONNACK onto an error carrying the broker's reason code
pub fn refused(code: ConnectReturnCode) -> MqttError {
    MqttError::ConnectionRefused {
        code: return_code_value(code),
        reason: return_code_reason(code).to_string(),
    }
}

/// Whole seconds for rumqttc's handshake timeout, never zero
pub fn handshake_timeout_secs(connect_timeout: Duration) -> u64 {
    connect_timeout.as_secs().max(1)
}

/// Map an event-loop failure seen before CONNACK onto a connect error
pub fn connect_failure(error: rumqttc::ConnectionError) -> MqttError {
    match error {
        rumqttc::ConnectionError::ConnectionRefused(code) => refused(code),
        rumqttc::ConnectionError::NetworkTimeout => MqttError::Timeout {
            operation: "connect",
        },
        other => MqttError::ConnectFailed(Box::new(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrokerAddress;

    fn test_request(uri: &str) -> ConnectRequest {
        ConnectRequest {
            address: BrokerAddress::parse(uri).unwrap(),
            client_id: "IATA-Publish-Client".to_string(),
            username: "pg42819".to_string(),
            key: "aio_key".to_string(),
            keep_alive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(60),
            clean_session: true,
        }
    }

    #[test]
    fn test_configure_mqtt_options() {
        let options = configure_mqtt_options(&test_request("tcp://io.adafruit.com:1883"));

        assert_eq!(options.client_id(), "IATA-Publish-Client");
        assert_eq!(
            options.broker_address(),
            ("io.adafruit.com".to_string(), 1883)
        );
        assert_eq!(options.keep_alive(), Duration::from_secs(60));
        assert!(options.clean_session());
    }

    #[test]
    fn test_tls_uri_uses_tls_port() {
        let options = configure_mqtt_options(&test_request("mqtts://io.adafruit.com"));
        assert_eq!(
            options.broker_address(),
            ("io.adafruit.com".to_string(), 8883)
        );
    }

    #[test]
    fn test_refused_carries_broker_code() {
        let error = refused(ConnectReturnCode::BadUserNamePassword);
        assert_eq!(error.reason_code(), 4);
        assert!(error.to_string().contains("bad user name or password"));

        let error = refused(ConnectReturnCode::NotAuthorized);
        assert_eq!(error.reason_code(), 5);
    }

    #[test]
    fn test_connect_failure_mapping() {
        let error = connect_failure(rumqttc::ConnectionError::ConnectionRefused(
            ConnectReturnCode::ServiceUnavailable,
        ));
        assert!(matches!(error, MqttError::ConnectionRefused { code: 3, .. }));

        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let error = connect_failure(rumqttc::ConnectionError::Io(io));
        assert!(matches!(error, MqttError::ConnectFailed(_)));
        assert_eq!(error.reason_code(), crate::error::reason::SERVER_CONNECT_ERROR);
    }

    #[test]
    fn test_network_timeout_is_a_connect_timeout() {
        let error = connect_failure(rumqttc::ConnectionError::NetworkTimeout);
        assert!(matches!(error, MqttError::Timeout { operation: "connect" }));
        assert_eq!(error.reason_code(), crate::error::reason::CLIENT_TIMEOUT);
    }

    #[test]
    fn test_handshake_timeout_secs() {
        assert_eq!(handshake_timeout_secs(Duration::from_secs(60)), 60);
        assert_eq!(handshake_timeout_secs(Duration::from_millis(1500)), 1);
        assert_eq!(handshake_timeout_secs(Duration::from_millis(200)), 1);
    }
}
