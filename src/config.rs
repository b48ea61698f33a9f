//! Configuration for the feed client
//!
//! Settings come from three places, highest precedence first: command-line
//! flags, an optional TOML file, and the built-in [`Defaults`]. The API key is
//! never stored in the file; the file may only name the environment variable
//! that holds it.

use rumqttc::QoS;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Config file picked up from the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "ada.toml";

/// Built-in defaults, passed explicitly to whoever needs them
#[derive(Debug, Clone, PartialEq)]
pub struct Defaults {
    pub broker_uri: String,
    pub topic: String,
    pub qos: u8,
    pub publish_client_id: String,
    pub subscribe_client_id: String,
    pub message: String,
    pub username: String,
    pub username_env: String,
    pub key_env: String,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            broker_uri: "tcp://io.adafruit.com:1883".to_string(),
            topic: "feeds/sensorfeed".to_string(),
            qos: 1,
            publish_client_id: "IATA-Publish-Client".to_string(),
            subscribe_client_id: "IATA-Subscribe-Client".to_string(),
            message: "test message".to_string(),
            username: "pg42819".to_string(),
            username_env: "AIO_USER".to_string(),
            key_env: "AIO_KEY".to_string(),
            keep_alive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(60),
        }
    }
}

/// Contents of the optional TOML config file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub broker: BrokerSection,
    #[serde(default)]
    pub defaults: DefaultsSection,
}

/// `[broker]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BrokerSection {
    /// Broker URI, e.g. `tcp://io.adafruit.com:1883`
    pub uri: Option<String>,
    /// Account username, also the topic namespace
    pub username: Option<String>,
    /// Environment variable holding the API key
    pub key_env: Option<String>,
}

/// `[defaults]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DefaultsSection {
    pub topic: Option<String>,
    pub qos: Option<u8>,
    pub publish_client_id: Option<String>,
    pub subscribe_client_id: Option<String>,
}

/// Configuration errors, all reported before any network activity
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error(
        "Cannot continue without an API key. Pass one with --aio-key or set the env var {env_var}"
    )]
    MissingCredential { env_var: String },
    #[error("Invalid QoS level {0}: must be 0, 1 or 2")]
    InvalidQos(u8),
    #[error("Invalid broker URI '{uri}': {reason}")]
    InvalidBrokerUri { uri: String, reason: String },
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;

        if let Some(level) = config.defaults.qos {
            qos_from_level(level)?;
        }
        if let Some(uri) = &config.broker.uri {
            BrokerAddress::parse(uri)?;
        }

        Ok(config)
    }

    /// Load the explicit file if given, else `ada.toml` if it exists, else nothing
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.exists() {
                    Self::load_from_file(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}

/// Map a numeric QoS level onto the protocol's three tiers, without clamping
pub fn qos_from_level(level: u8) -> Result<QoS, ConfigError> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(ConfigError::InvalidQos(other)),
    }
}

/// Numeric level of a QoS tier
pub fn qos_level(qos: QoS) -> u8 {
    match qos {
        QoS::AtMostOnce => 0,
        QoS::AtLeastOnce => 1,
        QoS::ExactlyOnce => 2,
    }
}

/// Parsed broker URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub uri: String,
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl BrokerAddress {
    /// Parse `tcp://`, `mqtt://`, `ssl://` or `mqtts://` URIs
    pub fn parse(uri: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidBrokerUri {
            uri: uri.to_string(),
            reason: reason.to_string(),
        };

        let url = Url::parse(uri).map_err(|e| invalid(&e.to_string()))?;
        let tls = match url.scheme() {
            "tcp" | "mqtt" => false,
            "ssl" | "mqtts" => true,
            _ => return Err(invalid("scheme must be tcp, mqtt, ssl or mqtts")),
        };
        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| invalid("missing host"))?;
        let port = url.port().unwrap_or(if tls { 8883 } else { 1883 });

        Ok(Self {
            uri: uri.to_string(),
            host: host.to_string(),
            port,
            tls,
        })
    }
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

/// Everything a session needs to reach and authenticate with the broker
#[derive(Clone, PartialEq)]
pub struct BrokerConfig {
    pub address: BrokerAddress,
    pub username: String,
    pub key: String,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
}

impl BrokerConfig {
    pub fn new(address: BrokerAddress, username: String, key: String) -> Self {
        let defaults = Defaults::default();
        Self {
            address,
            username,
            key,
            keep_alive: defaults.keep_alive,
            connect_timeout: defaults.connect_timeout,
        }
    }
}

// Hand-written so the API key never reaches a log line.
impl fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("address", &self.address)
            .field("username", &self.username)
            .field("key", &"***")
            .field("keep_alive", &self.keep_alive)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config_file() {
        let toml_content = r#"
[broker]
uri = "mqtts://io.adafruit.com"
username = "pg42819"
key_env = "MY_AIO_KEY"

[defaults]
topic = "feeds/temperature"
qos = 2
publish_client_id = "pub"
subscribe_client_id = "sub"
"#;
        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.broker.username.as_deref(), Some("pg42819"));
        assert_eq!(config.broker.key_env.as_deref(), Some("MY_AIO_KEY"));
        assert_eq!(config.defaults.qos, Some(2));
        assert_eq!(config.defaults.topic.as_deref(), Some("feeds/temperature"));
    }

    #[test]
    fn test_empty_config_file() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_key_is_not_a_config_field() {
        let toml_content = r#"
[broker]
key = "abc123"
"#;
        assert!(toml::from_str::<AppConfig>(toml_content).is_err());
    }

    #[test]
    fn test_qos_levels() {
        assert_eq!(qos_from_level(0).unwrap(), QoS::AtMostOnce);
        assert_eq!(qos_from_level(1).unwrap(), QoS::AtLeastOnce);
        assert_eq!(qos_from_level(2).unwrap(), QoS::ExactlyOnce);
        assert!(matches!(qos_from_level(3), Err(ConfigError::InvalidQos(3))));

        for level in 0..=2 {
            assert_eq!(qos_level(qos_from_level(level).unwrap()), level);
        }
    }

    #[test]
    fn test_broker_address_default_ports() {
        let plain = BrokerAddress::parse("tcp://io.adafruit.com").unwrap();
        assert_eq!(plain.host, "io.adafruit.com");
        assert_eq!(plain.port, 1883);
        assert!(!plain.tls);

        let tls = BrokerAddress::parse("ssl://io.adafruit.com").unwrap();
        assert_eq!(tls.port, 8883);
        assert!(tls.tls);

        let explicit = BrokerAddress::parse("mqtt://localhost:2883").unwrap();
        assert_eq!(explicit.port, 2883);
        assert_eq!(explicit.to_string(), "mqtt://localhost:2883");
    }

    #[test]
    fn test_broker_address_rejects_bad_uris() {
        for uri in ["http://io.adafruit.com", "io.adafruit.com:1883", "not a uri"] {
            let result = BrokerAddress::parse(uri);
            assert!(
                matches!(result, Err(ConfigError::InvalidBrokerUri { .. })),
                "expected {uri} to be rejected"
            );
        }
    }

    #[test]
    fn test_broker_config_debug_redacts_key() {
        let config = BrokerConfig::new(
            BrokerAddress::parse("tcp://localhost:1883").unwrap(),
            "pg42819".to_string(),
            "aio_supersecret".to_string(),
        );
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("aio_supersecret"));
        assert!(rendered.contains("pg42819"));
        assert_eq!(config.keep_alive, Duration::from_secs(60));
        assert_eq!(config.connect_timeout, Duration::from_secs(60));
    }
}
