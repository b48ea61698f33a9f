//! Command-line surface and configuration resolution
//!
//! [`Cli::resolve`] merges flags, the optional config file, the environment
//! and the built-in [`Defaults`] into a [`RunConfig`]. It runs before any
//! network activity, so a missing credential never costs a connection
//! attempt.

use crate::config::{
    qos_from_level, AppConfig, BrokerAddress, BrokerConfig, ConfigError, Defaults,
};
use crate::session::WaitPolicy;
use crate::sink::Output;
use clap::Parser;
use rumqttc::QoS;
use std::path::PathBuf;

/// Publishes to and subscribes from a namespaced feed on a hosted MQTT broker
#[derive(Debug, Parser)]
#[command(name = "ada")]
#[command(about = "Publishes and subscribes to Adafruit.io style MQTT feeds")]
#[command(version)]
pub struct Cli {
    /// Topic to which to publish or subscribe (defaults to feeds/sensorfeed)
    #[arg(short, long)]
    pub topic: Option<String>,

    /// Message to publish
    #[arg(short, long)]
    pub message: Option<String>,

    /// Subscribe and listen for messages instead of publishing
    #[arg(short, long)]
    pub subscribe: bool,

    /// Quality of Service: 0 = at most once, 1 = at least once, 2 = exactly once (defaults to 1)
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..=2))]
    pub qos: Option<u8>,

    /// File to which subscribed messages are appended (defaults to the console)
    #[arg(short, long, value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Subscription timeout in seconds; 0 waits until interrupted
    #[arg(long, default_value_t = 0)]
    pub timeout: u64,

    /// Id to use for the client (defaults to fixed values for subscribe and publish)
    #[arg(long)]
    pub client_id: Option<String>,

    /// Account username, also the topic namespace (defaults to the AIO_USER env var, then pg42819)
    #[arg(long)]
    pub aio_user: Option<String>,

    /// API key (defaults to the AIO_KEY env var; fails if neither is supplied)
    #[arg(long)]
    pub aio_key: Option<String>,

    /// Broker URI (defaults to tcp://io.adafruit.com:1883)
    #[arg(long)]
    pub aio_broker: Option<String>,

    /// Configuration file path (defaults to ./ada.toml when present)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// What the invocation does
#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    Publish {
        message: String,
        /// True when no `--message` was given and the placeholder is used
        placeholder: bool,
    },
    Subscribe {
        output: Output,
        wait: WaitPolicy,
    },
}

/// Fully resolved configuration for one invocation
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub broker: BrokerConfig,
    pub topic: String,
    pub qos: QoS,
    pub client_id: String,
    pub mode: Mode,
}

impl Cli {
    /// Load the config file named by `--config`, or `./ada.toml` if present
    pub fn load_config_file(&self) -> Result<AppConfig, ConfigError> {
        AppConfig::load(self.config.as_deref())
    }

    /// Merge flags, file, environment and defaults
    ///
    /// `env` looks up environment variables; pass `|name| std::env::var(name).ok()`
    /// outside tests.
    pub fn resolve<F>(
        &self,
        file: &AppConfig,
        defaults: &Defaults,
        env: F,
    ) -> Result<RunConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let key_env = file
            .broker
            .key_env
            .clone()
            .unwrap_or_else(|| defaults.key_env.clone());
        let key = self
            .aio_key
            .clone()
            .or_else(|| env(&key_env))
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingCredential { env_var: key_env })?;

        let username = self
            .aio_user
            .clone()
            .or_else(|| file.broker.username.clone())
            .or_else(|| env(&defaults.username_env))
            .filter(|user| !user.is_empty())
            .unwrap_or_else(|| defaults.username.clone());

        let uri = self
            .aio_broker
            .as_deref()
            .or(file.broker.uri.as_deref())
            .unwrap_or(&defaults.broker_uri);
        let address = BrokerAddress::parse(uri)?;

        let qos = qos_from_level(self.qos.or(file.defaults.qos).unwrap_or(defaults.qos))?;

        let topic = self
            .topic
            .clone()
            .or_else(|| file.defaults.topic.clone())
            .unwrap_or_else(|| defaults.topic.clone());

        let (mode, default_client_id) = if self.subscribe {
            (
                Mode::Subscribe {
                    output: Output::from_path(self.file.clone()),
                    wait: WaitPolicy::from_secs(self.timeout),
                },
                file.defaults
                    .subscribe_client_id
                    .as_ref()
                    .unwrap_or(&defaults.subscribe_client_id),
            )
        } else {
            let (message, placeholder) = match &self.message {
                Some(message) => (message.clone(), false),
                None => (defaults.message.clone(), true),
            };
            (
                Mode::Publish {
                    message,
                    placeholder,
                },
                file.defaults
                    .publish_client_id
                    .as_ref()
                    .unwrap_or(&defaults.publish_client_id),
            )
        };
        let client_id = self
            .client_id
            .clone()
            .unwrap_or_else(|| default_client_id.clone());

        Ok(RunConfig {
            broker: BrokerConfig::new(address, username, key),
            topic,
            qos,
            client_id,
            mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("ada").chain(args.iter().copied())).unwrap()
    }

    fn env_with_key(name: &str) -> Option<String> {
        match name {
            "AIO_KEY" => Some("env-key".to_string()),
            "AIO_USER" => Some("env-user".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_publish_defaults() {
        let config = parse(&[])
            .resolve(&AppConfig::default(), &Defaults::default(), env_with_key)
            .unwrap();

        assert_eq!(config.topic, "feeds/sensorfeed");
        assert_eq!(config.qos, QoS::AtLeastOnce);
        assert_eq!(config.client_id, "IATA-Publish-Client");
        assert_eq!(config.broker.username, "env-user");
        assert_eq!(config.broker.key, "env-key");
        assert_eq!(config.broker.address.host, "io.adafruit.com");
        assert_eq!(
            config.mode,
            Mode::Publish {
                message: "test message".to_string(),
                placeholder: true
            }
        );
    }

    #[test]
    fn test_subscribe_defaults() {
        let config = parse(&["--subscribe"])
            .resolve(&AppConfig::default(), &Defaults::default(), env_with_key)
            .unwrap();

        assert_eq!(config.client_id, "IATA-Subscribe-Client");
        assert_eq!(
            config.mode,
            Mode::Subscribe {
                output: Output::Console,
                wait: WaitPolicy::Forever
            }
        );
    }

    #[test]
    fn test_subscribe_with_file_and_timeout() {
        let config = parse(&["-s", "-f", "feed.log", "--timeout", "5"])
            .resolve(&AppConfig::default(), &Defaults::default(), env_with_key)
            .unwrap();

        assert_eq!(
            config.mode,
            Mode::Subscribe {
                output: Output::File(PathBuf::from("feed.log")),
                wait: WaitPolicy::For(Duration::from_secs(5))
            }
        );
    }

    #[test]
    fn test_flags_override_environment() {
        let config = parse(&[
            "--aio-key",
            "flag-key",
            "--aio-user",
            "pg42819",
            "--client-id",
            "custom",
            "-q",
            "0",
        ])
        .resolve(&AppConfig::default(), &Defaults::default(), env_with_key)
        .unwrap();

        assert_eq!(config.broker.key, "flag-key");
        assert_eq!(config.broker.username, "pg42819");
        assert_eq!(config.client_id, "custom");
        assert_eq!(config.qos, QoS::AtMostOnce);
    }

    #[test]
    fn test_missing_credential() {
        let result = parse(&["--aio-user", "pg42819"]).resolve(
            &AppConfig::default(),
            &Defaults::default(),
            |_| None,
        );
        assert!(matches!(
            result,
            Err(ConfigError::MissingCredential { ref env_var }) if env_var == "AIO_KEY"
        ));
    }

    #[test]
    fn test_empty_credential_counts_as_missing() {
        let result = parse(&["--aio-user", "pg42819", "--aio-key", ""]).resolve(
            &AppConfig::default(),
            &Defaults::default(),
            |_| None,
        );
        assert!(matches!(result, Err(ConfigError::MissingCredential { .. })));
    }

    #[test]
    fn test_username_falls_back_to_default() {
        let config = parse(&["--aio-key", "k"])
            .resolve(&AppConfig::default(), &Defaults::default(), |_| None)
            .unwrap();
        assert_eq!(config.broker.username, "pg42819");
        assert_eq!(config.broker.key, "k");
    }

    #[test]
    fn test_empty_username_env_falls_back_to_default() {
        let config = parse(&["--aio-key", "k"])
            .resolve(&AppConfig::default(), &Defaults::default(), |name| {
                (name == "AIO_USER").then(String::new)
            })
            .unwrap();
        assert_eq!(config.broker.username, "pg42819");
    }

    #[test]
    fn test_qos_out_of_range_is_a_usage_error() {
        let result = Cli::try_parse_from(["ada", "--qos", "3"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_bad_broker_uri() {
        let result = parse(&["--aio-broker", "http://example.com"]).resolve(
            &AppConfig::default(),
            &Defaults::default(),
            env_with_key,
        );
        assert!(matches!(result, Err(ConfigError::InvalidBrokerUri { .. })));
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
