//! ada-feed - publish to and subscribe from a hosted MQTT feed
//!
//! A thin client for brokers that namespace every topic under the account
//! username, in the style of Adafruit IO: `feeds/sensorfeed` for user
//! `pg42819` lives at `pg42819/feeds/sensorfeed`.
//!
//! # Overview
//!
//! - [`session::Session`] owns the connection and the publish/subscribe
//!   operations
//! - [`sink::MessageSink`] receives incoming messages, delivery
//!   acknowledgements and connection loss
//! - [`transport::Transport`] is the seam to the `rumqttc` client
//! - [`cli`] and [`commands`] implement the `ada` binary
//!
//! # Quick Start
//!
//! ```rust
//! use ada_feed::sink::{ChannelSink, MessageSink, SinkEvent};
//! use ada_feed::topic::FeedTopic;
//!
//! let topic = FeedTopic::new("pg42819", "feeds/sensorfeed");
//! assert_eq!(topic.as_str(), "pg42819/feeds/sensorfeed");
//!
//! let (sink, mut events) = ChannelSink::new();
//! sink.message_arrived(1, topic.as_str(), b"42");
//! assert!(matches!(events.try_recv(), Ok(SinkEvent::MessageArrived { .. })));
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod observability;
pub mod session;
pub mod sink;
pub mod testing;
pub mod topic;
pub mod transport;

pub use config::{AppConfig, BrokerAddress, BrokerConfig, ConfigError, Defaults};
pub use error::{AdaError, MqttError, MqttResult};
pub use session::{Session, WaitPolicy};
pub use sink::{ChannelSink, MessageSink, Output, PrintSink, SinkEvent};
pub use topic::FeedTopic;
pub use transport::mqtt::MqttClient;
