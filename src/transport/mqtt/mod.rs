//! `rumqttc` implementation of the transport
//!
//! # Architecture
//!
//! - [`connection`] - Pure option building and CONNACK error mapping
//! - [`message_handler`] - Pure routing of polled events
//! - [`client`] - Impure I/O: the event-loop task and request/ack plumbing
//!
//! # Usage
//!
//! ```rust,no_run
//! use ada_feed::config::BrokerAddress;
//! use ada_feed::transport::{mqtt::MqttClient, ConnectRequest, Transport};
//! use std::time::Duration;
//!
//! # tokio_test_block_on(async {
//! let request = ConnectRequest {
//!     address: BrokerAddress::parse("tcp://localhost:1883")?,
//!     client_id: "demo".to_string(),
//!     username: "me".to_string(),
//!     key: std::env::var("AIO_KEY")?,
//!     keep_alive: Duration::from_secs(60),
//!     connect_timeout: Duration::from_secs(60),
//!     clean_session: true,
//! };
//!
//! let mut client = MqttClient::new();
//! client.connect(&request).await?;
//! client.disconnect().await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Runtime::new().unwrap().block_on(f)
//! # }
//! ```

pub mod client;
pub mod connection;
pub mod message_handler;

pub use client::MqttClient;
pub use connection::configure_mqtt_options;
pub use message_handler::{EventRoute, MessageHandler};
