//! Observability for the feed client
//!
//! Structured logging only; user-facing output goes to stdout separately.

pub mod logging;

pub use logging::{init_default_logging, init_logging, LogFormat};
