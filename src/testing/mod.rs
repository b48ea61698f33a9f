//! Testing utilities and mock implementations
//!
//! Lets sessions and sinks be exercised without a broker.

pub mod mocks;

pub use mocks::*;
