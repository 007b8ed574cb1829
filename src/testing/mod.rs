//! Testing utilities and mock implementations
//!
//! Mocks for the broker client and battery reader, so the agent can be
//! tested without an MQTT broker or real hardware.

pub mod mocks;

pub use mocks::*;
