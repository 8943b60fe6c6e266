//! Shared test utilities: a mock STOMP broker for exercising connect,
//! reconnect, heartbeat and subscription-replay behavior without a real
//! broker.

pub mod mock_broker;

pub use mock_broker::{connect_raw, MockBroker, MockBrokerConfig};
