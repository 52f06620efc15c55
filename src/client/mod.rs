//! The `client` module is the outbound side of the broker integration.
//!
//! It provides `BrokerConnection`, an explicit connect/close lifecycle around
//! a broker client, and `EventPublisher`, which publishes envelopes to a
//! destination topic over that connection.

pub mod connection;
pub mod publisher;

pub use connection::BrokerConnection;
pub use publisher::{EventPublisher, PublishMode};
