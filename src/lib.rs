//! # pubsub_transport
//!
//! `pubsub_transport` connects an application to a topic/subscription message
//! broker. Inbound, it provisions topics and subscriptions, receives messages,
//! routes each one to a handler by its logical pattern and controls when the
//! message is acknowledged. Outbound, it wraps events in the same envelope and
//! publishes them to a topic.
//!
//! ## Core Modules
//!
//! The library is structured into several modules, each with a distinct responsibility:
//!
//! - `broker`: The capability interface to the external broker, plus an in-memory engine.
//! - `client`: The outbound connection lifecycle and event publisher.
//! - `config`: Handles loading and managing configuration.
//! - `transport`: Envelope codec, handler registry, provisioning, ack/dispatch pipeline and server.
//! - `utils`: Contains shared utilities, such as error handling and logging.

pub mod broker;
pub mod client;
pub mod config;
pub mod transport;
pub mod utils;

#[cfg(test)]
mod tests;
