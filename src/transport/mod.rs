//! The `transport` module is the inbound side of the broker integration.
//!
//! It defines the wire envelope, the pattern → handler registry, idempotent
//! provisioning of topics and subscriptions, the per-message ack/dispatch
//! pipeline, and the server that ties them to live subscription streams.

pub mod envelope;
pub mod pipeline;
pub mod provision;
pub mod registry;
pub mod server;

pub use envelope::{MessageEnvelope, decode, encode};
pub use pipeline::{AckDispatchPipeline, AckPolicy, DispatchOutcome};
pub use provision::ResourceProvisioner;
pub use registry::{Handler, HandlerRegistry, HandlerResult};
pub use server::{ServerOptions, TransportServer};
