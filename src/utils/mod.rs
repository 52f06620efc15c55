//! The `utils` module provides the error types and logging plumbing shared
//! across the transport.

pub mod error;
pub mod logging;

pub use error::{HandlerError, TransportError};
pub use logging::{NoopLogger, TracingLogger, TransportLogger, logger_for};
