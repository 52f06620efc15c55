use std::sync::Arc;

use serde_json::Value;

/// Initialize tracing/logging for the application.
///
/// This uses a simple `with_max_level` configuration based on `default_level`.
pub fn init(default_level: &str) {
    let lvl = match default_level.to_lowercase().as_str() {
        "error" => tracing::Level::ERROR,
        "warn" | "warning" => tracing::Level::WARN,
        "debug" => tracing::Level::DEBUG,
        "trace" => tracing::Level::TRACE,
        _ => tracing::Level::INFO,
    };

    // Use try_init so tests and libraries can call this multiple times without panicking
    let _ = tracing_subscriber::fmt()
        .with_max_level(lvl)
        .with_target(false)
        .try_init();
}

/// Structured logger injected into the transport components.
///
/// Every record carries a message and a JSON object of contextual fields
/// (subscription, pattern, raw payload, ...).
pub trait TransportLogger: Send + Sync {
    fn debug(&self, message: &str, context: Value);
    fn info(&self, message: &str, context: Value);
    fn warn(&self, message: &str, context: Value);
    fn error(&self, message: &str, context: Value);

    /// Lifecycle messages ("creating topic ...", "closing connection ...").
    fn log(&self, message: &str, context: Value) {
        self.info(message, context);
    }
}

/// Forwards records to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl TransportLogger for TracingLogger {
    fn debug(&self, message: &str, context: Value) {
        tracing::debug!(context = %context, "{message}");
    }

    fn info(&self, message: &str, context: Value) {
        tracing::info!(context = %context, "{message}");
    }

    fn warn(&self, message: &str, context: Value) {
        tracing::warn!(context = %context, "{message}");
    }

    fn error(&self, message: &str, context: Value) {
        tracing::error!(context = %context, "{message}");
    }
}

/// Discards every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl TransportLogger for NoopLogger {
    fn debug(&self, _message: &str, _context: Value) {}
    fn info(&self, _message: &str, _context: Value) {}
    fn warn(&self, _message: &str, _context: Value) {}
    fn error(&self, _message: &str, _context: Value) {}
}

/// `TracingLogger` when logging is enabled, `NoopLogger` otherwise.
pub fn logger_for(enabled: bool) -> Arc<dyn TransportLogger> {
    if enabled {
        Arc::new(TracingLogger)
    } else {
        Arc::new(NoopLogger)
    }
}
