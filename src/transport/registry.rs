//! Pattern → handler registry
//!
//! Populated once during startup, then shared read-only (behind an `Arc`) by
//! every pipeline invocation. Lookup is by exact pattern match.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

use crate::utils::HandlerError;

pub type HandlerResult = Result<Value, HandlerError>;

/// Type-erased async handler: takes the envelope `data`, returns a result.
pub type Handler = Arc<dyn Fn(Value) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Handler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `pattern`. A later registration for the same
    /// pattern replaces the earlier one.
    pub fn register<F, Fut>(&mut self, pattern: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let pattern = pattern.into();
        let handler: Handler = Arc::new(move |data| handler(data).boxed());
        if self.handlers.insert(pattern.clone(), handler).is_some() {
            debug!(pattern = %pattern, "handler replaced");
        }
        self
    }

    pub fn lookup(&self, pattern: &str) -> Option<Handler> {
        self.handlers.get(pattern).cloned()
    }

    pub fn patterns(&self) -> Vec<&str> {
        let mut patterns: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        patterns.sort_unstable();
        patterns
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("patterns", &self.patterns())
            .finish()
    }
}
