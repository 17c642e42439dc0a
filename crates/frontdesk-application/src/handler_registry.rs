//! Handler dispatch table.

use async_trait::async_trait;
use frontdesk_core::handler::{FunctionHandler, HandlerError, HandlerInvocation};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Routes validated calls to the handler registered for their function.
///
/// A fallback handler, when set, receives every function without a
/// dedicated entry. This is how a single remote booking service is wired.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn FunctionHandler>>,
    fallback: Option<Arc<dyn FunctionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        mut self,
        function_name: impl Into<String>,
        handler: Arc<dyn FunctionHandler>,
    ) -> Self {
        self.handlers.insert(function_name.into(), handler);
        self
    }

    pub fn with_fallback(mut self, handler: Arc<dyn FunctionHandler>) -> Self {
        self.fallback = Some(handler);
        self
    }

    pub fn handles(&self, function_name: &str) -> bool {
        self.fallback.is_some() || self.handlers.contains_key(function_name)
    }
}

#[async_trait]
impl FunctionHandler for HandlerRegistry {
    async fn handle(&self, invocation: &HandlerInvocation) -> Result<Value, HandlerError> {
        let handler = self
            .handlers
            .get(&invocation.function_name)
            .or(self.fallback.as_ref())
            .ok_or_else(|| HandlerError::NotRegistered {
                function_name: invocation.function_name.clone(),
            })?;
        handler.handle(invocation).await
    }
}
