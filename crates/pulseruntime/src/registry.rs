use crate::builtin;
use pulsecore::{EngineError, NodeHandler, NodeKind};
use std::collections::HashMap;
use std::sync::Arc;

/// Maps a node's type to its executable handler.
///
/// The four built-in kinds are engine-owned and registered up front; action
/// kinds form an open set supplied by external domains through `register`.
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn NodeHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            handlers: HashMap::new(),
        };
        registry.register(Arc::new(builtin::StartHandler));
        registry.register(Arc::new(builtin::EndHandler));
        registry.register(Arc::new(builtin::ConditionHandler));
        registry.register(Arc::new(builtin::DelayHandler));
        registry
    }

    pub fn register(&mut self, handler: Arc<dyn NodeHandler>) {
        let handler_type = handler.handler_type().to_string();
        tracing::info!("registering node handler: {}", handler_type);
        self.handlers.insert(handler_type, handler);
    }

    /// An unknown node type is a definition bug: fatal, never retried.
    pub fn dispatch(&self, kind: &NodeKind) -> Result<Arc<dyn NodeHandler>, EngineError> {
        self.handlers
            .get(kind.as_str())
            .cloned()
            .ok_or_else(|| EngineError::Configuration(format!("unknown node type '{kind}'")))
    }

    pub fn list_handler_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
