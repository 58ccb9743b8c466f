//! Standard action handler library
//!
//! Sample handlers for the open action kinds a marketing workflow reaches
//! for: sending email, posting webhooks, AI text generation and context
//! transforms. Each one lives behind the uniform `NodeHandler` contract;
//! the engine knows nothing about their internals.

mod ai;
mod email;
mod template;
mod transform;
mod webhook;

pub use ai::AiGenerateHandler;
pub use email::SendEmailHandler;
pub use template::render_template;
pub use transform::DataTransformHandler;
pub use webhook::WebhookHandler;

use pulseruntime::HandlerRegistry;
use std::sync::Arc;

/// Register every standard action handler with a registry.
pub fn register_all(registry: &mut HandlerRegistry) {
    registry.register(Arc::new(email::SendEmailHandler));
    registry.register(Arc::new(webhook::WebhookHandler::new()));
    registry.register(Arc::new(ai::AiGenerateHandler));
    registry.register(Arc::new(transform::DataTransformHandler));
}
