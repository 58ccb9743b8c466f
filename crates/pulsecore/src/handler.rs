use crate::{ExecutionContext, NodeError, VarMap};
use async_trait::async_trait;
use std::time::Duration;

/// Uniform contract every executable node kind implements.
///
/// Built-in kinds (start, end, condition, delay) are engine-owned; action
/// kinds are supplied by external domains behind this trait only. Handlers
/// read the context, never mutate it directly: changes flow back as a delta
/// the engine applies at the node boundary. The engine wraps `execute` in a
/// hard per-node timeout, so a stuck handler is abandoned and treated as a
/// retryable failure.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    /// Type identifier this handler serves (e.g. "condition", "email.send").
    fn handler_type(&self) -> &str;

    async fn execute(
        &self,
        config: &VarMap,
        ctx: &ExecutionContext,
    ) -> Result<HandlerOutcome, NodeError>;
}

/// Successful result of one node execution.
#[derive(Debug, Clone, Default)]
pub struct HandlerOutcome {
    /// Variables to merge into the run context.
    pub delta: VarMap,
    /// Output slot to follow (condition nodes choose "true"/"false").
    pub next_slot: String,
    /// Delay nodes request suspension; the engine parks the run at the node
    /// boundary instead of the handler sleeping through its timeout.
    pub pause: Option<Duration>,
}

impl HandlerOutcome {
    pub fn advance() -> Self {
        Self {
            delta: VarMap::new(),
            next_slot: crate::Edge::DEFAULT_OUTPUT.to_string(),
            pause: None,
        }
    }

    pub fn branch(slot: impl Into<String>) -> Self {
        Self {
            delta: VarMap::new(),
            next_slot: slot.into(),
            pause: None,
        }
    }

    pub fn with_delta(mut self, delta: VarMap) -> Self {
        self.delta = delta;
        self
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.delta.insert(key.into(), value.into());
        self
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = Some(pause);
        self
    }
}
