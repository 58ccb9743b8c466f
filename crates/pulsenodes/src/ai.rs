use crate::template::render_template;
use async_trait::async_trait;
use pulsecore::{ExecutionContext, HandlerOutcome, NodeError, NodeHandler, VarMap};
use serde_json::Value;

/// `ai.generate` — renders a prompt template and emits the generated text
/// as `ai_generated_content`.
///
/// The provider call is an external collaborator behind this contract; the
/// handler ships with a deterministic placeholder so graphs using it stay
/// runnable without credentials.
pub struct AiGenerateHandler;

#[async_trait]
impl NodeHandler for AiGenerateHandler {
    fn handler_type(&self) -> &str {
        "ai.generate"
    }

    async fn execute(&self, config: &VarMap, ctx: &ExecutionContext) -> Result<HandlerOutcome, NodeError> {
        let prompt_template = config
            .get("prompt")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::Config("ai.generate needs 'prompt'".to_string()))?;
        let prompt = render_template(prompt_template, &ctx.variables);

        tracing::info!(chars = prompt.len(), "generating text for prompt");
        let content = format!("[generated] {prompt}");

        Ok(HandlerOutcome::advance()
            .with_var("ai_prompt", prompt)
            .with_var("ai_generated_content", content))
    }
}
