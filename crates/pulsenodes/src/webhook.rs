use crate::template::render_template;
use async_trait::async_trait;
use pulsecore::{ExecutionContext, HandlerOutcome, NodeError, NodeHandler, VarMap};
use serde_json::Value;

/// `webhook.post` — POSTs the run's context variables as JSON to the
/// configured URL. Transport errors and non-2xx responses are retryable
/// failures; the engine owns the backoff.
pub struct WebhookHandler {
    client: reqwest::Client,
}

impl WebhookHandler {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for WebhookHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeHandler for WebhookHandler {
    fn handler_type(&self) -> &str {
        "webhook.post"
    }

    async fn execute(&self, config: &VarMap, ctx: &ExecutionContext) -> Result<HandlerOutcome, NodeError> {
        let url_template = config
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::Config("webhook.post needs 'url'".to_string()))?;
        let url = render_template(url_template, &ctx.variables);

        tracing::info!(url, "posting webhook");

        let response = self
            .client
            .post(&url)
            .json(&ctx.variables)
            .send()
            .await
            .map_err(|e| NodeError::Failed(format!("webhook request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NodeError::Failed(format!(
                "webhook returned status {status}"
            )));
        }

        Ok(HandlerOutcome::advance().with_var("webhook_status", status.as_u16()))
    }
}
