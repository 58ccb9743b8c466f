use crate::template::render_template;
use async_trait::async_trait;
use pulsecore::{ExecutionContext, HandlerOutcome, NodeError, NodeHandler, VarMap};
use serde_json::Value;

/// `email.send` — renders recipient/subject/body templates against the run
/// context and hands the message to the delivery domain.
///
/// Actual delivery is an external collaborator; here the send is traced and
/// the rendered fields flow back as a context delta for downstream nodes.
pub struct SendEmailHandler;

#[async_trait]
impl NodeHandler for SendEmailHandler {
    fn handler_type(&self) -> &str {
        "email.send"
    }

    async fn execute(&self, config: &VarMap, ctx: &ExecutionContext) -> Result<HandlerOutcome, NodeError> {
        let to_template = config
            .get("to")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::Config("email.send needs 'to'".to_string()))?;
        let subject_template = config.get("subject").and_then(Value::as_str).unwrap_or("");
        let body_template = config.get("body").and_then(Value::as_str).unwrap_or("");

        let to = render_template(to_template, &ctx.variables);
        if to.trim().is_empty() || !to.contains('@') {
            return Err(NodeError::Failed(format!("invalid recipient address '{to}'")));
        }
        let subject = render_template(subject_template, &ctx.variables);
        let body = render_template(body_template, &ctx.variables);

        tracing::info!(to, subject, bytes = body.len(), "sending email");

        Ok(HandlerOutcome::advance()
            .with_var("email_sent", true)
            .with_var("email_to", to)
            .with_var("email_subject", subject))
    }
}
