use crate::template::render_template;
use async_trait::async_trait;
use pulsecore::{ExecutionContext, HandlerOutcome, NodeError, NodeHandler, VarMap};
use serde_json::Value;

/// `data.transform` — reshapes context variables in place.
///
/// Config:
/// - `set`: object of variable name to template string (rendered) or any
///   other JSON value (copied as-is);
/// - `remove`: array of variable names to null out.
pub struct DataTransformHandler;

#[async_trait]
impl NodeHandler for DataTransformHandler {
    fn handler_type(&self) -> &str {
        "data.transform"
    }

    async fn execute(&self, config: &VarMap, ctx: &ExecutionContext) -> Result<HandlerOutcome, NodeError> {
        let mut outcome = HandlerOutcome::advance();

        if let Some(value) = config.get("set") {
            let assignments = value.as_object().ok_or_else(|| {
                NodeError::Config("data.transform 'set' must be an object".to_string())
            })?;
            for (name, template) in assignments {
                let rendered = match template {
                    Value::String(s) => Value::String(render_template(s, &ctx.variables)),
                    other => other.clone(),
                };
                outcome.delta.insert(name.clone(), rendered);
            }
        }

        if let Some(value) = config.get("remove") {
            let names = value.as_array().ok_or_else(|| {
                NodeError::Config("data.transform 'remove' must be an array".to_string())
            })?;
            for name in names {
                if let Some(name) = name.as_str() {
                    // Deltas only merge, so removal is expressed as null.
                    outcome.delta.insert(name.to_string(), Value::Null);
                }
            }
        }

        Ok(outcome)
    }
}
