//! Engine-owned built-in node kinds: start, end, condition, delay.

use async_trait::async_trait;
use pulsecore::{ExecutionContext, HandlerOutcome, NodeError, NodeHandler, VarMap};
use serde_json::Value;
use std::time::Duration;

/// Entry point of every run. Passes the trigger context through unchanged.
pub struct StartHandler;

#[async_trait]
impl NodeHandler for StartHandler {
    fn handler_type(&self) -> &str {
        "start"
    }

    async fn execute(&self, _config: &VarMap, _ctx: &ExecutionContext) -> Result<HandlerOutcome, NodeError> {
        Ok(HandlerOutcome::advance())
    }
}

/// Terminal marker. The engine completes the run when it reaches one.
pub struct EndHandler;

#[async_trait]
impl NodeHandler for EndHandler {
    fn handler_type(&self) -> &str {
        "end"
    }

    async fn execute(&self, _config: &VarMap, _ctx: &ExecutionContext) -> Result<HandlerOutcome, NodeError> {
        Ok(HandlerOutcome::advance())
    }
}

/// Exclusive-or branch: evaluates `{field, operator, value}` against the
/// context variables and routes to the "true" or "false" output slot.
///
/// A predicate that cannot be evaluated (missing variable, incomparable
/// types) is a node failure, never a silent default branch.
pub struct ConditionHandler;

#[async_trait]
impl NodeHandler for ConditionHandler {
    fn handler_type(&self) -> &str {
        "condition"
    }

    async fn execute(&self, config: &VarMap, ctx: &ExecutionContext) -> Result<HandlerOutcome, NodeError> {
        let field = config
            .get("field")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::Config("condition node is missing 'field'".to_string()))?;
        let operator = config
            .get("operator")
            .and_then(Value::as_str)
            .unwrap_or("equals");
        let expected = config
            .get("value")
            .ok_or_else(|| NodeError::Config("condition node is missing 'value'".to_string()))?;

        let actual = ctx
            .variable(field)
            .ok_or_else(|| NodeError::MissingVariable(field.to_string()))?;

        let matched = evaluate(actual, operator, expected)?;
        let slot = if matched { "true" } else { "false" };
        tracing::debug!(field, operator, matched, "condition evaluated");
        Ok(HandlerOutcome::branch(slot))
    }
}

fn evaluate(actual: &Value, operator: &str, expected: &Value) -> Result<bool, NodeError> {
    match operator {
        "equals" => Ok(loosely_equal(actual, expected)),
        "not_equals" => Ok(!loosely_equal(actual, expected)),
        "greater_than" => compare(actual, expected).map(|ord| ord == std::cmp::Ordering::Greater),
        "less_than" => compare(actual, expected).map(|ord| ord == std::cmp::Ordering::Less),
        "contains" => contains(actual, expected),
        "not_contains" => contains(actual, expected).map(|c| !c),
        other => Err(NodeError::Config(format!(
            "unsupported condition operator '{other}'"
        ))),
    }
}

/// Numbers compare numerically even across integer/float representations.
fn loosely_equal(actual: &Value, expected: &Value) -> bool {
    match (actual.as_f64(), expected.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => actual == expected,
    }
}

fn compare(actual: &Value, expected: &Value) -> Result<std::cmp::Ordering, NodeError> {
    match (actual.as_f64(), expected.as_f64()) {
        (Some(a), Some(b)) => Ok(a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal)),
        _ => match (actual.as_str(), expected.as_str()) {
            (Some(a), Some(b)) => Ok(a.cmp(b)),
            _ => Err(NodeError::Failed(format!(
                "cannot order {actual} against {expected}"
            ))),
        },
    }
}

fn contains(actual: &Value, expected: &Value) -> Result<bool, NodeError> {
    match actual {
        Value::String(s) => {
            let needle = expected
                .as_str()
                .ok_or_else(|| NodeError::Failed("'contains' needs a string value".to_string()))?;
            Ok(s.contains(needle))
        }
        Value::Array(items) => Ok(items.iter().any(|item| loosely_equal(item, expected))),
        _ => Err(NodeError::Failed(format!(
            "'contains' cannot inspect {actual}"
        ))),
    }
}

/// Suspends the run for a configured duration.
///
/// The handler itself returns immediately with a pause request; the engine
/// persists the run state and parks it on a timer at the node boundary, so
/// the suspension neither busy-waits nor trips the per-node timeout.
pub struct DelayHandler;

#[async_trait]
impl NodeHandler for DelayHandler {
    fn handler_type(&self) -> &str {
        "delay"
    }

    async fn execute(&self, config: &VarMap, _ctx: &ExecutionContext) -> Result<HandlerOutcome, NodeError> {
        let duration = if let Some(ms) = config.get("delay_ms").and_then(Value::as_u64) {
            Duration::from_millis(ms)
        } else if let Some(secs) = config.get("delay_seconds").and_then(Value::as_u64) {
            Duration::from_secs(secs)
        } else {
            return Err(NodeError::Config(
                "delay node needs 'delay_seconds' or 'delay_ms'".to_string(),
            ));
        };
        Ok(HandlerOutcome::advance().with_pause(duration))
    }
}
