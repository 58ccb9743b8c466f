use crate::{ExecutionEngine, ExecutionStore, IsolationGovernor};
use pulsecore::{
    EngineError, ExecutionId, RejectReason, TriggerType, VarMap, WorkflowId,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// What happened to one matching workflow when an event arrived.
#[derive(Debug, Clone)]
pub enum TriggerOutcome {
    Started {
        workflow_id: WorkflowId,
        execution_id: ExecutionId,
    },
    /// Rejected admissions are logged and the trigger is dropped, not
    /// queued; the event is lost for this workflow.
    Dropped {
        workflow_id: WorkflowId,
        reason: RejectReason,
    },
}

/// Receives external events, resolves matching active definitions and hands
/// each through the governor to the engine.
///
/// Each admitted run executes on its own task; traversal inside a run stays
/// sequential. There is no ordering guarantee across runs.
pub struct TriggerRouter {
    store: Arc<dyn ExecutionStore>,
    governor: Arc<IsolationGovernor>,
    engine: Arc<ExecutionEngine>,
    cancellations: Arc<Mutex<HashMap<ExecutionId, CancellationToken>>>,
}

impl TriggerRouter {
    pub fn new(
        store: Arc<dyn ExecutionStore>,
        governor: Arc<IsolationGovernor>,
        engine: Arc<ExecutionEngine>,
        cancellations: Arc<Mutex<HashMap<ExecutionId, CancellationToken>>>,
    ) -> Self {
        Self {
            store,
            governor,
            engine,
            cancellations,
        }
    }

    pub async fn on_event(
        &self,
        trigger: TriggerType,
        payload: VarMap,
    ) -> Result<Vec<TriggerOutcome>, EngineError> {
        let definitions = self.store.active_workflows_for_trigger(trigger).await?;
        let mut outcomes = Vec::new();

        for definition in definitions {
            if !filter_matches(&definition.trigger_config, &payload) {
                tracing::debug!(workflow_id = %definition.id, "trigger filter did not match, skipping");
                continue;
            }

            let decision = self
                .governor
                .admit(definition.tenant_id, definition.id, payload.clone())
                .await;

            let Some(execution) = decision.execution else {
                let reason = decision.reason.unwrap_or(RejectReason::UnknownWorkflow);
                tracing::warn!(
                    workflow_id = %definition.id,
                    tenant_id = %definition.tenant_id,
                    %reason,
                    "trigger dropped"
                );
                outcomes.push(TriggerOutcome::Dropped {
                    workflow_id: definition.id,
                    reason,
                });
                continue;
            };

            let execution_id = execution.id;
            let token = CancellationToken::new();
            if let Ok(mut cancellations) = self.cancellations.lock() {
                cancellations.insert(execution_id, token.clone());
            }

            let engine = Arc::clone(&self.engine);
            let governor = Arc::clone(&self.governor);
            let cancellations = Arc::clone(&self.cancellations);
            let workflow_id = definition.id;
            tokio::spawn(async move {
                let record = engine.run(&definition, execution, token).await;
                governor.release(record.tenant_id);
                if let Ok(mut cancellations) = cancellations.lock() {
                    cancellations.remove(&record.id);
                }
            });

            outcomes.push(TriggerOutcome::Started {
                workflow_id,
                execution_id,
            });
        }

        Ok(outcomes)
    }
}

/// The optional `filter` object in trigger_config must match the payload
/// field-for-field for the workflow to fire.
fn filter_matches(trigger_config: &VarMap, payload: &VarMap) -> bool {
    match trigger_config.get("filter") {
        Some(Value::Object(filter)) => filter
            .iter()
            .all(|(field, expected)| payload.get(field) == Some(expected)),
        _ => true,
    }
}
