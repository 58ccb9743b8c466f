use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pulsecore::{
    EngineError, ExecutionId, TenantId, TriggerType, WorkflowDefinition, WorkflowExecution,
    WorkflowId,
};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Storage seam for definitions and execution records.
///
/// The engine persists each run incrementally through this trait (creation,
/// every node step, terminal state); the concrete backend is out of scope
/// beyond the record shapes, so the default is an in-memory map.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn upsert_workflow(&self, definition: WorkflowDefinition) -> Result<(), EngineError>;
    async fn workflow(&self, id: WorkflowId) -> Result<WorkflowDefinition, EngineError>;
    async fn active_workflows_for_trigger(
        &self,
        trigger: TriggerType,
    ) -> Result<Vec<WorkflowDefinition>, EngineError>;

    async fn insert_execution(&self, execution: WorkflowExecution) -> Result<(), EngineError>;
    async fn update_execution(&self, execution: WorkflowExecution) -> Result<(), EngineError>;
    async fn execution(&self, id: ExecutionId) -> Result<WorkflowExecution, EngineError>;
    async fn executions_for_tenant(
        &self,
        tenant_id: TenantId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<WorkflowExecution>, EngineError>;
}

/// In-memory store backed by `tokio::sync::RwLock` maps.
#[derive(Default)]
pub struct MemoryStore {
    workflows: RwLock<HashMap<WorkflowId, WorkflowDefinition>>,
    executions: RwLock<HashMap<ExecutionId, WorkflowExecution>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionStore for MemoryStore {
    async fn upsert_workflow(&self, definition: WorkflowDefinition) -> Result<(), EngineError> {
        self.workflows.write().await.insert(definition.id, definition);
        Ok(())
    }

    async fn workflow(&self, id: WorkflowId) -> Result<WorkflowDefinition, EngineError> {
        self.workflows
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(EngineError::WorkflowNotFound(id))
    }

    async fn active_workflows_for_trigger(
        &self,
        trigger: TriggerType,
    ) -> Result<Vec<WorkflowDefinition>, EngineError> {
        Ok(self
            .workflows
            .read()
            .await
            .values()
            .filter(|w| w.is_active && w.trigger_type == trigger)
            .cloned()
            .collect())
    }

    async fn insert_execution(&self, execution: WorkflowExecution) -> Result<(), EngineError> {
        self.executions.write().await.insert(execution.id, execution);
        Ok(())
    }

    /// Terminal records are immutable: a write that would change one is a
    /// bug in the caller, not a storage race.
    async fn update_execution(&self, execution: WorkflowExecution) -> Result<(), EngineError> {
        let mut executions = self.executions.write().await;
        if let Some(existing) = executions.get(&execution.id) {
            if existing.is_terminal() {
                return Err(EngineError::IllegalTransition {
                    from: existing.status.as_str(),
                    to: execution.status.as_str(),
                });
            }
        }
        executions.insert(execution.id, execution);
        Ok(())
    }

    async fn execution(&self, id: ExecutionId) -> Result<WorkflowExecution, EngineError> {
        self.executions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(EngineError::ExecutionNotFound(id))
    }

    async fn executions_for_tenant(
        &self,
        tenant_id: TenantId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<WorkflowExecution>, EngineError> {
        let mut records: Vec<WorkflowExecution> = self
            .executions
            .read()
            .await
            .values()
            .filter(|e| e.tenant_id == tenant_id)
            .filter(|e| since.map(|cutoff| e.created_at >= cutoff).unwrap_or(true))
            .cloned()
            .collect();
        records.sort_by_key(|e| e.created_at);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulsecore::{ExecutionStatus, VarMap};
    use uuid::Uuid;

    #[tokio::test]
    async fn terminal_records_cannot_be_overwritten() {
        let store = MemoryStore::new();
        let mut execution =
            WorkflowExecution::new(Uuid::new_v4(), Uuid::new_v4(), VarMap::new());
        execution.transition(ExecutionStatus::Running).unwrap();
        execution.transition(ExecutionStatus::Completed).unwrap();
        store.insert_execution(execution.clone()).await.unwrap();

        let mut tampered = execution.clone();
        tampered.status = ExecutionStatus::Running;
        let err = store.update_execution(tampered).await.unwrap_err();
        assert!(matches!(err, EngineError::IllegalTransition { .. }));

        let stored = store.execution(execution.id).await.unwrap();
        assert_eq!(stored.status, ExecutionStatus::Completed);
    }
}
