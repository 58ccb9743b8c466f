use crate::{
    AdmissionDecision, EngineConfig, ExecutionEngine, ExecutionStore, GraphValidator,
    HandlerRegistry, IsolationGovernor, MemoryStore, TriggerOutcome, TriggerRouter,
    ValidationReport,
};
use pulsecore::{
    EngineError, EventBus, ExecutionEvent, ExecutionId, TenantId, TriggerType, VarMap,
    WorkflowDefinition, WorkflowExecution, WorkflowId,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Configuration for the runtime.
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    pub engine: EngineConfig,
    pub event_buffer_size: usize,
}

impl RuntimeConfig {
    fn buffer(&self) -> usize {
        if self.event_buffer_size == 0 {
            1024
        } else {
            self.event_buffer_size
        }
    }
}

/// Facade wiring the store, handler registry, engine, governor and trigger
/// router together behind one surface.
pub struct PulseRuntime {
    store: Arc<dyn ExecutionStore>,
    registry: Arc<HandlerRegistry>,
    engine: Arc<ExecutionEngine>,
    governor: Arc<IsolationGovernor>,
    router: TriggerRouter,
    events: Arc<EventBus>,
    cancellations: Arc<Mutex<HashMap<ExecutionId, CancellationToken>>>,
}

impl PulseRuntime {
    /// Runtime with built-in handlers only and an in-memory store.
    pub fn new() -> Self {
        Self::with_registry(Arc::new(HandlerRegistry::new()), RuntimeConfig::default())
    }

    pub fn with_registry(registry: Arc<HandlerRegistry>, config: RuntimeConfig) -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), registry, config)
    }

    pub fn with_store(
        store: Arc<dyn ExecutionStore>,
        registry: Arc<HandlerRegistry>,
        config: RuntimeConfig,
    ) -> Self {
        let events = Arc::new(EventBus::new(config.buffer()));
        let engine = Arc::new(ExecutionEngine::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&events),
            config.engine.clone(),
        ));
        let governor = Arc::new(IsolationGovernor::new(Arc::clone(&store)));
        let cancellations = Arc::new(Mutex::new(HashMap::new()));
        let router = TriggerRouter::new(
            Arc::clone(&store),
            Arc::clone(&governor),
            Arc::clone(&engine),
            Arc::clone(&cancellations),
        );
        Self {
            store,
            registry,
            engine,
            governor,
            router,
            events,
            cancellations,
        }
    }

    /// Validate and persist a definition. A definition failing validation is
    /// stored deactivated with the errors surfaced to the caller.
    pub async fn deploy(
        &self,
        mut definition: WorkflowDefinition,
    ) -> Result<ValidationReport, EngineError> {
        let report = GraphValidator::validate(&definition.graph);
        for warning in &report.warnings {
            tracing::warn!(workflow_id = %definition.id, warning, "graph validation warning");
        }
        if !report.is_valid() {
            tracing::warn!(
                workflow_id = %definition.id,
                errors = report.errors.len(),
                "definition failed validation, forcing inactive"
            );
            definition.is_active = false;
        }
        self.store.upsert_workflow(definition).await?;
        Ok(report)
    }

    /// Route an external event to every matching active workflow.
    pub async fn handle_event(
        &self,
        trigger: TriggerType,
        payload: VarMap,
    ) -> Result<Vec<TriggerOutcome>, EngineError> {
        self.router.on_event(trigger, payload).await
    }

    /// Admission decision only, for callers that surface limits externally.
    pub async fn admit(
        &self,
        tenant_id: TenantId,
        workflow_id: WorkflowId,
        input_data: VarMap,
    ) -> AdmissionDecision {
        self.governor.admit(tenant_id, workflow_id, input_data).await
    }

    /// Manually trigger one workflow and wait for its terminal record.
    /// Manual runs pass through admission like any other trigger.
    pub async fn execute_workflow(
        &self,
        tenant_id: TenantId,
        workflow_id: WorkflowId,
        input_data: VarMap,
    ) -> Result<WorkflowExecution, EngineError> {
        let decision = self
            .governor
            .admit(tenant_id, workflow_id, input_data)
            .await;
        let Some(execution) = decision.execution else {
            let reason = decision
                .reason
                .unwrap_or(pulsecore::RejectReason::UnknownWorkflow);
            return Err(EngineError::AdmissionRejected(reason));
        };

        let definition = self.store.workflow(workflow_id).await?;
        let token = CancellationToken::new();
        if let Ok(mut cancellations) = self.cancellations.lock() {
            cancellations.insert(execution.id, token.clone());
        }
        let record = self.engine.run(&definition, execution, token).await;
        self.governor.release(tenant_id);
        if let Ok(mut cancellations) = self.cancellations.lock() {
            cancellations.remove(&record.id);
        }
        Ok(record)
    }

    /// Request cooperative cancellation; takes effect at the next node
    /// boundary. Returns false when the run is no longer in flight.
    pub fn cancel(&self, execution_id: ExecutionId) -> bool {
        match self.cancellations.lock() {
            Ok(cancellations) => match cancellations.get(&execution_id) {
                Some(token) => {
                    token.cancel();
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.events.subscribe()
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn ExecutionStore> {
        &self.store
    }
}

impl Default for PulseRuntime {
    fn default() -> Self {
        Self::new()
    }
}
