use crate::{ExecutionId, ExecutionStatus, TenantId, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Lifecycle events emitted while a run progresses, for external
/// subscribers (notification fan-out, live editor views, audit sinks).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    #[serde(rename = "execution.started")]
    Started {
        execution_id: ExecutionId,
        workflow_id: WorkflowId,
        tenant_id: TenantId,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "execution.node.completed")]
    NodeCompleted {
        execution_id: ExecutionId,
        node_id: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "execution.completed")]
    Completed {
        execution_id: ExecutionId,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "execution.failed")]
    Failed {
        execution_id: ExecutionId,
        status: ExecutionStatus,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl ExecutionEvent {
    pub fn execution_id(&self) -> ExecutionId {
        match self {
            ExecutionEvent::Started { execution_id, .. }
            | ExecutionEvent::NodeCompleted { execution_id, .. }
            | ExecutionEvent::Completed { execution_id, .. }
            | ExecutionEvent::Failed { execution_id, .. } => *execution_id,
        }
    }
}

/// In-process broadcast bus for execution events.
///
/// Slow or absent subscribers never block the engine; a send with no
/// receivers is not an error.
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let _ = self.sender.send(event);
    }
}
