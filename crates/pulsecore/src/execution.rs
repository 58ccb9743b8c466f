use crate::{EngineError, ExecutionId, TenantId, VarMap, WorkflowId, WorkflowLimits};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// One instantiation of a workflow for a specific trigger.
///
/// Created only by a successful admission decision, mutated exclusively by
/// the engine while running, immutable once terminal (retained for audit).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub tenant_id: TenantId,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub input_data: VarMap,
    pub output_data: Option<VarMap>,
    #[serde(default)]
    pub execution_log: Vec<ExecutionLogEntry>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl WorkflowExecution {
    pub fn new(workflow_id: WorkflowId, tenant_id: TenantId, input_data: VarMap) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            tenant_id,
            status: ExecutionStatus::Pending,
            input_data,
            output_data: None,
            execution_log: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Move to `next`, rejecting backward or terminal-record mutations.
    pub fn transition(&mut self, next: ExecutionStatus) -> Result<(), EngineError> {
        if !self.status.can_transition(next) {
            return Err(EngineError::IllegalTransition {
                from: self.status.as_str(),
                to: next.as_str(),
            });
        }
        if next == ExecutionStatus::Running && self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        self.status = next;
        Ok(())
    }

    pub fn log_node(&mut self, entry: ExecutionLogEntry) {
        self.execution_log.push(entry);
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Run status; transitions are monotonic, never backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }

    pub fn can_transition(&self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one node attempt, ordered within the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub node_id: String,
    pub status: NodeRunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRunStatus {
    Completed,
    Failed,
}

/// Per-run mutable state threaded through handlers. Never persisted.
#[derive(Debug)]
pub struct ExecutionContext {
    pub current_node_id: String,
    pub variables: VarMap,
    pub visited: HashSet<String>,
    pub remaining_node_budget: u32,
    pub deadline: Instant,
    pub cancellation: CancellationToken,
}

impl ExecutionContext {
    pub fn new(variables: VarMap, limits: &WorkflowLimits) -> Self {
        Self {
            current_node_id: String::new(),
            variables,
            visited: HashSet::new(),
            remaining_node_budget: limits.max_nodes,
            deadline: Instant::now() + Duration::from_secs(limits.max_execution_time_seconds),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn variable(&self, name: &str) -> Option<&serde_json::Value> {
        self.variables.get(name)
    }

    /// Merge a handler's context delta into the variable bag.
    pub fn apply_delta(&mut self, delta: VarMap) {
        for (key, value) in delta {
            self.variables.insert(key, value);
        }
    }

    pub fn deadline_exceeded(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub fn time_remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}
