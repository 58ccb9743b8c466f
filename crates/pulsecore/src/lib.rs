//! Core abstractions for the Pulse automation engine
//!
//! This crate provides the data model shared by every other component:
//! tenant-owned workflow definitions, execution records, the handler
//! contract, the error taxonomy and the lifecycle event bus.

mod error;
mod events;
mod execution;
mod handler;
mod workflow;

pub use error::{EngineError, NodeError, RejectReason};
pub use events::{EventBus, ExecutionEvent};
pub use execution::{
    ExecutionContext, ExecutionLogEntry, ExecutionStatus, NodeRunStatus, WorkflowExecution,
    DEFAULT_MAX_RETRIES,
};
pub use handler::{HandlerOutcome, NodeHandler};
pub use workflow::{
    Edge, Graph, Node, NodeKind, TriggerType, WorkflowDefinition, WorkflowLimits,
};

pub type TenantId = uuid::Uuid;
pub type WorkflowId = uuid::Uuid;
pub type ExecutionId = uuid::Uuid;

/// Context variables as they appear in trigger payloads and node deltas.
pub type VarMap = serde_json::Map<String, serde_json::Value>;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
