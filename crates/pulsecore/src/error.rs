use thiserror::Error;

/// Run-scope errors produced by the engine and its collaborators.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Broken definition (missing start node, unknown node type). Fatal,
    /// never retried; requires a definition fix.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("node error: {0}")]
    Node(#[from] NodeError),

    /// A retryable node failure that exhausted the run's retry allowance.
    #[error("node '{node_id}' failed after {retries} retries: {source}")]
    RetriesExhausted {
        node_id: String,
        retries: u32,
        #[source]
        source: NodeError,
    },

    /// The run consumed its node budget before reaching a terminal point,
    /// which signals a cyclic or malformed graph that escaped validation.
    #[error("node budget exceeded: {limit} steps executed without reaching an end node")]
    NodeBudgetExceeded { limit: u32 },

    /// The run outlived its wall-clock budget.
    #[error("execution timeout: exceeded {seconds}s wall-clock budget")]
    DeadlineExceeded { seconds: u64 },

    /// Rejected before any execution record exists; reported directly to
    /// the caller and never retried by the engine.
    #[error("admission rejected: {0}")]
    AdmissionRejected(RejectReason),

    #[error("workflow not found: {0}")]
    WorkflowNotFound(uuid::Uuid),

    #[error("execution not found: {0}")]
    ExecutionNotFound(uuid::Uuid),

    /// Attempted backward or terminal-record mutation of an execution.
    #[error("illegal status transition: {from} -> {to}")]
    IllegalTransition { from: &'static str, to: &'static str },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Fatal errors terminate the run without retrying the current node.
    pub fn is_fatal(&self) -> bool {
        match self {
            EngineError::Node(e) => !e.is_retryable(),
            _ => true,
        }
    }
}

/// Node-scope errors surfaced by handlers.
#[derive(Error, Debug, Clone)]
pub enum NodeError {
    /// The node's own config is unusable. Fatal for the run.
    #[error("node configuration error: {0}")]
    Config(String),

    /// Transient execution failure, retried with backoff.
    #[error("node execution failed: {0}")]
    Failed(String),

    /// A condition predicate referenced a variable absent from the context.
    /// Treated as a node failure, never a silent default branch.
    #[error("missing context variable: {0}")]
    MissingVariable(String),

    /// The handler exceeded its per-node timeout. Retryable at node scope.
    #[error("node timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("cancelled")]
    Cancelled,
}

impl NodeError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NodeError::Failed(_) | NodeError::MissingVariable(_) | NodeError::Timeout { .. }
        )
    }
}

/// Why an admission request was rejected.
///
/// The engine never retries a rejected admission; no execution record exists
/// for it. The external HTTP layer maps reasons onto status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    UnknownWorkflow,
    CrossTenant,
    Inactive,
    ConcurrencyLimit,
    DailyQuota,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::UnknownWorkflow => "unknown workflow",
            RejectReason::CrossTenant => "cross-tenant",
            RejectReason::Inactive => "workflow inactive",
            RejectReason::ConcurrencyLimit => "concurrency limit",
            RejectReason::DailyQuota => "daily quota exceeded",
        }
    }

    /// HTTP status the external API layer mirrors this rejection as.
    pub fn http_status(&self) -> u16 {
        match self {
            RejectReason::UnknownWorkflow => 404,
            RejectReason::CrossTenant => 403,
            RejectReason::Inactive => 409,
            RejectReason::ConcurrencyLimit | RejectReason::DailyQuota => 429,
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
