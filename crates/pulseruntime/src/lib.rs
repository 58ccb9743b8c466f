//! Workflow execution runtime
//!
//! This crate hosts everything that runs a workflow once it is defined:
//! graph validation, the handler registry with the engine-owned built-in
//! kinds, the sequential per-run execution engine, the per-tenant isolation
//! governor, the trigger router and the storage seam.

mod builtin;
mod engine;
mod governor;
mod registry;
mod router;
mod runtime;
mod store;
mod validator;

pub use builtin::{ConditionHandler, DelayHandler, EndHandler, StartHandler};
pub use engine::{EngineConfig, ExecutionEngine, RetryPolicy};
pub use governor::{AdmissionDecision, AdmissionLimits, IsolationGovernor};
pub use registry::HandlerRegistry;
pub use router::{TriggerOutcome, TriggerRouter};
pub use runtime::{PulseRuntime, RuntimeConfig};
pub use store::{ExecutionStore, MemoryStore};
pub use validator::{GraphValidator, ValidationReport};
