use crate::{ExecutionStore, HandlerRegistry};
use chrono::Utc;
use pulsecore::{
    EngineError, EventBus, ExecutionContext, ExecutionEvent, ExecutionLogEntry, ExecutionStatus,
    NodeError, NodeKind, NodeRunStatus, VarMap, WorkflowDefinition, WorkflowExecution,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Exponential backoff with a cap for node-level retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            multiplier: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `attempt` (1-based): base * multiplier^(n-1), capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31) as i32;
        let raw = self.base_delay_ms as f64 * self.multiplier.powi(exp);
        Duration::from_millis((raw as u64).min(self.max_delay_ms))
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Hard per-node timeout; a stuck handler is abandoned and the attempt
    /// counts as a retryable failure.
    pub node_timeout_ms: u64,
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            node_timeout_ms: 30_000,
            retry: RetryPolicy::default(),
        }
    }
}

/// Walks the graph for one run, dispatching to handlers and updating the
/// execution record incrementally.
///
/// Traversal within a run is strictly sequential; branching is exclusive-or
/// through condition output slots. Parallelism exists only across runs.
pub struct ExecutionEngine {
    store: Arc<dyn ExecutionStore>,
    registry: Arc<HandlerRegistry>,
    events: Arc<EventBus>,
    config: EngineConfig,
}

impl ExecutionEngine {
    pub fn new(
        store: Arc<dyn ExecutionStore>,
        registry: Arc<HandlerRegistry>,
        events: Arc<EventBus>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            registry,
            events,
            config,
        }
    }

    /// Drive `execution` (a freshly admitted Pending record) to a terminal
    /// status. Failures are encoded in the returned record, not the return
    /// type: a failed run is a normal outcome that retains its log for audit.
    pub async fn run(
        &self,
        definition: &WorkflowDefinition,
        mut execution: WorkflowExecution,
        cancellation: CancellationToken,
    ) -> WorkflowExecution {
        let run_started = Instant::now();

        if let Err(e) = execution.transition(ExecutionStatus::Running) {
            tracing::error!(execution_id = %execution.id, error = %e, "cannot start execution");
            return execution;
        }
        self.persist(&execution).await;
        self.events.emit(ExecutionEvent::Started {
            execution_id: execution.id,
            workflow_id: execution.workflow_id,
            tenant_id: execution.tenant_id,
            timestamp: Utc::now(),
        });
        tracing::info!(
            execution_id = %execution.id,
            workflow = %definition.name,
            "starting workflow execution"
        );

        // Locate the start node before any handler runs; its absence is a
        // definition bug, not a node failure.
        let Some(start_id) = definition.graph.start_node() else {
            return self
                .fail(
                    execution,
                    EngineError::Configuration("workflow has no start node".to_string()),
                )
                .await;
        };

        let mut ctx = ExecutionContext::new(execution.input_data.clone(), &definition.limits)
            .with_cancellation(cancellation);
        ctx.current_node_id = start_id.to_string();

        loop {
            // Cancellation is cooperative and only observed here, at the
            // node boundary; an in-flight handler is never interrupted.
            if ctx.cancellation.is_cancelled() {
                return self.cancel(execution).await;
            }
            if ctx.deadline_exceeded() {
                return self
                    .fail(
                        execution,
                        EngineError::DeadlineExceeded {
                            seconds: definition.limits.max_execution_time_seconds,
                        },
                    )
                    .await;
            }
            // Guards against cyclic or malformed graphs escaping validation.
            if ctx.remaining_node_budget == 0 {
                return self
                    .fail(
                        execution,
                        EngineError::NodeBudgetExceeded {
                            limit: definition.limits.max_nodes,
                        },
                    )
                    .await;
            }

            let node_id = ctx.current_node_id.clone();
            let Some(node) = definition.graph.node(&node_id) else {
                return self
                    .fail(
                        execution,
                        EngineError::Configuration(format!(
                            "edge targets unknown node '{node_id}'"
                        )),
                    )
                    .await;
            };
            let handler = match self.registry.dispatch(&node.kind) {
                Ok(handler) => handler,
                Err(e) => return self.fail(execution, e).await,
            };

            // Attempt loop: the same node is re-tried with backoff until it
            // succeeds, exhausts the run's retries, or fails fatally.
            let (outcome, duration_ms) = loop {
                let attempt_started = Utc::now();
                let attempt_clock = Instant::now();
                let result = match timeout(
                    Duration::from_millis(self.config.node_timeout_ms),
                    handler.execute(&node.config, &ctx),
                )
                .await
                {
                    Ok(inner) => inner,
                    Err(_elapsed) => Err(NodeError::Timeout {
                        ms: self.config.node_timeout_ms,
                    }),
                };
                let completed = Utc::now();

                match result {
                    Ok(outcome) => {
                        execution.log_node(ExecutionLogEntry {
                            node_id: node_id.clone(),
                            status: NodeRunStatus::Completed,
                            started_at: attempt_started,
                            completed_at: completed,
                            error: None,
                        });
                        break (outcome, attempt_clock.elapsed().as_millis() as u64);
                    }
                    Err(err) => {
                        execution.log_node(ExecutionLogEntry {
                            node_id: node_id.clone(),
                            status: NodeRunStatus::Failed,
                            started_at: attempt_started,
                            completed_at: completed,
                            error: Some(err.to_string()),
                        });
                        if !err.is_retryable() {
                            return self.fail(execution, EngineError::Node(err)).await;
                        }
                        execution.retry_count += 1;
                        if execution.retry_count > execution.max_retries {
                            let retries = execution.max_retries;
                            return self
                                .fail(
                                    execution,
                                    EngineError::RetriesExhausted {
                                        node_id: node_id.clone(),
                                        retries,
                                        source: err,
                                    },
                                )
                                .await;
                        }
                        let delay = self.config.retry.delay_for(execution.retry_count);
                        tracing::warn!(
                            execution_id = %execution.id,
                            node_id,
                            retry = execution.retry_count,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "node failed, backing off before re-attempt"
                        );
                        self.persist(&execution).await;
                        tokio::time::sleep(delay).await;
                        if ctx.cancellation.is_cancelled() {
                            return self.cancel(execution).await;
                        }
                        if ctx.deadline_exceeded() {
                            return self
                                .fail(
                                    execution,
                                    EngineError::DeadlineExceeded {
                                        seconds: definition.limits.max_execution_time_seconds,
                                    },
                                )
                                .await;
                        }
                    }
                }
            };

            ctx.visited.insert(node_id.clone());
            ctx.remaining_node_budget -= 1;
            ctx.apply_delta(outcome.delta);
            self.persist(&execution).await;
            self.events.emit(ExecutionEvent::NodeCompleted {
                execution_id: execution.id,
                node_id: node_id.clone(),
                duration_ms,
                timestamp: Utc::now(),
            });

            // A delay node parks the run here, at the node boundary, with its
            // state already persisted. The timer is the continuation; nothing
            // busy-waits and the per-node timeout never sees the pause.
            if let Some(pause) = outcome.pause {
                tracing::debug!(execution_id = %execution.id, node_id, ?pause, "suspending run");
                tokio::select! {
                    _ = tokio::time::sleep(pause) => {}
                    _ = ctx.cancellation.cancelled() => {}
                }
                if ctx.cancellation.is_cancelled() {
                    return self.cancel(execution).await;
                }
            }

            // Reaching an end node, or a node with no matching outgoing
            // edge, is normal completion.
            if node.kind == NodeKind::End {
                return self.complete(execution, ctx.variables, run_started).await;
            }
            match definition.graph.edge_from(&node_id, &outcome.next_slot) {
                Some(edge) => ctx.current_node_id = edge.target.clone(),
                None => return self.complete(execution, ctx.variables, run_started).await,
            }
        }
    }

    async fn complete(
        &self,
        mut execution: WorkflowExecution,
        variables: VarMap,
        run_started: Instant,
    ) -> WorkflowExecution {
        execution.output_data = Some(variables);
        if let Err(e) = execution.transition(ExecutionStatus::Completed) {
            tracing::error!(execution_id = %execution.id, error = %e, "completion transition rejected");
        }
        self.persist(&execution).await;
        self.events.emit(ExecutionEvent::Completed {
            execution_id: execution.id,
            duration_ms: run_started.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
        });
        tracing::info!(
            execution_id = %execution.id,
            steps = execution.execution_log.len(),
            "workflow execution completed"
        );
        execution
    }

    async fn fail(&self, mut execution: WorkflowExecution, err: EngineError) -> WorkflowExecution {
        execution.error_message = Some(err.to_string());
        if let Err(e) = execution.transition(ExecutionStatus::Failed) {
            tracing::error!(execution_id = %execution.id, error = %e, "failure transition rejected");
        }
        self.persist(&execution).await;
        self.events.emit(ExecutionEvent::Failed {
            execution_id: execution.id,
            status: ExecutionStatus::Failed,
            error: err.to_string(),
            timestamp: Utc::now(),
        });
        tracing::error!(execution_id = %execution.id, error = %err, "workflow execution failed");
        execution
    }

    async fn cancel(&self, mut execution: WorkflowExecution) -> WorkflowExecution {
        execution.error_message = Some("cancelled at node boundary".to_string());
        if let Err(e) = execution.transition(ExecutionStatus::Cancelled) {
            tracing::error!(execution_id = %execution.id, error = %e, "cancel transition rejected");
        }
        self.persist(&execution).await;
        self.events.emit(ExecutionEvent::Failed {
            execution_id: execution.id,
            status: ExecutionStatus::Cancelled,
            error: "cancelled at node boundary".to_string(),
            timestamp: Utc::now(),
        });
        tracing::info!(execution_id = %execution.id, "workflow execution cancelled");
        execution
    }

    /// Incremental persistence must not kill a run midway; a failed write is
    /// logged and the in-memory record stays authoritative until terminal.
    async fn persist(&self, execution: &WorkflowExecution) {
        if let Err(e) = self.store.update_execution(execution.clone()).await {
            tracing::warn!(execution_id = %execution.id, error = %e, "failed to persist execution");
        }
    }
}
