//! End-to-end engine tests over the in-memory store: traversal, branching,
//! retry bookkeeping, budgets, timeouts and cancellation.

use async_trait::async_trait;
use pulsecore::{
    EventBus, ExecutionContext, ExecutionEvent, ExecutionStatus, HandlerOutcome, NodeError,
    NodeHandler, NodeKind, NodeRunStatus, Node, TriggerType, VarMap, WorkflowDefinition,
    WorkflowExecution,
};
use pulseruntime::{EngineConfig, ExecutionEngine, ExecutionStore, HandlerRegistry, MemoryStore, RetryPolicy};
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Sets a marker variable named by its config.
struct MarkHandler {
    handler_type: &'static str,
    marker: &'static str,
    calls: Arc<AtomicU32>,
}

impl MarkHandler {
    fn new(handler_type: &'static str, marker: &'static str) -> (Self, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        (
            Self {
                handler_type,
                marker,
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

#[async_trait]
impl NodeHandler for MarkHandler {
    fn handler_type(&self) -> &str {
        self.handler_type
    }

    async fn execute(&self, _config: &VarMap, _ctx: &ExecutionContext) -> Result<HandlerOutcome, NodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(HandlerOutcome::advance().with_var(self.marker, true))
    }
}

/// Fails a fixed number of times, then succeeds.
struct FlakyHandler {
    remaining_failures: AtomicU32,
}

#[async_trait]
impl NodeHandler for FlakyHandler {
    fn handler_type(&self) -> &str {
        "test.flaky"
    }

    async fn execute(&self, _config: &VarMap, _ctx: &ExecutionContext) -> Result<HandlerOutcome, NodeError> {
        let before = self.remaining_failures.fetch_update(
            Ordering::SeqCst,
            Ordering::SeqCst,
            |n| if n > 0 { Some(n - 1) } else { None },
        );
        match before {
            Ok(_) => Err(NodeError::Failed("transient upstream error".to_string())),
            Err(_) => Ok(HandlerOutcome::advance().with_var("recovered", true)),
        }
    }
}

/// Never returns within any sane per-node timeout.
struct StuckHandler;

#[async_trait]
impl NodeHandler for StuckHandler {
    fn handler_type(&self) -> &str {
        "test.stuck"
    }

    async fn execute(&self, _config: &VarMap, _ctx: &ExecutionContext) -> Result<HandlerOutcome, NodeError> {
        tokio::time::sleep(std::time::Duration::from_secs(600)).await;
        Ok(HandlerOutcome::advance())
    }
}

fn fast_config() -> EngineConfig {
    EngineConfig {
        node_timeout_ms: 200,
        retry: RetryPolicy {
            base_delay_ms: 5,
            multiplier: 2.0,
            max_delay_ms: 40,
        },
    }
}

fn engine_with(
    registry: HandlerRegistry,
    config: EngineConfig,
) -> (ExecutionEngine, Arc<MemoryStore>, Arc<EventBus>) {
    let store = Arc::new(MemoryStore::new());
    let events = Arc::new(EventBus::new(256));
    let engine = ExecutionEngine::new(
        Arc::clone(&store) as Arc<dyn ExecutionStore>,
        Arc::new(registry),
        Arc::clone(&events),
        config,
    );
    (engine, store, events)
}

fn definition(tenant: Uuid) -> WorkflowDefinition {
    let mut definition = WorkflowDefinition::new(tenant, "test workflow", TriggerType::Manual);
    definition.is_active = true;
    definition
}

fn pending(definition: &WorkflowDefinition, input: VarMap) -> WorkflowExecution {
    WorkflowExecution::new(definition.id, definition.tenant_id, input)
}

fn input(pairs: &[(&str, serde_json::Value)]) -> VarMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[tokio::test]
async fn linear_graph_completes_with_accumulated_output() {
    let mut registry = HandlerRegistry::new();
    let (mark, _) = MarkHandler::new("test.mark", "marked");
    registry.register(Arc::new(mark));

    let tenant = Uuid::new_v4();
    let mut def = definition(tenant);
    def.graph
        .add_node("start", Node::new(NodeKind::Start))
        .add_node("step", Node::new(NodeKind::action("test.mark")))
        .add_node("end", Node::new(NodeKind::End));
    def.graph.connect("start", "step");
    def.graph.connect("step", "end");

    let (engine, store, events) = engine_with(registry, fast_config());
    let mut rx = events.subscribe();

    let record = engine
        .run(&def, pending(&def, input(&[("name", json!("Ada"))])), CancellationToken::new())
        .await;

    assert_eq!(record.status, ExecutionStatus::Completed);
    assert_eq!(record.tenant_id, tenant);
    assert!(record.started_at.is_some() && record.completed_at.is_some());

    let output = record.output_data.as_ref().unwrap();
    assert_eq!(output.get("name"), Some(&json!("Ada")));
    assert_eq!(output.get("marked"), Some(&json!(true)));

    let node_ids: Vec<&str> = record
        .execution_log
        .iter()
        .map(|e| e.node_id.as_str())
        .collect();
    assert_eq!(node_ids, vec!["start", "step", "end"]);
    assert!(record
        .execution_log
        .iter()
        .all(|e| e.status == NodeRunStatus::Completed));

    // Persisted terminal record matches the returned one.
    let stored = store.execution(record.id).await.unwrap();
    assert_eq!(stored.status, ExecutionStatus::Completed);

    // Lifecycle events: started, three node completions, completed.
    assert!(matches!(rx.recv().await.unwrap(), ExecutionEvent::Started { .. }));
    for _ in 0..3 {
        assert!(matches!(
            rx.recv().await.unwrap(),
            ExecutionEvent::NodeCompleted { .. }
        ));
    }
    assert!(matches!(
        rx.recv().await.unwrap(),
        ExecutionEvent::Completed { .. }
    ));
}

#[tokio::test]
async fn missing_start_node_fails_without_invoking_any_handler() {
    let mut registry = HandlerRegistry::new();
    let (mark, calls) = MarkHandler::new("test.mark", "marked");
    registry.register(Arc::new(mark));

    let mut def = definition(Uuid::new_v4());
    def.graph
        .add_node("step", Node::new(NodeKind::action("test.mark")))
        .add_node("end", Node::new(NodeKind::End));
    def.graph.connect("step", "end");

    let (engine, _, _) = engine_with(registry, fast_config());
    let record = engine
        .run(&def, pending(&def, VarMap::new()), CancellationToken::new())
        .await;

    assert_eq!(record.status, ExecutionStatus::Failed);
    assert!(record.error_message.as_ref().unwrap().contains("no start node"));
    assert!(record.execution_log.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn flaky_node_is_retried_on_the_same_node_then_succeeds() {
    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(FlakyHandler {
        remaining_failures: AtomicU32::new(2),
    }));

    let mut def = definition(Uuid::new_v4());
    def.graph
        .add_node("start", Node::new(NodeKind::Start))
        .add_node("step", Node::new(NodeKind::action("test.flaky")))
        .add_node("end", Node::new(NodeKind::End));
    def.graph.connect("start", "step");
    def.graph.connect("step", "end");

    let (engine, _, _) = engine_with(registry, fast_config());
    let record = engine
        .run(&def, pending(&def, VarMap::new()), CancellationToken::new())
        .await;

    assert_eq!(record.status, ExecutionStatus::Completed);
    assert_eq!(record.retry_count, 2);

    // Exactly two failed entries followed by one success for that node.
    let step_entries: Vec<_> = record
        .execution_log
        .iter()
        .filter(|e| e.node_id == "step")
        .collect();
    assert_eq!(step_entries.len(), 3);
    assert_eq!(step_entries[0].status, NodeRunStatus::Failed);
    assert_eq!(step_entries[1].status, NodeRunStatus::Failed);
    assert_eq!(step_entries[2].status, NodeRunStatus::Completed);
    assert!(step_entries[0].error.as_ref().unwrap().contains("transient"));

    let output = record.output_data.unwrap();
    assert_eq!(output.get("recovered"), Some(&json!(true)));
}

#[tokio::test]
async fn exhausted_retries_mark_the_run_failed() {
    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(FlakyHandler {
        remaining_failures: AtomicU32::new(u32::MAX),
    }));

    let mut def = definition(Uuid::new_v4());
    def.graph
        .add_node("start", Node::new(NodeKind::Start))
        .add_node("step", Node::new(NodeKind::action("test.flaky")))
        .add_node("end", Node::new(NodeKind::End));
    def.graph.connect("start", "step");
    def.graph.connect("step", "end");

    let (engine, _, _) = engine_with(registry, fast_config());
    let record = engine
        .run(&def, pending(&def, VarMap::new()), CancellationToken::new())
        .await;

    assert_eq!(record.status, ExecutionStatus::Failed);
    assert_eq!(record.retry_count, 4);
    let error = record.error_message.unwrap();
    assert!(error.contains("after 3 retries"), "unexpected error: {error}");

    // Initial attempt plus three retries, all logged.
    let failed_attempts = record
        .execution_log
        .iter()
        .filter(|e| e.node_id == "step" && e.status == NodeRunStatus::Failed)
        .count();
    assert_eq!(failed_attempts, 4);
}

#[tokio::test]
async fn condition_routes_to_the_matching_branch() {
    let mut registry = HandlerRegistry::new();
    let (mark_a, _) = MarkHandler::new("test.mark_a", "took_a");
    let (mark_b, _) = MarkHandler::new("test.mark_b", "took_b");
    registry.register(Arc::new(mark_a));
    registry.register(Arc::new(mark_b));

    let mut def = definition(Uuid::new_v4());
    def.graph
        .add_node("start", Node::new(NodeKind::Start))
        .add_node(
            "check",
            Node::new(NodeKind::Condition)
                .with_config("field", "score")
                .with_config("operator", "greater_than")
                .with_config("value", 50),
        )
        .add_node("action_a", Node::new(NodeKind::action("test.mark_a")))
        .add_node("action_b", Node::new(NodeKind::action("test.mark_b")))
        .add_node("end", Node::new(NodeKind::End));
    def.graph.connect("start", "check");
    def.graph.connect_slot("check", "true", "action_a");
    def.graph.connect_slot("check", "false", "action_b");
    def.graph.connect("action_a", "end");
    def.graph.connect("action_b", "end");

    let registry_b = {
        // Fresh registry for the second run, same handler wiring.
        let mut registry = HandlerRegistry::new();
        let (mark_a, _) = MarkHandler::new("test.mark_a", "took_a");
        let (mark_b, _) = MarkHandler::new("test.mark_b", "took_b");
        registry.register(Arc::new(mark_a));
        registry.register(Arc::new(mark_b));
        registry
    };

    let (engine, _, _) = engine_with(registry, fast_config());
    let high = engine
        .run(&def, pending(&def, input(&[("score", json!(70))])), CancellationToken::new())
        .await;
    assert_eq!(high.status, ExecutionStatus::Completed);
    let path: Vec<&str> = high.execution_log.iter().map(|e| e.node_id.as_str()).collect();
    assert_eq!(path, vec!["start", "check", "action_a", "end"]);
    assert_eq!(high.output_data.unwrap().get("took_a"), Some(&json!(true)));

    let (engine, _, _) = engine_with(registry_b, fast_config());
    let low = engine
        .run(&def, pending(&def, input(&[("score", json!(30))])), CancellationToken::new())
        .await;
    assert_eq!(low.status, ExecutionStatus::Completed);
    let path: Vec<&str> = low.execution_log.iter().map(|e| e.node_id.as_str()).collect();
    assert_eq!(path, vec!["start", "check", "action_b", "end"]);
    assert_eq!(low.output_data.unwrap().get("took_b"), Some(&json!(true)));
}

#[tokio::test]
async fn self_looping_condition_exhausts_the_node_budget() {
    let mut def = definition(Uuid::new_v4());
    def.limits.max_nodes = 50;
    def.graph
        .add_node("start", Node::new(NodeKind::Start))
        .add_node(
            "loop",
            Node::new(NodeKind::Condition)
                .with_config("field", "score")
                .with_config("operator", "greater_than")
                .with_config("value", 50),
        );
    def.graph.connect("start", "loop");
    // Both outputs route back to the condition itself.
    def.graph.connect_slot("loop", "true", "loop");
    def.graph.connect_slot("loop", "false", "loop");

    let (engine, _, _) = engine_with(HandlerRegistry::new(), fast_config());
    let record = engine
        .run(&def, pending(&def, input(&[("score", json!(70))])), CancellationToken::new())
        .await;

    assert_eq!(record.status, ExecutionStatus::Failed);
    assert!(record
        .error_message
        .as_ref()
        .unwrap()
        .contains("budget exceeded"));
    assert_eq!(record.execution_log.len(), 50);
}

#[tokio::test]
async fn unknown_node_type_is_fatal_and_not_retried() {
    let mut def = definition(Uuid::new_v4());
    def.graph
        .add_node("start", Node::new(NodeKind::Start))
        .add_node("mystery", Node::new(NodeKind::action("nope.unknown")));
    def.graph.connect("start", "mystery");

    let (engine, _, _) = engine_with(HandlerRegistry::new(), fast_config());
    let record = engine
        .run(&def, pending(&def, VarMap::new()), CancellationToken::new())
        .await;

    assert_eq!(record.status, ExecutionStatus::Failed);
    assert_eq!(record.retry_count, 0);
    assert!(record
        .error_message
        .as_ref()
        .unwrap()
        .contains("unknown node type"));
}

#[tokio::test]
async fn stuck_handler_times_out_per_node_and_eventually_fails_the_run() {
    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(StuckHandler));

    let mut def = definition(Uuid::new_v4());
    def.graph
        .add_node("start", Node::new(NodeKind::Start))
        .add_node("stuck", Node::new(NodeKind::action("test.stuck")));
    def.graph.connect("start", "stuck");

    let mut config = fast_config();
    config.node_timeout_ms = 50;
    let (engine, _, _) = engine_with(registry, config);
    let record = engine
        .run(&def, pending(&def, VarMap::new()), CancellationToken::new())
        .await;

    assert_eq!(record.status, ExecutionStatus::Failed);
    let timeouts = record
        .execution_log
        .iter()
        .filter(|e| e.node_id == "stuck")
        .filter(|e| e.error.as_deref().is_some_and(|msg| msg.contains("timed out")))
        .count();
    // Initial attempt plus max_retries, every one abandoned by the timeout.
    assert_eq!(timeouts, 4);
}

#[tokio::test]
async fn wall_clock_budget_fails_a_run_that_sleeps_too_long() {
    let mut def = definition(Uuid::new_v4());
    def.limits.max_execution_time_seconds = 1;
    def.graph
        .add_node("start", Node::new(NodeKind::Start))
        .add_node(
            "wait",
            Node::new(NodeKind::Delay).with_config("delay_ms", 1200),
        )
        .add_node("end", Node::new(NodeKind::End));
    def.graph.connect("start", "wait");
    def.graph.connect("wait", "end");

    let (engine, _, _) = engine_with(HandlerRegistry::new(), fast_config());
    let record = engine
        .run(&def, pending(&def, VarMap::new()), CancellationToken::new())
        .await;

    assert_eq!(record.status, ExecutionStatus::Failed);
    assert!(record
        .error_message
        .as_ref()
        .unwrap()
        .contains("execution timeout"));
    // The delay node itself executed fine; the run died at the boundary after.
    assert!(record.execution_log.iter().any(|e| e.node_id == "wait"));
}

#[tokio::test]
async fn cancellation_is_observed_at_the_next_node_boundary() {
    let mut registry = HandlerRegistry::new();
    let (mark, calls) = MarkHandler::new("test.mark", "marked");
    registry.register(Arc::new(mark));

    let mut def = definition(Uuid::new_v4());
    def.graph
        .add_node("start", Node::new(NodeKind::Start))
        .add_node(
            "wait",
            Node::new(NodeKind::Delay).with_config("delay_ms", 500),
        )
        .add_node("after", Node::new(NodeKind::action("test.mark")))
        .add_node("end", Node::new(NodeKind::End));
    def.graph.connect("start", "wait");
    def.graph.connect("wait", "after");
    def.graph.connect("after", "end");

    let (engine, _, _) = engine_with(registry, fast_config());
    let engine = Arc::new(engine);
    let token = CancellationToken::new();
    let run_token = token.clone();
    let execution = pending(&def, VarMap::new());

    let handle = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.run(&def, execution, run_token).await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    token.cancel();

    let record = handle.await.unwrap();
    assert_eq!(record.status, ExecutionStatus::Cancelled);
    // The node after the suspension never ran.
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!record.execution_log.iter().any(|e| e.node_id == "after"));
}
