use crate::{TenantId, VarMap, WorkflowId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A tenant-owned automation graph triggered by an event.
///
/// Definitions are authored externally (visual editor) and are read-only to
/// the engine; the node/edge shape mirrors the editor's export format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: WorkflowId,
    pub tenant_id: TenantId,
    pub name: String,
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub trigger_config: VarMap,
    pub graph: Graph,
    #[serde(default)]
    pub is_active: bool,
    #[serde(flatten)]
    pub limits: WorkflowLimits,
}

impl WorkflowDefinition {
    pub fn new(tenant_id: TenantId, name: impl Into<String>, trigger_type: TriggerType) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            name: name.into(),
            trigger_type,
            trigger_config: VarMap::new(),
            graph: Graph::default(),
            is_active: false,
            limits: WorkflowLimits::default(),
        }
    }
}

/// Event kinds a workflow can be triggered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Manual,
    Webhook,
    ContactCreated,
    ContactUpdated,
    FormSubmitted,
    Schedule,
}

/// Per-tenant ceilings enforced at admission plus per-run budgets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WorkflowLimits {
    #[serde(default = "WorkflowLimits::default_concurrent")]
    pub max_concurrent_executions: u32,
    #[serde(default = "WorkflowLimits::default_daily")]
    pub max_daily_executions: u32,
    #[serde(default = "WorkflowLimits::default_nodes")]
    pub max_nodes: u32,
    #[serde(default = "WorkflowLimits::default_time")]
    pub max_execution_time_seconds: u64,
}

impl WorkflowLimits {
    fn default_concurrent() -> u32 {
        10
    }
    fn default_daily() -> u32 {
        100
    }
    fn default_nodes() -> u32 {
        100
    }
    fn default_time() -> u64 {
        300
    }
}

impl Default for WorkflowLimits {
    fn default() -> Self {
        Self {
            max_concurrent_executions: Self::default_concurrent(),
            max_daily_executions: Self::default_daily(),
            max_nodes: Self::default_nodes(),
            max_execution_time_seconds: Self::default_time(),
        }
    }
}

/// Node arena plus directed edges between output and input slots.
///
/// Nodes are addressed by stable string ids so cyclic references (condition
/// loops) are representable without ownership cycles; cycle safety at run
/// time comes from the node budget, not the shape of this struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Graph {
    #[serde(default)]
    pub nodes: BTreeMap<String, Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Graph {
    /// Id of the unique start node, if exactly one exists.
    pub fn start_node(&self) -> Option<&str> {
        let mut starts = self
            .nodes
            .iter()
            .filter(|(_, n)| n.kind == NodeKind::Start)
            .map(|(id, _)| id.as_str());
        match (starts.next(), starts.next()) {
            (Some(id), None) => Some(id),
            _ => None,
        }
    }

    /// Resolve the edge leaving `source` on `slot`, if any.
    pub fn edge_from(&self, source: &str, slot: &str) -> Option<&Edge> {
        self.edges
            .iter()
            .find(|e| e.source == source && e.source_output == slot)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn add_node(&mut self, id: impl Into<String>, node: Node) -> &mut Self {
        self.nodes.insert(id.into(), node);
        self
    }

    pub fn connect(&mut self, source: impl Into<String>, target: impl Into<String>) -> &mut Self {
        self.connect_slot(source, Edge::DEFAULT_OUTPUT, target)
    }

    pub fn connect_slot(
        &mut self,
        source: impl Into<String>,
        slot: impl Into<String>,
        target: impl Into<String>,
    ) -> &mut Self {
        self.edges.push(Edge {
            source: source.into(),
            source_output: slot.into(),
            target: target.into(),
            target_input: Edge::DEFAULT_INPUT.to_string(),
        });
        self
    }
}

/// One step in a workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub config: VarMap,
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            config: VarMap::new(),
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }
}

/// Closed set of engine-owned node kinds plus an open set of action kinds
/// resolved through the handler registry (e.g. `email.send`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    Start,
    End,
    Condition,
    Delay,
    Action(String),
}

impl NodeKind {
    pub fn as_str(&self) -> &str {
        match self {
            NodeKind::Start => "start",
            NodeKind::End => "end",
            NodeKind::Condition => "condition",
            NodeKind::Delay => "delay",
            NodeKind::Action(name) => name,
        }
    }

    pub fn action(name: impl Into<String>) -> Self {
        NodeKind::Action(name.into())
    }
}

impl From<String> for NodeKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "start" => NodeKind::Start,
            "end" => NodeKind::End,
            "condition" => NodeKind::Condition,
            "delay" => NodeKind::Delay,
            _ => NodeKind::Action(s),
        }
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directed link from one node's output slot to another's input slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub source: String,
    #[serde(default = "Edge::default_output")]
    pub source_output: String,
    pub target: String,
    #[serde(default = "Edge::default_input")]
    pub target_input: String,
}

impl Edge {
    pub const DEFAULT_OUTPUT: &'static str = "out";
    pub const DEFAULT_INPUT: &'static str = "in";

    fn default_output() -> String {
        Self::DEFAULT_OUTPUT.to_string()
    }

    fn default_input() -> String {
        Self::DEFAULT_INPUT.to_string()
    }
}
