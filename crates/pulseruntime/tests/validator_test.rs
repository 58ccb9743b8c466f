//! Graph topology validation tests.

use pulsecore::{Graph, Node, NodeKind};
use pulseruntime::GraphValidator;

fn linear() -> Graph {
    let mut graph = Graph::default();
    graph
        .add_node("start", Node::new(NodeKind::Start))
        .add_node("send", Node::new(NodeKind::action("email.send")))
        .add_node("end", Node::new(NodeKind::End));
    graph.connect("start", "send");
    graph.connect("send", "end");
    graph
}

#[test]
fn valid_linear_graph_passes_cleanly() {
    let report = GraphValidator::validate(&linear());
    assert!(report.is_valid());
    assert!(report.errors.is_empty());
    assert!(report.warnings.is_empty());
}

#[test]
fn missing_start_node_is_an_error() {
    let mut graph = Graph::default();
    graph
        .add_node("send", Node::new(NodeKind::action("email.send")))
        .add_node("end", Node::new(NodeKind::End));
    graph.connect("send", "end");

    let report = GraphValidator::validate(&graph);
    assert!(!report.is_valid());
    assert!(report.errors.iter().any(|e| e.contains("no start node")));
}

#[test]
fn multiple_start_nodes_are_an_error() {
    let mut graph = linear();
    graph.add_node("start2", Node::new(NodeKind::Start));
    graph.connect("start2", "send");

    let report = GraphValidator::validate(&graph);
    assert!(!report.is_valid());
    assert!(report
        .errors
        .iter()
        .any(|e| e.contains("expected exactly one")));
}

#[test]
fn edge_to_unknown_node_is_an_error() {
    let mut graph = linear();
    graph.connect("send", "ghost");

    let report = GraphValidator::validate(&graph);
    assert!(!report.is_valid());
    assert!(report
        .errors
        .iter()
        .any(|e| e.contains("unknown target node 'ghost'")));
}

#[test]
fn orphan_node_is_a_warning_not_an_error() {
    let mut graph = linear();
    graph.add_node("floating", Node::new(NodeKind::action("data.transform")));

    let report = GraphValidator::validate(&graph);
    assert!(report.is_valid());
    assert!(report
        .warnings
        .iter()
        .any(|w| w.contains("'floating'") && w.contains("unreachable")));
}

#[test]
fn duplicate_out_edges_on_one_slot_are_a_warning() {
    let mut graph = linear();
    graph.add_node("other", Node::new(NodeKind::action("data.transform")));
    graph.connect("start", "other");
    graph.connect("other", "end");

    let report = GraphValidator::validate(&graph);
    assert!(report.is_valid());
    assert!(report
        .warnings
        .iter()
        .any(|w| w.contains("multiple edges leave node 'start'")));
}

#[test]
fn cycle_without_a_condition_is_rejected() {
    let mut graph = Graph::default();
    graph
        .add_node("start", Node::new(NodeKind::Start))
        .add_node("a", Node::new(NodeKind::action("data.transform")))
        .add_node("b", Node::new(NodeKind::action("data.transform")));
    graph.connect("start", "a");
    graph.connect("a", "b");
    graph.connect("b", "a");

    let report = GraphValidator::validate(&graph);
    assert!(!report.is_valid());
    assert!(report
        .errors
        .iter()
        .any(|e| e.contains("cycle without a condition node")));
}

#[test]
fn self_loop_without_a_condition_is_rejected() {
    let mut graph = Graph::default();
    graph
        .add_node("start", Node::new(NodeKind::Start))
        .add_node("a", Node::new(NodeKind::action("data.transform")));
    graph.connect("start", "a");
    graph.connect("a", "a");

    let report = GraphValidator::validate(&graph);
    assert!(!report.is_valid());
    assert!(report
        .errors
        .iter()
        .any(|e| e.contains("cycle without a condition node")));
}

#[test]
fn condition_guarded_loop_is_allowed() {
    let mut graph = Graph::default();
    graph
        .add_node("start", Node::new(NodeKind::Start))
        .add_node(
            "retry_gate",
            Node::new(NodeKind::Condition)
                .with_config("field", "attempts")
                .with_config("operator", "less_than")
                .with_config("value", 5),
        )
        .add_node("work", Node::new(NodeKind::action("data.transform")))
        .add_node("end", Node::new(NodeKind::End));
    graph.connect("start", "retry_gate");
    graph.connect_slot("retry_gate", "true", "work");
    graph.connect("work", "retry_gate");
    graph.connect_slot("retry_gate", "false", "end");

    let report = GraphValidator::validate(&graph);
    assert!(report.is_valid(), "errors: {:?}", report.errors);
}
