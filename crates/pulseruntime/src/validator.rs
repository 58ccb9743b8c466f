use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use pulsecore::{Graph, NodeKind};
use std::collections::HashMap;

/// Result of validating a workflow graph before activation.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validates node/edge topology. A definition that fails validation cannot
/// be activated; the runtime forces `is_active` off and surfaces the errors.
pub struct GraphValidator;

impl GraphValidator {
    pub fn validate(graph: &Graph) -> ValidationReport {
        let mut report = ValidationReport::default();

        let start_count = graph
            .nodes
            .values()
            .filter(|n| n.kind == NodeKind::Start)
            .count();
        match start_count {
            1 => {}
            0 => report.errors.push("graph has no start node".to_string()),
            n => report
                .errors
                .push(format!("graph has {n} start nodes, expected exactly one")),
        }

        for edge in &graph.edges {
            if !graph.nodes.contains_key(&edge.source) {
                report
                    .errors
                    .push(format!("edge references unknown source node '{}'", edge.source));
            }
            if !graph.nodes.contains_key(&edge.target) {
                report
                    .errors
                    .push(format!("edge references unknown target node '{}'", edge.target));
            }
        }

        // Orphan nodes are suspicious but not fatal: the editor may save a
        // half-wired canvas.
        for (id, node) in &graph.nodes {
            if node.kind == NodeKind::Start {
                continue;
            }
            if !graph.edges.iter().any(|e| &e.target == id) {
                report
                    .warnings
                    .push(format!("node '{id}' has no inbound edge and is unreachable"));
            }
        }

        // Two edges out of the same slot would make traversal ambiguous; the
        // engine follows the first match.
        let mut seen_slots: HashMap<(&str, &str), u32> = HashMap::new();
        for edge in &graph.edges {
            let count = seen_slots
                .entry((edge.source.as_str(), edge.source_output.as_str()))
                .or_insert(0);
            *count += 1;
            if *count == 2 {
                report.warnings.push(format!(
                    "multiple edges leave node '{}' on slot '{}'",
                    edge.source, edge.source_output
                ));
            }
        }

        Self::check_cycles(graph, &mut report);
        report
    }

    /// Cycles are rejected unless routed through a condition node, whose
    /// exclusive branch is the only sanctioned loop exit. Runtime cycle
    /// safety still rests on the node budget.
    fn check_cycles(graph: &Graph, report: &mut ValidationReport) {
        let mut dag: DiGraph<&str, ()> = DiGraph::new();
        let mut indices: HashMap<&str, NodeIndex> = HashMap::new();

        for id in graph.nodes.keys() {
            indices.insert(id.as_str(), dag.add_node(id.as_str()));
        }
        for edge in &graph.edges {
            if let (Some(&from), Some(&to)) = (
                indices.get(edge.source.as_str()),
                indices.get(edge.target.as_str()),
            ) {
                dag.add_edge(from, to, ());
            }
        }

        for component in tarjan_scc(&dag) {
            let is_cycle = component.len() > 1
                || component
                    .first()
                    .map(|&idx| dag.find_edge(idx, idx).is_some())
                    .unwrap_or(false);
            if !is_cycle {
                continue;
            }

            let has_condition = component.iter().any(|&idx| {
                let id = dag[idx];
                graph
                    .node(id)
                    .map(|n| n.kind == NodeKind::Condition)
                    .unwrap_or(false)
            });
            if !has_condition {
                let members: Vec<&str> = component.iter().map(|&idx| dag[idx]).collect();
                report.errors.push(format!(
                    "cycle without a condition node: [{}]",
                    members.join(", ")
                ));
            }
        }
    }
}
