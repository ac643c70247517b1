//! Control-flow spine: the ordered start → sources → stop sequence
//!
//! Only control-flow edges are followed. When a node has more than one
//! outgoing control edge, the first in document order wins and the rest
//! are reported as warnings.

use crate::graph::{Channel, NodeKind, PipelineGraph};
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ControlSpine {
    /// Start, sources and stop, in walk order
    pub nodes: Vec<String>,
    /// Whether the walk ended on the stop node
    pub reached_stop: bool,
    pub warnings: Vec<String>,
}

impl ControlSpine {
    /// Source nodes on the spine, in order
    pub fn sources<'a>(&'a self, graph: &'a PipelineGraph) -> impl Iterator<Item = &'a str> + 'a {
        self.nodes
            .iter()
            .map(String::as_str)
            .filter(|id| graph.node(id).is_some_and(|n| n.kind == NodeKind::Source))
    }
}

/// Walk control-flow edges from the start node
pub fn analyze(graph: &PipelineGraph) -> ControlSpine {
    let mut spine = ControlSpine::default();
    let Some(start) = graph.nodes_of_kind(NodeKind::Start).next() else {
        spine.warnings.push("flow has no start node".to_string());
        return spine;
    };

    let mut visited: HashSet<&str> = HashSet::new();
    let mut current = start.id.as_str();
    loop {
        if !visited.insert(current) {
            spine
                .warnings
                .push(format!("control flow returns to '{current}', stopping walk"));
            break;
        }

        let Some(node) = graph.node(current) else {
            break;
        };
        if node.kind.is_control() || node.kind == NodeKind::Source {
            spine.nodes.push(node.id.clone());
        }
        if node.kind == NodeKind::Stop {
            spine.reached_stop = true;
            break;
        }

        let mut next = graph
            .outputs_of(current)
            .filter(|e| e.channel == Channel::ControlFlow);
        let Some(first) = next.next() else {
            break;
        };
        for ignored in next {
            let warning = format!(
                "'{}' has several control-flow edges; following '{}', ignoring '{}' to '{}'",
                current, first.target, ignored.id, ignored.target
            );
            tracing::warn!("{}", warning);
            spine.warnings.push(warning);
        }
        current = first.target.as_str();
    }

    tracing::debug!("Control spine: {:?}", spine.nodes);
    spine
}
