//! Structural checks run before any analysis or generation
//!
//! In order: the graph has nodes; it has exactly one start and one stop;
//! stop is reachable from start over any edge; every component node
//! resolves to a registered implementation of the right kind.

use crate::error::{Error, Result};
use crate::graph::{Node, NodeKind, PipelineGraph};
use etlflow_components::ComponentRegistry;
use std::collections::{HashSet, VecDeque};

/// Validate `graph` against `registry`, failing on the first violated check
pub fn validate(graph: &PipelineGraph, registry: &ComponentRegistry) -> Result<()> {
    if graph.nodes.is_empty() {
        return Err(Error::Structural("flow has no nodes".to_string()));
    }

    let start = single_marker(graph, NodeKind::Start)?;
    let stop = single_marker(graph, NodeKind::Stop)?;

    if !reachable(graph, &start.id, &stop.id) {
        return Err(Error::Structural(format!(
            "no path between start node '{}' and stop node '{}'",
            start.id, stop.id
        )));
    }

    for node in graph.nodes.iter().filter(|n| !n.kind.is_control()) {
        check_implementation(node, registry)?;
    }

    tracing::debug!("Flow '{}' passed validation", graph.id);
    Ok(())
}

fn single_marker(graph: &PipelineGraph, kind: NodeKind) -> Result<&Node> {
    let mut found = graph.nodes_of_kind(kind);
    let first = found
        .next()
        .ok_or_else(|| Error::Structural(format!("flow has no {kind} node")))?;
    if let Some(second) = found.next() {
        return Err(Error::Structural(format!(
            "flow has more than one {kind} node ('{}' and '{}')",
            first.id, second.id
        )));
    }
    Ok(first)
}

/// Breadth-first search over edges of either channel
fn reachable(graph: &PipelineGraph, from: &str, to: &str) -> bool {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    visited.insert(from);
    queue.push_back(from);

    while let Some(current) = queue.pop_front() {
        if current == to {
            return true;
        }
        for edge in graph.outputs_of(current) {
            if visited.insert(edge.target.as_str()) {
                queue.push_back(edge.target.as_str());
            }
        }
    }
    false
}

fn check_implementation(node: &Node, registry: &ComponentRegistry) -> Result<()> {
    let reference = node.implementation_ref.as_deref().ok_or_else(|| {
        Error::Structural(format!(
            "{} node '{}' has no implementation",
            node.kind, node.id
        ))
    })?;

    let descriptor = registry.resolve(reference).ok_or_else(|| {
        Error::Structural(format!(
            "node '{}': implementation '{}' is not a registered component",
            node.id, reference
        ))
    })?;

    if node.kind.component_kind() != Some(descriptor.kind) {
        return Err(Error::Structural(format!(
            "node '{}' is a {} but '{}' is a {} component",
            node.id, node.kind, reference, descriptor.kind
        )));
    }
    Ok(())
}
