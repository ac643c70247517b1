//! Data-flow chains: every source-to-leaf path along data edges
//!
//! Chains are logically parallel. A source fanning out to two consumers
//! yields two chains sharing their prefix; the wiring step deduplicates
//! the shared connections.
//!
//! Each node is expanded once per source. When a second path reaches a
//! node that was already expanded, its chain stops at that node, so the
//! chain count grows with the edge count and not with the path count.

use crate::graph::{Channel, NodeKind, PipelineGraph};
use serde::Serialize;
use std::collections::HashSet;

/// One path: source, zero or more transforms, then the last consumer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataChain {
    pub nodes: Vec<String>,
}

impl DataChain {
    pub fn source(&self) -> &str {
        &self.nodes[0]
    }

    /// Consecutive `(producer, consumer)` pairs
    pub fn links(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.nodes
            .windows(2)
            .map(|pair| (pair[0].as_str(), pair[1].as_str()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DataFlow {
    pub chains: Vec<DataChain>,
    pub warnings: Vec<String>,
}

/// Enumerate chains for every source node, in document order
pub fn analyze(graph: &PipelineGraph) -> DataFlow {
    let mut flow = DataFlow::default();

    for source in graph.nodes_of_kind(NodeKind::Source) {
        let before = flow.chains.len();
        let mut path = vec![source.id.as_str()];
        let mut expanded = HashSet::from([source.id.as_str()]);
        walk(graph, &mut path, &mut expanded, &mut flow);
        if flow.chains.len() == before {
            tracing::debug!("Source '{}' has no downstream consumer", source.id);
        }
    }

    tracing::debug!("Found {} data-flow chains", flow.chains.len());
    flow
}

fn walk<'g>(
    graph: &'g PipelineGraph,
    path: &mut Vec<&'g str>,
    expanded: &mut HashSet<&'g str>,
    flow: &mut DataFlow,
) {
    let Some(&current) = path.last() else {
        return;
    };

    let mut extended = false;
    for edge in graph
        .outputs_of(current)
        .filter(|e| e.channel == Channel::DataFlow)
    {
        let Some(target) = graph.node(&edge.target) else {
            continue;
        };
        if target.kind.is_control() {
            continue;
        }
        if target.kind == NodeKind::Source {
            flow.warnings.push(format!(
                "data edge '{}' from '{}' into source '{}' ignored",
                edge.id, current, target.id
            ));
            continue;
        }
        if path.contains(&target.id.as_str()) {
            flow.warnings.push(format!(
                "data edge '{}' from '{}' back to '{}' would form a cycle, ignored",
                edge.id, current, target.id
            ));
            continue;
        }

        extended = true;
        path.push(target.id.as_str());
        if expanded.insert(target.id.as_str()) {
            walk(graph, path, expanded, flow);
        } else {
            // Rejoins an expanded node; its suffix is already a chain
            flow.chains.push(DataChain {
                nodes: path.iter().map(|s| s.to_string()).collect(),
            });
        }
        path.pop();
    }

    // A lone source is not a chain
    if !extended && path.len() > 1 {
        flow.chains.push(DataChain {
            nodes: path.iter().map(|s| s.to_string()).collect(),
        });
    }
}
