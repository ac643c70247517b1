//! Flow analysis report
//!
//! Runs every check and analysis without stopping at the first problem, so
//! the `analyze` command can show the whole picture at once.

use crate::control_flow;
use crate::data_flow;
use crate::graph::PipelineGraph;
use crate::plan::FlowPlan;
use etlflow_components::ComponentRegistry;
use serde::{Deserialize, Serialize};

/// Information about one node as seen by the analyzers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzedNode {
    pub id: String,
    pub kind: String,
    pub implementation: Option<String>,
    /// Type path the implementation resolved to, if it did
    pub resolved: Option<String>,
}

/// Result of analyzing a flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowAnalysis {
    pub flow_id: String,
    pub flow_name: String,
    /// Whether the flow can be generated
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub nodes: Vec<AnalyzedNode>,
    pub control_spine: Vec<String>,
    pub chains: Vec<Vec<String>>,
    /// Queue connections a run would wire, when the flow is valid
    pub connections: Vec<(String, String)>,
    pub dependencies: Vec<String>,
}

/// Analyze `graph` against `registry`
pub fn analyze(graph: &PipelineGraph, registry: &ComponentRegistry) -> FlowAnalysis {
    let nodes = graph
        .nodes
        .iter()
        .map(|node| AnalyzedNode {
            id: node.id.clone(),
            kind: node.kind.to_string(),
            implementation: node.implementation_ref.clone(),
            resolved: node
                .implementation_ref
                .as_deref()
                .and_then(|r| registry.resolve(r))
                .map(|d| d.type_path.to_string()),
        })
        .collect();

    let mut analysis = FlowAnalysis {
        flow_id: graph.id.clone(),
        flow_name: graph.name.clone(),
        is_valid: false,
        errors: Vec::new(),
        warnings: Vec::new(),
        nodes,
        control_spine: Vec::new(),
        chains: Vec::new(),
        connections: Vec::new(),
        dependencies: Vec::new(),
    };

    match FlowPlan::build(graph, registry) {
        Ok(plan) => {
            analysis.is_valid = true;
            analysis.warnings = plan.warnings;
            analysis.control_spine = plan.control_spine.nodes;
            analysis.chains = plan.data_flow.chains.into_iter().map(|c| c.nodes).collect();
            analysis.connections = plan.connections;
            analysis.dependencies = plan.dependencies.iter().map(|d| d.to_string()).collect();
        }
        Err(e) => {
            analysis.errors.push(e.to_string());
            // Still show what the analyzers see
            let spine = control_flow::analyze(graph);
            let flow = data_flow::analyze(graph);
            analysis.warnings = spine.warnings.into_iter().chain(flow.warnings).collect();
            analysis.control_spine = spine.nodes;
            analysis.chains = flow.chains.into_iter().map(|c| c.nodes).collect();
        }
    }

    analysis
}
