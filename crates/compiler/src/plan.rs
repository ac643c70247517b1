//! Executable plan shared by the code generator and the interpreter
//!
//! A plan is a validated graph reduced to what a run needs: one worker per
//! component node with typed parameter values, and the deduplicated list of
//! queue connections taken from the data-flow chains.

use crate::control_flow::{self, ControlSpine};
use crate::data_flow::{self, DataFlow};
use crate::error::{Error, Result};
use crate::graph::{Node, NodeKind, PipelineGraph};
use crate::validator;
use etlflow_components::{ComponentDescriptor, ComponentRegistry};
use etlflow_runtime::row::value_to_text;
use etlflow_runtime::{ComponentKind, DependencySpec, ParameterType, Value};
use heck::ToUpperCamelCase;
use serde::Serialize;
use std::collections::HashSet;

/// Module path generated flows live under
pub const GENERATED_MODULE: &str = "etlflow_generated";

/// A parameter ready to be handed to `Component::set_parameter`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundParameter {
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerPlan {
    pub node_id: String,
    pub display_name: String,
    pub component_id: String,
    pub type_path: String,
    pub kind: ComponentKind,
    pub parameters: Vec<BoundParameter>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowPlan {
    pub flow_id: String,
    /// Type name of the generated entry point, e.g. `FlowOrders`
    pub flow_type: String,
    pub workers: Vec<WorkerPlan>,
    /// `(producer, consumer)` pairs in chain order, without duplicates
    pub connections: Vec<(String, String)>,
    /// Third-party artifacts declared by the components in use
    pub dependencies: Vec<DependencySpec>,
    pub control_spine: ControlSpine,
    pub data_flow: DataFlow,
    pub warnings: Vec<String>,
}

/// `Flow` followed by the sheet id in UpperCamelCase, always a valid Rust identifier
pub fn flow_type_name(sheet_id: &str) -> String {
    let sanitized: String = sheet_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();
    format!("Flow{}", sanitized.to_upper_camel_case())
}

/// Deduplicate dependency declarations; a required declaration wins over an optional one
pub fn merge_dependencies<'a>(
    specs: impl IntoIterator<Item = &'a DependencySpec>,
) -> Vec<DependencySpec> {
    let mut merged: Vec<DependencySpec> = Vec::new();
    for spec in specs {
        match merged.iter_mut().find(|existing| *existing == spec) {
            Some(existing) => existing.optional &= spec.optional,
            None => merged.push(spec.clone()),
        }
    }
    merged
}

/// Apply the literal formatting rules to a sheet value.
///
/// Numbers and booleans keep their type when they parse as such; every
/// other declared type is carried as a string.
pub fn bind_value(declared: ParameterType, value: &Value) -> Value {
    match declared {
        ParameterType::Number => match value {
            Value::Number(_) => value.clone(),
            Value::String(s) => {
                let t = s.trim();
                t.parse::<i64>()
                    .map(Value::from)
                    .ok()
                    .or_else(|| {
                        t.parse::<f64>()
                            .ok()
                            .and_then(serde_json::Number::from_f64)
                            .map(Value::Number)
                    })
                    .unwrap_or_else(|| value.clone())
            }
            other => Value::String(value_to_text(other)),
        },
        ParameterType::Boolean => match value {
            Value::Bool(_) => value.clone(),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => value.clone(),
            },
            other => Value::String(value_to_text(other)),
        },
        _ => match value {
            Value::String(_) => value.clone(),
            other => Value::String(value_to_text(other)),
        },
    }
}

fn bind_parameters(node: &Node, descriptor: &ComponentDescriptor) -> Result<Vec<BoundParameter>> {
    let declared = descriptor.parameters();
    let mut bound = Vec::new();

    for param in &node.parameters {
        let def = declared.definition(&param.name).ok_or_else(|| {
            Error::Generation(format!(
                "node '{}': component '{}' has no parameter '{}'",
                node.id, descriptor.id, param.name
            ))
        })?;
        let Some(value) = param.value.as_ref().or(param.default_value.as_ref()) else {
            continue;
        };
        let declared_type = param.declared_type.unwrap_or(def.declared_type);
        bound.push(BoundParameter {
            name: param.name.clone(),
            value: bind_value(declared_type, value),
        });
    }

    // Required by the component or by the sheet
    let required = declared
        .definitions()
        .iter()
        .filter(|def| def.required)
        .map(|def| def.name.as_str())
        .chain(node.parameters.iter().filter(|p| p.required).map(|p| p.name.as_str()));
    for name in required {
        let has_default = declared
            .definition(name)
            .is_some_and(|def| def.default_value.is_some());
        if !has_default && !bound.iter().any(|b| b.name == name) {
            return Err(Error::Generation(format!(
                "node '{}': required parameter '{}' has no value",
                node.id, name
            )));
        }
    }

    Ok(bound)
}

impl FlowPlan {
    /// Validate, analyze and bind `graph`
    pub fn build(graph: &PipelineGraph, registry: &ComponentRegistry) -> Result<Self> {
        validator::validate(graph, registry)?;

        let control_spine = control_flow::analyze(graph);
        let data_flow = data_flow::analyze(graph);
        let mut warnings: Vec<String> = control_spine
            .warnings
            .iter()
            .chain(&data_flow.warnings)
            .cloned()
            .collect();

        let spine: HashSet<&str> = control_spine.nodes.iter().map(String::as_str).collect();
        let mut workers = Vec::new();
        let mut declared_deps: Vec<&DependencySpec> = Vec::new();

        for node in graph.nodes.iter().filter(|n| !n.kind.is_control()) {
            let reference = node.implementation_ref.as_deref().unwrap_or_default();
            let descriptor = registry.resolve(reference).ok_or_else(|| {
                Error::Generation(format!(
                    "node '{}': cannot resolve implementation '{}'",
                    node.id, reference
                ))
            })?;

            if node.kind == NodeKind::Source && !spine.contains(node.id.as_str()) {
                warnings.push(format!(
                    "source '{}' is not on the control-flow path from start",
                    node.id
                ));
            }
            if node.threads > 1 {
                warnings.push(format!(
                    "node '{}' requests {} threads; it runs as a single worker",
                    node.id, node.threads
                ));
            }

            declared_deps.extend(descriptor.dependencies.iter());
            workers.push(WorkerPlan {
                node_id: node.id.clone(),
                display_name: node.display_name(),
                component_id: descriptor.id.to_string(),
                type_path: descriptor.type_path.to_string(),
                kind: descriptor.kind,
                parameters: bind_parameters(node, descriptor)?,
            });
        }

        let mut seen = HashSet::new();
        let connections: Vec<(String, String)> = data_flow
            .chains
            .iter()
            .flat_map(|chain| chain.links())
            .filter(|link| seen.insert(*link))
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect();

        for warning in &warnings {
            tracing::warn!("{}", warning);
        }

        Ok(Self {
            flow_id: graph.id.clone(),
            flow_type: flow_type_name(&graph.id),
            workers,
            connections,
            dependencies: merge_dependencies(declared_deps),
            control_spine,
            data_flow,
            warnings,
        })
    }

    /// `etlflow_generated::<flow type>`, the bundle's `Flow-Class`
    pub fn flow_class(&self) -> String {
        format!("{}::{}", GENERATED_MODULE, self.flow_type)
    }
}
