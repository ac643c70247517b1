//! Pipeline graph model
//!
//! Parsed from the designer's sheet JSON and never mutated afterwards.
//! Node and edge order follows the input document; analyzers rely on it
//! for deterministic tie-breaking.

use crate::error::{Error, Result};
use etlflow_runtime::{ComponentKind, ParameterType, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Role of a node in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Start,
    Stop,
    Source,
    Transform,
    Destination,
}

impl NodeKind {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "start" => Some(NodeKind::Start),
            "stop" => Some(NodeKind::Stop),
            "source" => Some(NodeKind::Source),
            "transform" => Some(NodeKind::Transform),
            "destination" => Some(NodeKind::Destination),
            _ => None,
        }
    }

    /// Start and stop only sequence execution; they run no component
    pub fn is_control(self) -> bool {
        matches!(self, NodeKind::Start | NodeKind::Stop)
    }

    /// Capability an implementation must provide for this node
    pub fn component_kind(self) -> Option<ComponentKind> {
        match self {
            NodeKind::Source => Some(ComponentKind::Source),
            NodeKind::Transform => Some(ComponentKind::Transform),
            NodeKind::Destination => Some(ComponentKind::Destination),
            NodeKind::Start | NodeKind::Stop => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeKind::Start => "start",
            NodeKind::Stop => "stop",
            NodeKind::Source => "source",
            NodeKind::Transform => "transform",
            NodeKind::Destination => "destination",
        };
        f.write_str(s)
    }
}

/// Which analyzer an edge belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Channel {
    ControlFlow,
    DataFlow,
}

impl Channel {
    /// A handle naming "control" and not "data" is control flow; anything
    /// else, including no handle at all, is data flow.
    pub fn from_handle(handle: Option<&str>) -> Self {
        match handle {
            Some(h) if h.contains("control") && !h.contains("data") => Channel::ControlFlow,
            _ => Channel::DataFlow,
        }
    }
}

/// A parameter as configured on a node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub name: String,
    pub declared_type: Option<ParameterType>,
    pub required: bool,
    pub default_value: Option<Value>,
    /// `None` when the sheet holds no value (or `null`)
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    /// Palette id, e.g. `"filter"`
    pub component_id: Option<String>,
    pub label: Option<String>,
    pub implementation_ref: Option<String>,
    pub parameters: Vec<Parameter>,
    pub threads: u32,
}

impl Node {
    /// `label (id)`, used as the worker's log marker
    pub fn display_name(&self) -> String {
        match self.label.as_deref().or(self.component_id.as_deref()) {
            Some(name) if !name.is_empty() => format!("{} ({})", name, self.id),
            _ => self.id.clone(),
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub channel: Channel,
}

/// Immutable pipeline graph
#[derive(Debug, Clone, Serialize)]
pub struct PipelineGraph {
    pub id: String,
    pub version: Option<String>,
    pub name: String,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

// Sheet JSON as written by the designer

#[derive(Deserialize)]
struct SheetDocument {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    version: Option<Value>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    nodes: Vec<SheetNode>,
    #[serde(default)]
    edges: Vec<SheetEdge>,
}

#[derive(Deserialize)]
struct SheetNode {
    id: String,
    #[serde(rename = "type", default)]
    node_type: Option<String>,
    #[serde(default)]
    data: Option<SheetNodeData>,
}

#[derive(Deserialize, Default)]
struct SheetNodeData {
    #[serde(default)]
    label: Option<String>,
    #[serde(rename = "componentData", default)]
    component_data: Option<SheetComponentData>,
}

#[derive(Deserialize, Default)]
struct SheetComponentData {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(rename = "implementationClass", default)]
    implementation_class: Option<String>,
    #[serde(rename = "type", default)]
    component_type: Option<String>,
    #[serde(default)]
    parameters: Vec<SheetParameter>,
    #[serde(default)]
    threads: Option<Value>,
}

#[derive(Deserialize)]
struct SheetParameter {
    name: String,
    #[serde(default)]
    value: Value,
    #[serde(rename = "parameterType", default)]
    parameter_type: Option<String>,
    #[serde(default)]
    required: bool,
    #[serde(rename = "defaultValue", default)]
    default_value: Option<Value>,
}

#[derive(Deserialize)]
struct SheetEdge {
    #[serde(default)]
    id: Option<String>,
    source: String,
    target: String,
    #[serde(rename = "sourceHandle", default)]
    source_handle: Option<String>,
}

fn parse_threads(node_id: &str, raw: Option<&Value>) -> Result<u32> {
    let threads = match raw {
        None | Some(Value::Null) => return Ok(1),
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(_) => None,
    };
    match threads {
        Some(t) if t >= 1 && t <= i64::from(u32::MAX) => Ok(t as u32),
        _ => Err(Error::Structural(format!(
            "node '{node_id}' has an invalid thread count {}, must be at least 1",
            raw.map(Value::to_string).unwrap_or_default()
        ))),
    }
}

fn convert_parameter(raw: SheetParameter) -> Result<Parameter> {
    let declared_type = raw
        .parameter_type
        .as_deref()
        .map(str::parse::<ParameterType>)
        .transpose()
        .map_err(|e| Error::Structural(format!("parameter '{}': {e}", raw.name)))?;
    Ok(Parameter {
        name: raw.name,
        declared_type,
        required: raw.required,
        default_value: raw.default_value.filter(|v| !v.is_null()),
        value: Some(raw.value).filter(|v| !v.is_null()),
    })
}

fn convert_node(raw: SheetNode) -> Result<Node> {
    let data = raw.data.unwrap_or_default();
    let component = data.component_data.unwrap_or_default();

    let kind = raw
        .node_type
        .as_deref()
        .and_then(NodeKind::parse)
        .or_else(|| component.component_type.as_deref().and_then(NodeKind::parse))
        .or_else(|| match component.id.as_deref() {
            Some("start") => Some(NodeKind::Start),
            Some("stop") => Some(NodeKind::Stop),
            _ => None,
        })
        .ok_or_else(|| {
            Error::Structural(format!(
                "cannot determine the kind of node '{}' (type {:?})",
                raw.id, raw.node_type
            ))
        })?;

    let threads = parse_threads(&raw.id, component.threads.as_ref())?;
    let parameters = component
        .parameters
        .into_iter()
        .map(convert_parameter)
        .collect::<Result<Vec<_>>>()?;

    Ok(Node {
        id: raw.id,
        kind,
        component_id: component.id,
        label: data.label.or(component.label),
        implementation_ref: component
            .implementation_class
            .filter(|s| !s.trim().is_empty()),
        parameters,
        threads,
    })
}

impl PipelineGraph {
    /// Parse a sheet document
    pub fn from_json(json: &str) -> Result<Self> {
        let doc: SheetDocument = serde_json::from_str(json)?;
        Self::from_document(doc)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let doc: SheetDocument = serde_json::from_value(value)?;
        Self::from_document(doc)
    }

    pub fn from_sheet_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&json)
    }

    fn from_document(doc: SheetDocument) -> Result<Self> {
        let id = doc.id.unwrap_or_else(|| "sheet".to_string());
        let version = doc.version.map(|v| match v {
            Value::String(s) => s,
            other => other.to_string(),
        });

        // First pass: nodes
        let mut nodes = Vec::with_capacity(doc.nodes.len());
        let mut index = HashMap::new();
        for raw in doc.nodes {
            let node = convert_node(raw)?;
            if index.insert(node.id.clone(), nodes.len()).is_some() {
                return Err(Error::Structural(format!("duplicate node id '{}'", node.id)));
            }
            nodes.push(node);
        }

        // Second pass: edges
        let mut edges = Vec::with_capacity(doc.edges.len());
        for (i, raw) in doc.edges.into_iter().enumerate() {
            for end in [&raw.source, &raw.target] {
                if !index.contains_key(end) {
                    return Err(Error::Structural(format!(
                        "edge references unknown node '{end}'"
                    )));
                }
            }
            edges.push(Edge {
                id: raw.id.unwrap_or_else(|| format!("edge-{i}")),
                channel: Channel::from_handle(raw.source_handle.as_deref()),
                source: raw.source,
                target: raw.target,
            });
        }

        Ok(Self {
            name: doc.name.unwrap_or_else(|| id.clone()),
            id,
            version,
            nodes,
            edges,
            index,
        })
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Edges leaving `id`, in document order
    pub fn outputs_of<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.source == id)
    }

    /// Edges entering `id`, in document order
    pub fn inputs_of<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.target == id)
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.iter().filter(move |n| n.kind == kind)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}
