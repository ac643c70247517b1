//! Component contract shared by every pipeline node implementation

use crate::context::WorkerContext;
use crate::error::Result;
use crate::parameter::ParameterSet;
use crate::queue::Ports;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Directional capability of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    /// Produces rows, has no input
    Source,
    /// Consumes rows and produces rows
    Transform,
    /// Consumes rows, has no output
    Destination,
}

impl ComponentKind {
    pub fn has_input(self) -> bool {
        !matches!(self, ComponentKind::Source)
    }

    pub fn has_output(self) -> bool {
        !matches!(self, ComponentKind::Destination)
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ComponentKind::Source => "source",
            ComponentKind::Transform => "transform",
            ComponentKind::Destination => "destination",
        };
        f.write_str(s)
    }
}

/// An executable pipeline component.
///
/// Constructed once per run, parameters bound right after construction,
/// then [`run`](Component::run) is invoked exactly once by its worker after
/// all queues are wired. Sources must finish with exactly one terminator;
/// transforms forward the terminator before returning.
#[async_trait]
pub trait Component: Send {
    /// Registry id of the component (e.g. `"filter"`)
    fn component_id(&self) -> &str;

    fn kind(&self) -> ComponentKind;

    fn parameters(&self) -> &ParameterSet;

    fn parameters_mut(&mut self) -> &mut ParameterSet;

    /// Bind one parameter value
    fn set_parameter(&mut self, name: &str, value: crate::Value) -> Result<()> {
        self.parameters_mut().set(name, value)
    }

    /// Component-specific work
    async fn run(&mut self, ctx: &WorkerContext, ports: &mut Ports) -> Result<()>;
}

/// Run a component with the standard start/completion/failure log lines
pub async fn execute(
    component: &mut dyn Component,
    ctx: &WorkerContext,
    ports: &mut Ports,
) -> Result<()> {
    ctx.info("Starting execution");

    let result = match component.parameters().check_required() {
        Ok(()) => component.run(ctx, ports).await,
        Err(e) => Err(e),
    };

    match &result {
        Ok(()) => ctx.info("Execution completed successfully"),
        Err(e) => ctx.error(format!("Execution failed: {e}")),
    }
    result
}
