//! In-process flow interpreter
//!
//! Runs a sheet directly from its plan, without generating or building a
//! crate. Components come from the registry and parameters are bound with
//! the same values the generator would emit, so an interpreted run and a
//! compiled run of the same flow behave identically.

use crate::error::{Error, Result};
use crate::graph::PipelineGraph;
use crate::plan::FlowPlan;
use etlflow_components::ComponentRegistry;
use etlflow_runtime::{ExecutionContext, RunReport, Supervisor};
use std::sync::Arc;

/// Runs sheets in-process
///
/// ```no_run
/// use etlflow_compiler::{Interpreter, PipelineGraph};
/// use etlflow_components::ComponentRegistry;
/// use etlflow_runtime::ExecutionContext;
///
/// # tokio_test::block_on(async {
/// let graph = PipelineGraph::from_sheet_file("orders.json")?;
/// let report = Interpreter::new(ComponentRegistry::with_builtins())
///     .run(&graph, ExecutionContext::new())
///     .await?;
/// println!("{} workers, succeeded: {}", report.workers, report.succeeded);
/// # Ok::<(), etlflow_compiler::Error>(())
/// # }).unwrap();
/// ```
pub struct Interpreter {
    registry: ComponentRegistry,
}

impl Interpreter {
    pub fn new(registry: ComponentRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Build a supervisor with every worker instantiated and connected
    pub fn instantiate(&self, plan: &FlowPlan, ctx: Arc<ExecutionContext>) -> Result<Supervisor> {
        let mut supervisor = Supervisor::new(ctx);

        for worker in &plan.workers {
            let descriptor = self.registry.get(&worker.component_id).ok_or_else(|| {
                Error::Generation(format!(
                    "node '{}': component '{}' is not registered",
                    worker.node_id, worker.component_id
                ))
            })?;
            let mut component = descriptor.create();
            for param in &worker.parameters {
                component.set_parameter(&param.name, param.value.clone())?;
            }
            supervisor.add_worker(&worker.node_id, &worker.display_name, component)?;
        }

        for (from, to) in &plan.connections {
            supervisor.connect(from, to)?;
        }
        Ok(supervisor)
    }

    /// Validate, plan and run `graph`. A run with failed workers still
    /// returns its report; see [`RunReport::into_result`].
    pub async fn run(&self, graph: &PipelineGraph, ctx: Arc<ExecutionContext>) -> Result<RunReport> {
        let plan = FlowPlan::build(graph, &self.registry)?;
        tracing::info!(
            "Interpreting flow '{}' with {} workers",
            plan.flow_id,
            plan.workers.len()
        );
        let supervisor = self.instantiate(&plan, ctx)?;
        Ok(supervisor.run().await?)
    }
}
