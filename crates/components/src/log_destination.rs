//! LogDestinationComponent - writes rows to the worker log

use crate::registry::ComponentDefinition;
use etlflow_runtime::{
    async_trait, Component, ComponentKind, ParameterDef, ParameterSet, Ports, Result, Severity,
    WorkerContext,
};

/// Logs every row it receives and records how many it consumed
///
/// The count is stored in the run's variable bag as `<node id>.rows`.
pub struct LogDestinationComponent {
    params: ParameterSet,
}

impl Default for LogDestinationComponent {
    fn default() -> Self {
        Self {
            params: ParameterSet::new(vec![ParameterDef::select("level", &["debug", "info"])
                .label("Log Level")
                .default_value("info")]),
        }
    }
}

impl ComponentDefinition for LogDestinationComponent {
    const ID: &'static str = "log-destination";
    const LABEL: &'static str = "Log Destination";
    const DESCRIPTION: &'static str = "Writes every row to the run log";
    const KIND: ComponentKind = ComponentKind::Destination;
    const TYPE_PATH: &'static str = "etlflow_components::LogDestinationComponent";
}

#[async_trait]
impl Component for LogDestinationComponent {
    fn component_id(&self) -> &str {
        Self::ID
    }

    fn kind(&self) -> ComponentKind {
        Self::KIND
    }

    fn parameters(&self) -> &ParameterSet {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut ParameterSet {
        &mut self.params
    }

    async fn run(&mut self, ctx: &WorkerContext, ports: &mut Ports) -> Result<()> {
        let severity = match self.params.get_str("level").as_deref() {
            Some("debug") => Severity::Debug,
            _ => Severity::Info,
        };

        let mut count = 0u64;
        loop {
            let row = ports.take().await?;
            if row.is_terminator() {
                break;
            }
            count += 1;
            let payload = serde_json::to_string(row.payload())?;
            ctx.log(severity, format!("Row {count}: {payload}"));
        }

        if let Some(node) = ctx.node_id() {
            ctx.set_var(format!("{node}.rows"), count);
        }
        ctx.info(format!("Consumed {count} rows"));
        Ok(())
    }
}
