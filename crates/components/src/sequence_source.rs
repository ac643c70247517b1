//! SequenceSourceComponent - generates numbered rows
//!
//! Emits `count` rows whose `field` holds `start`, `start + 1`, ... and
//! then the terminator. Useful for smoke-testing a sheet without inputs.

use crate::registry::ComponentDefinition;
use etlflow_runtime::{
    async_trait, Component, ComponentKind, Error, ParameterDef, ParameterSet, Ports, Result, Row,
    WorkerContext,
};

/// Emits `count` rows holding consecutive integers
pub struct SequenceSourceComponent {
    params: ParameterSet,
}

impl Default for SequenceSourceComponent {
    fn default() -> Self {
        Self {
            params: ParameterSet::new(vec![
                ParameterDef::number("count").label("Row Count").default_value(3),
                ParameterDef::number("start").label("First Value").default_value(1),
                ParameterDef::string("field").label("Field Name").default_value("value"),
            ]),
        }
    }
}

impl ComponentDefinition for SequenceSourceComponent {
    const ID: &'static str = "sequence-source";
    const LABEL: &'static str = "Sequence Source";
    const DESCRIPTION: &'static str = "Generates a sequence of numbered rows";
    const KIND: ComponentKind = ComponentKind::Source;
    const TYPE_PATH: &'static str = "etlflow_components::SequenceSourceComponent";
    const SUPPORTS_CONTROL_FLOW: bool = true;
}

#[async_trait]
impl Component for SequenceSourceComponent {
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
        let count = self.params.get_i64("count")?.unwrap_or(3);
        if count < 0 {
            return Err(Error::parameter("count", "must not be negative"));
        }
        let start = self.params.get_i64("start")?.unwrap_or(1);
        let field = self.params.get_str("field").unwrap_or_else(|| "value".into());
        if count > 0 && start.checked_add(count - 1).is_none() {
            return Err(Error::parameter(
                "start",
                format!("{start} + {count} rows overflows a 64-bit integer"),
            ));
        }

        for value in (0..count).map(|i| start + i) {
            ports.send(Row::new().with(field.as_str(), value)).await?;
        }
        ctx.debug(format!("Generated {count} rows"));
        ports.output.finish().await
    }
}
