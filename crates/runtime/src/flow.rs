//! Entry point contract implemented by every generated flow

use crate::context::ExecutionContext;
use crate::error::{Error, Result};
use crate::supervisor::RunReport;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Method name the loader looks for on an entry point
pub const ENTRY_METHOD: &str = "execute";

/// Type name of the single argument handed to [`CompiledFlow::execute`]
pub const CONTEXT_TYPE: &str = "etlflow_runtime::ExecutionContext";

/// Version of the runtime a flow was linked against
pub const RUNTIME_ABI: &str = env!("CARGO_PKG_VERSION");

/// A generated, self-contained pipeline
#[async_trait]
pub trait CompiledFlow: Send + Sync {
    /// Fully-qualified flow type, matches the bundle's `Flow-Class`
    fn flow_type(&self) -> &'static str;

    async fn execute(&self, ctx: Arc<ExecutionContext>) -> Result<RunReport>;
}

/// What a flow binary reports about itself when asked with `--describe`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowDescriptor {
    pub flow_type: String,
    pub entry_method: String,
    pub context_type: String,
    pub runtime_abi: String,
}

impl FlowDescriptor {
    pub fn for_flow(flow: &dyn CompiledFlow) -> Self {
        Self {
            flow_type: flow.flow_type().to_string(),
            entry_method: ENTRY_METHOD.to_string(),
            context_type: CONTEXT_TYPE.to_string(),
            runtime_abi: RUNTIME_ABI.to_string(),
        }
    }

    /// Check that this descriptor is runnable by a host expecting
    /// `flow_class` on this runtime version.
    pub fn verify(&self, flow_class: &str) -> Result<()> {
        if self.entry_method != ENTRY_METHOD {
            return Err(Error::ContextMismatch(format!(
                "entry point '{}' exposes '{}' instead of '{}'",
                self.flow_type, self.entry_method, ENTRY_METHOD
            )));
        }
        if self.context_type != CONTEXT_TYPE {
            return Err(Error::ContextMismatch(format!(
                "'{}' expects a '{}' context, host provides '{}'",
                self.flow_type, self.context_type, CONTEXT_TYPE
            )));
        }
        if self.runtime_abi != RUNTIME_ABI {
            return Err(Error::ContextMismatch(format!(
                "'{}' was built against runtime {}, host runtime is {}",
                self.flow_type, self.runtime_abi, RUNTIME_ABI
            )));
        }
        if self.flow_type != flow_class {
            return Err(Error::ContextMismatch(format!(
                "bundle declares Flow-Class '{}' but binary implements '{}'",
                flow_class, self.flow_type
            )));
        }
        Ok(())
    }
}
