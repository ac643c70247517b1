//! etlflow runtime
//!
//! The fixed vocabulary every compiled flow is built against:
//!
//! - [`Row`] and its end-of-stream terminator
//! - bounded, fan-out queues ([`InputQueue`], [`OutputPorts`])
//! - the [`Component`] contract and its lifecycle wrapper [`execute`]
//! - the per-run [`ExecutionContext`] and per-worker [`WorkerContext`]
//! - the [`Supervisor`] running one task per node
//! - the [`launcher`] used as the bundle's main entry

pub mod component;
pub mod context;
pub mod dependency;
pub mod error;
pub mod flow;
pub mod launcher;
pub mod loading;
pub mod parameter;
pub mod queue;
pub mod row;
pub mod supervisor;

pub use async_trait::async_trait;
pub use component::{execute, Component, ComponentKind};
pub use context::{
    sort_records, ExecutionContext, ExecutionContextBuilder, JsonLinesSink, LogRecord, LogSink,
    MemorySink, RowCounts, Severity, TracingSink, WorkerContext,
};
pub use dependency::DependencySpec;
pub use error::{Error, Result};
pub use flow::{CompiledFlow, FlowDescriptor};
pub use loading::{LoadingContext, LoadingLayer};
pub use parameter::{ParameterDef, ParameterSet, ParameterType};
pub use queue::{InputQueue, OutputPorts, Ports};
pub use row::{Row, Value};
pub use supervisor::{RunReport, Supervisor, WorkerFailure};
