//! etlflow compiler
//!
//! Turns a pipeline sheet into something that runs:
//!
//! ```text
//! sheet JSON -> PipelineGraph -> validate -> control/data-flow analysis -> FlowPlan
//!     FlowPlan -> generator -> cargo build -> bundle      (compile)
//!     bundle   -> loader -> flow process                  (run)
//!     FlowPlan -> interpreter -> Supervisor               (exec)
//! ```

pub mod analysis;
pub mod bundle;
pub mod config;
pub mod control_flow;
pub mod data_flow;
pub mod dependencies;
pub mod error;
pub mod generator;
pub mod graph;
pub mod interpreter;
pub mod literal;
pub mod loader;
pub mod orchestrator;
pub mod plan;
pub mod templates;
pub mod validator;

pub use analysis::{analyze, FlowAnalysis};
pub use bundle::{BundleContents, Manifest};
pub use config::{BuildConfig, BuildProfile};
pub use control_flow::ControlSpine;
pub use data_flow::{DataChain, DataFlow};
pub use dependencies::{DependencyResolver, ResolvedDependencies};
pub use error::{Error, Result};
pub use generator::{generate, GeneratedArtifact};
pub use graph::{Channel, Edge, Node, NodeKind, PipelineGraph};
pub use interpreter::Interpreter;
pub use loader::{run_bundle, BundleLoader, ExtractedBundle};
pub use orchestrator::{BuildOrchestrator, BuildOutput};
pub use plan::FlowPlan;
pub use validator::validate;
