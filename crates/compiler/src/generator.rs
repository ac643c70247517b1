//! Artifact generator
//!
//! Emits a self-contained crate for one flow. Output is a pure function of
//! the plan: the same graph always yields byte-identical sources.

use crate::config::BuildConfig;
use crate::error::{Error, Result};
use crate::graph::PipelineGraph;
use crate::literal::{string_literal, value_expr};
use crate::plan::FlowPlan;
use crate::templates;
use etlflow_components::ComponentRegistry;
use etlflow_runtime::DependencySpec;
use heck::ToSnakeCase;
use std::fs;
use std::path::{Path, PathBuf};

/// Version stamped into generated sources and bundle manifests
pub const COMPILER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A generated flow crate, not yet built
#[derive(Debug, Clone)]
pub struct GeneratedArtifact {
    /// Entry point type name, e.g. `FlowOrders`
    pub flow_type: String,
    /// Fully-qualified entry point, e.g. `etlflow_generated::FlowOrders`
    pub flow_class: String,
    pub package_name: String,
    pub bin_name: String,
    /// Contents of `src/main.rs`
    pub source: String,
    pub cargo_toml: String,
    pub dependencies: Vec<DependencySpec>,
    pub warnings: Vec<String>,
}

impl GeneratedArtifact {
    /// Write `Cargo.toml` and `src/main.rs` under `dir`
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let src_dir = dir.join("src");
        fs::create_dir_all(&src_dir)?;
        fs::write(dir.join("Cargo.toml"), &self.cargo_toml)?;
        let main_rs = src_dir.join("main.rs");
        fs::write(&main_rs, &self.source)?;
        tracing::debug!("Wrote generated crate to {:?}", dir);
        Ok(main_rs)
    }
}

fn toml_path(path: &Path) -> String {
    toml::Value::String(path.to_string_lossy().into_owned()).to_string()
}

/// Generate the crate for `graph`
pub fn generate(
    graph: &PipelineGraph,
    registry: &ComponentRegistry,
    config: &BuildConfig,
) -> Result<GeneratedArtifact> {
    let plan = FlowPlan::build(graph, registry)?;
    generate_from_plan(&plan, config)
}

/// Generate the crate for an already built plan
pub fn generate_from_plan(plan: &FlowPlan, config: &BuildConfig) -> Result<GeneratedArtifact> {
    if plan.workers.is_empty() {
        return Err(Error::Generation(format!(
            "flow '{}' has no component nodes",
            plan.flow_id
        )));
    }

    let mut worker_blocks = String::new();
    for worker in &plan.workers {
        let statements: Vec<String> = worker
            .parameters
            .iter()
            .map(|p| {
                format!(
                    "component.set_parameter({}, {})?;",
                    string_literal(&p.name),
                    value_expr(&p.value)
                )
            })
            .collect();
        worker_blocks.push_str(&templates::generate_worker_block(
            &worker.node_id,
            &worker.display_name,
            &worker.type_path,
            &statements,
        ));
    }

    let connects: Vec<String> = plan
        .connections
        .iter()
        .map(|(from, to)| {
            format!(
                "supervisor.connect({}, {})?;",
                string_literal(from),
                string_literal(to)
            )
        })
        .collect();

    let flow_class = plan.flow_class();
    let mut source = templates::generate_main_header(&plan.flow_id, COMPILER_VERSION);
    source.push_str(&templates::generate_flow(
        &plan.flow_type,
        &flow_class,
        &worker_blocks,
        &connects,
    ));

    let snake = plan.flow_type.to_snake_case();
    let package_name = format!("etlflow-generated-{}", snake.replace('_', "-"));
    let bin_name = snake;

    let crates = config.workspace_root.join("crates");
    let cargo_toml = templates::generate_cargo_toml(
        &package_name,
        &bin_name,
        &toml_path(&crates.join("runtime")),
        &toml_path(&crates.join("components")),
    );

    tracing::info!(
        "Generated {} with {} workers and {} connections",
        flow_class,
        plan.workers.len(),
        plan.connections.len()
    );

    Ok(GeneratedArtifact {
        flow_type: plan.flow_type.clone(),
        flow_class,
        package_name,
        bin_name,
        source,
        cargo_toml,
        dependencies: plan.dependencies.clone(),
        warnings: plan.warnings.clone(),
    })
}

/// Source with right-aligned line numbers, for build diagnostics
pub fn numbered_listing(source: &str) -> String {
    source
        .lines()
        .enumerate()
        .map(|(i, line)| format!("{:>4} | {}", i + 1, line))
        .collect::<Vec<_>>()
        .join("\n")
}
