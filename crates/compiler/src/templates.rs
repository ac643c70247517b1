//! Source templates for generated flow crates
//!
//! The generated crate depends on the local `etlflow-runtime` and
//! `etlflow-components` crates by path and builds a single binary whose
//! `main` hands the flow to the runtime launcher.

/// Text safe inside a `//` or `//!` line comment
pub fn comment_text(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

/// Cargo.toml of the generated crate
///
/// `runtime_path` and `components_path` are already TOML-quoted.
pub fn generate_cargo_toml(
    package_name: &str,
    bin_name: &str,
    runtime_path: &str,
    components_path: &str,
) -> String {
    format!(
        r#"[package]
name = "{package_name}"
version = "0.1.0"
edition = "2021"
description = "etlflow compiled flow - auto-generated"
publish = false

[[bin]]
name = "{bin_name}"
path = "src/main.rs"

[dependencies]
etlflow-runtime = {{ path = {runtime_path} }}
etlflow-components = {{ path = {components_path} }}

# Built on its own, never as part of an enclosing workspace
[workspace]
"#
    )
}

/// Header and imports of `main.rs`
pub fn generate_main_header(flow_id: &str, compiler_version: &str) -> String {
    let flow_id = comment_text(flow_id);
    format!(
        r#"//! Compiled flow for sheet {flow_id}
//!
//! Generated by etlflow flow compiler {compiler_version}. Do not edit.

use etlflow_runtime::{{
    async_trait, CompiledFlow, Component, ExecutionContext, Result, RunReport, Supervisor, Value,
}};
use std::sync::Arc;
"#
    )
}

/// One worker block inside `wire`
pub fn generate_worker_block(
    node_id: &str,
    display_name: &str,
    type_path: &str,
    parameter_statements: &[String],
) -> String {
    let mut block = format!(
        "\n        // {comment}\n        {{\n            let mut component = {type_path}::default();\n",
        comment = comment_text(display_name),
    );
    for statement in parameter_statements {
        block.push_str("            ");
        block.push_str(statement);
        block.push('\n');
    }
    block.push_str(&format!(
        "            supervisor.add_worker({node_id}, {display_name}, Box::new(component))?;\n        }}\n",
        node_id = crate::literal::string_literal(node_id),
        display_name = crate::literal::string_literal(display_name),
    ));
    block
}

/// The flow type, its `CompiledFlow` impl and `main`
pub fn generate_flow(
    flow_type: &str,
    flow_class: &str,
    worker_blocks: &str,
    connect_statements: &[String],
) -> String {
    let connects: String = connect_statements
        .iter()
        .map(|s| format!("        {s}\n"))
        .collect();
    format!(
        r#"
/// Entry point loaded by the etlflow launcher
pub struct {flow_type};

impl {flow_type} {{
    /// Instantiate every component, bind its parameters and wire the queues
    fn wire(ctx: Arc<ExecutionContext>) -> Result<Supervisor> {{
        let mut supervisor = Supervisor::new(ctx);
{worker_blocks}
{connects}
        Ok(supervisor)
    }}
}}

#[async_trait]
impl CompiledFlow for {flow_type} {{
    fn flow_type(&self) -> &'static str {{
        "{flow_class}"
    }}

    async fn execute(&self, ctx: Arc<ExecutionContext>) -> Result<RunReport> {{
        let supervisor = Self::wire(ctx)?;
        supervisor.run().await
    }}
}}

fn main() {{
    std::process::exit(etlflow_runtime::launcher::run_main({flow_type}));
}}
"#
    )
}
