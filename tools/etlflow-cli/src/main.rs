//! etlflow - compile and run visual ETL flows
//!
//! Turns a pipeline sheet exported by the designer into a self-contained
//! bundle, and runs bundles.
//!
//! # Usage
//!
//! ```bash
//! # Compile a sheet into a bundle
//! etlflow compile ./orders.json ./orders.bundle
//!
//! # Run a bundle
//! etlflow run ./orders.bundle
//!
//! # Run a sheet in-process without building it
//! etlflow exec ./orders.json --log-json ./orders.log.jsonl
//!
//! # Check a sheet and show how it will be wired
//! etlflow analyze ./orders.json
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use etlflow_compiler::{
    analyze, generate, BuildConfig, BuildOrchestrator, BuildProfile, Interpreter, PipelineGraph,
};
use etlflow_components::ComponentRegistry;
use etlflow_runtime::{ExecutionContext, JsonLinesSink};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// etlflow - compile pipeline sheets into runnable bundles
#[derive(Parser)]
#[command(name = "etlflow")]
#[command(author, version)]
#[command(about = "Compile visual ETL flows into self-contained bundles and run them")]
struct Args {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    verbosity: u8,

    /// Diagnostic logging; build errors include the generated source
    #[arg(long, global = true)]
    verbose: bool,

    /// Build configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate, generate and build a sheet into a bundle
    Compile {
        /// Pipeline sheet (JSON)
        sheet: PathBuf,

        /// Bundle to write
        output: PathBuf,

        /// Build the flow binary without optimizations
        #[arg(long)]
        debug: bool,

        /// Leave the scratch build directory in place
        #[arg(long)]
        keep_build_dir: bool,
    },

    /// Load and run a bundle
    Run {
        /// Bundle produced by `compile`
        bundle: PathBuf,
    },

    /// Run a sheet in-process without building it
    Exec {
        /// Pipeline sheet (JSON)
        sheet: PathBuf,

        /// Also write worker log records as JSON lines
        #[arg(long)]
        log_json: Option<PathBuf>,
    },

    /// Print the validation and analysis report as JSON
    Analyze {
        /// Pipeline sheet (JSON)
        sheet: PathBuf,
    },

    /// List registered components
    Components,

    /// Write the generated crate without building it
    Generate {
        /// Pipeline sheet (JSON)
        sheet: PathBuf,

        /// Directory for the generated crate
        #[arg(short, long, default_value = "./generated")]
        out: PathBuf,
    },
}

fn load_sheet(path: &Path) -> Result<PipelineGraph> {
    PipelineGraph::from_sheet_file(path)
        .with_context(|| format!("Failed to load sheet {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    let level = if args.verbose {
        args.verbosity.max(2)
    } else {
        args.verbosity
    };
    let filter = match level {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    let mut config = BuildConfig::load(args.config.as_ref())
        .context("Failed to load build configuration")?;
    tracing::debug!("Build configuration: {:?}", config);

    let registry = ComponentRegistry::with_builtins();

    match args.command {
        Command::Compile {
            sheet,
            output,
            debug,
            keep_build_dir,
        } => {
            if debug {
                config.profile = BuildProfile::Debug;
            }
            config.keep_build_dir |= keep_build_dir;

            let graph = load_sheet(&sheet)?;
            let result = BuildOrchestrator::new(config, registry)
                .verbose(args.verbose)
                .compile(&graph, &output)
                .await
                .with_context(|| format!("Failed to compile {}", sheet.display()))?;

            for warning in &result.warnings {
                eprintln!("warning: {warning}");
            }
            if let Some(dir) = &result.build_dir {
                eprintln!("Build directory kept at {}", dir.display());
            }
            println!("{}", result.bundle_path.display());
        }

        Command::Run { bundle } => {
            etlflow_compiler::run_bundle(&bundle, Some(config.queue_capacity), level >= 2)
                .await
                .with_context(|| format!("Failed to run {}", bundle.display()))?;
        }

        Command::Exec { sheet, log_json } => {
            let graph = load_sheet(&sheet)?;
            let mut builder = ExecutionContext::builder().queue_capacity(config.queue_capacity);
            if let Some(path) = &log_json {
                let sink = JsonLinesSink::create(path)
                    .with_context(|| format!("Failed to create {}", path.display()))?;
                builder = builder.sink(Arc::new(sink));
            }

            let report = Interpreter::new(registry)
                .run(&graph, builder.build())
                .await
                .with_context(|| format!("Failed to run {}", sheet.display()))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            report.into_result().context("Flow execution failed")?;
        }

        Command::Analyze { sheet } => {
            let graph = load_sheet(&sheet)?;
            let analysis = analyze(&graph, &registry);
            println!("{}", serde_json::to_string_pretty(&analysis)?);
            if !analysis.is_valid {
                bail!("Flow '{}' is invalid", analysis.flow_id);
            }
        }

        Command::Components => {
            let infos: Vec<_> = registry.list().into_iter().map(|d| d.info()).collect();
            println!("{}", serde_json::to_string_pretty(&infos)?);
        }

        Command::Generate { sheet, out } => {
            let graph = load_sheet(&sheet)?;
            let artifact = generate(&graph, &registry, &config)
                .with_context(|| format!("Failed to generate {}", sheet.display()))?;
            let main_rs = artifact
                .write_to(&out)
                .with_context(|| format!("Failed to write {}", out.display()))?;
            for warning in &artifact.warnings {
                eprintln!("warning: {warning}");
            }
            println!("{}", main_rs.display());
        }
    }

    Ok(())
}
