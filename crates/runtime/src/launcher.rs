//! Bootstrap for generated flow binaries
//!
//! The bundle manifest names this module as `Main-Class`. A generated
//! binary's `main` hands its flow to [`run_main`], which answers the
//! loader's `--describe` handshake or runs the flow inside the loading
//! context the loader prepared.

use crate::context::{ExecutionContext, DEFAULT_QUEUE_CAPACITY};
use crate::error::{Error, Result};
use crate::flow::{CompiledFlow, FlowDescriptor};
use crate::loading::LoadingContext;
use crate::supervisor::RunReport;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Identifier written as the bundle's `Main-Class`
pub const LAUNCHER_ID: &str = "etlflow_runtime::launcher";

/// Flow type the loader expects this binary to implement
pub const FLOW_CLASS_ENV: &str = "ETLFLOW_FLOW_CLASS";
/// Overrides the bounded queue capacity
pub const QUEUE_CAPACITY_ENV: &str = "ETLFLOW_QUEUE_CAPACITY";

/// Process exit code for a failed run
pub const EXIT_FAILURE: i32 = 1;
/// Process exit code when the loader and binary disagree
pub const EXIT_CONTEXT_MISMATCH: i32 = 3;

/// Run a generated flow as a process and return its exit code
pub fn run_main<F: CompiledFlow + 'static>(flow: F) -> i32 {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.iter().any(|a| a == "--describe") {
        return match serde_json::to_string(&FlowDescriptor::for_flow(&flow)) {
            Ok(json) => {
                println!("{json}");
                0
            }
            Err(e) => {
                eprintln!("failed to describe flow: {e}");
                EXIT_FAILURE
            }
        };
    }

    let verbose = args.iter().any(|a| a == "--verbose" || a == "-v");
    init_logging(verbose);

    match launch(&flow) {
        Ok(report) if report.succeeded => 0,
        Ok(report) => {
            for failure in &report.failures {
                tracing::error!("{} failed: {}", failure.component, failure.message);
            }
            EXIT_FAILURE
        }
        Err(e @ Error::ContextMismatch(_)) => {
            tracing::error!("{}", e);
            EXIT_CONTEXT_MISMATCH
        }
        Err(e) => {
            tracing::error!("Flow {} failed to start: {}", flow.flow_type(), e);
            EXIT_FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };
    // A subscriber may already be installed when embedded in tests
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .try_init();
}

/// Check the loader's expectation against the linked flow
pub fn verify_expected_flow(actual: &str, expected: Option<&str>) -> Result<()> {
    match expected {
        Some(expected) if expected != actual => Err(Error::ContextMismatch(format!(
            "loader expects '{expected}' but this binary implements '{actual}'"
        ))),
        _ => Ok(()),
    }
}

fn launch<F: CompiledFlow + 'static>(flow: &F) -> Result<RunReport> {
    let expected = std::env::var(FLOW_CLASS_ENV).ok();
    verify_expected_flow(flow.flow_type(), expected.as_deref())?;

    let loading = LoadingContext::from_env();
    tracing::debug!("Loading context: {:?}", loading.layers());

    let capacity = match std::env::var(QUEUE_CAPACITY_ENV) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| Error::Launch(format!("invalid {QUEUE_CAPACITY_ENV}: '{raw}'")))?,
        Err(_) => DEFAULT_QUEUE_CAPACITY,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let ctx = ExecutionContext::builder()
        .queue_capacity(capacity)
        .loading_context(loading)
        .build();

    tracing::info!("Running {} (run {})", flow.flow_type(), ctx.run_id());
    runtime.block_on(flow.execute(ctx))
}
