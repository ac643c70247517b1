//! Supervisor - wires workers together and runs one task per node
//!
//! All connections are registered before [`Supervisor::run`] spawns any
//! worker. Failures are recorded per worker; siblings keep running until
//! they finish or observe a closed queue (best-effort completion).

use crate::component::{self, Component};
use crate::context::{ExecutionContext, RowCounts, Severity, WorkerContext};
use crate::error::{Error, Result};
use crate::queue::{self, InputQueue, OutputPorts, Ports};
use crate::row::Row;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

struct Worker {
    node_id: String,
    display_name: String,
    component: Box<dyn Component>,
    input: InputQueue,
    output: OutputPorts,
}

/// A worker that did not complete successfully
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerFailure {
    pub node_id: String,
    pub component: String,
    pub message: String,
}

/// Outcome of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: uuid::Uuid,
    pub succeeded: bool,
    pub workers: usize,
    pub failures: Vec<WorkerFailure>,
    pub row_counts: BTreeMap<String, RowCounts>,
    pub elapsed_ms: u64,
}

impl RunReport {
    /// Turn a failed report into [`Error::RunFailed`]
    pub fn into_result(self) -> Result<Self> {
        if self.succeeded {
            return Ok(self);
        }
        let summary = self
            .failures
            .iter()
            .map(|f| format!("{}: {}", f.component, f.message))
            .collect::<Vec<_>>()
            .join("; ");
        Err(Error::RunFailed(summary))
    }
}

/// Owns the workers of one run and the queues between them
///
/// ```
/// use etlflow_runtime::{ExecutionContext, Supervisor};
///
/// # tokio_test::block_on(async {
/// let ctx = ExecutionContext::builder().without_tracing().build();
/// let report = Supervisor::new(ctx).run().await?;
/// assert!(report.succeeded);
/// assert_eq!(report.workers, 0);
/// # Ok::<(), etlflow_runtime::Error>(())
/// # }).unwrap();
/// ```
pub struct Supervisor {
    ctx: Arc<ExecutionContext>,
    workers: Vec<Worker>,
    index: HashMap<String, usize>,
    senders: HashMap<String, mpsc::Sender<Row>>,
    edges: HashSet<(String, String)>,
}

impl Supervisor {
    pub fn new(ctx: Arc<ExecutionContext>) -> Self {
        Self {
            ctx,
            workers: Vec::new(),
            index: HashMap::new(),
            senders: HashMap::new(),
            edges: HashSet::new(),
        }
    }

    pub fn context(&self) -> &Arc<ExecutionContext> {
        &self.ctx
    }

    /// Register the component that runs for `node_id`
    pub fn add_worker(
        &mut self,
        node_id: &str,
        display_name: &str,
        component: Box<dyn Component>,
    ) -> Result<()> {
        if self.index.contains_key(node_id) {
            return Err(Error::Worker(format!("duplicate worker for node '{node_id}'")));
        }
        let (tx, input, output) = queue::channel(node_id, &self.ctx);
        self.senders.insert(node_id.to_string(), tx);
        self.index.insert(node_id.to_string(), self.workers.len());
        self.workers.push(Worker {
            node_id: node_id.to_string(),
            display_name: display_name.to_string(),
            component,
            input,
            output,
        });
        Ok(())
    }

    /// Route `from`'s output into `to`'s input queue.
    ///
    /// Returns `false` when the connection already exists.
    pub fn connect(&mut self, from: &str, to: &str) -> Result<bool> {
        let from_idx = self.worker_index(from)?;
        let to_idx = self.worker_index(to)?;

        let from_kind = self.workers[from_idx].component.kind();
        let to_kind = self.workers[to_idx].component.kind();
        if !from_kind.has_output() {
            return Err(Error::Worker(format!(
                "'{from}' is a {from_kind} and has no output"
            )));
        }
        if !to_kind.has_input() {
            return Err(Error::Worker(format!("'{to}' is a {to_kind} and has no input")));
        }
        if !self.edges.insert((from.to_string(), to.to_string())) {
            return Ok(false);
        }

        let tx = self
            .senders
            .get(to)
            .cloned()
            .ok_or_else(|| Error::Worker(format!("no queue for '{to}'")))?;
        self.workers[from_idx].output.register(to.to_string(), tx);
        self.workers[to_idx].input.add_producer();
        tracing::debug!("Connected {} -> {}", from, to);
        Ok(true)
    }

    fn worker_index(&self, node_id: &str) -> Result<usize> {
        self.index
            .get(node_id)
            .copied()
            .ok_or_else(|| Error::Worker(format!("unknown node '{node_id}'")))
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Start every worker and wait for all of them
    pub async fn run(mut self) -> Result<RunReport> {
        // Only producers may hold senders once workers start
        self.senders.clear();

        let started = Instant::now();
        let ctx = Arc::clone(&self.ctx);
        let worker_count = self.workers.len();
        tracing::info!("Starting {} workers for run {}", worker_count, ctx.run_id());

        let mut tasks: Vec<(String, String, JoinHandle<Result<()>>)> = Vec::new();
        for worker in self.workers.drain(..) {
            let Worker {
                node_id,
                display_name,
                mut component,
                input,
                output,
            } = worker;
            let wctx = WorkerContext::new(Arc::clone(&ctx), node_id.clone(), display_name.clone());

            tracing::debug!(
                "Spawning worker {} (kind: {}, producers: {}, consumers: {})",
                display_name,
                component.kind(),
                input.producers(),
                output.consumer_count()
            );

            let task = tokio::spawn(async move {
                let mut ports = Ports { input, output };
                let result = component::execute(component.as_mut(), &wctx, &mut ports).await;
                drop(ports);
                result
            });
            tasks.push((node_id, display_name, task));
        }

        let mut failures = Vec::new();
        for (node_id, display_name, task) in tasks {
            let message = match task.await {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(join_err) => {
                    ctx.log(
                        Severity::Error,
                        Some(&display_name),
                        format!("Worker aborted: {join_err}"),
                    );
                    format!("worker panicked: {join_err}")
                }
            };
            tracing::warn!("Worker {} failed: {}", display_name, message);
            failures.push(WorkerFailure {
                node_id,
                component: display_name,
                message,
            });
        }

        let succeeded = failures.is_empty();
        if succeeded {
            ctx.log(Severity::Info, None, "Flow execution completed");
        } else {
            ctx.log(
                Severity::Error,
                None,
                format!("Flow execution failed: {} of {} workers failed", failures.len(), worker_count),
            );
        }

        Ok(RunReport {
            run_id: ctx.run_id(),
            succeeded,
            workers: worker_count,
            failures,
            row_counts: ctx.row_counts(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }
}
