//! Execution context shared by every worker of one pipeline run
//!
//! The [`ExecutionContext`] owns the run-wide state: the variable bag, the
//! log sequence counter and the log sinks. Each worker receives its own
//! [`WorkerContext`], which carries the component marker explicitly so log
//! lines stay attributable when workers interleave.

use crate::loading::LoadingContext;
use crate::row::Value;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Default bounded queue capacity between two workers
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Marker written for log lines emitted outside of any component
pub const NO_COMPONENT: &str = "-";

/// Worker log severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// One worker log line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Monotonic per-run sequence number, starting at 1
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    /// Component marker, `-` when none is set
    pub component: String,
    pub message: String,
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:06}] {} {:<5} [{}] {}",
            self.seq,
            self.timestamp.to_rfc3339(),
            self.severity,
            self.component,
            self.message
        )
    }
}

/// Re-establish emission order after out-of-order transport
pub fn sort_records(records: &mut [LogRecord]) {
    records.sort_by_key(|r| r.seq);
}

/// Destination for worker log records
pub trait LogSink: Send + Sync {
    fn emit(&self, record: &LogRecord);
}

/// Forwards records to the installed `tracing` subscriber
#[derive(Debug, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, record: &LogRecord) {
        let seq = record.seq;
        let component = record.component.as_str();
        match record.severity {
            Severity::Debug => tracing::debug!(seq, component, "{}", record.message),
            Severity::Info => tracing::info!(seq, component, "{}", record.message),
            Severity::Warn => tracing::warn!(seq, component, "{}", record.message),
            Severity::Error => tracing::error!(seq, component, "{}", record.message),
        }
    }
}

/// Writes one JSON object per record, suitable for shipping over a message bus
pub struct JsonLinesSink {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl JsonLinesSink {
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Create (truncate) a file and write records to it
    pub fn create(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::new(Box::new(std::io::BufWriter::new(file))))
    }
}

impl LogSink for JsonLinesSink {
    fn emit(&self, record: &LogRecord) {
        let mut writer = self.writer.lock();
        let written = serde_json::to_writer(&mut *writer, record)
            .map_err(std::io::Error::from)
            .and_then(|_| writer.write_all(b"\n"))
            .and_then(|_| writer.flush());
        if let Err(e) = written {
            tracing::warn!("Failed to write log record {}: {}", record.seq, e);
        }
    }
}

/// Keeps records in memory; handy for tests and for summaries
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }
}

impl LogSink for MemorySink {
    fn emit(&self, record: &LogRecord) {
        self.records.lock().push(record.clone());
    }
}

/// Rows seen by one node during a run (terminators excluded)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowCounts {
    pub received: u64,
    pub sent: u64,
}

/// Run-wide state shared by all workers of one pipeline execution
pub struct ExecutionContext {
    run_id: uuid::Uuid,
    vars: RwLock<HashMap<String, Value>>,
    seq: AtomicU64,
    sinks: Vec<Arc<dyn LogSink>>,
    queue_capacity: usize,
    loading: LoadingContext,
    row_counts: Mutex<BTreeMap<String, RowCounts>>,
}

impl ExecutionContext {
    /// Context with default settings and a `tracing` sink
    pub fn new() -> Arc<Self> {
        Self::builder().build()
    }

    pub fn builder() -> ExecutionContextBuilder {
        ExecutionContextBuilder::default()
    }

    pub fn run_id(&self) -> uuid::Uuid {
        self.run_id
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// The loading context this run was started in
    pub fn loading_context(&self) -> &LoadingContext {
        &self.loading
    }

    pub fn set_var(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.vars.write().insert(key.into(), value.into());
    }

    pub fn get_var(&self, key: &str) -> Option<Value> {
        self.vars.read().get(key).cloned()
    }

    pub fn remove_var(&self, key: &str) -> Option<Value> {
        self.vars.write().remove(key)
    }

    /// Apply `f` to a variable under the write lock
    pub fn update_var<F>(&self, key: &str, f: F)
    where
        F: FnOnce(&mut Value),
    {
        let mut vars = self.vars.write();
        let slot = vars.entry(key.to_string()).or_insert(Value::Null);
        f(slot);
    }

    /// Snapshot of the variable bag
    pub fn vars(&self) -> HashMap<String, Value> {
        self.vars.read().clone()
    }

    /// Emit one log record stamped with the next sequence number
    pub fn log(&self, severity: Severity, component: Option<&str>, message: impl Into<String>) {
        let record = LogRecord {
            seq: self.seq.fetch_add(1, Ordering::SeqCst) + 1,
            timestamp: Utc::now(),
            severity,
            component: component.unwrap_or(NO_COMPONENT).to_string(),
            message: message.into(),
        };
        for sink in &self.sinks {
            sink.emit(&record);
        }
    }

    pub(crate) fn record_received(&self, node: &str) {
        self.row_counts
            .lock()
            .entry(node.to_string())
            .or_default()
            .received += 1;
    }

    pub(crate) fn record_sent(&self, node: &str) {
        self.row_counts
            .lock()
            .entry(node.to_string())
            .or_default()
            .sent += 1;
    }

    /// Per-node row counters collected so far
    pub fn row_counts(&self) -> BTreeMap<String, RowCounts> {
        self.row_counts.lock().clone()
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("run_id", &self.run_id)
            .field("queue_capacity", &self.queue_capacity)
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

/// Builder for [`ExecutionContext`]
#[derive(Default)]
pub struct ExecutionContextBuilder {
    queue_capacity: Option<usize>,
    sinks: Vec<Arc<dyn LogSink>>,
    loading: Option<LoadingContext>,
    without_tracing: bool,
}

impl ExecutionContextBuilder {
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity.max(1));
        self
    }

    pub fn sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn loading_context(mut self, loading: LoadingContext) -> Self {
        self.loading = Some(loading);
        self
    }

    /// Do not attach the default `tracing` sink
    pub fn without_tracing(mut self) -> Self {
        self.without_tracing = true;
        self
    }

    pub fn build(self) -> Arc<ExecutionContext> {
        let mut sinks = self.sinks;
        if !self.without_tracing {
            sinks.insert(0, Arc::new(TracingSink));
        }
        Arc::new(ExecutionContext {
            run_id: uuid::Uuid::new_v4(),
            vars: RwLock::new(HashMap::new()),
            seq: AtomicU64::new(0),
            sinks,
            queue_capacity: self.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY),
            loading: self.loading.unwrap_or_default(),
            row_counts: Mutex::new(BTreeMap::new()),
        })
    }
}

/// Per-worker handle on the run context
///
/// Passed explicitly into every worker instead of relying on ambient
/// thread-local state.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    ctx: Arc<ExecutionContext>,
    node_id: Option<String>,
    component: Option<String>,
}

impl WorkerContext {
    pub fn new(
        ctx: Arc<ExecutionContext>,
        node_id: impl Into<String>,
        component: impl Into<String>,
    ) -> Self {
        Self {
            ctx,
            node_id: Some(node_id.into()),
            component: Some(component.into()),
        }
    }

    /// Context without a component marker (supervisor-level logging)
    pub fn detached(ctx: Arc<ExecutionContext>) -> Self {
        Self {
            ctx,
            node_id: None,
            component: None,
        }
    }

    /// Same run, different marker. The receiver keeps its own marker.
    pub fn scoped(&self, component: impl Into<String>) -> Self {
        Self {
            ctx: Arc::clone(&self.ctx),
            node_id: self.node_id.clone(),
            component: Some(component.into()),
        }
    }

    pub fn context(&self) -> &Arc<ExecutionContext> {
        &self.ctx
    }

    pub fn node_id(&self) -> Option<&str> {
        self.node_id.as_deref()
    }

    pub fn component(&self) -> Option<&str> {
        self.component.as_deref()
    }

    pub fn log(&self, severity: Severity, message: impl Into<String>) {
        self.ctx.log(severity, self.component(), message);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(Severity::Debug, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(Severity::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(Severity::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(Severity::Error, message);
    }

    pub fn set_var(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.ctx.set_var(key, value);
    }

    pub fn get_var(&self, key: &str) -> Option<Value> {
        self.ctx.get_var(key)
    }
}
