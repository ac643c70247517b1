//! Integration tests for supervisor-driven worker pipelines
//!
//! Covers end-of-stream propagation through chains of varying length,
//! fan-out, fan-in and best-effort completion when a worker fails.

use etlflow_runtime::{
    async_trait, Component, ComponentKind, Error, ExecutionContext, MemorySink, ParameterSet,
    Ports, Result, Row, Supervisor, Value, WorkerContext,
};
use std::sync::Arc;

struct CountingSource {
    params: ParameterSet,
    rows: i64,
}

#[async_trait]
impl Component for CountingSource {
    fn component_id(&self) -> &str {
        "counting-source"
    }
    fn kind(&self) -> ComponentKind {
        ComponentKind::Source
    }
    fn parameters(&self) -> &ParameterSet {
        &self.params
    }
    fn parameters_mut(&mut self) -> &mut ParameterSet {
        &mut self.params
    }
    async fn run(&mut self, _ctx: &WorkerContext, ports: &mut Ports) -> Result<()> {
        for i in 1..=self.rows {
            ports.send(Row::new().with("n", i)).await?;
        }
        ports.output.finish().await
    }
}

struct PassThrough {
    params: ParameterSet,
    fail_after: Option<usize>,
}

#[async_trait]
impl Component for PassThrough {
    fn component_id(&self) -> &str {
        "pass-through"
    }
    fn kind(&self) -> ComponentKind {
        ComponentKind::Transform
    }
    fn parameters(&self) -> &ParameterSet {
        &self.params
    }
    fn parameters_mut(&mut self) -> &mut ParameterSet {
        &mut self.params
    }
    async fn run(&mut self, _ctx: &WorkerContext, ports: &mut Ports) -> Result<()> {
        let mut seen = 0;
        loop {
            let row = ports.take().await?;
            if row.is_terminator() {
                return ports.send(row).await;
            }
            seen += 1;
            if self.fail_after.is_some_and(|n| seen > n) {
                return Err(Error::component("boom"));
            }
            ports.send(row).await?;
        }
    }
}

/// Appends every observed row to the variable `<node>.seen`; terminators as "END"
struct Collector {
    params: ParameterSet,
}

#[async_trait]
impl Component for Collector {
    fn component_id(&self) -> &str {
        "collector"
    }
    fn kind(&self) -> ComponentKind {
        ComponentKind::Destination
    }
    fn parameters(&self) -> &ParameterSet {
        &self.params
    }
    fn parameters_mut(&mut self) -> &mut ParameterSet {
        &mut self.params
    }
    async fn run(&mut self, ctx: &WorkerContext, ports: &mut Ports) -> Result<()> {
        let key = format!("{}.seen", ctx.node_id().unwrap_or("?"));
        loop {
            let row = ports.take().await?;
            let entry = if row.is_terminator() {
                Value::from("END")
            } else {
                row.get("n").cloned().unwrap_or(Value::Null)
            };
            ctx.context().update_var(&key, |v| {
                if !v.is_array() {
                    *v = Value::Array(Vec::new());
                }
                if let Value::Array(items) = v {
                    items.push(entry.clone());
                }
            });
            if row.is_terminator() {
                return Ok(());
            }
        }
    }
}

fn source(rows: i64) -> Box<dyn Component> {
    Box::new(CountingSource {
        params: ParameterSet::default(),
        rows,
    })
}

fn pass(fail_after: Option<usize>) -> Box<dyn Component> {
    Box::new(PassThrough {
        params: ParameterSet::default(),
        fail_after,
    })
}

fn collector() -> Box<dyn Component> {
    Box::new(Collector {
        params: ParameterSet::default(),
    })
}

fn context() -> (Arc<ExecutionContext>, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let ctx = ExecutionContext::builder()
        .without_tracing()
        .queue_capacity(2)
        .sink(sink.clone())
        .build();
    (ctx, sink)
}

fn seen(ctx: &ExecutionContext, node: &str) -> Vec<Value> {
    match ctx.get_var(&format!("{node}.seen")) {
        Some(Value::Array(items)) => items,
        other => panic!("no rows recorded for {node}: {other:?}"),
    }
}

#[tokio::test]
async fn test_chain_lengths_preserve_row_count_and_single_terminator() {
    for transforms in 0..4 {
        let (ctx, _) = context();
        let mut sup = Supervisor::new(ctx.clone());
        sup.add_worker("src", "src", source(25)).unwrap();
        let mut prev = "src".to_string();
        for t in 0..transforms {
            let id = format!("t{t}");
            sup.add_worker(&id, &id, pass(None)).unwrap();
            sup.connect(&prev, &id).unwrap();
            prev = id;
        }
        sup.add_worker("dst", "dst", collector()).unwrap();
        sup.connect(&prev, "dst").unwrap();

        let report = sup.run().await.unwrap();
        assert!(report.succeeded, "{:?}", report.failures);

        let rows = seen(&ctx, "dst");
        assert_eq!(rows.len(), 26);
        assert_eq!(rows.last(), Some(&Value::from("END")));
        assert_eq!(rows.iter().filter(|v| *v == "END").count(), 1);
        assert_eq!(report.row_counts["src"].sent, 25);
        assert_eq!(report.row_counts["dst"].received, 25);
    }
}

#[tokio::test]
async fn test_rows_arrive_in_send_order() {
    let (ctx, _) = context();
    let mut sup = Supervisor::new(ctx.clone());
    sup.add_worker("src", "src", source(3)).unwrap();
    sup.add_worker("filter", "filter", pass(None)).unwrap();
    sup.add_worker("dst", "dst", collector()).unwrap();
    sup.connect("src", "filter").unwrap();
    sup.connect("filter", "dst").unwrap();

    let report = sup.run().await.unwrap();
    assert!(report.succeeded);
    assert_eq!(
        seen(&ctx, "dst"),
        vec![Value::from(1), Value::from(2), Value::from(3), Value::from("END")]
    );
}

#[tokio::test]
async fn test_zero_rows_still_terminates() {
    let (ctx, _) = context();
    let mut sup = Supervisor::new(ctx.clone());
    sup.add_worker("src", "src", source(0)).unwrap();
    sup.add_worker("dst", "dst", collector()).unwrap();
    sup.connect("src", "dst").unwrap();

    let report = tokio::time::timeout(std::time::Duration::from_secs(5), sup.run())
        .await
        .expect("destination blocked waiting for terminator")
        .unwrap();
    assert!(report.succeeded);
    assert_eq!(seen(&ctx, "dst"), vec![Value::from("END")]);
}

#[tokio::test]
async fn test_fan_out_delivers_every_row_to_each_consumer() {
    let (ctx, _) = context();
    let mut sup = Supervisor::new(ctx.clone());
    sup.add_worker("src", "src", source(10)).unwrap();
    sup.add_worker("a", "a", collector()).unwrap();
    sup.add_worker("b", "b", collector()).unwrap();
    sup.connect("src", "a").unwrap();
    sup.connect("src", "b").unwrap();

    let report = sup.run().await.unwrap();
    assert!(report.succeeded);
    assert_eq!(seen(&ctx, "a").len(), 11);
    assert_eq!(seen(&ctx, "b").len(), 11);
}

#[tokio::test]
async fn test_fan_in_merges_terminators() {
    let (ctx, _) = context();
    let mut sup = Supervisor::new(ctx.clone());
    sup.add_worker("s1", "s1", source(4)).unwrap();
    sup.add_worker("s2", "s2", source(6)).unwrap();
    sup.add_worker("dst", "dst", collector()).unwrap();
    sup.connect("s1", "dst").unwrap();
    sup.connect("s2", "dst").unwrap();
    assert!(!sup.connect("s2", "dst").unwrap(), "duplicate edge must be ignored");

    let report = sup.run().await.unwrap();
    assert!(report.succeeded);
    let rows = seen(&ctx, "dst");
    assert_eq!(rows.len(), 11);
    assert_eq!(rows.iter().filter(|v| *v == "END").count(), 1);
    assert_eq!(rows.last(), Some(&Value::from("END")));
}

#[tokio::test]
async fn test_failing_worker_does_not_hang_siblings() {
    let (ctx, sink) = context();
    let mut sup = Supervisor::new(ctx.clone());
    sup.add_worker("src", "Source (src)", source(100)).unwrap();
    sup.add_worker("t", "Broken (t)", pass(Some(2))).unwrap();
    sup.add_worker("dst", "Sink (dst)", collector()).unwrap();
    sup.connect("src", "t").unwrap();
    sup.connect("t", "dst").unwrap();

    let report = tokio::time::timeout(std::time::Duration::from_secs(5), sup.run())
        .await
        .expect("run must finish")
        .unwrap();

    assert!(!report.succeeded);
    let failed: Vec<&str> = report.failures.iter().map(|f| f.node_id.as_str()).collect();
    assert!(failed.contains(&"t"));
    // downstream sees the closed queue instead of blocking forever
    assert!(failed.contains(&"dst"));
    assert!(report.clone().into_result().is_err());

    let records = sink.records();
    assert!(records
        .iter()
        .any(|r| r.component == "Broken (t)" && r.message.starts_with("Execution failed")));
    assert!(records.iter().any(|r| r.message.starts_with("Flow execution failed")));
}

#[tokio::test]
async fn test_every_log_line_is_attributed() {
    let (ctx, sink) = context();
    let mut sup = Supervisor::new(ctx.clone());
    sup.add_worker("src", "Numbers (src)", source(2)).unwrap();
    sup.add_worker("dst", "Sink (dst)", collector()).unwrap();
    sup.connect("src", "dst").unwrap();
    sup.run().await.unwrap();

    let records = sink.records();
    let starts: Vec<&str> = records
        .iter()
        .filter(|r| r.message == "Starting execution")
        .map(|r| r.component.as_str())
        .collect();
    assert_eq!(starts.len(), 2);
    assert!(starts.contains(&"Numbers (src)"));
    assert!(starts.contains(&"Sink (dst)"));
    assert_eq!(records.last().unwrap().message, "Flow execution completed");

    let mut seqs: Vec<u64> = records.iter().map(|r| r.seq).collect();
    seqs.sort_unstable();
    seqs.dedup();
    assert_eq!(seqs.len(), records.len());
}

#[tokio::test]
async fn test_wiring_rejects_wrong_direction() {
    let (ctx, _) = context();
    let mut sup = Supervisor::new(ctx);
    sup.add_worker("src", "src", source(1)).unwrap();
    sup.add_worker("dst", "dst", collector()).unwrap();
    assert!(sup.connect("dst", "src").is_err());
    assert!(sup.connect("src", "missing").is_err());
    assert!(sup.add_worker("src", "again", source(1)).is_err());
}
