//! Integration tests running built-in components through a supervisor

use etlflow_components::ComponentRegistry;
use etlflow_runtime::{
    async_trait, Component, ComponentKind, ExecutionContext, MemorySink, ParameterSet, Ports,
    Result, Row, Severity, Supervisor, Value, WorkerContext,
};
use std::sync::Arc;

/// Emits rows whose fields change from row to row
#[derive(Default)]
struct ShiftingRows {
    params: ParameterSet,
}

#[async_trait]
impl Component for ShiftingRows {
    fn component_id(&self) -> &str {
        "shifting-rows"
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
        ports.send(Row::new().with("a", 1)).await?;
        ports.send(Row::new().with("a", 2).with("b", "late")).await?;
        ports.send(Row::new().with("a", 3).with("c", "later")).await?;
        ports.output.finish().await
    }
}

fn registry() -> ComponentRegistry {
    ComponentRegistry::with_builtins()
}

fn context() -> (Arc<ExecutionContext>, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let ctx = ExecutionContext::builder()
        .without_tracing()
        .queue_capacity(8)
        .sink(sink.clone())
        .build();
    (ctx, sink)
}

#[tokio::test]
async fn test_file_to_csv_through_filter_and_map() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("people.csv");
    let output = dir.path().join("adults.csv");
    std::fs::write(&input, "name,age\nann,31\n\nbob,12\n\"cy\",45\n").unwrap();

    let registry = registry();
    let (ctx, _) = context();
    let mut sup = Supervisor::new(ctx.clone());

    let mut source = registry.create("file-source").unwrap();
    source
        .set_parameter("filepath", Value::from(input.to_string_lossy().to_string()))
        .unwrap();
    let mut filter = registry.create("filter").unwrap();
    filter.set_parameter("condition", Value::from("age >= 18")).unwrap();
    let mut map = registry.create("map-transform").unwrap();
    map.set_parameter(
        "mappingExpression",
        Value::from("SELECT name AS who, _line AS line"),
    )
    .unwrap();
    let mut dest = registry.create("csv-destination").unwrap();
    dest.set_parameter("filepath", Value::from(output.to_string_lossy().to_string()))
        .unwrap();

    sup.add_worker("src", "File (src)", source).unwrap();
    sup.add_worker("flt", "Filter (flt)", filter).unwrap();
    sup.add_worker("map", "Map (map)", map).unwrap();
    sup.add_worker("dst", "CSV (dst)", dest).unwrap();
    sup.connect("src", "flt").unwrap();
    sup.connect("flt", "map").unwrap();
    sup.connect("map", "dst").unwrap();

    let report = sup.run().await.unwrap();
    assert!(report.succeeded, "{:?}", report.failures);
    assert_eq!(report.row_counts["src"].sent, 3);
    assert_eq!(report.row_counts["dst"].received, 2);

    let written = std::fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(lines, vec!["line,who", "2,ann", "5,\"\"\"cy\"\"\""]);
}

#[tokio::test]
async fn test_missing_required_parameter_fails_worker() {
    let registry = registry();
    let (ctx, sink) = context();
    let mut sup = Supervisor::new(ctx);
    sup.add_worker("src", "File (src)", registry.create("file-source").unwrap())
        .unwrap();
    sup.add_worker("dst", "Log (dst)", registry.create("log-destination").unwrap())
        .unwrap();
    sup.connect("src", "dst").unwrap();

    let report = sup.run().await.unwrap();
    assert!(!report.succeeded);
    assert!(report
        .failures
        .iter()
        .any(|f| f.node_id == "src" && f.message.contains("filepath")));
    assert!(sink
        .records()
        .iter()
        .any(|r| r.component == "File (src)" && r.message.starts_with("Execution failed")));
}

#[tokio::test]
async fn test_sequence_into_log_destination() {
    let registry = registry();
    let (ctx, sink) = context();
    let mut source = registry.create("sequence-source").unwrap();
    source.set_parameter("count", Value::from(5)).unwrap();

    let mut sup = Supervisor::new(ctx.clone());
    sup.add_worker("seq", "Sequence (seq)", source).unwrap();
    sup.add_worker("log", "Log (log)", registry.create("log-destination").unwrap())
        .unwrap();
    sup.connect("seq", "log").unwrap();

    let report = sup.run().await.unwrap();
    assert!(report.succeeded);
    assert_eq!(ctx.get_var("log.rows"), Some(Value::from(5)));
    let logged: Vec<String> = sink
        .records()
        .into_iter()
        .filter(|r| r.component == "Log (log)" && r.message.starts_with("Row "))
        .map(|r| r.message)
        .collect();
    assert_eq!(logged.len(), 5);
    assert_eq!(logged[0], "Row 1: {\"value\":1}");
}

#[tokio::test]
async fn test_database_source_streams_query_rows() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("items.db");
    {
        let conn = rusqlite::Connection::open(&db).unwrap();
        conn.execute_batch(
            "CREATE TABLE items (id INTEGER, name TEXT, price REAL);
             INSERT INTO items VALUES (1, 'pen', 1.5), (2, 'ink', 4.0), (3, 'pad', 2.25);",
        )
        .unwrap();
    }

    let registry = registry();
    let (ctx, _) = context();
    let mut source = registry.create("database-source").unwrap();
    source
        .set_parameter("database", Value::from(db.to_string_lossy().to_string()))
        .unwrap();
    source
        .set_parameter("query", Value::from("SELECT id, name FROM items WHERE price > 2"))
        .unwrap();

    let mut sup = Supervisor::new(ctx.clone());
    sup.add_worker("db", "DB (db)", source).unwrap();
    sup.add_worker("log", "Log (log)", registry.create("log-destination").unwrap())
        .unwrap();
    sup.connect("db", "log").unwrap();

    let report = sup.run().await.unwrap();
    assert!(report.succeeded, "{:?}", report.failures);
    assert_eq!(ctx.get_var("log.rows"), Some(Value::from(2)));
}

#[tokio::test]
async fn test_missing_input_file_reports_path() {
    let registry = registry();
    let (ctx, _) = context();
    let mut source = registry.create("file-source").unwrap();
    source
        .set_parameter("filepath", Value::from("/definitely/not/here.csv"))
        .unwrap();

    let mut sup = Supervisor::new(ctx);
    sup.add_worker("src", "File (src)", source).unwrap();
    sup.add_worker("dst", "Log (dst)", registry.create("log-destination").unwrap())
        .unwrap();
    sup.connect("src", "dst").unwrap();

    let report = sup.run().await.unwrap();
    assert!(!report.succeeded);
    let src_failure = report.failures.iter().find(|f| f.node_id == "src").unwrap();
    assert!(src_failure.message.contains("/definitely/not/here.csv"));
}

#[tokio::test]
async fn test_sequence_start_overflow_is_parameter_error() {
    let registry = registry();
    let (ctx, _) = context();
    let mut source = registry.create("sequence-source").unwrap();
    source.set_parameter("count", Value::from(3)).unwrap();
    source.set_parameter("start", Value::from(i64::MAX - 1)).unwrap();

    let mut sup = Supervisor::new(ctx.clone());
    sup.add_worker("seq", "Sequence (seq)", source).unwrap();
    sup.add_worker("log", "Log (log)", registry.create("log-destination").unwrap())
        .unwrap();
    sup.connect("seq", "log").unwrap();

    let report = sup.run().await.unwrap();
    assert!(!report.succeeded);
    let failure = report.failures.iter().find(|f| f.node_id == "seq").unwrap();
    assert!(failure.message.contains("'start'"), "{}", failure.message);
    assert_eq!(report.row_counts.get("seq").map_or(0, |c| c.sent), 0);
}

#[tokio::test]
async fn test_csv_destination_warns_once_about_unknown_fields() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.csv");
    let registry = registry();
    let (ctx, sink) = context();

    let mut dest = registry.create("csv-destination").unwrap();
    dest.set_parameter("filepath", Value::from(output.to_string_lossy().to_string()))
        .unwrap();

    let mut sup = Supervisor::new(ctx);
    sup.add_worker("src", "Rows (src)", Box::new(ShiftingRows::default()))
        .unwrap();
    sup.add_worker("dst", "CSV (dst)", dest).unwrap();
    sup.connect("src", "dst").unwrap();

    let report = sup.run().await.unwrap();
    assert!(report.succeeded, "{:?}", report.failures);

    let written = std::fs::read_to_string(&output).unwrap();
    assert_eq!(written.lines().collect::<Vec<_>>(), vec!["a", "1", "2", "3"]);

    let warnings: Vec<String> = sink
        .records()
        .into_iter()
        .filter(|r| r.component == "CSV (dst)" && r.severity == Severity::Warn)
        .map(|r| r.message)
        .collect();
    assert_eq!(warnings.len(), 1, "{warnings:?}");
    assert!(warnings[0].contains(": b"), "{}", warnings[0]);
}
