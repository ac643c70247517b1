//! Integration tests running sheets through the interpreter
//!
//! Each sheet is built as designer JSON, so these also cover parsing,
//! validation, both analyzers and parameter binding end to end.

use etlflow_compiler::generator::generate_from_plan;
use etlflow_compiler::{generate, BuildConfig, Error, FlowPlan, Interpreter, PipelineGraph};
use etlflow_components::{ComponentDescriptor, ComponentRegistry};
use etlflow_runtime::{
    async_trait, Component, ComponentKind, ExecutionContext, MemorySink, ParameterSet, Ports,
    Result, Value, WorkerContext,
};
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;

/// Records every row's `value` in `<node>.seen`, terminators as "END"
#[derive(Default)]
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
                row.get("value").cloned().unwrap_or(Value::Null)
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

fn registry() -> ComponentRegistry {
    let mut registry = ComponentRegistry::with_builtins();
    registry.register(ComponentDescriptor::custom(
        "collector",
        ComponentKind::Destination,
        "test_support::Collector",
        || Box::new(Collector::default()),
    ));
    registry
}

fn context() -> (Arc<ExecutionContext>, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let ctx = ExecutionContext::builder()
        .without_tracing()
        .queue_capacity(4)
        .sink(sink.clone())
        .build();
    (ctx, sink)
}

fn control(id: &str, from: &str, to: &str) -> serde_json::Value {
    json!({"id": id, "source": from, "target": to, "sourceHandle": "control-flow-out", "targetHandle": "control-flow-in"})
}

fn data(id: &str, from: &str, to: &str) -> serde_json::Value {
    json!({"id": id, "source": from, "target": to, "sourceHandle": "data-out", "targetHandle": "data-in"})
}

/// start -> sequence(rows) -> `transforms` x filter(condition) -> collector, stop after the source
fn sheet(rows: i64, transforms: usize, condition: &str) -> serde_json::Value {
    let mut nodes = vec![
        json!({"id": "start", "type": "start"}),
        json!({"id": "seq", "type": "source", "data": {"label": "Numbers", "componentData": {
            "id": "sequence-source",
            "implementationClass": "sequence-source",
            "parameters": [{"name": "count", "value": rows.to_string(), "parameterType": "number"}]
        }}}),
    ];
    let mut edges = vec![control("c1", "start", "seq")];
    let mut prev = "seq".to_string();
    for i in 0..transforms {
        let id = format!("f{i}");
        nodes.push(json!({"id": id, "type": "transform", "data": {"componentData": {
            "id": "filter",
            "implementationClass": "etlflow_components::FilterComponent",
            "parameters": [{"name": "condition", "value": condition, "parameterType": "string"}]
        }}}));
        edges.push(data(&format!("d{i}"), &prev, &id));
        prev = id;
    }
    nodes.push(json!({"id": "out", "type": "destination", "data": {"componentData": {
        "id": "collector",
        "implementationClass": "collector"
    }}}));
    nodes.push(json!({"id": "stop", "type": "stop"}));
    edges.push(data("dout", &prev, "out"));
    edges.push(control("c2", "seq", "stop"));
    json!({"id": "numbers", "version": "1", "name": "Numbers", "nodes": nodes, "edges": edges})
}

fn seen(ctx: &ExecutionContext, node: &str) -> Vec<Value> {
    match ctx.get_var(&format!("{node}.seen")) {
        Some(Value::Array(items)) => items,
        other => panic!("{node} recorded nothing: {other:?}"),
    }
}

#[tokio::test]
async fn test_rows_then_terminator_in_order() {
    let graph = PipelineGraph::from_value(sheet(3, 1, "true")).unwrap();
    let (ctx, sink) = context();

    let report = Interpreter::new(registry()).run(&graph, ctx.clone()).await.unwrap();

    assert!(report.succeeded, "{:?}", report.failures);
    assert_eq!(seen(&ctx, "out"), vec![json!(1), json!(2), json!(3), json!("END")]);
    assert_eq!(report.row_counts["seq"].sent, 3);
    assert_eq!(report.row_counts["out"].received, 3);

    let records = sink.records();
    assert!(records
        .iter()
        .any(|r| r.component == "Numbers (seq)" && r.message == "Execution completed successfully"));
    assert!(records.iter().any(|r| r.message == "Flow execution completed"));
}

#[tokio::test]
async fn test_filter_drops_rows() {
    let graph = PipelineGraph::from_value(sheet(5, 2, "value > 3")).unwrap();
    let (ctx, _) = context();
    let report = Interpreter::new(registry()).run(&graph, ctx.clone()).await.unwrap();
    assert!(report.succeeded);
    assert_eq!(seen(&ctx, "out"), vec![json!(4), json!(5), json!("END")]);
}

#[tokio::test]
async fn test_zero_rows_still_terminates() {
    let graph = PipelineGraph::from_value(sheet(0, 2, "true")).unwrap();
    let (ctx, _) = context();

    let report = tokio::time::timeout(
        std::time::Duration::from_secs(10),
        Interpreter::new(registry()).run(&graph, ctx.clone()),
    )
    .await
    .expect("flow with an empty source must finish")
    .unwrap();

    assert!(report.succeeded);
    assert_eq!(seen(&ctx, "out"), vec![json!("END")]);
}

#[tokio::test]
async fn test_no_path_to_stop_fails_without_generation() {
    let mut doc = sheet(3, 0, "true");
    doc["edges"].as_array_mut().unwrap().retain(|e| e["id"] != "c2");
    let graph = PipelineGraph::from_value(doc).unwrap();

    let err = generate(&graph, &registry(), &BuildConfig::default()).unwrap_err();
    assert!(matches!(&err, Error::Structural(msg) if msg.contains("no path between start node 'start' and stop node 'stop'")));

    let (ctx, _) = context();
    let err = Interpreter::new(registry()).run(&graph, ctx.clone()).await.unwrap_err();
    assert!(err.is_structural());
    assert!(ctx.get_var("out.seen").is_none());
}

#[tokio::test]
async fn test_fan_in_merges_terminators() {
    let mut doc = sheet(2, 0, "true");
    let nodes = doc["nodes"].as_array_mut().unwrap();
    nodes.push(json!({"id": "seq2", "type": "source", "data": {"componentData": {
        "id": "sequence-source",
        "implementationClass": "sequence-source",
        "parameters": [
            {"name": "count", "value": 2, "parameterType": "number"},
            {"name": "start", "value": 10, "parameterType": "number"}
        ]
    }}}));
    let edges = doc["edges"].as_array_mut().unwrap();
    edges.push(control("c3", "start", "seq2"));
    edges.push(data("d2", "seq2", "out"));
    let graph = PipelineGraph::from_value(doc).unwrap();
    let (ctx, _) = context();

    let report = Interpreter::new(registry()).run(&graph, ctx.clone()).await.unwrap();
    assert!(report.succeeded, "{:?}", report.failures);

    let mut values = seen(&ctx, "out");
    assert_eq!(values.pop(), Some(json!("END")));
    assert!(!values.contains(&json!("END")));
    let mut numbers: Vec<i64> = values.iter().filter_map(Value::as_i64).collect();
    numbers.sort_unstable();
    assert_eq!(numbers, vec![1, 2, 10, 11]);
}

#[tokio::test]
async fn test_failing_source_is_reported() {
    let mut doc = sheet(3, 1, "true");
    doc["nodes"][1]["data"]["componentData"] = json!({
        "id": "file-source",
        "implementationClass": "file-source",
        "parameters": [{"name": "filepath", "value": "/nonexistent/etlflow/input.csv", "parameterType": "string"}]
    });
    let graph = PipelineGraph::from_value(doc).unwrap();
    let (ctx, _) = context();

    let report = Interpreter::new(registry()).run(&graph, ctx.clone()).await.unwrap();
    assert!(!report.succeeded);
    assert!(report.failures.iter().any(|f| f.node_id == "seq"));
    assert!(report.into_result().is_err());
}

#[tokio::test]
async fn test_missing_required_parameter_is_generation_error() {
    let mut doc = sheet(3, 1, "true");
    doc["nodes"][2]["data"]["componentData"]["parameters"] = json!([]);
    let graph = PipelineGraph::from_value(doc).unwrap();
    let (ctx, _) = context();

    let err = Interpreter::new(registry()).run(&graph, ctx).await.unwrap_err();
    assert!(matches!(err, Error::Generation(msg) if msg.contains("'condition'")));
}

#[test]
fn test_generation_is_repeatable() {
    let graph = PipelineGraph::from_value(sheet(3, 2, "value != \"x\"")).unwrap();
    let first = generate(&graph, &registry(), &BuildConfig::default()).unwrap();
    let second = generate(&graph, &registry(), &BuildConfig::default()).unwrap();
    assert_eq!(first.source, second.source);
    assert!(first.source.contains("test_support::Collector::default()"));
    assert!(first.source.contains(r#"Value::from("value != \"x\"")"#));
}

#[test]
fn test_plans_and_sources_match_across_builds() {
    // Two sources fanning into one destination through a shared filter
    let mut doc = sheet(3, 1, "value > 1");
    doc["nodes"].as_array_mut().unwrap().push(json!({"id": "seq2", "type": "source", "data": {"componentData": {
        "id": "sequence-source",
        "implementationClass": "sequence-source"
    }}}));
    let edges = doc["edges"].as_array_mut().unwrap();
    edges.push(control("c3", "start", "seq2"));
    edges.push(data("d2", "seq2", "f0"));
    edges.push(data("d3", "seq2", "out"));
    let graph = PipelineGraph::from_value(doc).unwrap();
    let config = BuildConfig::default();

    let first = FlowPlan::build(&graph, &registry()).unwrap();
    let second = FlowPlan::build(&graph, &registry()).unwrap();
    assert_eq!(first.connections, second.connections);
    assert_eq!(
        first.connections,
        vec![
            ("seq".to_string(), "f0".to_string()),
            ("f0".to_string(), "out".to_string()),
            ("seq2".to_string(), "f0".to_string()),
            ("seq2".to_string(), "out".to_string()),
        ]
    );

    let a = generate_from_plan(&first, &config).unwrap();
    let b = generate_from_plan(&second, &config).unwrap();
    assert_eq!(a.source, b.source);
    assert_eq!(a.cargo_toml, b.cargo_toml);
    assert_eq!(a.dependencies, b.dependencies);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_destination_sees_every_row_then_one_terminator(rows in 0i64..40, transforms in 0usize..4) {
        let graph = PipelineGraph::from_value(sheet(rows, transforms, "true")).unwrap();
        let (ctx, _) = context();
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let report = runtime
            .block_on(Interpreter::new(registry()).run(&graph, ctx.clone()))
            .unwrap();

        prop_assert!(report.succeeded);
        let values = seen(&ctx, "out");
        prop_assert_eq!(values.len() as i64, rows + 1);
        prop_assert_eq!(values.last(), Some(&json!("END")));
        let expected: Vec<Value> = (1..=rows).map(Value::from).collect();
        prop_assert_eq!(&values[..rows as usize], &expected[..]);
    }
}
