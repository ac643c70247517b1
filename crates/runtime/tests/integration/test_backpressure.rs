//! Bounded queues must throttle a producer that outruns its consumer

use etlflow_runtime::{
    async_trait, Component, ComponentKind, ExecutionContext, ParameterSet, Ports, Result, Row,
    Supervisor, WorkerContext,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const CAPACITY: usize = 2;

struct EagerSource {
    params: ParameterSet,
    sent: Arc<AtomicUsize>,
}

#[async_trait]
impl Component for EagerSource {
    fn component_id(&self) -> &str {
        "eager-source"
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
        for i in 0..50 {
            ports.send(Row::new().with("i", i)).await?;
            self.sent.fetch_add(1, Ordering::SeqCst);
        }
        ports.output.finish().await
    }
}

struct SlowSink {
    params: ParameterSet,
    sent: Arc<AtomicUsize>,
    observed_before_first_take: Arc<AtomicUsize>,
}

#[async_trait]
impl Component for SlowSink {
    fn component_id(&self) -> &str {
        "slow-sink"
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
    async fn run(&mut self, _ctx: &WorkerContext, ports: &mut Ports) -> Result<()> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        self.observed_before_first_take
            .store(self.sent.load(Ordering::SeqCst), Ordering::SeqCst);
        while !ports.take().await?.is_terminator() {}
        Ok(())
    }
}

#[tokio::test]
async fn test_full_queue_blocks_producer() {
    let ctx = ExecutionContext::builder()
        .without_tracing()
        .queue_capacity(CAPACITY)
        .build();
    let sent = Arc::new(AtomicUsize::new(0));
    let observed = Arc::new(AtomicUsize::new(usize::MAX));

    let mut sup = Supervisor::new(ctx);
    sup.add_worker(
        "src",
        "src",
        Box::new(EagerSource {
            params: ParameterSet::default(),
            sent: sent.clone(),
        }),
    )
    .unwrap();
    sup.add_worker(
        "dst",
        "dst",
        Box::new(SlowSink {
            params: ParameterSet::default(),
            sent: sent.clone(),
            observed_before_first_take: observed.clone(),
        }),
    )
    .unwrap();
    sup.connect("src", "dst").unwrap();

    let report = sup.run().await.unwrap();
    assert!(report.succeeded);

    // The producer can run ahead by at most the queue capacity
    assert!(observed.load(Ordering::SeqCst) <= CAPACITY);
    assert_eq!(sent.load(Ordering::SeqCst), 50);
}
