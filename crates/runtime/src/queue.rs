//! Bounded queues connecting producer and consumer workers
//!
//! Every consumer owns one bounded `mpsc` channel. Each upstream producer
//! holds a clone of its sender inside [`OutputPorts`]; sending a row clones
//! it to every registered consumer (fan-out) and waits for capacity, so a
//! slow consumer throttles its producers.

use crate::context::ExecutionContext;
use crate::error::{Error, Result};
use crate::row::Row;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Receiving side of a worker
pub struct InputQueue {
    node: String,
    rx: mpsc::Receiver<Row>,
    producers: usize,
    terminated: usize,
    finished: bool,
    ctx: Arc<ExecutionContext>,
}

impl InputQueue {
    pub(crate) fn new(node: String, rx: mpsc::Receiver<Row>, ctx: Arc<ExecutionContext>) -> Self {
        Self {
            node,
            rx,
            producers: 0,
            terminated: 0,
            finished: false,
            ctx,
        }
    }

    pub(crate) fn add_producer(&mut self) {
        self.producers += 1;
    }

    /// Number of upstream producers wired into this queue
    pub fn producers(&self) -> usize {
        self.producers
    }

    /// Wait for the next row.
    ///
    /// With several producers the consumer sees a single terminator, once
    /// every producer has sent its own. A queue with no producers is already
    /// at end of stream. After the terminator has been returned, further
    /// calls keep returning it.
    pub async fn take(&mut self) -> Result<Row> {
        if self.finished || self.producers == 0 {
            self.finished = true;
            return Ok(Row::terminator());
        }

        loop {
            match self.rx.recv().await {
                Some(row) if row.is_terminator() => {
                    self.terminated += 1;
                    if self.terminated >= self.producers {
                        self.finished = true;
                        return Ok(row);
                    }
                }
                Some(row) => {
                    self.ctx.record_received(&self.node);
                    return Ok(row);
                }
                None => {
                    return Err(Error::UpstreamClosed {
                        node: self.node.clone(),
                    })
                }
            }
        }
    }

    /// True once the merged terminator has been delivered
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Sending side of a worker
pub struct OutputPorts {
    node: String,
    consumers: Vec<(String, mpsc::Sender<Row>)>,
    ctx: Arc<ExecutionContext>,
}

impl OutputPorts {
    pub(crate) fn new(node: String, ctx: Arc<ExecutionContext>) -> Self {
        Self {
            node,
            consumers: Vec::new(),
            ctx,
        }
    }

    pub(crate) fn register(&mut self, consumer: String, tx: mpsc::Sender<Row>) {
        self.consumers.push((consumer, tx));
    }

    pub fn consumer_ids(&self) -> impl Iterator<Item = &str> {
        self.consumers.iter().map(|(id, _)| id.as_str())
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    /// Forward a row to every registered consumer, in registration order.
    ///
    /// Blocks while a consumer's queue is full. Fails if a consumer has
    /// stopped receiving.
    pub async fn send(&self, row: Row) -> Result<()> {
        let is_data = !row.is_terminator();
        for (consumer, tx) in &self.consumers {
            tx.send(row.clone())
                .await
                .map_err(|_| Error::DownstreamClosed {
                    node: self.node.clone(),
                    consumer: consumer.clone(),
                })?;
        }
        if is_data {
            self.ctx.record_sent(&self.node);
        }
        Ok(())
    }

    /// Send the end-of-stream sentinel
    pub async fn finish(&self) -> Result<()> {
        self.send(Row::terminator()).await
    }
}

/// Both ends of a worker, handed to [`Component::run`](crate::Component::run)
pub struct Ports {
    pub input: InputQueue,
    pub output: OutputPorts,
}

impl Ports {
    /// Shorthand for `self.input.take()`
    pub async fn take(&mut self) -> Result<Row> {
        self.input.take().await
    }

    /// Shorthand for `self.output.send(row)`
    pub async fn send(&self, row: Row) -> Result<()> {
        self.output.send(row).await
    }
}

/// Create the queue owned by `node` together with its sender
pub(crate) fn channel(
    node: &str,
    ctx: &Arc<ExecutionContext>,
) -> (mpsc::Sender<Row>, InputQueue, OutputPorts) {
    let (tx, rx) = mpsc::channel(ctx.queue_capacity());
    let input = InputQueue::new(node.to_string(), rx, Arc::clone(ctx));
    let output = OutputPorts::new(node.to_string(), Arc::clone(ctx));
    (tx, input, output)
}
