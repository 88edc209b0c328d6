//! Record dispatchers
//!
//! A dispatcher routes each record to one of a fixed, ordered list of queues.
//! Putting onto a full bounded queue waits; that is back-pressure, not an
//! error. Poison is never dispatched: it is broadcast to every queue with
//! [`broadcast_poison`] once the stream is exhausted.

use anyhow::Result;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use batchline_common::BatchlineError;

use crate::queue::QueueSender;
use crate::record::{Batch, Payload, Record};
use crate::writer::{PartialWrite, RecordWriter};

#[async_trait]
pub trait Dispatcher<P: Payload>: Send {
    async fn dispatch(&mut self, record: Record<P>) -> Result<()>;
}

#[async_trait]
impl<P: Payload> Dispatcher<P> for Box<dyn Dispatcher<P>> {
    async fn dispatch(&mut self, record: Record<P>) -> Result<()> {
        (**self).dispatch(record).await
    }
}

fn require_queues<P>(queues: &[QueueSender<P>]) -> batchline_common::Result<()> {
    if queues.is_empty() {
        return Err(BatchlineError::invalid("queues", "at least one target queue is required"));
    }
    Ok(())
}

/// Sends record `k` (counting from 0 over the dispatcher's lifetime) to
/// queue `k mod N`
#[derive(Debug)]
pub struct RoundRobinDispatcher<P> {
    queues: Vec<QueueSender<P>>,
    dispatched: u64,
}

impl<P> RoundRobinDispatcher<P> {
    pub fn new(queues: Vec<QueueSender<P>>) -> batchline_common::Result<Self> {
        require_queues(&queues)?;
        Ok(Self {
            queues,
            dispatched: 0,
        })
    }

    /// Index of the queue the next record goes to
    pub fn next_target(&self) -> usize {
        (self.dispatched % self.queues.len() as u64) as usize
    }
}

#[async_trait]
impl<P: Payload> Dispatcher<P> for RoundRobinDispatcher<P> {
    async fn dispatch(&mut self, record: Record<P>) -> Result<()> {
        let target = self.next_target();
        self.dispatched = self.dispatched.wrapping_add(1);
        self.queues[target].put_record(record).await
    }
}

/// Picks a queue uniformly at random for every record
#[derive(Debug)]
pub struct RandomDispatcher<P> {
    queues: Vec<QueueSender<P>>,
    rng: StdRng,
}

impl<P> RandomDispatcher<P> {
    pub fn new(queues: Vec<QueueSender<P>>) -> batchline_common::Result<Self> {
        require_queues(&queues)?;
        Ok(Self {
            queues,
            rng: StdRng::from_os_rng(),
        })
    }

    /// Deterministic variant for reproducible runs
    pub fn with_seed(queues: Vec<QueueSender<P>>, seed: u64) -> batchline_common::Result<Self> {
        require_queues(&queues)?;
        Ok(Self {
            queues,
            rng: StdRng::seed_from_u64(seed),
        })
    }
}

#[async_trait]
impl<P: Payload> Dispatcher<P> for RandomDispatcher<P> {
    async fn dispatch(&mut self, record: Record<P>) -> Result<()> {
        let target = self.rng.random_range(0..self.queues.len());
        self.queues[target].put_record(record).await
    }
}

type Predicate<P> = Box<dyn Fn(&Record<P>) -> bool + Send>;

/// Routes a record to the queue of the first matching predicate, else to the
/// default queue. Without a default, unmatched records are dropped.
pub struct ContentBasedDispatcher<P> {
    routes: Vec<(Predicate<P>, QueueSender<P>)>,
    default: Option<QueueSender<P>>,
}

impl<P> ContentBasedDispatcher<P> {
    pub fn builder() -> ContentBasedDispatcherBuilder<P> {
        ContentBasedDispatcherBuilder {
            routes: Vec::new(),
            default: None,
        }
    }
}

#[async_trait]
impl<P: Payload> Dispatcher<P> for ContentBasedDispatcher<P> {
    async fn dispatch(&mut self, record: Record<P>) -> Result<()> {
        let target = self
            .routes
            .iter()
            .find(|(predicate, _)| predicate(&record))
            .map(|(_, queue)| queue)
            .or(self.default.as_ref());

        match target {
            Some(queue) => queue.put_record(record).await,
            None => {
                tracing::debug!(record = record.header().number(), "No route matched, dropping record");
                Ok(())
            }
        }
    }
}

pub struct ContentBasedDispatcherBuilder<P> {
    routes: Vec<(Predicate<P>, QueueSender<P>)>,
    default: Option<QueueSender<P>>,
}

impl<P> ContentBasedDispatcherBuilder<P> {
    /// Add a route; routes are tried in registration order
    pub fn when<F>(mut self, predicate: F, queue: QueueSender<P>) -> Self
    where
        F: Fn(&Record<P>) -> bool + Send + 'static,
    {
        self.routes.push((Box::new(predicate), queue));
        self
    }

    pub fn otherwise(mut self, queue: QueueSender<P>) -> Self {
        self.default = Some(queue);
        self
    }

    pub fn build(self) -> batchline_common::Result<ContentBasedDispatcher<P>> {
        if self.routes.is_empty() && self.default.is_none() {
            return Err(BatchlineError::invalid(
                "routes",
                "a content based dispatcher needs a route or a default queue",
            ));
        }
        Ok(ContentBasedDispatcher {
            routes: self.routes,
            default: self.default,
        })
    }
}

/// Put one poison envelope on every queue, in order.
///
/// Every queue is attempted even if one of them is closed; the first failure
/// is returned.
pub async fn broadcast_poison<P>(queues: &[QueueSender<P>]) -> Result<()> {
    let mut first_error = None;
    for queue in queues {
        if let Err(err) = queue.put_poison().await {
            tracing::warn!(queue = %queue.name(), error = %err, "Failed to broadcast poison record");
            if first_error.is_none() {
                first_error = Some(err);
            }
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Built-in dispatch strategies for fork/join jobs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum DispatchStrategy {
    #[default]
    RoundRobin,
    Random { seed: Option<u64> },
}

impl DispatchStrategy {
    pub fn dispatcher<P: Payload>(
        self,
        queues: Vec<QueueSender<P>>,
    ) -> batchline_common::Result<Box<dyn Dispatcher<P>>> {
        Ok(match self {
            DispatchStrategy::RoundRobin => Box::new(RoundRobinDispatcher::new(queues)?),
            DispatchStrategy::Random { seed: Some(seed) } => {
                Box::new(RandomDispatcher::with_seed(queues, seed)?)
            }
            DispatchStrategy::Random { seed: None } => Box::new(RandomDispatcher::new(queues)?),
        })
    }
}

/// Writer that hands every record of a batch to a dispatcher.
///
/// Records already dispatched cannot be recalled, so a failure partway
/// through a batch is reported as a [`PartialWrite`].
pub struct DispatchWriter<D> {
    dispatcher: D,
}

impl<D> DispatchWriter<D> {
    pub fn new(dispatcher: D) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl<P, D> RecordWriter<P> for DispatchWriter<D>
where
    P: Payload,
    D: Dispatcher<P>,
{
    async fn write_records(&mut self, batch: &Batch<P>) -> Result<()> {
        for (written, record) in batch.iter().enumerate() {
            if let Err(err) = self.dispatcher.dispatch(record.clone()).await {
                return Err(PartialWrite::new(written, batch.len(), &err).into());
            }
        }
        Ok(())
    }
}
