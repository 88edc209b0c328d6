//! Fork/join topology
//!
//! One master job reads the source and dispatches every record to one of N
//! worker queues. Each worker job reads its queue up to the first poison
//! record, runs its own pipeline and writes into a shared aggregation queue.
//! The join job reads the aggregation queue until it has seen one poison
//! record per worker and writes to the final sink.
//!
//! ```text
//!                      ┌─> worker-0 ─┐
//! source -> master ────┼─> worker-1 ─┼─> aggregate -> join -> sink
//!                      └─> worker-N ─┘
//! ```
//!
//! Poison is sent by the topology, not by the jobs: the master's queues get
//! one poison each once the master job is over, and every worker sends one
//! poison to the aggregation queue once it is over, whatever the job's
//! status. A failing job therefore never leaves a downstream reader waiting
//! forever.

use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use batchline_common::config::{EngineConfig, DEFAULT_BATCH_SIZE, DEFAULT_ERROR_THRESHOLD, DEFAULT_WORKERS};
use batchline_common::{BatchlineError, Result};

use crate::dispatch::{broadcast_poison, DispatchStrategy, DispatchWriter, Dispatcher};
use crate::job::{Job, JobExecutor, JobReport};
use crate::queue::{self, QueueSender};
use crate::reader::{QueueReader, RecordReader};
use crate::record::Payload;
use crate::stage::Pipeline;
use crate::writer::{QueueWriter, RecordWriter};

type DispatcherFactory<P> =
    Box<dyn FnOnce(Vec<QueueSender<P>>) -> Result<Box<dyn Dispatcher<P>>> + Send>;
type PipelineFactory<P> = Box<dyn FnMut(usize) -> Pipeline<P> + Send>;

enum DispatchSource<P: Payload> {
    Strategy(DispatchStrategy),
    Factory(DispatcherFactory<P>),
}

/// Builder for [`ForkJoinJob`]
pub struct ForkJoinBuilder<P: Payload> {
    name: String,
    reader: Option<Box<dyn RecordReader<P>>>,
    writer: Option<Box<dyn RecordWriter<P>>>,
    workers: usize,
    queue_capacity: Option<usize>,
    dispatch: DispatchSource<P>,
    worker_pipeline: Option<PipelineFactory<P>>,
    batch_size: usize,
    error_threshold: u64,
    pool_size: Option<usize>,
}

impl<P: Payload> ForkJoinBuilder<P> {
    pub fn new() -> Self {
        Self {
            name: "fork-join".to_string(),
            reader: None,
            writer: None,
            workers: DEFAULT_WORKERS,
            queue_capacity: None,
            dispatch: DispatchSource::Strategy(DispatchStrategy::RoundRobin),
            worker_pipeline: None,
            batch_size: DEFAULT_BATCH_SIZE,
            error_threshold: DEFAULT_ERROR_THRESHOLD,
            pool_size: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Source read by the master job
    pub fn reader(mut self, reader: impl RecordReader<P> + 'static) -> Self {
        self.reader = Some(Box::new(reader));
        self
    }

    /// Final sink written by the join job
    pub fn writer(mut self, writer: impl RecordWriter<P> + 'static) -> Self {
        self.writer = Some(Box::new(writer));
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Capacity of every worker queue and of the aggregation queue.
    /// `None` makes them unbounded.
    pub fn queue_capacity(mut self, capacity: Option<usize>) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn dispatch(mut self, strategy: DispatchStrategy) -> Self {
        self.dispatch = DispatchSource::Strategy(strategy);
        self
    }

    /// Build the master's dispatcher from the worker queues, e.g. for
    /// content-based routing
    pub fn dispatcher_factory<F, D>(mut self, factory: F) -> Self
    where
        F: FnOnce(Vec<QueueSender<P>>) -> Result<D> + Send + 'static,
        D: Dispatcher<P> + 'static,
    {
        self.dispatch = DispatchSource::Factory(Box::new(
            move |queues: Vec<QueueSender<P>>| -> Result<Box<dyn Dispatcher<P>>> {
                Ok(Box::new(factory(queues)?))
            },
        ));
        self
    }

    /// Pipeline of each worker, given the worker index
    pub fn worker_pipeline<F>(mut self, factory: F) -> Self
    where
        F: FnMut(usize) -> Pipeline<P> + Send + 'static,
    {
        self.worker_pipeline = Some(Box::new(factory));
        self
    }

    /// Batch size of every job of the topology
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Error threshold of every job of the topology
    pub fn error_threshold(mut self, error_threshold: u64) -> Self {
        self.error_threshold = error_threshold;
        self
    }

    /// Defaults to `workers + 2`
    pub fn pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = Some(pool_size);
        self
    }

    pub fn config(mut self, config: &EngineConfig) -> Self {
        self.batch_size = config.batch_size;
        self.error_threshold = config.error_threshold;
        self.workers = config.workers;
        self.queue_capacity = Some(config.queue_capacity);
        self.pool_size = Some(config.pool_size);
        self
    }

    pub fn build(self) -> Result<ForkJoinJob<P>> {
        if self.workers == 0 {
            return Err(BatchlineError::invalid("workers", "must be at least 1"));
        }
        if self.queue_capacity == Some(0) {
            return Err(BatchlineError::invalid("queue_capacity", "must be at least 1"));
        }
        let reader = self
            .reader
            .ok_or_else(|| BatchlineError::invalid("reader", "a fork/join job needs a source reader"))?;
        let writer = self
            .writer
            .ok_or_else(|| BatchlineError::invalid("writer", "a fork/join job needs a sink writer"))?;

        let required = self.workers + 2;
        let pool_size = self.pool_size.unwrap_or(required);
        if pool_size < required {
            warn!(
                job = %self.name,
                pool_size,
                required,
                "Pool is smaller than master + workers + join; the topology may deadlock"
            );
        }

        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) = (0..self.workers)
            .map(|index| queue::channel(format!("{}-worker-{}", self.name, index), self.queue_capacity))
            .unzip();
        let (aggregate_sender, aggregate_receiver) =
            queue::channel(format!("{}-aggregate", self.name), self.queue_capacity);

        let dispatcher = match self.dispatch {
            DispatchSource::Strategy(strategy) => strategy.dispatcher(worker_senders.clone())?,
            DispatchSource::Factory(factory) => factory(worker_senders.clone())?,
        };

        let master = Job::builder()
            .named(format!("{}-master", self.name))
            .reader(reader)
            .writer(DispatchWriter::new(dispatcher))
            .batch_size(self.batch_size)
            .error_threshold(self.error_threshold)
            .build()?;

        let mut worker_pipeline = self.worker_pipeline;
        let workers = worker_receivers
            .into_iter()
            .enumerate()
            .map(|(index, receiver)| {
                let pipeline = worker_pipeline
                    .as_mut()
                    .map(|factory| factory(index))
                    .unwrap_or_default();
                Job::builder()
                    .named(format!("{}-worker-{}", self.name, index))
                    .reader(QueueReader::new(receiver))
                    .process(pipeline)
                    .writer(QueueWriter::new(aggregate_sender.clone()))
                    .batch_size(self.batch_size)
                    .error_threshold(self.error_threshold)
                    .build()
            })
            .collect::<Result<Vec<_>>>()?;

        let join = Job::builder()
            .named(format!("{}-join", self.name))
            .reader(QueueReader::with_poison_count(aggregate_receiver, self.workers))
            .writer(writer)
            .batch_size(self.batch_size)
            .error_threshold(self.error_threshold)
            .build()?;

        Ok(ForkJoinJob {
            name: self.name,
            pool_size,
            master,
            workers,
            join,
            worker_queues: worker_senders,
            aggregate_queue: aggregate_sender,
        })
    }
}

impl<P: Payload> Default for ForkJoinBuilder<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// An assembled master/workers/join topology, run once with
/// [`ForkJoinJob::call`]
pub struct ForkJoinJob<P: Payload> {
    name: String,
    pool_size: usize,
    master: Job<P>,
    workers: Vec<Job<P>>,
    join: Job<P>,
    worker_queues: Vec<QueueSender<P>>,
    aggregate_queue: QueueSender<P>,
}

impl<P: Payload> ForkJoinJob<P> {
    pub fn builder() -> ForkJoinBuilder<P> {
        ForkJoinBuilder::new()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Run every job of the topology concurrently on a pool of
    /// `pool_size` slots and collect their reports
    pub async fn call(self) -> ForkJoinReport {
        let executor = JobExecutor::new(self.pool_size);
        self.call_on(&executor).await
    }

    /// Like [`ForkJoinJob::call`], on a caller-provided pool
    pub async fn call_on(self, executor: &JobExecutor) -> ForkJoinReport {
        info!(job = %self.name, workers = self.workers.len(), "Starting fork/join job");

        let worker_queues = self.worker_queues;
        let master = executor.submit(self.master);
        let workers: Vec<_> = self
            .workers
            .into_iter()
            .map(|job| (executor.submit(job), self.aggregate_queue.clone()))
            .collect();
        let join = executor.submit(self.join);
        drop(self.aggregate_queue);

        let master = async move {
            let report = master.join().await;
            if let Err(err) = broadcast_poison(&worker_queues).await {
                warn!(error = %err, "Unable to signal end of stream to every worker");
            }
            report
        };
        let workers = join_all(workers.into_iter().map(|(handle, aggregate)| async move {
            let report = handle.join().await;
            if let Err(err) = aggregate.put_poison().await {
                warn!(worker = %report.name(), error = %err, "Unable to signal end of stream to the join job");
            }
            report
        }));

        let (master, workers, join) = tokio::join!(master, workers, join.join());
        let report = ForkJoinReport {
            name: self.name,
            master,
            workers,
            join,
        };
        info!(
            job = %report.name,
            status = %report.merged().status(),
            joined = report.join.metrics().read_count,
            "Fork/join job finished"
        );
        report
    }
}

/// Reports of every job of a fork/join run
#[derive(Debug, Clone, Serialize)]
pub struct ForkJoinReport {
    pub name: String,
    pub master: JobReport,
    pub workers: Vec<JobReport>,
    pub join: JobReport,
}

impl ForkJoinReport {
    /// All reports merged into one (see [`JobReport::merge`])
    pub fn merged(&self) -> JobReport {
        JobReport::merge(
            self.name.clone(),
            std::iter::once(&self.master)
                .chain(self.workers.iter())
                .chain(std::iter::once(&self.join)),
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::record::{Batch, Record, RecordNumbering};
    use crate::writer::NoOpWriter;
    use anyhow::Result as AnyResult;
    use async_trait::async_trait;

    struct Numbers {
        numbering: RecordNumbering,
        total: u64,
    }

    #[async_trait]
    impl RecordReader<u64> for Numbers {
        async fn read_record(&mut self) -> AnyResult<Option<Record<u64>>> {
            if self.numbering.count() == self.total {
                return Ok(None);
            }
            let next = self.numbering.count() + 1;
            Ok(Some(self.numbering.stamp(next)))
        }
    }

    struct Sum(std::sync::Arc<std::sync::atomic::AtomicU64>);

    #[async_trait]
    impl RecordWriter<u64> for Sum {
        async fn write_records(&mut self, batch: &Batch<u64>) -> AnyResult<()> {
            for record in batch {
                self.0.fetch_add(*record.payload(), std::sync::atomic::Ordering::SeqCst);
            }
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_every_record_reaches_the_join() {
        let sum = std::sync::Arc::new(std::sync::atomic::AtomicU64::new(0));
        let job = ForkJoinJob::builder()
            .named("sum")
            .reader(Numbers {
                numbering: RecordNumbering::new("numbers"),
                total: 100,
            })
            .workers(3)
            .queue_capacity(Some(4))
            .writer(Sum(sum.clone()))
            .build()
            .unwrap();
        assert_eq!(job.worker_count(), 3);
        assert_eq!(job.pool_size(), 5);

        let report = job.call().await;

        assert_eq!(report.master.metrics().write_count, 100);
        assert_eq!(
            report.workers.iter().map(|r| r.metrics().read_count).sum::<u64>(),
            100
        );
        assert_eq!(report.join.metrics().read_count, 100);
        assert_eq!(sum.load(std::sync::atomic::Ordering::SeqCst), 5050);
        assert_eq!(report.merged().status(), crate::job::JobStatus::Completed);
    }

    #[test]
    fn test_config_sizes_the_topology() {
        let config = EngineConfig {
            workers: 4,
            queue_capacity: 16,
            pool_size: 8,
            ..EngineConfig::default()
        };
        let job = ForkJoinJob::<u64>::builder()
            .config(&config)
            .reader(Numbers {
                numbering: RecordNumbering::default(),
                total: 0,
            })
            .writer(NoOpWriter)
            .build()
            .unwrap();

        assert_eq!(job.worker_count(), 4);
        assert_eq!(job.pool_size(), 8);
    }

    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_undersized_pool_builds_with_a_warning() {
        let logs = Captured::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let job = tracing::subscriber::with_default(subscriber, || {
            ForkJoinJob::<u64>::builder()
                .named("tight")
                .reader(Numbers {
                    numbering: RecordNumbering::default(),
                    total: 0,
                })
                .writer(NoOpWriter)
                .workers(3)
                .pool_size(2)
                .build()
                .unwrap()
        });

        assert_eq!(job.pool_size(), 2);
        assert_eq!(job.worker_count(), 3);
        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("may deadlock"), "missing warning in {:?}", output);
        assert!(output.contains("required=5"));
    }

    #[test]
    fn test_build_validation() {
        let no_workers = ForkJoinJob::<u64>::builder()
            .reader(Numbers {
                numbering: RecordNumbering::default(),
                total: 0,
            })
            .writer(NoOpWriter)
            .workers(0)
            .build();
        assert!(no_workers.is_err());

        let no_writer = ForkJoinJob::<u64>::builder()
            .reader(Numbers {
                numbering: RecordNumbering::default(),
                total: 0,
            })
            .build();
        assert!(no_writer.is_err());
    }
}
