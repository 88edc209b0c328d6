//! Batchline Core
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Record-oriented batch job engine: read records, run them through a stage
//! pipeline, write them in batches, report what happened.
//!
//! # Overview
//!
//! - **Records**: [`Record`], [`Header`], [`Batch`] and the queue item
//!   [`Envelope`]
//! - **Stages**: the [`Stage`] trait, [`Pipeline`] and built-in filters,
//!   mappers, validators and processors
//! - **Listeners**: job, batch, reader, pipeline and writer hooks
//! - **Jobs**: [`JobBuilder`], [`Job`], [`JobReport`], [`JobExecutor`] and
//!   pull-based [`JobMonitor`]s
//! - **Fork/join**: queues, [`Dispatcher`]s and [`ForkJoinJob`] to spread one
//!   stream over several worker pipelines
//!
//! # Example
//!
//! ```no_run
//! use anyhow::Result;
//! use async_trait::async_trait;
//! use batchline_core::{Batch, Filter, Job, JobStatus, Record, RecordNumbering, RecordReader, RecordWriter};
//!
//! struct Lines {
//!     lines: std::vec::IntoIter<String>,
//!     numbering: RecordNumbering,
//! }
//!
//! #[async_trait]
//! impl RecordReader<String> for Lines {
//!     async fn read_record(&mut self) -> Result<Option<Record<String>>> {
//!         Ok(self.lines.next().map(|line| self.numbering.stamp(line)))
//!     }
//! }
//!
//! struct Stdout;
//!
//! #[async_trait]
//! impl RecordWriter<String> for Stdout {
//!     async fn write_records(&mut self, batch: &Batch<String>) -> Result<()> {
//!         for record in batch {
//!             println!("{}", record.payload());
//!         }
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let job = Job::builder()
//!         .named("hello")
//!         .reader(Lines {
//!             lines: vec!["foo".to_string(), "bar".to_string()].into_iter(),
//!             numbering: RecordNumbering::new("memory"),
//!         })
//!         .filter(Filter::reject(|r: &Record<String>| r.payload().contains("bar")))
//!         .writer(Stdout)
//!         .build()?;
//!
//!     let report = job.call().await;
//!     assert_eq!(report.status(), JobStatus::Completed);
//!     Ok(())
//! }
//! ```

pub mod dispatch;
pub mod error;
pub mod fork_join;
pub mod job;
pub mod listener;
pub mod queue;
pub mod reader;
pub mod record;
pub mod stage;
pub mod writer;

// Re-export commonly used types
pub use dispatch::{
    broadcast_poison, ContentBasedDispatcher, DispatchStrategy, DispatchWriter, Dispatcher,
    RandomDispatcher, RoundRobinDispatcher,
};
pub use error::{JobError, JobResult};
pub use fork_join::{ForkJoinBuilder, ForkJoinJob, ForkJoinReport};
pub use job::{Job, JobBuilder, JobExecutor, JobHandle, JobMonitor, JobParameters, JobReport, JobStatus, Metrics};
pub use listener::{
    BatchListener, JobListener, NoOpListener, PipelineListener, ReaderListener, WriterListener,
};
pub use queue::{QueueReceiver, QueueSender};
pub use reader::{QueueReader, RecordReader};
pub use record::{Batch, Envelope, Header, Payload, Record, RecordNumbering, UNKNOWN_SOURCE};
pub use stage::{
    FilteredRecords, FilteredRecordsCollector, Filter, GrepFilter, Mapper, Pipeline, PrefixSkipper,
    Processor, RecordNumberSkipper, Stage, StageKind, Validator,
};
pub use writer::{CompositeWriter, NoOpWriter, PartialWrite, QueueWriter, RecordWriter};
