//! Batch job engine
//!
//! A [`Job`] drives one record stream end to end:
//!
//! ```text
//! reader → pipeline listeners → stage pipeline → batch → writer
//! ```
//!
//! Status moves STARTING → STARTED → BATCH_PROCESSING → COMPLETED | FAILED.
//! A job never returns an error: every outcome, including fatal failures,
//! is encoded in the returned [`JobReport`].
//!
//! Record errors are counted and the record dropped until the error count
//! exceeds the threshold (`errors > threshold`), which aborts the job right
//! after the offending record. Reader and writer failures abort immediately.
//! Records accepted by the pipeline but left unwritten by an abort are
//! counted as skipped, so `read = write + filter + error + skip` always holds.

mod builder;
mod engine;
mod executor;
mod monitor;
mod report;

pub use builder::JobBuilder;
pub use executor::{JobExecutor, JobHandle};
pub use monitor::JobMonitor;
pub use report::{JobParameters, JobReport, JobStatus, Metrics, DEFAULT_JOB_NAME};

use uuid::Uuid;

use crate::listener::{
    CompositeBatchListener, CompositeJobListener, CompositePipelineListener,
    CompositeReaderListener, CompositeWriterListener,
};
use crate::reader::RecordReader;
use crate::record::Payload;
use crate::stage::Pipeline;
use crate::writer::RecordWriter;
use monitor::MonitorPublisher;

/// A configured, runnable batch job. Built with [`JobBuilder`], run once
/// with [`Job::call`].
pub struct Job<P: Payload> {
    parameters: JobParameters,
    execution_id: Uuid,
    reader: Box<dyn RecordReader<P>>,
    writer: Box<dyn RecordWriter<P>>,
    pipeline: Pipeline<P>,
    job_listener: CompositeJobListener,
    batch_listener: CompositeBatchListener<P>,
    reader_listener: CompositeReaderListener<P>,
    pipeline_listener: CompositePipelineListener<P>,
    writer_listener: CompositeWriterListener<P>,
    publisher: Option<MonitorPublisher>,
    reader_opened: bool,
    writer_opened: bool,
}

impl<P: Payload> Job<P> {
    pub fn builder() -> JobBuilder<P> {
        JobBuilder::new()
    }

    pub fn name(&self) -> &str {
        &self.parameters.name
    }

    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    pub fn parameters(&self) -> &JobParameters {
        &self.parameters
    }

    /// Snapshot feed of the job's report; `None` unless monitoring is enabled
    pub fn monitor(&self) -> Option<JobMonitor> {
        self.publisher.as_ref().map(MonitorPublisher::subscribe)
    }
}

impl<P: Payload> std::fmt::Debug for Job<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("parameters", &self.parameters)
            .field("execution_id", &self.execution_id)
            .field("stages", &self.pipeline.len())
            .finish_non_exhaustive()
    }
}
