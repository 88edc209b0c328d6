//! Fluent job assembly

use uuid::Uuid;

use batchline_common::config::EngineConfig;
use batchline_common::{BatchlineError, Result};

use super::monitor::MonitorPublisher;
use super::report::{JobParameters, JobReport};
use super::Job;
use crate::listener::{
    BatchListener, CompositeBatchListener, CompositeJobListener, CompositePipelineListener,
    CompositeReaderListener, CompositeWriterListener, JobListener, PipelineListener,
    ReaderListener, WriterListener,
};
use crate::reader::RecordReader;
use crate::record::Payload;
use crate::stage::{Pipeline, Stage, StageKind};
use crate::writer::{NoOpWriter, RecordWriter};

/// Builder for [`Job`].
///
/// Stages run in kind order (filter, map, validate, process, marshal)
/// whatever the registration order; registrations of the same kind keep
/// their relative order. Aliases register under the same kind.
///
/// ```no_run
/// # use batchline_core::{Job, GrepFilter, Mapper, NoOpWriter, RecordReader};
/// # async fn run(reader: impl RecordReader<String> + 'static) -> batchline_common::Result<()> {
/// let job = Job::builder()
///     .named("greetings")
///     .reader(reader)
///     .filter(GrepFilter::new("hello"))
///     .map(Mapper::new(|line: String| line.to_uppercase()))
///     .writer(NoOpWriter)
///     .batch_size(100)
///     .build()?;
/// let report = job.call().await;
/// println!("{}", report);
/// # Ok(())
/// # }
/// ```
pub struct JobBuilder<P: Payload> {
    parameters: JobParameters,
    reader: Option<Box<dyn RecordReader<P>>>,
    writer: Option<Box<dyn RecordWriter<P>>>,
    stages: Vec<(StageKind, Box<dyn Stage<P>>)>,
    job_listener: CompositeJobListener,
    batch_listener: CompositeBatchListener<P>,
    reader_listener: CompositeReaderListener<P>,
    pipeline_listener: CompositePipelineListener<P>,
    writer_listener: CompositeWriterListener<P>,
}

impl<P: Payload> JobBuilder<P> {
    pub fn new() -> Self {
        Self {
            parameters: JobParameters::default(),
            reader: None,
            writer: None,
            stages: Vec::new(),
            job_listener: CompositeJobListener::new(),
            batch_listener: CompositeBatchListener::new(),
            reader_listener: CompositeReaderListener::new(),
            pipeline_listener: CompositePipelineListener::new(),
            writer_listener: CompositeWriterListener::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.parameters.name = name.into();
        self
    }

    pub fn reader(mut self, reader: impl RecordReader<P> + 'static) -> Self {
        self.reader = Some(Box::new(reader));
        self
    }

    /// Defaults to [`NoOpWriter`]
    pub fn writer(mut self, writer: impl RecordWriter<P> + 'static) -> Self {
        self.writer = Some(Box::new(writer));
        self
    }

    /// Register a stage under an explicit kind
    pub fn stage(mut self, kind: StageKind, stage: impl Stage<P> + 'static) -> Self {
        self.stages.push((kind, Box::new(stage)));
        self
    }

    pub fn filter(self, stage: impl Stage<P> + 'static) -> Self {
        self.stage(StageKind::Filter, stage)
    }

    pub fn skip(self, stage: impl Stage<P> + 'static) -> Self {
        self.stage(StageKind::Filter, stage)
    }

    pub fn skipper(self, stage: impl Stage<P> + 'static) -> Self {
        self.stage(StageKind::Filter, stage)
    }

    pub fn map(self, stage: impl Stage<P> + 'static) -> Self {
        self.stage(StageKind::Map, stage)
    }

    pub fn mapper(self, stage: impl Stage<P> + 'static) -> Self {
        self.stage(StageKind::Map, stage)
    }

    pub fn validate(self, stage: impl Stage<P> + 'static) -> Self {
        self.stage(StageKind::Validate, stage)
    }

    pub fn validator(self, stage: impl Stage<P> + 'static) -> Self {
        self.stage(StageKind::Validate, stage)
    }

    pub fn process(self, stage: impl Stage<P> + 'static) -> Self {
        self.stage(StageKind::Process, stage)
    }

    pub fn processor(self, stage: impl Stage<P> + 'static) -> Self {
        self.stage(StageKind::Process, stage)
    }

    pub fn marshal(self, stage: impl Stage<P> + 'static) -> Self {
        self.stage(StageKind::Marshal, stage)
    }

    pub fn marshaller(self, stage: impl Stage<P> + 'static) -> Self {
        self.stage(StageKind::Marshal, stage)
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.parameters.batch_size = batch_size;
        self
    }

    pub fn error_threshold(mut self, error_threshold: u64) -> Self {
        self.parameters.error_threshold = error_threshold;
        self
    }

    /// Publish report snapshots through [`Job::monitor`]
    pub fn enable_monitoring(mut self, enabled: bool) -> Self {
        self.parameters.monitoring = enabled;
        self
    }

    /// Take batch size, error threshold and monitoring from an engine config
    pub fn config(mut self, config: &EngineConfig) -> Self {
        self.parameters = JobParameters::from_config(self.parameters.name, config);
        self
    }

    pub fn job_listener(mut self, listener: impl JobListener + 'static) -> Self {
        self.job_listener.add(listener);
        self
    }

    pub fn batch_listener(mut self, listener: impl BatchListener<P> + 'static) -> Self {
        self.batch_listener.add(listener);
        self
    }

    pub fn reader_listener(mut self, listener: impl ReaderListener<P> + 'static) -> Self {
        self.reader_listener.add(listener);
        self
    }

    pub fn pipeline_listener(mut self, listener: impl PipelineListener<P> + 'static) -> Self {
        self.pipeline_listener.add(listener);
        self
    }

    pub fn writer_listener(mut self, listener: impl WriterListener<P> + 'static) -> Self {
        self.writer_listener.add(listener);
        self
    }

    pub fn build(self) -> Result<Job<P>> {
        if self.parameters.name.trim().is_empty() {
            return Err(BatchlineError::invalid("name", "job name must not be empty"));
        }
        if self.parameters.batch_size == 0 {
            return Err(BatchlineError::invalid("batch_size", "must be at least 1"));
        }
        if self.parameters.error_threshold == 0 {
            return Err(BatchlineError::invalid("error_threshold", "must be at least 1"));
        }
        let reader = self
            .reader
            .ok_or_else(|| BatchlineError::invalid("reader", "a job needs a record reader"))?;
        let writer = self.writer.unwrap_or_else(|| Box::new(NoOpWriter));

        let mut stages = self.stages;
        stages.sort_by_key(|(kind, _)| *kind);
        let pipeline = Pipeline::from(
            stages
                .into_iter()
                .map(|(_, stage)| stage)
                .collect::<Vec<_>>(),
        );

        let execution_id = Uuid::new_v4();
        let publisher = self.parameters.monitoring.then(|| {
            MonitorPublisher::new(JobReport::new(execution_id, self.parameters.clone()))
        });

        Ok(Job {
            parameters: self.parameters,
            execution_id,
            reader,
            writer,
            pipeline,
            job_listener: self.job_listener,
            batch_listener: self.batch_listener,
            reader_listener: self.reader_listener,
            pipeline_listener: self.pipeline_listener,
            writer_listener: self.writer_listener,
            publisher,
            reader_opened: false,
            writer_opened: false,
        })
    }
}

impl<P: Payload> Default for JobBuilder<P> {
    fn default() -> Self {
        Self::new()
    }
}
