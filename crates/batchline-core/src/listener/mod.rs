//! Lifecycle listeners
//!
//! Five listener families observe a job at different granularities. Every
//! hook has a no-op default, so implementors override only what they need
//! and `NoOpListener` serves as the null object for all families.
//!
//! Composites (see [`composite`]) call "before" hooks in registration order
//! and "after"/exception hooks in reverse registration order.

pub mod composite;

pub use composite::{
    CompositeBatchListener, CompositeJobListener, CompositePipelineListener,
    CompositeReaderListener, CompositeWriterListener,
};

use crate::error::JobError;
use crate::job::{JobParameters, JobReport};
use crate::record::{Batch, Record};

/// Job start/end notifications
pub trait JobListener: Send {
    fn before_job_start(&mut self, _parameters: &JobParameters) {}

    fn after_job_end(&mut self, _report: &JobReport) {}
}

/// Batch lifecycle notifications
pub trait BatchListener<P>: Send {
    /// A new batch is about to be accumulated
    fn before_batch_reading(&mut self) {}

    /// All records of the batch went through the pipeline
    fn after_batch_processing(&mut self, _batch: &Batch<P>) {}

    /// The batch was handed to the writer successfully
    fn after_batch_completed(&mut self, _batch: &Batch<P>) {}

    /// The batch will never be written because the job is aborting
    fn on_batch_aborted(&mut self, _batch: &Batch<P>, _error: &JobError) {}
}

/// Reader notifications
pub trait ReaderListener<P>: Send {
    fn before_record_reading(&mut self) {}

    /// Follows every successful read; `record` is `None` at end of stream
    fn after_record_reading(&mut self, _record: Option<&Record<P>>) {}

    /// Takes the place of `after_record_reading` when the read fails
    fn on_record_reading_exception(&mut self, _error: &JobError) {}
}

/// Pipeline notifications
pub trait PipelineListener<P>: Send {
    /// Called before the stage chain; may replace the record
    fn before_record_processing(&mut self, record: Record<P>) -> Record<P> {
        record
    }

    /// `output` is `None` when a stage filtered the record
    fn after_record_processing(&mut self, _input: &Record<P>, _output: Option<&Record<P>>) {}

    fn on_record_processing_exception(&mut self, _input: &Record<P>, _error: &JobError) {}
}

/// Writer notifications
pub trait WriterListener<P>: Send {
    fn before_batch_writing(&mut self, _batch: &Batch<P>) {}

    fn after_batch_writing(&mut self, _batch: &Batch<P>) {}

    fn on_batch_writing_exception(&mut self, _batch: &Batch<P>, _error: &JobError) {}
}

/// Null listener for every family
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpListener;

impl JobListener for NoOpListener {}
impl<P> BatchListener<P> for NoOpListener {}
impl<P> ReaderListener<P> for NoOpListener {}
impl<P> PipelineListener<P> for NoOpListener {}
impl<P> WriterListener<P> for NoOpListener {}
