//! Composite listeners
//!
//! "Before" hooks fan out forward; "after" and exception hooks fan out in
//! reverse, mirroring how nested decorators unwind.

use super::{BatchListener, JobListener, PipelineListener, ReaderListener, WriterListener};
use crate::error::JobError;
use crate::job::{JobParameters, JobReport};
use crate::record::{Batch, Record};

macro_rules! composite {
    ($(#[$doc:meta])* $name:ident, dyn $family:ident $(<$p:ident>)?) => {
        $(#[$doc])*
        pub struct $name $(<$p>)? {
            listeners: Vec<Box<dyn $family $(<$p>)?>>,
        }

        impl $(<$p>)? $name $(<$p>)? {
            pub fn new() -> Self {
                Self { listeners: Vec::new() }
            }

            /// Register a delegate after the existing ones
            pub fn add(&mut self, listener: impl $family $(<$p>)? + 'static) {
                self.listeners.push(Box::new(listener));
            }

            pub fn len(&self) -> usize {
                self.listeners.len()
            }

            pub fn is_empty(&self) -> bool {
                self.listeners.is_empty()
            }
        }

        impl $(<$p>)? Default for $name $(<$p>)? {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

composite!(
    /// Fans job notifications out to its delegates
    CompositeJobListener,
    dyn JobListener
);
composite!(
    /// Fans batch notifications out to its delegates
    CompositeBatchListener,
    dyn BatchListener<P>
);
composite!(
    /// Fans reader notifications out to its delegates
    CompositeReaderListener,
    dyn ReaderListener<P>
);
composite!(
    /// Fans pipeline notifications out to its delegates
    CompositePipelineListener,
    dyn PipelineListener<P>
);
composite!(
    /// Fans writer notifications out to its delegates
    CompositeWriterListener,
    dyn WriterListener<P>
);

impl JobListener for CompositeJobListener {
    fn before_job_start(&mut self, parameters: &JobParameters) {
        for listener in self.listeners.iter_mut() {
            listener.before_job_start(parameters);
        }
    }

    fn after_job_end(&mut self, report: &JobReport) {
        for listener in self.listeners.iter_mut().rev() {
            listener.after_job_end(report);
        }
    }
}

impl<P> BatchListener<P> for CompositeBatchListener<P> {
    fn before_batch_reading(&mut self) {
        for listener in self.listeners.iter_mut() {
            listener.before_batch_reading();
        }
    }

    fn after_batch_processing(&mut self, batch: &Batch<P>) {
        for listener in self.listeners.iter_mut().rev() {
            listener.after_batch_processing(batch);
        }
    }

    fn after_batch_completed(&mut self, batch: &Batch<P>) {
        for listener in self.listeners.iter_mut().rev() {
            listener.after_batch_completed(batch);
        }
    }

    fn on_batch_aborted(&mut self, batch: &Batch<P>, error: &JobError) {
        for listener in self.listeners.iter_mut().rev() {
            listener.on_batch_aborted(batch, error);
        }
    }
}

impl<P> ReaderListener<P> for CompositeReaderListener<P> {
    fn before_record_reading(&mut self) {
        for listener in self.listeners.iter_mut() {
            listener.before_record_reading();
        }
    }

    fn after_record_reading(&mut self, record: Option<&Record<P>>) {
        for listener in self.listeners.iter_mut().rev() {
            listener.after_record_reading(record);
        }
    }

    fn on_record_reading_exception(&mut self, error: &JobError) {
        for listener in self.listeners.iter_mut().rev() {
            listener.on_record_reading_exception(error);
        }
    }
}

impl<P> PipelineListener<P> for CompositePipelineListener<P> {
    fn before_record_processing(&mut self, record: Record<P>) -> Record<P> {
        self.listeners
            .iter_mut()
            .fold(record, |current, listener| listener.before_record_processing(current))
    }

    fn after_record_processing(&mut self, input: &Record<P>, output: Option<&Record<P>>) {
        for listener in self.listeners.iter_mut().rev() {
            listener.after_record_processing(input, output);
        }
    }

    fn on_record_processing_exception(&mut self, input: &Record<P>, error: &JobError) {
        for listener in self.listeners.iter_mut().rev() {
            listener.on_record_processing_exception(input, error);
        }
    }
}

impl<P> WriterListener<P> for CompositeWriterListener<P> {
    fn before_batch_writing(&mut self, batch: &Batch<P>) {
        for listener in self.listeners.iter_mut() {
            listener.before_batch_writing(batch);
        }
    }

    fn after_batch_writing(&mut self, batch: &Batch<P>) {
        for listener in self.listeners.iter_mut().rev() {
            listener.after_batch_writing(batch);
        }
    }

    fn on_batch_writing_exception(&mut self, batch: &Batch<P>, error: &JobError) {
        for listener in self.listeners.iter_mut().rev() {
            listener.on_batch_writing_exception(batch, error);
        }
    }
}
