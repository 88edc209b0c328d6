//! Read → process → batch → write loop

use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::report::{JobReport, JobStatus};
use super::Job;
use crate::error::{describe, JobError, JobResult};
use crate::listener::{BatchListener, JobListener, PipelineListener, ReaderListener, WriterListener};
use crate::record::{Batch, Payload, Record};
use crate::stage::Stage;
use crate::writer::PartialWrite;

/// Batches larger than this are not preallocated in full
const MAX_PREALLOCATED_BATCH: usize = 1024;

enum Outcome<P> {
    Processed(Record<P>),
    Filtered,
    Errored,
}

impl<P: Payload> Job<P> {
    /// Run the job to completion and return its report.
    ///
    /// Never fails: fatal errors end up in [`JobReport::last_error`] with a
    /// FAILED status.
    #[tracing::instrument(skip_all, fields(job = %self.parameters.name, execution_id = %self.execution_id))]
    pub async fn call(mut self) -> JobReport {
        let mut report = JobReport::new(self.execution_id, self.parameters.clone());
        info!(
            batch_size = self.parameters.batch_size,
            error_threshold = self.parameters.error_threshold,
            "Starting job"
        );
        self.publish(&report);
        self.job_listener.before_job_start(&self.parameters);

        match self.open().await {
            Ok(()) => {
                report.status = JobStatus::Started;
                self.publish(&report);
                self.process_batches(&mut report).await;
            }
            Err(err) => self.abort(&mut report, &Batch::new(), err),
        }

        self.close(&mut report).await;
        if report.status != JobStatus::Failed {
            report.status = JobStatus::Completed;
        }
        report.end_time = Some(Utc::now());

        info!(
            status = %report.status,
            read = report.metrics.read_count,
            written = report.metrics.write_count,
            filtered = report.metrics.filter_count,
            errors = report.metrics.error_count,
            skipped = report.metrics.skip_count,
            "Job finished"
        );
        self.publish(&report);
        self.job_listener.after_job_end(&report);
        report
    }

    async fn open(&mut self) -> JobResult<()> {
        self.reader
            .open()
            .await
            .map_err(|err| JobError::ReaderOpen(describe(&err)))?;
        self.reader_opened = true;

        self.writer
            .open()
            .await
            .map_err(|err| JobError::WriterOpen(describe(&err)))?;
        self.writer_opened = true;
        Ok(())
    }

    async fn process_batches(&mut self, report: &mut JobReport) {
        report.status = JobStatus::BatchProcessing;
        let batch_size = self.parameters.batch_size.max(1);

        loop {
            self.batch_listener.before_batch_reading();
            let mut batch = Batch::with_capacity(batch_size.min(MAX_PREALLOCATED_BATCH));
            let mut end_of_stream = false;

            while batch.len() < batch_size {
                self.reader_listener.before_record_reading();
                let record = match self.reader.read_record().await {
                    Ok(Some(record)) => record,
                    Ok(None) => {
                        self.reader_listener.after_record_reading(None);
                        end_of_stream = true;
                        break;
                    }
                    Err(err) => {
                        let error = JobError::ReaderRead(describe(&err));
                        self.reader_listener.on_record_reading_exception(&error);
                        self.abort(report, &batch, error);
                        return;
                    }
                };
                self.reader_listener.after_record_reading(Some(&record));
                report.metrics.read_count += 1;

                match self.process_record(record) {
                    Outcome::Processed(output) => batch.push(output),
                    Outcome::Filtered => report.metrics.filter_count += 1,
                    Outcome::Errored => {
                        report.metrics.error_count += 1;
                        if report.metrics.error_count > self.parameters.error_threshold {
                            let error = JobError::ErrorThresholdExceeded {
                                threshold: self.parameters.error_threshold,
                                errors: report.metrics.error_count,
                            };
                            self.abort(report, &batch, error);
                            return;
                        }
                    }
                }
            }

            self.batch_listener.after_batch_processing(&batch);

            if !batch.is_empty() {
                if let Err((error, delivered)) = self.write_batch(&batch).await {
                    report.metrics.write_count += delivered as u64;
                    self.abort_after(report, &batch, delivered, error);
                    return;
                }
                report.metrics.write_count += batch.len() as u64;
                self.batch_listener.after_batch_completed(&batch);
            }
            self.publish(report);

            if end_of_stream {
                return;
            }
        }
    }

    fn process_record(&mut self, record: Record<P>) -> Outcome<P> {
        let record = self.pipeline_listener.before_record_processing(record);
        let input = record.clone();

        match self.pipeline.process(record) {
            Ok(Some(output)) => {
                self.pipeline_listener
                    .after_record_processing(&input, Some(&output));
                Outcome::Processed(output)
            }
            Ok(None) => {
                debug!(record = input.header().number(), "Record filtered");
                self.pipeline_listener.after_record_processing(&input, None);
                Outcome::Filtered
            }
            Err(err) => {
                let error = JobError::Stage {
                    record: input.header().number(),
                    message: describe(&err),
                };
                warn!(record = input.header().number(), error = %error, "Unable to process record");
                self.pipeline_listener
                    .on_record_processing_exception(&input, &error);
                Outcome::Errored
            }
        }
    }

    /// On failure, also returns how many leading records of the batch the
    /// writer delivered anyway (see [`PartialWrite`]).
    async fn write_batch(&mut self, batch: &Batch<P>) -> Result<(), (JobError, usize)> {
        self.writer_listener.before_batch_writing(batch);
        match self.writer.write_records(batch).await {
            Ok(()) => {
                self.writer_listener.after_batch_writing(batch);
                Ok(())
            }
            Err(err) => {
                let delivered = err
                    .downcast_ref::<PartialWrite>()
                    .map_or(0, |partial| partial.written().min(batch.len()));
                let error = JobError::WriterWrite(describe(&err));
                self.writer_listener.on_batch_writing_exception(batch, &error);
                Err((error, delivered))
            }
        }
    }

    /// Mark the job FAILED. Records of `pending` were accepted but will
    /// never be written.
    fn abort(&mut self, report: &mut JobReport, pending: &Batch<P>, error: JobError) {
        self.abort_after(report, pending, 0, error);
    }

    /// Like [`Job::abort`], when the first `delivered` records of `pending`
    /// did reach the writer.
    fn abort_after(&mut self, report: &mut JobReport, pending: &Batch<P>, delivered: usize, error: JobError) {
        let skipped = pending.len() - delivered;
        report.metrics.skip_count += skipped as u64;
        if !pending.is_empty() {
            self.batch_listener.on_batch_aborted(pending, &error);
        }
        error!(error = %error, delivered, skipped, "Job aborted");
        report.status = JobStatus::Failed;
        report.last_error = Some(error);
    }

    /// Close writer then reader. Failures are logged and kept as last error
    /// unless an earlier error is already recorded; they never change the
    /// status.
    async fn close(&mut self, report: &mut JobReport) {
        if self.writer_opened {
            if let Err(err) = self.writer.close().await {
                let error = JobError::WriterClose(describe(&err));
                warn!(error = %error, "Unable to close record writer");
                if report.last_error.is_none() {
                    report.last_error = Some(error);
                }
            }
        }
        if self.reader_opened {
            if let Err(err) = self.reader.close().await {
                let error = JobError::ReaderClose(describe(&err));
                warn!(error = %error, "Unable to close record reader");
                if report.last_error.is_none() {
                    report.last_error = Some(error);
                }
            }
        }
    }

    fn publish(&self, report: &JobReport) {
        if let Some(publisher) = &self.publisher {
            publisher.publish(report);
        }
    }
}
