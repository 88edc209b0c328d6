//! Record writer contract and the writers the engine itself relies on

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::error::describe;
use crate::queue::QueueSender;
use crate::record::{Batch, Payload};

/// Sink for batches of records.
///
/// A batch is all-or-nothing from the engine's point of view: a failed
/// `write_records` fails the job and is never retried.
#[async_trait]
pub trait RecordWriter<P: Payload>: Send {
    async fn open(&mut self) -> Result<()> {
        Ok(())
    }

    async fn write_records(&mut self, batch: &Batch<P>) -> Result<()>;

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<P: Payload> RecordWriter<P> for Box<dyn RecordWriter<P>> {
    async fn open(&mut self) -> Result<()> {
        (**self).open().await
    }

    async fn write_records(&mut self, batch: &Batch<P>) -> Result<()> {
        (**self).write_records(batch).await
    }

    async fn close(&mut self) -> Result<()> {
        (**self).close().await
    }
}

/// Failure of a writer that had already delivered the first `written`
/// records of the batch and cannot take them back.
///
/// Returned through `anyhow`; the engine counts the delivered records as
/// written and only the rest as skipped.
#[derive(Debug, thiserror::Error)]
#[error("{written} of {total} records delivered before failure: {reason}")]
pub struct PartialWrite {
    written: usize,
    total: usize,
    reason: String,
}

impl PartialWrite {
    pub fn new(written: usize, total: usize, cause: &anyhow::Error) -> Self {
        Self {
            written,
            total,
            reason: describe(cause),
        }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn total(&self) -> usize {
        self.total
    }
}

/// Discards every batch
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpWriter;

#[async_trait]
impl<P: Payload> RecordWriter<P> for NoOpWriter {
    async fn write_records(&mut self, _batch: &Batch<P>) -> Result<()> {
        Ok(())
    }
}

/// Pushes every record of a batch onto a queue, in order
#[derive(Debug)]
pub struct QueueWriter<P> {
    sender: QueueSender<P>,
}

impl<P> QueueWriter<P> {
    pub fn new(sender: QueueSender<P>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl<P: Payload> RecordWriter<P> for QueueWriter<P> {
    async fn write_records(&mut self, batch: &Batch<P>) -> Result<()> {
        for (written, record) in batch.iter().enumerate() {
            if let Err(err) = self.sender.put_record(record.clone()).await {
                return Err(PartialWrite::new(written, batch.len(), &err).into());
            }
        }
        Ok(())
    }
}

/// Writes every batch to each delegate in registration order
pub struct CompositeWriter<P> {
    writers: Vec<Box<dyn RecordWriter<P>>>,
}

impl<P: Payload> CompositeWriter<P> {
    pub fn new() -> Self {
        Self {
            writers: Vec::new(),
        }
    }

    pub fn with(mut self, writer: impl RecordWriter<P> + 'static) -> Self {
        self.writers.push(Box::new(writer));
        self
    }

    pub fn len(&self) -> usize {
        self.writers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writers.is_empty()
    }
}

impl<P: Payload> Default for CompositeWriter<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<P: Payload> RecordWriter<P> for CompositeWriter<P> {
    /// Opens delegates in order. If one fails, the ones already opened are
    /// closed again before the error is returned.
    async fn open(&mut self) -> Result<()> {
        for index in 0..self.writers.len() {
            if let Err(err) = self.writers[index].open().await {
                for (opened, writer) in self.writers[..index].iter_mut().enumerate() {
                    if let Err(close_err) = writer.close().await {
                        tracing::warn!(delegate = opened, error = %close_err, "Failed to close delegate writer");
                    }
                }
                return Err(err.context(format!("Failed to open delegate writer #{}", index)));
            }
        }
        Ok(())
    }

    async fn write_records(&mut self, batch: &Batch<P>) -> Result<()> {
        for (index, writer) in self.writers.iter_mut().enumerate() {
            writer
                .write_records(batch)
                .await
                .with_context(|| format!("Delegate writer #{} failed", index))?;
        }
        Ok(())
    }

    /// Closes every delegate even if one fails; reports the first failure
    async fn close(&mut self) -> Result<()> {
        let mut first_error = None;
        for (index, writer) in self.writers.iter_mut().enumerate() {
            if let Err(err) = writer.close().await {
                tracing::warn!(delegate = index, error = %err, "Failed to close delegate writer");
                if first_error.is_none() {
                    first_error = Some(err.context(format!("Failed to close delegate writer #{}", index)));
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
