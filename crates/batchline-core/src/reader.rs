//! Record reader contract and the queue-backed reader used by fork/join

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::queue::QueueReceiver;
use crate::record::{Envelope, Payload, Record, RecordNumbering};

/// Source of records for a job.
///
/// Implementations must number records 1, 2, 3, ... for the lifetime of the
/// instance ([`RecordNumbering`] does this).
#[async_trait]
pub trait RecordReader<P: Payload>: Send {
    async fn open(&mut self) -> Result<()> {
        Ok(())
    }

    /// Next record, or `None` at end of stream
    async fn read_record(&mut self) -> Result<Option<Record<P>>>;

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<P: Payload> RecordReader<P> for Box<dyn RecordReader<P>> {
    async fn open(&mut self) -> Result<()> {
        (**self).open().await
    }

    async fn read_record(&mut self) -> Result<Option<Record<P>>> {
        (**self).read_record().await
    }

    async fn close(&mut self) -> Result<()> {
        (**self).close().await
    }
}

/// Reads data envelopes from a queue until it has seen the expected number
/// of poison envelopes.
///
/// Poison never surfaces as a record. Records are renumbered from 1 with the
/// queue name as their source; payloads are untouched. A queue whose senders
/// all disappear before enough poison arrived is a read error.
pub struct QueueReader<P> {
    receiver: QueueReceiver<P>,
    expected_poisons: usize,
    poisons_seen: usize,
    numbering: RecordNumbering,
}

impl<P> QueueReader<P> {
    /// Reader ending at the first poison envelope
    pub fn new(receiver: QueueReceiver<P>) -> Self {
        Self::with_poison_count(receiver, 1)
    }

    /// Reader ending once `expected_poisons` poison envelopes were consumed,
    /// e.g. one per upstream worker
    pub fn with_poison_count(receiver: QueueReceiver<P>, expected_poisons: usize) -> Self {
        let numbering = RecordNumbering::new(receiver.name());
        Self {
            receiver,
            expected_poisons,
            poisons_seen: 0,
            numbering,
        }
    }

    pub fn poisons_seen(&self) -> usize {
        self.poisons_seen
    }
}

#[async_trait]
impl<P: Payload> RecordReader<P> for QueueReader<P> {
    async fn read_record(&mut self) -> Result<Option<Record<P>>> {
        while self.poisons_seen < self.expected_poisons {
            match self.receiver.take().await {
                Some(Envelope::Data(record)) => {
                    return Ok(Some(self.numbering.stamp(record.into_payload())));
                }
                Some(Envelope::Poison) => {
                    self.poisons_seen += 1;
                    tracing::trace!(
                        queue = %self.receiver.name(),
                        seen = self.poisons_seen,
                        expected = self.expected_poisons,
                        "Poison record received"
                    );
                }
                None => bail!(
                    "Queue '{}' closed after {} of {} poison records",
                    self.receiver.name(),
                    self.poisons_seen,
                    self.expected_poisons
                ),
            }
        }
        Ok(None)
    }
}
