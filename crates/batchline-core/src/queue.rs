//! Record queues
//!
//! The fork/join boundary. A queue is a FIFO `tokio::sync::mpsc` channel of
//! [`Envelope`]s: `put` on a bounded queue waits while it is full, `take`
//! waits while it is empty. Senders are cheap to clone, so several workers can
//! feed one aggregation queue.

use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::mpsc;

use crate::record::{Envelope, Record};

/// Create a bounded queue holding at most `capacity` envelopes (minimum 1)
pub fn bounded<P>(name: impl Into<String>, capacity: usize) -> (QueueSender<P>, QueueReceiver<P>) {
    let name: Arc<str> = Arc::from(name.into());
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        QueueSender {
            name: name.clone(),
            inner: SenderInner::Bounded(tx),
        },
        QueueReceiver {
            name,
            inner: ReceiverInner::Bounded(rx),
        },
    )
}

/// Create a queue whose `put` never waits
pub fn unbounded<P>(name: impl Into<String>) -> (QueueSender<P>, QueueReceiver<P>) {
    let name: Arc<str> = Arc::from(name.into());
    let (tx, rx) = mpsc::unbounded_channel();
    (
        QueueSender {
            name: name.clone(),
            inner: SenderInner::Unbounded(tx),
        },
        QueueReceiver {
            name,
            inner: ReceiverInner::Unbounded(rx),
        },
    )
}

/// Create a bounded queue when a capacity is given, unbounded otherwise
pub fn channel<P>(name: impl Into<String>, capacity: Option<usize>) -> (QueueSender<P>, QueueReceiver<P>) {
    match capacity {
        Some(capacity) => bounded(name, capacity),
        None => unbounded(name),
    }
}

enum SenderInner<P> {
    Bounded(mpsc::Sender<Envelope<P>>),
    Unbounded(mpsc::UnboundedSender<Envelope<P>>),
}

/// Producer side of a queue
pub struct QueueSender<P> {
    name: Arc<str>,
    inner: SenderInner<P>,
}

impl<P> Clone for QueueSender<P> {
    fn clone(&self) -> Self {
        let inner = match &self.inner {
            SenderInner::Bounded(tx) => SenderInner::Bounded(tx.clone()),
            SenderInner::Unbounded(tx) => SenderInner::Unbounded(tx.clone()),
        };
        Self {
            name: self.name.clone(),
            inner,
        }
    }
}

impl<P> fmt::Debug for QueueSender<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueSender").field("name", &self.name).finish()
    }
}

impl<P> QueueSender<P> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueue an envelope, waiting for room on a full bounded queue.
    ///
    /// Fails only when the receiving side has been dropped.
    pub async fn put(&self, envelope: Envelope<P>) -> Result<()> {
        let sent = match &self.inner {
            SenderInner::Bounded(tx) => tx.send(envelope).await.is_ok(),
            SenderInner::Unbounded(tx) => tx.send(envelope).is_ok(),
        };
        if sent {
            Ok(())
        } else {
            Err(anyhow!("Queue '{}' is closed", self.name))
        }
    }

    pub async fn put_record(&self, record: Record<P>) -> Result<()> {
        self.put(Envelope::Data(record)).await
    }

    pub async fn put_poison(&self) -> Result<()> {
        self.put(Envelope::Poison).await
    }
}

enum ReceiverInner<P> {
    Bounded(mpsc::Receiver<Envelope<P>>),
    Unbounded(mpsc::UnboundedReceiver<Envelope<P>>),
}

/// Consumer side of a queue
pub struct QueueReceiver<P> {
    name: Arc<str>,
    inner: ReceiverInner<P>,
}

impl<P> fmt::Debug for QueueReceiver<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueReceiver").field("name", &self.name).finish()
    }
}

impl<P> QueueReceiver<P> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the next envelope. `None` once every sender is gone and the
    /// queue is drained.
    pub async fn take(&mut self) -> Option<Envelope<P>> {
        match &mut self.inner {
            ReceiverInner::Bounded(rx) => rx.recv().await,
            ReceiverInner::Unbounded(rx) => rx.recv().await,
        }
    }
}
