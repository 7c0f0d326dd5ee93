//! The queue is the only structure shared between log producers and the batching
//! loop. Producers never wait: a full queue rejects the newest record.
use crate::LogRecord;
use async_channel::{Receiver, Sender, TrySendError};
use std::num::NonZeroUsize;

/// Reason a record was discarded instead of queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Dropped {
    /// The queue is at capacity.
    #[error("queue overflow")]
    Full,
    /// The queue no longer accepts records.
    #[error("queue closed")]
    Closed,
}

/// Producer half of the queue. Cheap to clone, safe to use from any thread.
#[derive(Debug, Clone)]
pub struct Producer {
    inner: Sender<LogRecord>,
}

/// Consumer half of the queue. Intended for a single batching loop.
#[derive(Debug)]
pub struct Consumer {
    inner: Receiver<LogRecord>,
}

/// Create a queue holding at most `capacity` records.
pub fn bounded(capacity: NonZeroUsize) -> (Producer, Consumer) {
    let (tx, rx) = async_channel::bounded(capacity.get());
    (Producer { inner: tx }, Consumer { inner: rx })
}

impl Producer {
    /// Push a record without blocking.
    pub fn try_push(&self, record: LogRecord) -> Result<(), Dropped> {
        self.inner.try_send(record).map_err(|e| match e {
            TrySendError::Full(_) => Dropped::Full,
            TrySendError::Closed(_) => Dropped::Closed,
        })
    }

    /// Stop accepting records. Records already queued can still be popped.
    pub fn close(&self) -> bool {
        self.inner.close()
    }

    /// Number of records currently queued.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Maximum number of queued records.
    pub fn capacity(&self) -> usize {
        self.inner.capacity().unwrap_or(usize::MAX)
    }
}

impl Consumer {
    /// Wait for the next record.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<LogRecord> {
        self.inner.recv().await.ok()
    }

    /// Take the next record if one is ready.
    pub fn try_pop(&self) -> Option<LogRecord> {
        self.inner.try_recv().ok()
    }

    /// Number of records currently queued.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Maximum number of queued records.
    pub fn capacity(&self) -> usize {
        self.inner.capacity().unwrap_or(usize::MAX)
    }
}
