use crate::{LogRecord, queue::Consumer};
use futures_util::{FutureExt, select_biased};
use std::{num::NonZeroUsize, time::Duration};
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;

/// An ordered group of records shipped in one delivery attempt.
pub type Batch = Vec<LogRecord>;

/// Default time a partially filled batch waits for more records.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(1);

/// Collects records from the queue into batches.
///
/// A batch is complete when it holds `batch_size` records, or when `idle_timeout`
/// has passed without a new record arriving. An empty batch never times out.
#[derive(Debug)]
pub struct Batcher {
    consumer: Consumer,
    batch_size: NonZeroUsize,
    idle_timeout: Duration,
}

impl Batcher {
    /// Create a batcher draining `consumer`.
    pub fn new(consumer: Consumer, batch_size: NonZeroUsize, idle_timeout: Duration) -> Self {
        Self {
            consumer,
            batch_size,
            idle_timeout,
        }
    }

    /// Maximum number of records per batch.
    pub fn batch_size(&self) -> NonZeroUsize {
        self.batch_size
    }

    /// Wait for the next non-empty batch.
    ///
    /// Returns `None` when `cancel` fires, discarding anything collected so far, or
    /// when the queue is closed with nothing left to collect.
    pub async fn next_batch(&mut self, cancel: &CancellationToken) -> Option<Batch> {
        let first = select_biased! {
            _ = cancel.cancelled().fuse() => return None,
            record = self.consumer.pop().fuse() => record?,
        };

        let mut batch = Vec::with_capacity(self.batch_size.get());
        batch.push(first);

        let mut deadline = Box::pin(sleep(self.idle_timeout));
        while batch.len() < self.batch_size.get() {
            let record = select_biased! {
                _ = cancel.cancelled().fuse() => return None,
                _ = deadline.as_mut().fuse() => {
                    tracing::trace!(records = batch.len(), "idle timeout, flushing partial batch");
                    break;
                },
                record = self.consumer.pop().fuse() => record,
            };
            match record {
                Some(record) => {
                    batch.push(record);
                    deadline.as_mut().reset(Instant::now() + self.idle_timeout);
                }
                None => break,
            }
        }

        Some(batch)
    }
}
