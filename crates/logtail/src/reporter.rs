//! A reporter for batching and sending records to the ingestion service.
//!
//! [`Reporter`] is the producer side handed to log taps. [`Reporting`] owns the
//! background loop; it is created once per reporter and runs until cancelled.
use crate::{
    Dropped, LogRecord, LogtailClient, LogtailClientError,
    batcher::{Batch, Batcher, DEFAULT_IDLE_TIMEOUT},
    queue::{self, Consumer, Producer},
};
use futures_util::{FutureExt, join, select_biased};
use std::{
    future::pending,
    num::NonZeroUsize,
    pin::Pin,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{self, AtomicBool, AtomicU64},
    },
    time::Duration,
};
use tokio_util::sync::CancellationToken;

/// Default queue capacity.
pub const DEFAULT_BUFFER_SIZE: NonZeroUsize = NonZeroUsize::new(1024).unwrap();
/// Default maximum number of records per batch.
pub const DEFAULT_BATCH_SIZE: NonZeroUsize = NonZeroUsize::new(100).unwrap();
/// Default delay before the single retry of a failed batch.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// A reporter for batching and sending records to the ingestion service.
#[derive(Clone)]
pub struct Reporter {
    state: Arc<State>,
    producer: Producer,
    consumer: Arc<Mutex<Option<Consumer>>>,
    client: LogtailClient,
}

/// Reporting is a handle to the reporting process, allowing configuration and starting the reporting.
pub struct Reporting {
    state: Arc<State>,
    consumer: Consumer,
    client: LogtailClient,

    batch_size: NonZeroUsize,
    idle_timeout: Duration,
    retry_delay: Duration,

    cancel: CancellationToken,
    shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send + 'static>>,
}

struct State {
    is_reporting: AtomicBool,
    is_closing: AtomicBool,
    dropped: AtomicU64,
}

impl Reporter {
    /// Create a new reporter with the given client and the default queue capacity.
    pub fn from_client(client: LogtailClient) -> Self {
        Self::with_capacity(client, DEFAULT_BUFFER_SIZE)
    }

    /// Create a new reporter whose queue holds at most `buffer_size` records.
    pub fn with_capacity(client: LogtailClient, buffer_size: NonZeroUsize) -> Self {
        let (producer, consumer) = queue::bounded(buffer_size);
        Self {
            state: Arc::new(State::default()),
            producer,
            consumer: Arc::new(Mutex::new(Some(consumer))),
            client,
        }
    }

    /// Create the reporting process.
    ///
    /// If the reporter is already in reporting state, it returns `None`.
    pub fn reporting(&self) -> Option<Reporting> {
        if self.state.set_reporting() {
            return None;
        }

        let consumer = self
            .consumer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;

        Some(Reporting {
            state: self.state.clone(),
            consumer,
            client: self.client.clone(),

            batch_size: DEFAULT_BATCH_SIZE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            retry_delay: DEFAULT_RETRY_DELAY,

            cancel: CancellationToken::new(),
            shutdown_signal: Box::pin(pending()),
        })
    }

    /// Queue a record for delivery without blocking.
    ///
    /// A full queue keeps its current contents and discards `record`.
    pub fn report(&self, record: LogRecord) -> Result<(), Dropped> {
        let result = if self.state.is_closing() {
            Err(Dropped::Closed)
        } else {
            self.producer.try_push(record)
        };
        if result.is_err() {
            self.state.dropped.fetch_add(1, atomic::Ordering::Relaxed);
        }
        result
    }

    /// Number of records discarded so far.
    pub fn dropped(&self) -> u64 {
        self.state.dropped.load(atomic::Ordering::Relaxed)
    }

    /// Number of records waiting in the queue.
    pub fn queued(&self) -> usize {
        self.producer.len()
    }

    /// Whether the reporting loop has stopped.
    pub fn is_closed(&self) -> bool {
        self.state.is_closing()
    }
}

impl Reporting {
    /// Quit when shutdown_signal received.
    ///
    /// Accept a `shutdown_signal` argument as a graceful shutdown signal.
    pub fn with_graceful_shutdown(
        mut self,
        shutdown_signal: impl Future<Output = ()> + Send + 'static,
    ) -> Self {
        self.shutdown_signal = Box::pin(shutdown_signal);
        self
    }

    /// Quit when `cancel` is cancelled.
    ///
    /// The token also aborts in-flight deliveries and pending retries.
    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Set the maximum number of records per batch.
    ///
    /// Default is `100`.
    pub fn with_batch_size(mut self, batch_size: NonZeroUsize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set how long a partially filled batch waits for more records.
    ///
    /// Default is 1 second.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Set the delay before a failed batch is retried.
    ///
    /// Default is 1 second.
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Start the reporting process.
    ///
    /// Must be polled inside a Tokio runtime. Returns once cancelled.
    pub async fn start(self) {
        let Reporting {
            state,
            consumer,
            client,
            batch_size,
            idle_timeout,
            retry_delay,
            cancel,
            shutdown_signal,
        } = self;

        let stop = cancel.child_token();
        let mut batcher = Batcher::new(consumer, batch_size, idle_timeout);

        let work_fut = {
            let stop = stop.clone();
            async move {
                while let Some(batch) = batcher.next_batch(&stop).await {
                    ship(&client, batch, retry_delay, &stop).await;
                }
                state.is_closing.store(true, atomic::Ordering::Relaxed);
                tracing::debug!("reporting stopped");
                stop.cancel();
            }
        };

        let shutdown_fut = async move {
            select_biased! {
                _ = stop.cancelled().fuse() => {},
                _ = shutdown_signal.fuse() => stop.cancel(),
            }
        };

        join!(work_fut, shutdown_fut);
    }
}

async fn ship(
    client: &LogtailClient,
    batch: Batch,
    retry_delay: Duration,
    cancel: &CancellationToken,
) {
    match client.try_send_batch(&batch, cancel).await {
        Ok(()) | Err(LogtailClientError::Cancelled) => {}
        Err(e) => {
            client.report_error("failed to send batch", &e);
            tokio::spawn(retry(client.clone(), batch, retry_delay, cancel.clone()));
        }
    }
}

async fn retry(client: LogtailClient, batch: Batch, delay: Duration, cancel: CancellationToken) {
    select_biased! {
        _ = cancel.cancelled().fuse() => return,
        _ = tokio::time::sleep(delay).fuse() => {},
    }
    match client.try_send_batch(&batch, &cancel).await {
        Ok(()) | Err(LogtailClientError::Cancelled) => {}
        Err(e) => client.report_error("failed to send batch (retry)", &e),
    }
}

impl Default for State {
    fn default() -> Self {
        Self {
            is_reporting: AtomicBool::new(false),
            is_closing: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }
}

impl State {
    fn set_reporting(&self) -> bool {
        self.is_reporting.swap(true, atomic::Ordering::Relaxed)
    }

    fn is_closing(&self) -> bool {
        self.is_closing.load(atomic::Ordering::Relaxed)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn client() -> LogtailClient {
        LogtailClient::builder()
            .source_token("token")
            .endpoint("http://127.0.0.1:9")
            .https_only(false)
            .build()
            .unwrap()
    }

    #[test]
    fn reporting_is_handed_out_once() {
        let reporter = Reporter::from_client(client());
        assert!(reporter.reporting().is_some());
        assert!(reporter.reporting().is_none());
        assert!(reporter.clone().reporting().is_none());
    }

    #[test]
    fn overflow_is_counted() {
        let reporter = Reporter::with_capacity(client(), NonZeroUsize::new(2).unwrap());
        let results: Vec<_> = (0..5)
            .map(|i| reporter.report(format!("{{\"i\":{i}}}").into()))
            .collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 2);
        assert_eq!(reporter.dropped(), 3);
        assert_eq!(reporter.queued(), 2);
    }

    #[tokio::test]
    async fn graceful_shutdown_stops_the_loop() {
        let reporter = Reporter::from_client(client());
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let reporting = reporter
            .reporting()
            .unwrap()
            .with_graceful_shutdown(async move {
                rx.await.ok();
            });
        let handle = tokio::spawn(reporting.start());

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();

        assert!(reporter.is_closed());
        assert_eq!(reporter.report("{}".into()), Err(Dropped::Closed));
    }

    #[tokio::test]
    async fn cancellation_token_stops_the_loop() {
        let reporter = Reporter::from_client(client());
        let cancel = CancellationToken::new();
        let reporting = reporter
            .reporting()
            .unwrap()
            .with_cancellation_token(cancel.clone());
        let handle = tokio::spawn(reporting.start());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(reporter.is_closed());
    }
}
