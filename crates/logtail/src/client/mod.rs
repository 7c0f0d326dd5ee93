//! Logtail ingestion client

pub use self::builder::{LogtailClientBuilder, LogtailClientBuilderError};
use crate::LogRecord;
use futures_util::{FutureExt, future::poll_fn, select_biased};
use reqwest::{StatusCode, Url};
use std::{cell::Cell, fmt::Display, pin::pin, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Level};

mod builder;
mod headers;

/// Default ingestion endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://in.logtail.com";
/// Default timeout of a single delivery attempt.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// A client for sending batches of records to the Logtail ingestion API.
#[derive(Clone)]
pub struct LogtailClient {
    inner: Arc<LogtailClientInner>,
}

struct LogtailClientInner {
    url: Url,
    http: reqwest::Client,
    enable_trace: bool,
    print_internal_error: bool,
}

/// Error type for delivery attempts.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum LogtailClientError {
    /// The ingestion service answered with a status other than `202 Accepted`.
    #[error("unexpected http status {status}")]
    Http {
        /// HTTP status code.
        status: u16,
    },
    /// Transport level failure, including timeouts.
    #[error("http client error: {0}")]
    Imp(#[from] reqwest::Error),
    /// The attempt was abandoned because of shutdown.
    #[error("delivery cancelled")]
    Cancelled,
}

impl LogtailClient {
    /// Create a new client builder.
    pub fn builder<'a>() -> LogtailClientBuilder<'a> {
        LogtailClientBuilder::default()
    }

    /// The endpoint batches are POSTed to.
    pub fn endpoint(&self) -> &Url {
        &self.inner.url
    }

    /// Send a batch, discarding the outcome.
    pub async fn send_batch(&self, batch: &[LogRecord], cancel: &CancellationToken) {
        if let Err(e) = self.try_send_batch(batch, cancel).await {
            self.report_error("failed to send batch", &e);
        }
    }

    /// Send a batch as a single JSON array in one POST request.
    ///
    /// The attempt ends early with [`LogtailClientError::Cancelled`] once `cancel` fires.
    pub async fn try_send_batch(
        &self,
        batch: &[LogRecord],
        cancel: &CancellationToken,
    ) -> Result<(), LogtailClientError> {
        let fut = delivering(self.send_batch_inner(batch, cancel));
        if self.inner.enable_trace {
            fut.instrument(tracing::span!(
                Level::TRACE,
                "send_batch",
                endpoint = %self.inner.url,
                records = batch.len()
            ))
            .await
        } else {
            fut.await
        }
    }

    async fn send_batch_inner(
        &self,
        batch: &[LogRecord],
        cancel: &CancellationToken,
    ) -> Result<(), LogtailClientError> {
        let body = encode_batch(batch);
        let request = self.inner.http.post(self.inner.url.clone()).body(body);

        let res = select_biased! {
            _ = cancel.cancelled().fuse() => return Err(LogtailClientError::Cancelled),
            res = request.send().fuse() => res?,
        };

        let status = res.status();
        if self.inner.enable_trace {
            tracing::trace!(%status);
        }
        if status != StatusCode::ACCEPTED {
            return Err(LogtailClientError::Http {
                status: status.as_u16(),
            });
        }
        if self.inner.enable_trace {
            tracing::debug!(records = batch.len(), "batch accepted");
        }
        Ok(())
    }

    /// Surface a delivery problem on the local diagnostic channel.
    pub(crate) fn report_error(&self, context: &str, err: &dyn Display) {
        if self.inner.enable_trace {
            tracing::error!("{context}: {err}");
        } else if self.inner.print_internal_error {
            eprintln!("[logtail] {context}: {err}");
        }
    }
}

thread_local! {
    static DELIVERING: Cell<bool> = const { Cell::new(false) };
}

struct DeliveryGuard(bool);

impl DeliveryGuard {
    fn enter() -> Self {
        Self(DELIVERING.replace(true))
    }
}

impl Drop for DeliveryGuard {
    fn drop(&mut self) {
        DELIVERING.set(self.0);
    }
}

/// Whether the current thread is polling a delivery request.
///
/// Events emitted while this is `true` come from the HTTP stack shipping a batch, and
/// a layer feeding the queue must not enqueue them.
pub fn in_delivery() -> bool {
    DELIVERING.with(Cell::get)
}

/// Poll `fut` as part of a delivery, so that [`in_delivery`] holds while it runs.
///
/// Every attempt made by [`LogtailClient`] already runs inside this scope.
pub async fn delivering<F: Future>(fut: F) -> F::Output {
    let mut fut = pin!(fut);
    poll_fn(|cx| {
        let _guard = DeliveryGuard::enter();
        fut.as_mut().poll(cx)
    })
    .await
}

/// Join pre-serialized records into one JSON array: `[r1,r2,...]`.
///
/// Records are trusted to be valid JSON values and are not re-parsed.
pub fn encode_batch(batch: &[LogRecord]) -> Vec<u8> {
    let len = 2 + batch.iter().map(LogRecord::len).sum::<usize>() + batch.len().saturating_sub(1);
    let mut buf = Vec::with_capacity(len);
    buf.push(b'[');
    for (i, record) in batch.iter().enumerate() {
        if i > 0 {
            buf.push(b',');
        }
        buf.extend_from_slice(record.as_bytes());
    }
    buf.push(b']');
    buf
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn encode_joins_records() {
        let batch = [
            LogRecord::from(r#"{"a":1}"#),
            LogRecord::from(r#"{"b":2}"#),
            LogRecord::from(r#"{"c":3}"#),
        ];
        let encoded = encode_batch(&batch);
        assert_eq!(encoded, br#"[{"a":1},{"b":2},{"c":3}]"#);
    }

    #[tokio::test]
    async fn delivery_scope_covers_every_poll() {
        assert!(!in_delivery());
        let seen = delivering(async {
            let before = in_delivery();
            tokio::task::yield_now().await;
            (before, in_delivery())
        })
        .await;
        assert_eq!(seen, (true, true));
        assert!(!in_delivery());
    }

    #[tokio::test]
    async fn delivery_scope_nests() {
        delivering(async {
            delivering(async {}).await;
            assert!(in_delivery());
        })
        .await;
        assert!(!in_delivery());
    }

    #[test]
    fn encode_single_and_empty() {
        assert_eq!(encode_batch(&[LogRecord::from("{}")]), b"[{}]");
        assert_eq!(encode_batch(&[]), b"[]");
    }

    #[test]
    fn encode_does_not_touch_record_bytes() {
        let batch = [LogRecord::from(r#"{"msg":"a,b]["}"#), LogRecord::from(" {} ")];
        assert_eq!(encode_batch(&batch), br#"[{"msg":"a,b]["}, {} ]"#);
    }
}
