//! Batching log shipper for the [Logtail](https://betterstack.com/logs) ingestion API.
//!
//! Records are already-serialized JSON objects. They are pushed into a bounded queue
//! without ever blocking the producer, collected into batches by a single background
//! loop, and POSTed as one JSON array per batch.
//!
//! ```no_run
//! use logtail::{LogRecord, LogtailClient, reporter::Reporter};
//! use std::{num::NonZeroUsize, time::Duration};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = LogtailClient::builder()
//!     .source_token("source-token")
//!     .build()?;
//! let reporter = Reporter::with_capacity(client, NonZeroUsize::new(4096).unwrap());
//!
//! let cancel = CancellationToken::new();
//! let reporting = reporter
//!     .reporting()
//!     .expect("first call")
//!     .with_batch_size(NonZeroUsize::new(100).unwrap())
//!     .with_idle_timeout(Duration::from_secs(1))
//!     .with_cancellation_token(cancel.clone());
//! tokio::spawn(reporting.start());
//!
//! reporter.report(LogRecord::from(r#"{"message":"hello"}"#)).ok();
//! cancel.cancel();
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `reqwest-default-tls`: use [`reqwest`] with TLS (enabled by default). This currently
//!   selects [`rustls`], the same provider as `reqwest-rustls`.
//! - `reqwest-rustls`: use [`reqwest`] with the [`rustls`] TLS provider.
//!
//! [`reqwest`]: https://docs.rs/reqwest
//! [`rustls`]: https://docs.rs/rustls
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// Batch collection from the bounded queue.
pub mod batcher;
mod client;
/// Bounded, drop-on-overflow record queue.
pub mod queue;
mod record;
pub mod reporter;

pub use client::{
    DEFAULT_ENDPOINT, DEFAULT_TIMEOUT, LogtailClient, LogtailClientBuilder,
    LogtailClientBuilderError, LogtailClientError, delivering, encode_batch, in_delivery,
};
pub use queue::Dropped;
pub use record::LogRecord;
pub use tokio_util::sync::CancellationToken;

#[cfg(test)]
#[cfg_attr(test, ctor::ctor)]
fn init() {
    // Initialize the tracing subscriber for tests
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .init();
}
