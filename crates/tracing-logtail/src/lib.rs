//! A tracing layer that ships JSON log records to [Logtail](https://betterstack.com/logs).
//!
//! Every event is serialized once, copied into a bounded queue and written to the
//! layer's own writer. A background [`Reporting`] task batches the queue and POSTs
//! each batch to the ingestion endpoint. Logging never blocks: if the queue is full
//! the record is dropped.
//!
//! ```no_run
//! use tracing_logtail::{LogtailClient, logtail::CancellationToken, reporter::Reporter};
//! use std::num::NonZeroUsize;
//! use tracing_subscriber::layer::SubscriberExt;
//! use tracing_subscriber::util::SubscriberInitExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = LogtailClient::builder()
//!         .source_token("source-token")
//!         .build()?;
//!     let reporter = Reporter::with_capacity(client, NonZeroUsize::new(4096).unwrap());
//!
//!     let cancel = CancellationToken::new();
//!     let reporting = reporter
//!         .reporting()
//!         .expect("first call")
//!         .with_batch_size(NonZeroUsize::new(100).unwrap())
//!         .with_cancellation_token(cancel.clone());
//!     let handle = tokio::spawn(reporting.start());
//!
//!     tracing_subscriber::registry()
//!         .with(tracing_subscriber::fmt::layer())
//!         .with(tracing_logtail::layer(reporter).with_instance_id("worker-1"))
//!         .init();
//!
//!     tracing::info!(user = "ferris", "hello");
//!
//!     cancel.cancel();
//!     handle.await?;
//!     Ok(())
//! }
//! ```
//!
//! [`Reporting`]: logtail::reporter::Reporting
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// Serializing [`Event`](tracing::Event)s into records.
pub mod encode;
/// Recording span and event fields as JSON.
pub mod fields;
/// Options for the default record format.
pub mod format;
/// Tracing layer that ships records through a [`Reporter`](logtail::reporter::Reporter).
pub mod layer;
/// Copying encoded records into the delivery queue.
pub mod tap;
/// Time utilities for recording timestamps.
pub mod time;

pub use layer::{Layer, layer};
pub use logtail::{self, LogtailClient, reporter};
pub use tap::Tap;

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
