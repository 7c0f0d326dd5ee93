use serde_json::{Map, Value};
use std::time::Instant;

/// Key under which [`SystemTime`] writes its timestamp.
pub const TIMESTAMP_KEY: &str = "dt";
/// Key under which [`Uptime`] writes the elapsed seconds.
pub const UPTIME_KEY: &str = "uptime";

/// A type that can measure and record the current time.
///
/// This trait is used by `Format` to include a timestamp with each record.
///
/// Notable default implementations of this trait are `SystemTime` and `()`. The former records the
/// current wall-clock time as RFC 3339, and the latter does not record the current time at all.
/// `RecordTime` is also automatically implemented for any function pointer with the appropriate
/// signature.
pub trait RecordTime {
    /// Measure and write the current time into the record being built.
    fn record_time(&self, record: &mut Map<String, Value>);
}

/// Returns a new `SystemTime` timestamp provider.
///
/// This is equivalent to calling
/// ```rust
/// # fn timer() -> tracing_logtail::time::SystemTime {
/// tracing_logtail::time::SystemTime::default()
/// # }
/// ```
pub fn time() -> SystemTime {
    SystemTime
}

/// Returns a new `Uptime` timestamp provider.
///
/// With this timer, records carry the amount of time elapsed since the timestamp
/// provider was constructed.
///
/// This is equivalent to calling
/// ```rust
/// # fn timer() -> tracing_logtail::time::Uptime {
/// tracing_logtail::time::Uptime::default()
/// # }
/// ```
pub fn uptime() -> Uptime {
    Uptime::default()
}

impl<F> RecordTime for &F
where
    F: RecordTime,
{
    fn record_time(&self, record: &mut Map<String, Value>) {
        (*self).record_time(record)
    }
}

impl RecordTime for () {
    fn record_time(&self, _: &mut Map<String, Value>) {}
}

impl RecordTime for fn(&mut Map<String, Value>) {
    fn record_time(&self, record: &mut Map<String, Value>) {
        (*self)(record)
    }
}

/// Retrieve and record the current wall-clock time.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct SystemTime;

/// Retrieve and record the relative elapsed wall-clock time since an epoch.
///
/// The `Default` implementation for `Uptime` makes the epoch the current time.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Uptime {
    epoch: Instant,
}

impl Default for Uptime {
    fn default() -> Self {
        Uptime {
            epoch: Instant::now(),
        }
    }
}

impl From<Instant> for Uptime {
    fn from(epoch: Instant) -> Self {
        Uptime { epoch }
    }
}

impl RecordTime for SystemTime {
    fn record_time(&self, record: &mut Map<String, Value>) {
        record.insert(
            TIMESTAMP_KEY.to_string(),
            Value::String(jiff::Timestamp::now().to_string()),
        );
    }
}

impl RecordTime for Uptime {
    fn record_time(&self, record: &mut Map<String, Value>) {
        record.insert(
            UPTIME_KEY.to_string(),
            Value::from(self.epoch.elapsed().as_secs_f64()),
        );
    }
}
