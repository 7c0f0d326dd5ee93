use crate::{
    fields::{JsonVisitor, SpanFields},
    format::Format,
    time::RecordTime,
};
use compact_str::format_compact;
use serde_json::{Map, Value};
use std::fmt;
use tracing::{Event, Subscriber};
use tracing_subscriber::{layer::Context, registry::LookupSpan};

/// Error produced while serializing an event.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum EncodeError {
    /// JSON serialization failed.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    /// A formatter returned an error.
    #[error("format: {0}")]
    Fmt(#[from] fmt::Error),
}

/// Turns an [`Event`] into one serialized record.
pub trait EncodeEvent<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    /// Append the serialized form of `event` to `buf`.
    ///
    /// Implementations must append exactly one record and leave any bytes already in
    /// `buf` untouched.
    fn encode_event<T: RecordTime>(
        &self,
        event: &Event<'_>,
        ctx: &Context<'_, S>,
        format: &Format<T>,
        buf: &mut Vec<u8>,
    ) -> Result<(), EncodeError>;
}

/// The default [`EncodeEvent`] implementation, writing one JSON object per [`Event`].
#[derive(Debug)]
pub struct JsonEvent {
    // reserve the ability to add fields to this without causing a breaking
    // change in the future.
    _private: (),
}

impl JsonEvent {
    /// Create a new `JsonEvent`.
    pub fn new() -> Self {
        Self { _private: () }
    }
}

impl Default for JsonEvent {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> EncodeEvent<S> for JsonEvent
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn encode_event<T: RecordTime>(
        &self,
        event: &Event<'_>,
        ctx: &Context<'_, S>,
        format: &Format<T>,
        buf: &mut Vec<u8>,
    ) -> Result<(), EncodeError> {
        let mut record = Map::new();
        let metadata = event.metadata();

        // metadata keys below take precedence over event fields of the same name
        event.record(&mut JsonVisitor::new(&mut record));

        format.timer.record_time(&mut record);

        if format.display_level {
            record.insert("level".into(), metadata.level().as_str().into());
        }

        let current_thread = std::thread::current();
        if format.display_thread_name {
            if let Some(name) = current_thread.name() {
                record.insert("thread_name".into(), name.into());
            } else if !format.display_thread_id {
                record.insert(
                    "thread_name".into(),
                    Value::String(format_compact!("{:0>2?}", current_thread.id()).into()),
                );
            }
        }
        if format.display_thread_id {
            record.insert(
                "thread_id".into(),
                Value::String(format_compact!("{:0>2?}", current_thread.id()).into()),
            );
        }

        if format.display_target {
            record.insert("target".into(), metadata.target().into());
        }

        if format.display_filename {
            if let Some(file) = metadata.file() {
                record.insert("file".into(), file.into());
            }
        }

        if format.display_line_number {
            if let Some(line) = metadata.line() {
                record.insert("line".into(), line.into());
            }
        }

        if let Some(instance_id) = &format.instance_id {
            record.insert("instance_id".into(), instance_id.as_str().into());
        }

        if format.display_span_list {
            if let Some(scope) = ctx.event_scope(event) {
                let spans: Vec<Value> = scope
                    .from_root()
                    .map(|span| {
                        let mut entry = Map::new();
                        entry.insert("name".into(), span.name().into());
                        if let Some(fields) = span.extensions().get::<SpanFields>() {
                            entry.extend(
                                fields
                                    .fields()
                                    .iter()
                                    .map(|(k, v)| (k.clone(), v.clone())),
                            );
                        }
                        Value::Object(entry)
                    })
                    .collect();
                if !spans.is_empty() {
                    record.insert("spans".into(), Value::Array(spans));
                }
            }
        }

        serde_json::to_writer(&mut *buf, &record)?;
        Ok(())
    }
}
