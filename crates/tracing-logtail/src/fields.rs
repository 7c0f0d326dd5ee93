use serde_json::{Map, Value};
use std::{error::Error, fmt::Debug};
use tracing::field::{Field, Visit};

/// Fields recorded on a span, stored in the span's extensions.
#[derive(Debug, Clone, Default)]
pub struct SpanFields {
    fields: Map<String, Value>,
}

impl SpanFields {
    /// A [`Visit`] that records into these fields.
    pub fn visitor(&mut self) -> JsonVisitor<'_> {
        JsonVisitor::new(&mut self.fields)
    }

    /// The recorded fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// A [`Visit`] that writes every field into a JSON object, keeping numbers and
/// booleans typed and rendering everything else with `Debug`.
#[derive(Debug)]
pub struct JsonVisitor<'a> {
    target: &'a mut Map<String, Value>,
}

impl<'a> JsonVisitor<'a> {
    /// Returns a visitor that writes to the provided `target`.
    pub fn new(target: &'a mut Map<String, Value>) -> Self {
        Self { target }
    }

    fn insert(&mut self, field: &Field, value: Value) {
        self.target.insert(field.name().to_string(), value);
    }
}

impl Visit for JsonVisitor<'_> {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::from(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn Error + 'static)) {
        self.insert(field, Value::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        self.insert(field, Value::String(format!("{value:?}")));
    }
}
