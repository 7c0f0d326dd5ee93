use crate::{
    encode::{self, EncodeEvent},
    fields::SpanFields,
    format::Format,
    tap::Tap,
    time::{RecordTime, SystemTime},
};
use compact_str::CompactString;
use logtail::reporter::Reporter;
use std::{cell::RefCell, io, io::Write, marker::PhantomData};
use tracing::{
    Event, Id, Metadata, Subscriber,
    span::{Attributes, Record},
};
use tracing_subscriber::{
    fmt::MakeWriter,
    layer::{self, Context},
    registry::LookupSpan,
};

/// A [`Layer`] that taps every event into a [`Reporter`].
///
/// Each event is serialized once by the encoder. The serialized bytes are queued for
/// delivery and also written, one record per line, to the layer's writer. The writer
/// discards its input unless one is set with [`Layer::with_writer`].
///
/// [`Layer`]: tracing_subscriber::layer::Layer
pub struct Layer<S, FT = SystemTime, E = encode::JsonEvent, W = fn() -> io::Sink> {
    tap: Tap<E>,
    format: Format<FT>,
    make_writer: W,
    log_internal_errors: bool,
    _inner: PhantomData<fn(S)>,
}

impl<S> Layer<S> {
    /// Returns a new [`Layer`] with the default configuration.
    pub fn new(reporter: Reporter) -> Self {
        Self {
            tap: Tap::new(encode::JsonEvent::default(), reporter),
            format: Format::default(),
            make_writer: io::sink,
            log_internal_errors: true,
            _inner: PhantomData,
        }
    }
}

impl<S, FT, E, W> Layer<S, FT, E, W> {
    /// Sets the encoder that serializes events.
    pub fn with_encoder<E2>(self, encoder: E2) -> Layer<S, FT, E2, W>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
        E2: EncodeEvent<S> + 'static,
    {
        Layer {
            tap: self.tap.with_inner(encoder),
            format: self.format,
            make_writer: self.make_writer,
            log_internal_errors: self.log_internal_errors,
            _inner: PhantomData,
        }
    }

    /// Sets the [`MakeWriter`] that receives the serialized records.
    pub fn with_writer<W2>(self, make_writer: W2) -> Layer<S, FT, E, W2>
    where
        W2: for<'w> MakeWriter<'w> + 'static,
    {
        Layer {
            tap: self.tap,
            format: self.format,
            make_writer,
            log_internal_errors: self.log_internal_errors,
            _inner: PhantomData,
        }
    }

    /// Use the given [`timer`] for record timestamps.
    ///
    /// See the [`time` module] for the provided timer implementations.
    ///
    /// [`timer`]: crate::time::RecordTime
    /// [`time` module]: mod@crate::time
    pub fn with_timer<FT2>(self, timer: FT2) -> Layer<S, FT2, E, W> {
        Layer {
            tap: self.tap,
            format: self.format.with_timer(timer),
            make_writer: self.make_writer,
            log_internal_errors: self.log_internal_errors,
            _inner: self._inner,
        }
    }

    /// Do not emit timestamps with records.
    pub fn without_time(self) -> Layer<S, (), E, W> {
        Layer {
            tap: self.tap,
            format: self.format.without_time(),
            make_writer: self.make_writer,
            log_internal_errors: self.log_internal_errors,
            _inner: self._inner,
        }
    }

    /// Sets whether or not an event's target is displayed.
    pub fn with_target(self, display_target: bool) -> Self {
        Layer {
            format: self.format.with_target(display_target),
            ..self
        }
    }

    /// Sets whether or not an event's [source code file path][file] is
    /// displayed.
    ///
    /// [file]: tracing::Metadata::file
    pub fn with_file(self, display_filename: bool) -> Self {
        Layer {
            format: self.format.with_file(display_filename),
            ..self
        }
    }

    /// Sets whether or not an event's [source code line number][line] is
    /// displayed.
    ///
    /// [line]: tracing::Metadata::line
    pub fn with_line_number(self, display_line_number: bool) -> Self {
        Layer {
            format: self.format.with_line_number(display_line_number),
            ..self
        }
    }

    /// Sets whether or not an event's level is displayed.
    pub fn with_level(self, display_level: bool) -> Self {
        Layer {
            format: self.format.with_level(display_level),
            ..self
        }
    }

    /// Sets whether or not the [thread ID] of the current thread is displayed
    /// when formatting events.
    ///
    /// [thread ID]: std::thread::ThreadId
    pub fn with_thread_ids(self, display_thread_ids: bool) -> Self {
        Layer {
            format: self.format.with_thread_ids(display_thread_ids),
            ..self
        }
    }

    /// Sets whether or not the [name] of the current thread is displayed
    /// when formatting events.
    ///
    /// [name]: std::thread#naming-threads
    pub fn with_thread_names(self, display_thread_names: bool) -> Self {
        Layer {
            format: self.format.with_thread_names(display_thread_names),
            ..self
        }
    }

    /// Sets whether or not the enclosing spans are written with each record.
    pub fn with_span_list(self, display_span_list: bool) -> Self {
        Layer {
            format: self.format.with_span_list(display_span_list),
            ..self
        }
    }

    /// Sets the instance ID written with each record.
    pub fn with_instance_id(self, instance_id: impl Into<CompactString>) -> Self {
        Layer {
            format: self.format.with_instance_id(instance_id),
            ..self
        }
    }

    /// Sets whether a dropped record prints a line to stderr.
    pub fn print_overflow(self, print_overflow: bool) -> Self {
        Layer {
            tap: self.tap.print_overflow(print_overflow),
            ..self
        }
    }

    /// Sets where overflow notes are written. Defaults to stderr.
    pub fn with_overflow_writer<W2>(self, make_writer: W2) -> Self
    where
        W2: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        Layer {
            tap: self.tap.with_overflow_writer(make_writer),
            ..self
        }
    }

    /// Sets whether encoding and writing failures are printed to stderr.
    pub fn log_internal_errors(self, log_internal_errors: bool) -> Self {
        Layer {
            log_internal_errors,
            ..self
        }
    }
}

thread_local! {
    static BUF: RefCell<Vec<u8>> = const { RefCell::new(Vec::new()) };
}

impl<S, FT, E, W> layer::Layer<S> for Layer<S, FT, E, W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    FT: RecordTime + 'static,
    E: EncodeEvent<S> + 'static,
    W: for<'w> MakeWriter<'w> + 'static,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let span = ctx.span(id).expect("Span not found, this is a bug");
        let mut fields = SpanFields::default();
        attrs.record(&mut fields.visitor());
        span.extensions_mut().insert(fields);
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let span = ctx.span(id).expect("Span not found, this is a bug");
        let mut extensions = span.extensions_mut();
        if let Some(fields) = extensions.get_mut::<SpanFields>() {
            values.record(&mut fields.visitor());
        } else {
            let mut fields = SpanFields::default();
            values.record(&mut fields.visitor());
            extensions.insert(fields);
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        if logtail::in_delivery()
            || is_internal(event.metadata())
            || ctx
                .event_scope(event)
                .is_some_and(|mut scope| scope.any(|span| is_internal(span.metadata())))
        {
            return;
        }

        BUF.with(|buf| {
            let borrow = buf.try_borrow_mut();
            let mut a;
            let mut b;
            let buf = match borrow {
                Ok(buf) => {
                    a = buf;
                    &mut *a
                }
                _ => {
                    b = Vec::new();
                    &mut b
                }
            };

            match self.tap.encode_event(event, &ctx, &self.format, buf) {
                Ok(()) => {
                    buf.push(b'\n');
                    let mut writer = self.make_writer.make_writer_for(event.metadata());
                    if let Err(e) = writer.write_all(buf) {
                        if self.log_internal_errors {
                            eprintln!("[tracing-logtail] unable to write record: {e}");
                        }
                    }
                }
                Err(e) => {
                    if self.log_internal_errors {
                        eprintln!("[tracing-logtail] unable to encode event: {e}");
                    }
                }
            }

            buf.clear();
        });
    }
}

/// Events from the pipeline itself are never shipped.
fn is_internal(metadata: &Metadata<'_>) -> bool {
    ["logtail", "tracing_logtail"].iter().any(|krate| {
        metadata
            .target()
            .strip_prefix(krate)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
    })
}

/// Returns a new [logtail layer] that can be [composed] with other layers to
/// construct a [`Subscriber`].
///
/// This is a shorthand for the equivalent [`Layer::new`] function.
///
/// [logtail layer]: Layer
/// [composed]: tracing_subscriber::layer
pub fn layer<S>(reporter: Reporter) -> Layer<S> {
    Layer::new(reporter)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::encode::EncodeError;
    use logtail::LogtailClient;
    use serde_json::Value;
    use std::{
        fmt,
        num::NonZeroUsize,
        sync::{Arc, Mutex},
    };
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Capture {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }

        fn lines(&self) -> Vec<Value> {
            let buf = self.0.lock().unwrap();
            buf.split(|b| *b == b'\n')
                .filter(|line| !line.is_empty())
                .map(|line| serde_json::from_slice(line).unwrap())
                .collect()
        }
    }

    fn reporter(capacity: usize) -> Reporter {
        let client = LogtailClient::builder()
            .source_token("token")
            .endpoint("http://127.0.0.1:9")
            .https_only(false)
            .build()
            .unwrap();
        Reporter::with_capacity(client, NonZeroUsize::new(capacity).unwrap())
    }

    fn with_layer<L>(layer: L, f: impl FnOnce())
    where
        L: layer::Layer<tracing_subscriber::Registry> + Send + Sync + 'static,
    {
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, f);
    }

    #[test]
    fn records_are_queued_and_passed_through() {
        let reporter = reporter(16);
        let capture = Capture::default();
        let writer = capture.clone();
        let layer = Layer::new(reporter.clone())
            .without_time()
            .with_writer(move || writer.clone());

        with_layer(layer, || {
            tracing::info!(user = "ferris", attempt = 3, ok = true, "hello");
            tracing::warn!("second");
        });

        assert_eq!(reporter.queued(), 2);
        let lines = capture.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["message"], "hello");
        assert_eq!(lines[0]["level"], "INFO");
        assert_eq!(lines[0]["user"], "ferris");
        assert_eq!(lines[0]["attempt"], 3);
        assert_eq!(lines[0]["ok"], true);
        assert_eq!(lines[0]["target"], module_path!());
        assert!(lines[0].get("dt").is_none());
        assert_eq!(lines[1]["level"], "WARN");
    }

    #[test]
    fn default_format_has_timestamp() {
        let capture = Capture::default();
        let writer = capture.clone();
        let layer = Layer::new(reporter(4)).with_writer(move || writer.clone());

        with_layer(layer, || tracing::info!("tick"));

        let lines = capture.lines();
        assert!(lines[0]["dt"].as_str().is_some());
    }

    #[test]
    fn optional_metadata() {
        let capture = Capture::default();
        let writer = capture.clone();
        let layer = Layer::new(reporter(4))
            .without_time()
            .with_target(false)
            .with_level(false)
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .with_instance_id("worker-1")
            .with_writer(move || writer.clone());

        with_layer(layer, || tracing::info!("meta"));

        let line = &capture.lines()[0];
        assert!(line.get("target").is_none());
        assert!(line.get("level").is_none());
        assert_eq!(line["file"], file!());
        assert!(line["line"].as_u64().is_some());
        assert!(line["thread_id"].as_str().is_some());
        assert_eq!(line["instance_id"], "worker-1");
    }

    #[test]
    fn metadata_wins_over_event_fields() {
        let capture = Capture::default();
        let writer = capture.clone();
        let layer = Layer::new(reporter(4))
            .with_instance_id("worker-1")
            .with_writer(move || writer.clone());

        with_layer(layer, || {
            tracing::warn!(level = "custom", dt = 0, instance_id = "spoofed", "clash");
        });

        let line = &capture.lines()[0];
        assert_eq!(line["level"], "WARN");
        assert_eq!(line["instance_id"], "worker-1");
        assert!(line["dt"].as_str().is_some());
        assert_eq!(line["message"], "clash");
    }

    #[test]
    fn spans_are_listed_root_first() {
        let capture = Capture::default();
        let writer = capture.clone();
        let layer = Layer::new(reporter(4))
            .without_time()
            .with_writer(move || writer.clone());

        with_layer(layer, || {
            let outer = tracing::info_span!("request", id = 7, user = tracing::field::Empty);
            let _outer = outer.enter();
            outer.record("user", "ferris");
            let inner = tracing::info_span!("query");
            let _inner = inner.enter();
            tracing::info!("inside");
        });

        let spans = capture.lines()[0]["spans"].as_array().unwrap().clone();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0]["name"], "request");
        assert_eq!(spans[0]["id"], 7);
        assert_eq!(spans[0]["user"], "ferris");
        assert_eq!(spans[1]["name"], "query");
    }

    #[test]
    fn overflow_drops_but_keeps_passthrough() {
        let reporter = reporter(2);
        let capture = Capture::default();
        let writer = capture.clone();
        let notes = Capture::default();
        let note_writer = notes.clone();
        let layer = Layer::new(reporter.clone())
            .with_overflow_writer(move || note_writer.clone())
            .with_writer(move || writer.clone());

        with_layer(layer, || {
            for i in 0..5 {
                tracing::info!(i, "burst");
            }
        });

        assert_eq!(reporter.queued(), 2);
        assert_eq!(reporter.dropped(), 3);
        assert_eq!(capture.lines().len(), 5);
        assert_eq!(
            notes.text(),
            "[tracing-logtail] queue overflow, dropping log record\n".repeat(3)
        );
    }

    #[test]
    fn overflow_note_can_be_silenced() {
        let reporter = reporter(1);
        let notes = Capture::default();
        let note_writer = notes.clone();
        let layer = Layer::new(reporter.clone())
            .print_overflow(false)
            .with_overflow_writer(move || note_writer.clone());

        with_layer(layer, || {
            tracing::info!("kept");
            tracing::info!("dropped");
        });

        assert_eq!(reporter.dropped(), 1);
        assert!(notes.text().is_empty());
    }

    #[test]
    fn pipeline_events_are_ignored() {
        let reporter = reporter(4);
        let layer = Layer::new(reporter.clone());

        with_layer(layer, || {
            tracing::error!(target: "logtail::reporter", "failed to send batch");
            tracing::error!(target: "logtail", "failed");
            let span = tracing::info_span!(target: "logtail::client", "send_batch");
            let _guard = span.enter();
            tracing::debug!(target: "hyper", "connection");
        });
        assert_eq!(reporter.queued(), 0);

        let layer = Layer::new(reporter.clone());
        with_layer(layer, || {
            tracing::info!(target: "logtail_app", "not ours");
        });
        assert_eq!(reporter.queued(), 1);
    }

    #[test]
    fn events_during_delivery_are_ignored() {
        let reporter = reporter(4);
        let layer = Layer::new(reporter.clone());
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();

        with_layer(layer, || {
            // no enclosing span, as with tracing disabled on the client
            rt.block_on(logtail::delivering(async {
                tracing::debug!(target: "hyper_util::client", "connecting");
                tokio::task::yield_now().await;
                tracing::debug!(target: "reqwest::connect", "connected");
            }));
            tracing::info!("after delivery");
        });

        assert_eq!(reporter.queued(), 1);
    }

    struct Failing;

    impl<S> EncodeEvent<S> for Failing
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        fn encode_event<T: RecordTime>(
            &self,
            _event: &Event<'_>,
            _ctx: &Context<'_, S>,
            _format: &Format<T>,
            buf: &mut Vec<u8>,
        ) -> Result<(), EncodeError> {
            buf.extend_from_slice(b"{\"partial\":");
            Err(EncodeError::Fmt(fmt::Error))
        }
    }

    #[test]
    fn encoder_errors_skip_the_queue() {
        let reporter = reporter(4);
        let capture = Capture::default();
        let writer = capture.clone();
        let layer = Layer::new(reporter.clone())
            .with_encoder(Failing)
            .log_internal_errors(false)
            .with_writer(move || writer.clone());

        with_layer(layer, || tracing::info!("lost"));

        assert_eq!(reporter.queued(), 0);
        assert_eq!(reporter.dropped(), 0);
        assert!(capture.0.lock().unwrap().is_empty());
    }
}
