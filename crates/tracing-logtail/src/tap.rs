use crate::{
    encode::{EncodeError, EncodeEvent},
    format::Format,
    time::RecordTime,
};
use logtail::{Dropped, LogRecord, reporter::Reporter};
use std::io::{self, Write};
use tracing::{Event, Subscriber};
use tracing_subscriber::{
    fmt::{MakeWriter, writer::BoxMakeWriter},
    layer::Context,
    registry::LookupSpan,
};

/// Wraps an [`EncodeEvent`] and forwards a copy of every record it produces to a
/// [`Reporter`].
///
/// The wrapped encoder's output and errors are returned unchanged. Enqueueing never
/// blocks and never fails the call: a record that does not fit in the queue is
/// discarded with a one-line note, written to stderr unless another writer is set
/// with [`Tap::with_overflow_writer`].
pub struct Tap<E> {
    inner: E,
    reporter: Reporter,
    print_overflow: bool,
    overflow_writer: BoxMakeWriter,
}

impl<E> Tap<E> {
    /// Wrap `inner`, reporting to `reporter`.
    pub fn new(inner: E, reporter: Reporter) -> Self {
        Self {
            inner,
            reporter,
            print_overflow: true,
            overflow_writer: BoxMakeWriter::new(io::stderr),
        }
    }

    /// Whether a dropped record prints a line to stderr.
    ///
    /// Enabled by default.
    pub fn print_overflow(self, print_overflow: bool) -> Self {
        Self {
            print_overflow,
            ..self
        }
    }

    /// Where overflow notes are written.
    pub fn with_overflow_writer<W>(self, make_writer: W) -> Self
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        Self {
            overflow_writer: BoxMakeWriter::new(make_writer),
            ..self
        }
    }

    /// Replace the wrapped encoder.
    pub fn with_inner<E2>(self, inner: E2) -> Tap<E2> {
        Tap {
            inner,
            reporter: self.reporter,
            print_overflow: self.print_overflow,
            overflow_writer: self.overflow_writer,
        }
    }

    /// The wrapped encoder.
    pub fn inner(&self) -> &E {
        &self.inner
    }

    /// The reporter records are forwarded to.
    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }
}

impl<S, E> EncodeEvent<S> for Tap<E>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    E: EncodeEvent<S>,
{
    fn encode_event<T: RecordTime>(
        &self,
        event: &Event<'_>,
        ctx: &Context<'_, S>,
        format: &Format<T>,
        buf: &mut Vec<u8>,
    ) -> Result<(), EncodeError> {
        let start = buf.len();
        self.inner.encode_event(event, ctx, format, buf)?;

        // the caller reuses `buf`, so the queue gets its own copy
        let record = LogRecord::copy_from_slice(&buf[start..]);
        if let Err(Dropped::Full) = self.reporter.report(record) {
            if self.print_overflow {
                // nowhere left to report a failing diagnostic sink
                let _ = writeln!(
                    self.overflow_writer.make_writer(),
                    "[tracing-logtail] queue overflow, dropping log record"
                );
            }
        }
        Ok(())
    }
}
