use crate::time::SystemTime;
use compact_str::CompactString;

/// Controls which metadata [`JsonEvent`](crate::encode::JsonEvent) writes next to the
/// event's own fields.
pub struct Format<T = SystemTime> {
    pub(crate) timer: T,
    pub(crate) display_target: bool,
    pub(crate) display_level: bool,
    pub(crate) display_thread_id: bool,
    pub(crate) display_thread_name: bool,
    pub(crate) display_filename: bool,
    pub(crate) display_line_number: bool,
    pub(crate) display_span_list: bool,
    pub(crate) instance_id: Option<CompactString>,
}

impl Default for Format<SystemTime> {
    fn default() -> Self {
        Format {
            timer: SystemTime,
            display_target: true,
            display_level: true,
            display_thread_id: false,
            display_thread_name: false,
            display_filename: false,
            display_line_number: false,
            display_span_list: true,
            instance_id: None,
        }
    }
}

impl<T> Format<T> {
    /// Use the given [`timer`] for record timestamps.
    ///
    /// See [`time` module] for the provided timer implementations.
    ///
    /// [`timer`]: crate::time::RecordTime
    /// [`time` module]: mod@crate::time
    pub fn with_timer<T2>(self, timer: T2) -> Format<T2> {
        Format {
            timer,
            display_target: self.display_target,
            display_level: self.display_level,
            display_thread_id: self.display_thread_id,
            display_thread_name: self.display_thread_name,
            display_filename: self.display_filename,
            display_line_number: self.display_line_number,
            display_span_list: self.display_span_list,
            instance_id: self.instance_id,
        }
    }

    /// Do not emit timestamps with records.
    pub fn without_time(self) -> Format<()> {
        self.with_timer(())
    }

    /// Sets whether or not an event's target is displayed.
    pub fn with_target(self, display_target: bool) -> Format<T> {
        Format {
            display_target,
            ..self
        }
    }

    /// Sets whether or not an event's level is displayed.
    pub fn with_level(self, display_level: bool) -> Format<T> {
        Format {
            display_level,
            ..self
        }
    }

    /// Sets whether or not the [thread ID] of the current thread is displayed
    /// when formatting events.
    ///
    /// [thread ID]: std::thread::ThreadId
    pub fn with_thread_ids(self, display_thread_id: bool) -> Format<T> {
        Format {
            display_thread_id,
            ..self
        }
    }

    /// Sets whether or not the [name] of the current thread is displayed
    /// when formatting events.
    ///
    /// [name]: std::thread#naming-threads
    pub fn with_thread_names(self, display_thread_name: bool) -> Format<T> {
        Format {
            display_thread_name,
            ..self
        }
    }

    /// Sets whether or not an event's [source code file path][file] is
    /// displayed.
    ///
    /// [file]: tracing::Metadata::file
    pub fn with_file(self, display_filename: bool) -> Format<T> {
        Format {
            display_filename,
            ..self
        }
    }

    /// Sets whether or not an event's [source code line number][line] is
    /// displayed.
    ///
    /// [line]: tracing::Metadata::line
    pub fn with_line_number(self, display_line_number: bool) -> Format<T> {
        Format {
            display_line_number,
            ..self
        }
    }

    /// Sets whether or not the source code location from which an event
    /// originated is displayed.
    ///
    /// This is equivalent to calling [`Format::with_file`] and
    /// [`Format::with_line_number`] with the same value.
    pub fn with_source_location(self, display_location: bool) -> Self {
        self.with_line_number(display_location)
            .with_file(display_location)
    }

    /// Sets whether or not the enclosing spans and their fields are written
    /// under the `spans` key, root first.
    pub fn with_span_list(self, display_span_list: bool) -> Format<T> {
        Format {
            display_span_list,
            ..self
        }
    }

    /// Attach an `instance_id` field to every record.
    pub fn with_instance_id(self, instance_id: impl Into<CompactString>) -> Format<T> {
        Format {
            instance_id: Some(instance_id.into()),
            ..self
        }
    }
}
