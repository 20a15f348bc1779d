use crate::formatter::JsonFormatter;
use crate::record::{EventMetadata, ExceptionInfo, LogEvent};
use crate::value::{Decimal, FieldMap, FieldValue};
use chrono::Utc;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error;
use std::fmt::{self, Write as _};
use std::io::{self, Write};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::{self, FormatEvent, FormatFields};
use tracing_subscriber::fmt::{FmtContext, MakeWriter};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Name of the field whose `dyn Error` value is captured as the event's
/// exception.
pub const EXCEPTION_FIELD: &str = "exc_info";

/// `tracing_subscriber` layer that renders every event it observes as one
/// JSON line and writes it to a [`MakeWriter`].
///
/// Level filtering is left to the subscriber stack (e.g. a `Filtered`
/// layer or an `EnvFilter`); this layer formats whatever reaches it.
pub struct JsonLayer<W = fn() -> io::Stdout> {
    formatter: JsonFormatter,
    make_writer: W,
    stack_info: bool,
}

impl JsonLayer {
    /// Layer writing to stdout with the given formatter.
    pub fn new(formatter: JsonFormatter) -> Self {
        JsonLayer { formatter, make_writer: io::stdout, stack_info: false }
    }
}

impl Default for JsonLayer {
    fn default() -> Self {
        JsonLayer::new(JsonFormatter::default())
    }
}

impl<W> JsonLayer<W> {
    /// Replace the writer the formatted lines go to.
    pub fn with_writer<W2>(self, make_writer: W2) -> JsonLayer<W2>
    where
        W2: for<'a> MakeWriter<'a> + 'static,
    {
        JsonLayer { formatter: self.formatter, make_writer, stack_info: self.stack_info }
    }

    /// Capture a backtrace into `stack_info` for every event.
    pub fn with_stack_info(mut self, enabled: bool) -> Self {
        self.stack_info = enabled;
        self
    }

    pub fn formatter(&self) -> &JsonFormatter {
        &self.formatter
    }
}

impl<S, W> Layer<S> for JsonLayer<W>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
    W: for<'a> MakeWriter<'a> + 'static,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let func_name = ctx.event_span(event).map(|span| span.name().to_string());
        let mut log_event = log_event_from(event, func_name);
        attach_backtraces(&mut log_event, self.stack_info);

        let mut line = self.formatter.format(&log_event);
        line.push('\n');

        // A failed write loses this line only; the caller is never affected.
        let mut writer = self.make_writer.make_writer_for(event.metadata());
        let _ = writer.write_all(line.as_bytes());
    }
}

/// Allows plugging the formatter into `tracing_subscriber::fmt` via
/// `event_format`, reusing its writer and filtering setup.
impl<S, N> FormatEvent<S, N> for JsonFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let func_name = ctx
            .event_scope()
            .and_then(|mut scope| scope.next())
            .map(|span| span.name().to_string());
        let mut log_event = log_event_from(event, func_name);
        attach_backtraces(&mut log_event, false);
        writeln!(writer, "{}", self.format(&log_event))
    }
}

/// Convert a `tracing` event into a [`LogEvent`].
///
/// `func_name` is the name of the span the event was emitted in, if any.
pub fn log_event_from(event: &Event<'_>, func_name: Option<String>) -> LogEvent {
    let mut fields = FieldMap::new();
    let mut message: Option<String> = None;
    let mut exception: Option<ExceptionInfo> = None;

    let mut visitor = FieldVisitor {
        fields: &mut fields,
        message: &mut message,
        exception: &mut exception,
    };
    event.record(&mut visitor);

    let meta = event.metadata();
    let mut metadata = EventMetadata::current(meta.target());
    if let Some(file) = meta.file() {
        metadata = metadata.with_source(file, meta.line());
    } else {
        metadata.line_no = meta.line();
    }
    metadata.module = meta.module_path().map(str::to_string);
    metadata.func_name = func_name;

    LogEvent {
        message: message.unwrap_or_default(),
        level: *meta.level(),
        timestamp: Utc::now(),
        fields,
        exception,
        metadata,
    }
}

/// Collects the fields of an event into a [`FieldMap`], pulling out the
/// message and the exception.
pub struct FieldVisitor<'a> {
    pub fields: &'a mut FieldMap,
    pub message: &'a mut Option<String>,
    pub exception: &'a mut Option<ExceptionInfo>,
}

impl<'a> FieldVisitor<'a> {
    fn insert(&mut self, field: &Field, value: FieldValue) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.insert(field, FieldValue::from(value));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, FieldValue::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, FieldValue::from(value));
    }

    fn record_i128(&mut self, field: &Field, value: i128) {
        let value = match i64::try_from(value) {
            Ok(v) => FieldValue::Int(v),
            Err(_) => wide_integer(value),
        };
        self.insert(field, value);
    }

    fn record_u128(&mut self, field: &Field, value: u128) {
        let value = match u64::try_from(value) {
            Ok(v) => FieldValue::UInt(v),
            Err(_) => wide_integer(value),
        };
        self.insert(field, value);
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, FieldValue::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, FieldValue::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn Error + 'static)) {
        if field.name() == EXCEPTION_FIELD {
            *self.exception = Some(ExceptionInfo::from_error(value));
        } else {
            self.insert(field, FieldValue::Str(value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.insert(field, FieldValue::Str(format!("{:?}", value)));
        }
    }
}

/// Fill `stack_info` when forced, and give a captured exception the same
/// backtrace. Without `force`, an exception only gets one when
/// `RUST_BACKTRACE`/`RUST_LIB_BACKTRACE` enable capturing.
fn attach_backtraces(log_event: &mut LogEvent, force: bool) {
    let stack = force.then(|| Backtrace::force_capture().to_string());
    if let Some(exception) = log_event.exception.take() {
        let backtrace = stack.clone().or_else(|| {
            let bt = Backtrace::capture();
            (bt.status() == BacktraceStatus::Captured).then(|| bt.to_string())
        });
        log_event.exception = Some(match backtrace {
            Some(bt) => exception.with_backtrace(bt),
            None => exception,
        });
    }
    log_event.metadata.stack_info = stack;
}

fn wide_integer(value: impl fmt::Display) -> FieldValue {
    let text = value.to_string();
    match text.parse::<Decimal>() {
        Ok(d) => FieldValue::Decimal(d),
        Err(_) => FieldValue::Str(text),
    }
}
