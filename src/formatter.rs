use std::fmt;
use std::sync::Arc;

use crate::backend::{default_fallback, EncodeError, FallbackFn, JsonBackend, SerdeJsonBackend};
use crate::record::{JsonRecord, LogEvent, BUILTIN_ATTRS};
use crate::value::{FieldMap, FieldValue};

/// Text returned when a record cannot be encoded at all.
pub const EMPTY_RECORD: &str = "{}";

/// Injects intrinsic fields into the extras before the base record is built.
pub type IntrinsicFieldsFn = dyn Fn(&LogEvent, &mut FieldMap) + Send + Sync;

/// Normalizes the merged record. Returns the record to use, or `None` to
/// keep the (possibly mutated) input.
pub type NormalizeFn = dyn Fn(&mut JsonRecord) -> Option<JsonRecord> + Send + Sync;

/// Final rewrite of the record, applied after normalization.
pub type PostProcessFn = dyn Fn(JsonRecord) -> JsonRecord + Send + Sync;

/// Renders a [`LogEvent`] as a single-line JSON document.
///
/// Formatting runs four steps: extract extra fields, build the record,
/// normalize it, and serialize it through the configured [`JsonBackend`].
/// Variants are assembled from strategies via [`JsonFormatter::builder`];
/// [`JsonFormatter::verbose`] and [`JsonFormatter::flat`] are the two
/// predefined ones.
///
/// Usage example:
///
/// ```
/// use tracing_json_formatter::{JsonFormatter, LogEvent};
///
/// let formatter = JsonFormatter::new();
/// let event = LogEvent::new(tracing::Level::INFO, "app", "Sign up")
///     .with_field("referral_code", "52d6ce");
/// let line = formatter.format(&event);
/// assert!(line.contains(r#""referral_code":"52d6ce""#));
/// ```
#[derive(Clone)]
pub struct JsonFormatter {
    backend: Arc<dyn JsonBackend>,
    fallback: Arc<FallbackFn>,
    intrinsic_fields: Option<Arc<IntrinsicFieldsFn>>,
    normalize: Arc<NormalizeFn>,
    post_process: Option<Arc<PostProcessFn>>,
}

impl fmt::Debug for JsonFormatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonFormatter")
            .field("intrinsic_fields", &self.intrinsic_fields.is_some())
            .field("post_process", &self.post_process.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for JsonFormatter {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl JsonFormatter {
    /// Minimal formatter: message, time, exception and extra fields.
    pub fn new() -> Self {
        Self::default()
    }

    /// Formatter that also emits the event's intrinsic metadata.
    pub fn verbose() -> Self {
        Self::builder().intrinsic_fields(verbose_fields).build()
    }

    /// Formatter whose values are all JSON scalars or null.
    pub fn flat() -> Self {
        Self::builder().post_process(flatten_values).build()
    }

    pub fn builder() -> JsonFormatterBuilder {
        JsonFormatterBuilder::default()
    }

    /// Format an event. Never fails: a record that cannot be encoded is
    /// rendered as [`EMPTY_RECORD`].
    pub fn format(&self, event: &LogEvent) -> String {
        let extra = self.extract_extra_fields(event);
        let record = self.build_record(&event.message, extra, event);
        let record = self.normalize_record(record);
        let record = match &self.post_process {
            Some(post_process) => post_process(record),
            None => record,
        };
        self.to_json(&record)
    }

    /// Fields the caller attached to the event, intrinsic names excluded.
    pub fn extract_extra_fields(&self, event: &LogEvent) -> FieldMap {
        event
            .fields
            .iter()
            .filter(|(key, _)| !BUILTIN_ATTRS.contains(key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Merge the extras with `message`, `time` and `exc_info`.
    ///
    /// `message` is always overwritten; a caller-supplied `time` is kept.
    pub fn build_record(&self, message: &str, mut extra: FieldMap, event: &LogEvent) -> JsonRecord {
        if let Some(intrinsic_fields) = &self.intrinsic_fields {
            intrinsic_fields(event, &mut extra);
        }

        extra.insert("message".to_string(), FieldValue::Str(message.to_string()));
        if !extra.contains_key("time") {
            extra.insert("time".to_string(), FieldValue::from(event.timestamp));
        }
        if let Some(exception) = &event.exception {
            extra.insert("exc_info".to_string(), FieldValue::Str(exception.render()));
        }
        extra
    }

    /// Run the normalize hook; an in-place hook returning `None` keeps the
    /// mutated input.
    pub fn normalize_record(&self, mut record: JsonRecord) -> JsonRecord {
        match (self.normalize)(&mut record) {
            Some(replacement) => replacement,
            None => record,
        }
    }

    /// Serialize with the fallback converter, then without it, then give up
    /// with [`EMPTY_RECORD`].
    pub fn to_json(&self, record: &JsonRecord) -> String {
        self.backend
            .encode(record, Some(&*self.fallback))
            .or_else(|_| self.backend.encode(record, None))
            .unwrap_or_else(|_| EMPTY_RECORD.to_string())
    }
}

/// Builder for [`JsonFormatter`]. Every strategy has a default, so
/// `JsonFormatterBuilder::default().build()` is the minimal formatter.
pub struct JsonFormatterBuilder {
    backend: Arc<dyn JsonBackend>,
    fallback: Arc<FallbackFn>,
    intrinsic_fields: Option<Arc<IntrinsicFieldsFn>>,
    normalize: Arc<NormalizeFn>,
    post_process: Option<Arc<PostProcessFn>>,
}

impl Default for JsonFormatterBuilder {
    fn default() -> Self {
        JsonFormatterBuilder {
            backend: Arc::new(SerdeJsonBackend),
            fallback: Arc::new(default_fallback),
            intrinsic_fields: None,
            normalize: Arc::new(iso_datetimes),
            post_process: None,
        }
    }
}

impl JsonFormatterBuilder {
    pub fn backend<B: JsonBackend + 'static>(self, backend: B) -> Self {
        self.shared_backend(Arc::new(backend))
    }

    pub fn shared_backend(mut self, backend: Arc<dyn JsonBackend>) -> Self {
        self.backend = backend;
        self
    }

    /// Converter used for values the backend cannot encode natively.
    pub fn fallback<F>(mut self, fallback: F) -> Self
    where
        F: Fn(&FieldValue) -> Result<FieldValue, EncodeError> + Send + Sync + 'static,
    {
        self.fallback = Arc::new(fallback);
        self
    }

    pub fn intrinsic_fields<F>(mut self, f: F) -> Self
    where
        F: Fn(&LogEvent, &mut FieldMap) + Send + Sync + 'static,
    {
        self.intrinsic_fields = Some(Arc::new(f));
        self
    }

    pub fn normalize<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut JsonRecord) -> Option<JsonRecord> + Send + Sync + 'static,
    {
        self.normalize = Arc::new(f);
        self
    }

    pub fn post_process<F>(mut self, f: F) -> Self
    where
        F: Fn(JsonRecord) -> JsonRecord + Send + Sync + 'static,
    {
        self.post_process = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> JsonFormatter {
        JsonFormatter {
            backend: self.backend,
            fallback: self.fallback,
            intrinsic_fields: self.intrinsic_fields,
            normalize: self.normalize,
            post_process: self.post_process,
        }
    }
}

/// Default normalize hook: top-level date/times become ISO-8601 strings.
/// Mutates in place and returns `None`.
pub fn iso_datetimes(record: &mut JsonRecord) -> Option<JsonRecord> {
    for value in record.values_mut() {
        if let FieldValue::DateTime(ts) = value {
            *value = FieldValue::Str(ts.to_iso8601());
        }
    }
    None
}

/// Intrinsic fields emitted by the verbose variant.
pub fn verbose_fields(event: &LogEvent, extra: &mut FieldMap) {
    let meta = &event.metadata;
    let fields: [(&str, FieldValue); 12] = [
        ("filename", meta.file_name.clone().into()),
        ("funcName", meta.func_name.clone().into()),
        ("levelname", event.level_name().into()),
        ("lineno", meta.line_no.into()),
        ("module", meta.module.clone().into()),
        ("name", meta.name.clone().into()),
        ("pathname", meta.path_name.clone().into()),
        ("process", meta.process.into()),
        ("processName", meta.process_name.clone().into()),
        ("stack_info", meta.stack_info.clone().into()),
        ("thread", meta.thread.into()),
        ("threadName", meta.thread_name.clone().into()),
    ];
    for (key, value) in fields {
        extra.insert(key.to_string(), value);
    }
}

/// Post-process hook of the flat variant: anything that is not null or a
/// scalar is replaced by its text representation, or by null when that text
/// cannot be rendered.
pub fn flatten_values(record: JsonRecord) -> JsonRecord {
    record
        .into_iter()
        .map(|(key, value)| match value {
            FieldValue::Null => (key, FieldValue::Null),
            v if v.is_scalar() => (key, v),
            v => match v.try_to_string() {
                Ok(text) => (key, FieldValue::Str(text)),
                Err(_) => (key, FieldValue::Null),
            },
        })
        .collect()
}
