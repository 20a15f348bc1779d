use crate::value::{FieldMap, FieldValue};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::Level;

/// JSON record assembled for a single formatting call.
pub type JsonRecord = FieldMap;

/// Names of intrinsic log-record attributes. Fields with these names are
/// treated as framework metadata and never copied into the record as extras.
pub static BUILTIN_ATTRS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "args",
        "asctime",
        "created",
        "exc_info",
        "exc_text",
        "filename",
        "funcName",
        "levelname",
        "levelno",
        "lineno",
        "module",
        "msecs",
        "message",
        "msg",
        "name",
        "pathname",
        "process",
        "processName",
        "relativeCreated",
        "stack_info",
        "taskName",
        "thread",
        "threadName",
    ]
    .into_iter()
    .collect()
});

static PROCESS_NAME: Lazy<String> = Lazy::new(|| {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "unknown".to_string())
});

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
}

/// Stable numeric id of the calling thread, assigned on first use.
pub fn current_thread_id() -> u64 {
    THREAD_ID.with(|id| *id)
}

/// Intrinsic metadata of an event: source location, logger, process and thread.
#[derive(Debug, Clone, PartialEq)]
pub struct EventMetadata {
    /// Base name of the source file.
    pub file_name: Option<String>,
    /// Enclosing function, when known (innermost span name for `tracing`).
    pub func_name: Option<String>,
    pub line_no: Option<u32>,
    pub module: Option<String>,
    /// Logger name; the event target for `tracing`.
    pub name: String,
    /// Full path of the source file as recorded at compile time.
    pub path_name: Option<String>,
    pub process: u32,
    pub process_name: String,
    pub stack_info: Option<String>,
    pub thread: u64,
    pub thread_name: Option<String>,
}

impl EventMetadata {
    /// Metadata for a call made on the current thread of this process.
    /// Source location fields start empty.
    pub fn current(name: impl Into<String>) -> Self {
        EventMetadata {
            file_name: None,
            func_name: None,
            line_no: None,
            module: None,
            name: name.into(),
            path_name: None,
            process: std::process::id(),
            process_name: PROCESS_NAME.clone(),
            stack_info: None,
            thread: current_thread_id(),
            thread_name: std::thread::current().name().map(str::to_string),
        }
    }

    /// Fill `path_name` and `file_name` from a source path.
    pub fn with_source(mut self, path: &str, line: Option<u32>) -> Self {
        let base = path.rsplit(['/', '\\']).next().unwrap_or(path);
        self.file_name = Some(base.to_string());
        self.path_name = Some(path.to_string());
        self.line_no = line;
        self
    }
}

/// Captured error attached to an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionInfo {
    pub message: String,
    /// Messages of the error's source chain, outermost first.
    pub causes: Vec<String>,
    pub backtrace: Option<String>,
}

impl ExceptionInfo {
    pub fn new(message: impl Into<String>) -> Self {
        ExceptionInfo { message: message.into(), causes: Vec::new(), backtrace: None }
    }

    /// Capture an error together with its `source()` chain.
    pub fn from_error(err: &(dyn Error + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        ExceptionInfo { message: err.to_string(), causes, backtrace: None }
    }

    pub fn with_backtrace(mut self, backtrace: impl Into<String>) -> Self {
        self.backtrace = Some(backtrace.into());
        self
    }

    /// Multi-line text block stored under `exc_info`.
    pub fn render(&self) -> String {
        let mut out = format!("Error: {}", self.message);
        if !self.causes.is_empty() {
            out.push_str("\n\nCaused by:");
            for (i, cause) in self.causes.iter().enumerate() {
                let _ = write!(out, "\n    {}: {}", i, cause);
            }
        }
        if let Some(bt) = &self.backtrace {
            out.push_str("\n\nStack backtrace:\n");
            out.push_str(bt.trim_end());
        }
        out
    }
}

/// Snapshot of one logging call as seen by the formatter.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub message: String,
    pub level: Level,
    /// Creation time of the event.
    pub timestamp: DateTime<Utc>,
    /// Every field recorded on the event, intrinsic names included.
    pub fields: FieldMap,
    pub exception: Option<ExceptionInfo>,
    pub metadata: EventMetadata,
}

impl LogEvent {
    /// New event created now on the current thread, logged under `name`.
    pub fn new(level: Level, name: impl Into<String>, message: impl Into<String>) -> Self {
        LogEvent {
            message: message.into(),
            level,
            timestamp: Utc::now(),
            fields: FieldMap::new(),
            exception: None,
            metadata: EventMetadata::current(name),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_exception(mut self, exception: ExceptionInfo) -> Self {
        self.exception = Some(exception);
        self
    }

    pub fn with_metadata(mut self, metadata: EventMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Symbolic severity (`ERROR`, `WARN`, `INFO`, `DEBUG`, `TRACE`).
    pub fn level_name(&self) -> String {
        self.level.to_string()
    }

    /// Numeric severity; higher is more severe.
    pub fn level_no(&self) -> u32 {
        match self.level {
            Level::ERROR => 40,
            Level::WARN => 30,
            Level::INFO => 20,
            Level::DEBUG => 10,
            Level::TRACE => 5,
        }
    }
}
