pub mod value;
pub mod record;
pub mod backend;
pub mod formatter;
pub mod config;
pub mod layer;
pub mod init;

pub use backend::{default_fallback, make_backend, BackendKind, EncodeError, JsonBackend, SerdeJsonBackend, StrictBackend};
pub use config::{FormatterConfig, Variant};
pub use formatter::{JsonFormatter, JsonFormatterBuilder, EMPTY_RECORD};
pub use layer::JsonLayer;
pub use record::{EventMetadata, ExceptionInfo, JsonRecord, LogEvent, BUILTIN_ATTRS};
pub use value::{Decimal, FieldMap, FieldValue, LogObject, Serialized, Timestamp};
