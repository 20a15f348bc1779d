use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Number, Value};

use crate::record::JsonRecord;
use crate::value::FieldValue;

/// Converter invoked on any value a backend cannot encode natively. It must
/// return a substitute the backend can encode, or fail.
pub type FallbackFn = dyn Fn(&FieldValue) -> Result<FieldValue, EncodeError> + Send + Sync;

/// Nesting limit applied while encoding.
pub const MAX_DEPTH: usize = 128;

/// Capability that turns a record into JSON text.
///
/// Implementations may refuse a fallback converter altogether; the formatter
/// then retries the encoding without one.
pub trait JsonBackend: Send + Sync {
    /// Encode `record` as single-line JSON.
    ///
    /// **Parameters**
    /// - `record`: the normalized record.
    /// - `fallback`: optional converter for values the backend cannot encode.
    ///
    /// **Returns**
    /// - `Ok(text)` with the JSON document.
    /// - `Err(..)` if a value is unsupported, a circular reference was
    ///   found, a number could not be represented, or the backend rejects
    ///   fallback converters.
    fn encode(&self, record: &JsonRecord, fallback: Option<&FallbackFn>) -> Result<String, EncodeError>;
}

/// Error type returned when a record cannot be encoded.
#[derive(thiserror::Error, Debug)]
pub enum EncodeError {
    #[error("value of type {0} is not JSON serializable")]
    UnsupportedType(&'static str),

    #[error("circular reference detected")]
    CircularReference,

    #[error("number {0} cannot be represented in JSON")]
    NonFiniteNumber(f64),

    #[error("nesting exceeds the maximum depth")]
    DepthExceeded,

    #[error("backend does not accept a fallback converter")]
    FallbackUnsupported,

    #[error("value could not be rendered as text")]
    Render(#[from] fmt::Error),

    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Default fallback converter.
///
/// Objects with a structured view become maps; every other value becomes its
/// text representation.
pub fn default_fallback(value: &FieldValue) -> Result<FieldValue, EncodeError> {
    if let FieldValue::Object(obj) = value {
        if let Some(map) = obj.field_map() {
            return Ok(FieldValue::Map(map));
        }
    }
    Ok(FieldValue::Str(value.try_to_string()?))
}

/// Backend built on `serde_json`.
///
/// Null, booleans, integers, finite floats, strings, lists, tuples and maps
/// are encoded natively; decimals, complex numbers, date/times and objects go
/// through the fallback converter.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerdeJsonBackend;

impl JsonBackend for SerdeJsonBackend {
    fn encode(&self, record: &JsonRecord, fallback: Option<&FallbackFn>) -> Result<String, EncodeError> {
        let mut encoder = Encoder::new(fallback, false);
        let value = encoder.encode_record(record)?;
        Ok(serde_json::to_string(&value)?)
    }
}

/// Backend that never accepts a fallback converter.
///
/// Decimals are written as JSON numbers; objects, complex numbers and
/// date/times that survived normalization make encoding fail.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictBackend;

impl JsonBackend for StrictBackend {
    fn encode(&self, record: &JsonRecord, fallback: Option<&FallbackFn>) -> Result<String, EncodeError> {
        if fallback.is_some() {
            return Err(EncodeError::FallbackUnsupported);
        }
        let mut encoder = Encoder::new(None, true);
        let value = encoder.encode_record(record)?;
        Ok(serde_json::to_string(&value)?)
    }
}

/// Converts [`FieldValue`] trees into `serde_json::Value`s.
struct Encoder<'a> {
    fallback: Option<&'a FallbackFn>,
    native_decimal: bool,
    /// Addresses of objects currently being expanded through the fallback.
    active: Vec<usize>,
}

impl<'a> Encoder<'a> {
    fn new(fallback: Option<&'a FallbackFn>, native_decimal: bool) -> Self {
        Encoder { fallback, native_decimal, active: Vec::new() }
    }

    fn encode_record(&mut self, record: &JsonRecord) -> Result<Value, EncodeError> {
        let mut map = Map::with_capacity(record.len());
        for (key, value) in record {
            map.insert(key.clone(), self.encode(value, 1)?);
        }
        Ok(Value::Object(map))
    }

    fn is_native(&self, value: &FieldValue) -> bool {
        match value {
            FieldValue::Decimal(_) => self.native_decimal,
            FieldValue::Complex(_) | FieldValue::DateTime(_) | FieldValue::Object(_) => false,
            _ => true,
        }
    }

    fn encode(&mut self, value: &FieldValue, depth: usize) -> Result<Value, EncodeError> {
        if depth > MAX_DEPTH {
            return Err(EncodeError::DepthExceeded);
        }
        match value {
            FieldValue::Null => Ok(Value::Null),
            FieldValue::Bool(b) => Ok(Value::Bool(*b)),
            FieldValue::Int(i) => Ok(Value::from(*i)),
            FieldValue::UInt(u) => Ok(Value::from(*u)),
            FieldValue::Float(x) => finite(*x),
            FieldValue::Str(s) => Ok(Value::String(s.clone())),
            FieldValue::Decimal(d) if self.native_decimal => finite(d.to_f64()),
            FieldValue::List(items) | FieldValue::Tuple(items) => items
                .iter()
                .map(|item| self.encode(item, depth + 1))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            FieldValue::Map(map) => {
                let mut out = Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), self.encode(v, depth + 1)?);
                }
                Ok(Value::Object(out))
            }
            other => self.encode_with_fallback(other, depth),
        }
    }

    fn encode_with_fallback(&mut self, value: &FieldValue, depth: usize) -> Result<Value, EncodeError> {
        let fallback = self.fallback.ok_or(EncodeError::UnsupportedType(value.type_name()))?;

        let marker = match value {
            FieldValue::Object(obj) => Some(Arc::as_ptr(obj) as *const () as usize),
            _ => None,
        };
        if let Some(addr) = marker {
            if self.active.contains(&addr) {
                return Err(EncodeError::CircularReference);
            }
            self.active.push(addr);
        }

        let result = match fallback(value) {
            Ok(substitute) if self.is_native(&substitute) => self.encode(&substitute, depth + 1),
            Ok(substitute) => Err(EncodeError::UnsupportedType(substitute.type_name())),
            Err(err) => Err(err),
        };

        if marker.is_some() {
            self.active.pop();
        }
        result
    }
}

fn finite(x: f64) -> Result<Value, EncodeError> {
    Number::from_f64(x)
        .map(Value::Number)
        .ok_or(EncodeError::NonFiniteNumber(x))
}

/// Backend implementations selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum BackendKind {
    #[default]
    #[serde(rename = "serde_json")]
    SerdeJson,
    #[serde(rename = "strict")]
    Strict,
}

/// Error type returned when parsing a backend name.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unknown JSON backend: {0}")]
pub struct UnknownBackend(pub String);

impl FromStr for BackendKind {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "serde_json" | "serde-json" | "json" => Ok(BackendKind::SerdeJson),
            "strict" => Ok(BackendKind::Strict),
            _ => Err(UnknownBackend(s.to_string())),
        }
    }
}

/// Create a concrete backend for the given kind.
pub fn make_backend(kind: BackendKind) -> Arc<dyn JsonBackend> {
    match kind {
        BackendKind::SerdeJson => Arc::new(SerdeJsonBackend),
        BackendKind::Strict => Arc::new(StrictBackend),
    }
}
