use chrono::{DateTime, FixedOffset, NaiveDateTime, Timelike, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt::{self, Write as _};
use std::str::FromStr;
use std::sync::Arc;

/// Ordered mapping from field name to value. Used both for the extra fields
/// of an event and for the JSON record assembled from them.
pub type FieldMap = IndexMap<String, FieldValue>;

/// A rich value attached to a log call that has no direct JSON shape.
///
/// The fallback converter first asks for a structured [`field_map`] view and
/// otherwise uses the `Display` text. Objects implementing neither in a
/// meaningful way are therefore always stringified, never dropped.
///
/// [`field_map`]: LogObject::field_map
pub trait LogObject: fmt::Display + Send + Sync {
    /// Structured view of the object, if it has one.
    fn field_map(&self) -> Option<FieldMap> {
        None
    }
}

impl fmt::Debug for dyn LogObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LogObject({})", self)
    }
}

/// Adapts any `Serialize + Display` value into a [`LogObject`].
///
/// The structured view is whatever `serde_json` produces for the value when
/// that is a JSON object; scalars and sequences fall back to the text form.
pub struct Serialized<T>(pub T);

impl<T: fmt::Display> fmt::Display for Serialized<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<T> LogObject for Serialized<T>
where
    T: Serialize + fmt::Display + Send + Sync,
{
    fn field_map(&self) -> Option<FieldMap> {
        match serde_json::to_value(&self.0).ok()? {
            serde_json::Value::Object(map) => Some(
                map.into_iter()
                    .map(|(k, v)| (k, FieldValue::from(v)))
                    .collect(),
            ),
            _ => None,
        }
    }
}

/// Arbitrary-precision decimal kept in its textual form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decimal(String);

impl Decimal {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Nearest `f64`, used by backends that encode decimals as JSON numbers.
    pub fn to_f64(&self) -> f64 {
        // Validated on construction, so parsing only loses precision.
        self.0.parse().unwrap_or(f64::NAN)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid decimal literal: {0:?}")]
pub struct ParseDecimalError(String);

impl FromStr for Decimal {
    type Err = ParseDecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseDecimalError(s.to_string());
        let body = s.strip_prefix(['+', '-']).unwrap_or(s);
        let (mantissa, exponent) = match body.find(['e', 'E']) {
            Some(idx) => (&body[..idx], Some(&body[idx + 1..])),
            None => (body, None),
        };

        let (int_part, frac_part) = match mantissa.split_once('.') {
            Some((i, f)) => (i, f),
            None => (mantissa, ""),
        };
        let all_digits = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(err());
        }
        if !all_digits(int_part) || !all_digits(frac_part) {
            return Err(err());
        }

        if let Some(exp) = exponent {
            let digits = exp.strip_prefix(['+', '-']).unwrap_or(exp);
            if digits.is_empty() || !all_digits(digits) {
                return Err(err());
            }
        }

        Ok(Decimal(s.to_string()))
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Complex number with `f64` parts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

impl Complex {
    pub fn new(re: f64, im: f64) -> Self {
        Complex { re, im }
    }
}

impl fmt::Display for Complex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.im.is_sign_negative() {
            write!(f, "({}-{}i)", self.re, -self.im)
        } else {
            write!(f, "({}+{}i)", self.re, self.im)
        }
    }
}

/// Date/time value attached to a record.
///
/// Timezone-aware values render with their UTC offset; naive values render
/// without any offset suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp {
    Aware(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

impl Timestamp {
    /// ISO-8601 text: seconds precision, microseconds only when non-zero.
    pub fn to_iso8601(&self) -> String {
        match self {
            Timestamp::Aware(dt) => {
                let mut out = dt.format("%Y-%m-%dT%H:%M:%S").to_string();
                push_micros(&mut out, dt.nanosecond());
                out.push_str(&dt.format("%:z").to_string());
                out
            }
            Timestamp::Naive(dt) => {
                let mut out = dt.format("%Y-%m-%dT%H:%M:%S").to_string();
                push_micros(&mut out, dt.nanosecond());
                out
            }
        }
    }
}

fn push_micros(out: &mut String, nanos: u32) {
    // leap seconds carry nanos >= 1e9; chrono already prints them as second 60
    let micros = (nanos % 1_000_000_000) / 1_000;
    if micros != 0 {
        out.push_str(&format!(".{:06}", micros));
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

/// Dynamic value held by a record.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Decimal(Decimal),
    Complex(Complex),
    Str(String),
    DateTime(Timestamp),
    List(Vec<FieldValue>),
    /// Fixed-size sequence; encoded as a JSON array, displayed as `(a, b)`.
    Tuple(Vec<FieldValue>),
    Map(FieldMap),
    Object(Arc<dyn LogObject>),
}

impl FieldValue {
    /// Wrap a rich object.
    pub fn object<O: LogObject + 'static>(obj: O) -> Self {
        FieldValue::Object(Arc::new(obj))
    }

    /// Short name of the variant, used in encoder errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "bool",
            FieldValue::Int(_) | FieldValue::UInt(_) => "integer",
            FieldValue::Float(_) => "float",
            FieldValue::Decimal(_) => "decimal",
            FieldValue::Complex(_) => "complex",
            FieldValue::Str(_) => "string",
            FieldValue::DateTime(_) => "datetime",
            FieldValue::List(_) => "list",
            FieldValue::Tuple(_) => "tuple",
            FieldValue::Map(_) => "map",
            FieldValue::Object(_) => "object",
        }
    }

    /// Scalars kept as-is by the flat variant.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            FieldValue::Bool(_)
                | FieldValue::Int(_)
                | FieldValue::UInt(_)
                | FieldValue::Float(_)
                | FieldValue::Decimal(_)
                | FieldValue::Complex(_)
                | FieldValue::Str(_)
                | FieldValue::DateTime(_)
        )
    }

    /// Text representation. Unlike `to_string`, an object whose `Display`
    /// fails yields an error instead of a panic.
    pub fn try_to_string(&self) -> Result<String, fmt::Error> {
        let mut out = String::new();
        write!(out, "{}", self)?;
        Ok(out)
    }

    fn write_nested(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Str(s) => write!(f, "{:?}", s),
            other => fmt::Display::fmt(other, f),
        }
    }
}

fn write_seq(f: &mut fmt::Formatter<'_>, items: &[FieldValue], open: &str, close: &str) -> fmt::Result {
    f.write_str(open)?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        item.write_nested(f)?;
    }
    f.write_str(close)
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("null"),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::UInt(u) => write!(f, "{}", u),
            FieldValue::Float(x) => write!(f, "{}", x),
            FieldValue::Decimal(d) => d.fmt(f),
            FieldValue::Complex(c) => c.fmt(f),
            FieldValue::Str(s) => f.write_str(s),
            FieldValue::DateTime(ts) => ts.fmt(f),
            FieldValue::List(items) => write_seq(f, items, "[", "]"),
            FieldValue::Tuple(items) => write_seq(f, items, "(", ")"),
            FieldValue::Map(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{:?}: ", k)?;
                    v.write_nested(f)?;
                }
                f.write_str("}")
            }
            FieldValue::Object(obj) => obj.fmt(f),
        }
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        use FieldValue::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (UInt(a), UInt(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Decimal(a), Decimal(b)) => a == b,
            (Complex(a), Complex(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (DateTime(a), DateTime(b)) => a == b,
            (List(a), List(b)) | (Tuple(a), Tuple(b)) => a == b,
            (Map(a), Map(b)) => a == b,
            (Object(a), Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

macro_rules! from_signed {
    ($($t:ty),*) => {$(
        impl From<$t> for FieldValue {
            fn from(v: $t) -> Self {
                FieldValue::Int(v as i64)
            }
        }
    )*};
}

macro_rules! from_unsigned {
    ($($t:ty),*) => {$(
        impl From<$t> for FieldValue {
            fn from(v: $t) -> Self {
                FieldValue::UInt(v as u64)
            }
        }
    )*};
}

from_signed!(i8, i16, i32, i64, isize);
from_unsigned!(u8, u16, u32, u64, usize);

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<f32> for FieldValue {
    fn from(v: f32) -> Self {
        FieldValue::Float(v as f64)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

impl From<Decimal> for FieldValue {
    fn from(v: Decimal) -> Self {
        FieldValue::Decimal(v)
    }
}

impl From<Complex> for FieldValue {
    fn from(v: Complex) -> Self {
        FieldValue::Complex(v)
    }
}

impl From<Timestamp> for FieldValue {
    fn from(v: Timestamp) -> Self {
        FieldValue::DateTime(v)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::DateTime(Timestamp::Aware(v.fixed_offset()))
    }
}

impl From<DateTime<FixedOffset>> for FieldValue {
    fn from(v: DateTime<FixedOffset>) -> Self {
        FieldValue::DateTime(Timestamp::Aware(v))
    }
}

impl From<NaiveDateTime> for FieldValue {
    fn from(v: NaiveDateTime) -> Self {
        FieldValue::DateTime(Timestamp::Naive(v))
    }
}

impl From<FieldMap> for FieldValue {
    fn from(v: FieldMap) -> Self {
        FieldValue::Map(v)
    }
}

impl<T: Into<FieldValue>> From<Vec<T>> for FieldValue {
    fn from(v: Vec<T>) -> Self {
        FieldValue::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(FieldValue::Null, Into::into)
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(v: serde_json::Value) -> Self {
        use serde_json::Value;
        match v {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    FieldValue::UInt(u)
                } else {
                    FieldValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => FieldValue::Str(s),
            Value::Array(items) => FieldValue::List(items.into_iter().map(FieldValue::from).collect()),
            Value::Object(map) => FieldValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, FieldValue::from(v)))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn sample_naive() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2015, 9, 1)
            .unwrap()
            .and_hms_micro_opt(6, 9, 42, 797203)
            .unwrap()
    }

    #[test]
    fn naive_timestamp_has_no_offset() {
        let ts = Timestamp::Naive(sample_naive());
        assert_eq!(ts.to_iso8601(), "2015-09-01T06:09:42.797203");
    }

    #[test]
    fn aware_timestamp_carries_offset() {
        let dt = Utc.from_utc_datetime(&sample_naive());
        let ts = Timestamp::Aware(dt.fixed_offset());
        assert_eq!(ts.to_iso8601(), "2015-09-01T06:09:42.797203+00:00");

        let east = FixedOffset::east_opt(2 * 3600).unwrap();
        let ts = Timestamp::Aware(dt.with_timezone(&east));
        assert_eq!(ts.to_iso8601(), "2015-09-01T08:09:42.797203+02:00");
    }

    #[test]
    fn whole_seconds_omit_fraction() {
        let dt = NaiveDate::from_ymd_opt(2020, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        assert_eq!(Timestamp::Naive(dt).to_iso8601(), "2020-01-02T03:04:05");
    }

    #[test]
    fn leap_second_keeps_its_fraction() {
        let leap = NaiveDate::from_ymd_opt(2016, 12, 31).unwrap();
        let dt = leap.and_hms_micro_opt(23, 59, 59, 1_500_000).unwrap();
        assert_eq!(Timestamp::Naive(dt).to_iso8601(), "2016-12-31T23:59:60.500000");

        let dt = leap.and_hms_micro_opt(23, 59, 59, 1_000_000).unwrap();
        assert_eq!(Timestamp::Naive(dt).to_iso8601(), "2016-12-31T23:59:60");
    }

    #[test]
    fn decimal_parsing() {
        for ok in ["0.00497265", "-1", "+3.", ".5", "0E-8", "1.5e+10"] {
            assert!(ok.parse::<Decimal>().is_ok(), "{ok} should parse");
        }
        for bad in ["", "-", ".", "1.2.3", "abc", "1e", "1e+"] {
            assert!(bad.parse::<Decimal>().is_err(), "{bad} should not parse");
        }
        assert_eq!("0E-8".parse::<Decimal>().unwrap().to_f64(), 0.0);
    }

    #[test]
    fn nested_values_display_with_quoted_strings() {
        let mut inner = FieldMap::new();
        inner.insert("tags".into(), FieldValue::from(vec!["fizz", "bazz"]));
        assert_eq!(FieldValue::Map(inner).to_string(), r#"{"tags": ["fizz", "bazz"]}"#);

        let tuple = FieldValue::Tuple(vec!["a".into(), "b".into()]);
        assert_eq!(tuple.to_string(), r#"("a", "b")"#);

        assert_eq!(FieldValue::from("plain").to_string(), "plain");
        assert_eq!(FieldValue::Complex(Complex::new(1.0, -2.0)).to_string(), "(1-2i)");
    }

    #[derive(Serialize)]
    struct Request {
        path: &'static str,
        method: &'static str,
    }

    impl fmt::Display for Request {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "<Request: {} {:?}>", self.method, self.path)
        }
    }

    #[test]
    fn serialized_object_exposes_field_map() {
        let obj = Serialized(Request { path: "/bogus", method: "BOGUS" });
        let map = obj.field_map().unwrap();
        assert_eq!(map["path"], FieldValue::from("/bogus"));
        assert_eq!(map["method"], FieldValue::from("BOGUS"));
        assert_eq!(obj.to_string(), r#"<Request: BOGUS "/bogus">"#);
    }

    struct Unprintable;

    impl fmt::Display for Unprintable {
        fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
            Err(fmt::Error)
        }
    }

    impl LogObject for Unprintable {}

    #[test]
    fn failing_display_is_reported_not_panicked() {
        assert!(FieldValue::object(Unprintable).try_to_string().is_err());
        let nested = FieldValue::List(vec![1.into(), FieldValue::object(Unprintable)]);
        assert!(nested.try_to_string().is_err());
        assert_eq!(FieldValue::from(vec!["a"]).try_to_string(), Ok(r#"["a"]"#.to_string()));
    }

    #[test]
    fn json_numbers_keep_integer_kinds() {
        let v = FieldValue::from(serde_json::json!({"a": 1, "b": u64::MAX, "c": 0.5}));
        let FieldValue::Map(map) = v else { panic!("expected map") };
        assert_eq!(map["a"], FieldValue::Int(1));
        assert_eq!(map["b"], FieldValue::UInt(u64::MAX));
        assert_eq!(map["c"], FieldValue::Float(0.5));
    }
}
