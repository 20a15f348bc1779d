use std::fmt;

use serde::Serialize;
use tracing_json_formatter::{FieldMap, FieldValue, JsonFormatter, LogEvent, Serialized};

#[derive(Serialize)]
struct Request {
    method: &'static str,
    path: &'static str,
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Request: {} '{}'>", self.method, self.path)
    }
}

fn main() {
    let mut context = FieldMap::new();
    context.insert("tags".to_string(), vec!["fizz", "bazz"].into());

    let event = LogEvent::new(tracing::Level::WARN, "payments", "Payment was sent")
        .with_field("amount", "0.00497265".parse::<tracing_json_formatter::Decimal>().ok())
        .with_field("context", context)
        .with_field("request", FieldValue::object(Serialized(Request { method: "POST", path: "/pay" })));

    // Nested values come out as a JSON object here...
    eprintln!("{}", JsonFormatter::new().format(&event));
    // ...and as plain strings here.
    eprintln!("{}", JsonFormatter::flat().format(&event));
}
