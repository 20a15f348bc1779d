use std::error::Error;
use std::fmt;

use tracing::{error, info, info_span};
use tracing_json_formatter::config::Variant;
use tracing_json_formatter::init::{init_tracing_with_config, LayerConfig};
use tracing_json_formatter::{BackendKind, FormatterConfig};

#[derive(Debug)]
struct AuthError;

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid password")
    }
}

impl Error for AuthError {}

fn main() -> Result<(), Box<dyn Error>> {
    let config = LayerConfig {
        formatter: FormatterConfig::new(Variant::Verbose, BackendKind::SerdeJson),
        ..LayerConfig::default()
    };
    init_tracing_with_config(config)?;

    info!(service = "auth", "starting service");

    let span = info_span!("login");
    let _guard = span.enter();
    error!(
        user_id = 42,
        exc_info = &AuthError as &(dyn Error + 'static),
        "authentication failed"
    );

    Ok(())
}
