use crate::config::FormatterConfig;
use crate::layer::JsonLayer;
use serde::Deserialize;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Stream the JSON lines are written to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputTarget {
    #[default]
    Stdout,
    Stderr,
}

/// Configuration of the logging layer.
///
/// **Fields**
/// - `formatter`: variant and JSON backend, see [`FormatterConfig`].
/// - `target`: stream receiving one JSON document per event.
/// - `stack_info`: if `true`, a backtrace is captured for every event and
///   emitted as `stack_info` by the verbose variant.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LayerConfig {
    pub formatter: FormatterConfig,
    pub target: OutputTarget,
    pub stack_info: bool,
}

/// Error type returned when installing the global subscriber.
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("a global tracing subscriber is already installed")]
    AlreadySet(#[from] SetGlobalDefaultError),
}

/// Build a [`JsonLayer`] from a [`LayerConfig`] without installing it.
///
/// Useful when the application assembles its own subscriber stack, e.g. to
/// add filtering in front of the JSON output.
pub fn build_layer(config: &LayerConfig) -> JsonLayer<BoxMakeWriter> {
    let writer = match config.target {
        OutputTarget::Stdout => BoxMakeWriter::new(std::io::stdout),
        OutputTarget::Stderr => BoxMakeWriter::new(std::io::stderr),
    };
    JsonLayer::new(config.formatter.build())
        .with_writer(writer)
        .with_stack_info(config.stack_info)
}

/// Initialize the global `tracing` subscriber with a JSON layer built from
/// the provided [`LayerConfig`].
///
/// **Effects**
///
/// Installs a [`Registry`] combined with [`JsonLayer`] as the global default
/// subscriber, so every `tracing` event in the process is written as one
/// JSON line.
///
/// **Returns**
/// - `Err(InitError::AlreadySet)` if a global subscriber was installed before.
pub fn init_tracing_with_config(config: LayerConfig) -> Result<(), InitError> {
    let subscriber = Registry::default().with(build_layer(&config));
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Initialize tracing with the minimal formatter writing to stdout.
///
/// Equivalent to calling [`init_tracing_with_config`] with
/// [`LayerConfig::default`].
pub fn init_tracing() -> Result<(), InitError> {
    init_tracing_with_config(LayerConfig::default())
}
