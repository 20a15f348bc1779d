use std::str::FromStr;

use serde::Deserialize;

use crate::backend::{make_backend, BackendKind, UnknownBackend};
use crate::formatter::{flatten_values, verbose_fields, JsonFormatter};

/// Formatter variants that can be selected by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Message, time, exception and extra fields.
    #[default]
    Minimal,
    /// Minimal plus intrinsic event metadata.
    Verbose,
    /// Minimal with every non-scalar value stringified.
    Flat,
}

/// Formatter selection as a host application would deserialize it from its
/// own configuration, e.g. `{ "variant": "verbose", "backend": "serde_json" }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct FormatterConfig {
    pub variant: Variant,
    pub backend: BackendKind,
}

/// Error type returned when parsing configuration values from strings.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown formatter variant: {0}")]
    UnknownVariant(String),

    #[error(transparent)]
    Backend(#[from] UnknownBackend),
}

impl FromStr for Variant {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "minimal" | "default" => Ok(Variant::Minimal),
            "verbose" => Ok(Variant::Verbose),
            "flat" => Ok(Variant::Flat),
            _ => Err(ConfigError::UnknownVariant(s.to_string())),
        }
    }
}

impl FormatterConfig {
    pub fn new(variant: Variant, backend: BackendKind) -> Self {
        FormatterConfig { variant, backend }
    }

    /// Parse a `variant[:backend]` pair such as `"flat"` or `"verbose:strict"`.
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let (variant, backend) = match input.split_once(':') {
            Some((v, b)) => (v.parse::<Variant>()?, b.parse::<BackendKind>()?),
            None => (input.parse::<Variant>()?, BackendKind::default()),
        };
        Ok(FormatterConfig { variant, backend })
    }

    /// Build the formatter described by this configuration.
    pub fn build(&self) -> JsonFormatter {
        let builder = JsonFormatter::builder().shared_backend(make_backend(self.backend));
        match self.variant {
            Variant::Minimal => builder.build(),
            Variant::Verbose => builder.intrinsic_fields(verbose_fields).build(),
            Variant::Flat => builder.post_process(flatten_values).build(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::LogEvent;
    use serde_json::Value;

    #[test]
    fn defaults_to_minimal_serde_json() {
        let cfg = FormatterConfig::default();
        assert_eq!(cfg.variant, Variant::Minimal);
        assert_eq!(cfg.backend, BackendKind::SerdeJson);
    }

    #[test]
    fn deserializes_from_json() {
        let cfg: FormatterConfig = serde_json::from_str(r#"{"variant":"verbose","backend":"strict"}"#).unwrap();
        assert_eq!(cfg, FormatterConfig::new(Variant::Verbose, BackendKind::Strict));

        let cfg: FormatterConfig = serde_json::from_str(r#"{"variant":"flat"}"#).unwrap();
        assert_eq!(cfg.backend, BackendKind::SerdeJson);
    }

    #[test]
    fn parses_variant_and_backend_pairs() {
        assert_eq!(
            FormatterConfig::parse("verbose:strict"),
            Ok(FormatterConfig::new(Variant::Verbose, BackendKind::Strict))
        );
        assert_eq!(FormatterConfig::parse("FLAT").map(|c| c.variant), Ok(Variant::Flat));
        assert_eq!(
            FormatterConfig::parse("pretty"),
            Err(ConfigError::UnknownVariant("pretty".into()))
        );
        assert!(matches!(
            FormatterConfig::parse("flat:ujson"),
            Err(ConfigError::Backend(_))
        ));
    }

    #[test]
    fn builds_selected_variant() {
        let event = LogEvent::new(tracing::Level::INFO, "app", "hello")
            .with_field("tags", vec!["a", "b"]);

        let verbose: Value = serde_json::from_str(&FormatterConfig::parse("verbose").unwrap().build().format(&event)).unwrap();
        assert_eq!(verbose["levelname"], "INFO");

        let flat: Value = serde_json::from_str(&FormatterConfig::parse("flat").unwrap().build().format(&event)).unwrap();
        assert_eq!(flat["tags"], r#"["a", "b"]"#);
    }
}
