use crate::error::{BatchError, ConfigError};
use std::error::Error;

/// Header printed before every fatal error
pub const FATAL_HEADER: &str = "Something went wrong...";

/// Formats run-aborting errors for stderr
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorReporter;

impl ErrorReporter {
    pub fn new() -> Self {
        Self
    }

    /// Header, the error itself, every cause below it, and a hint when one applies
    pub fn format_fatal(&self, error: &(dyn Error + 'static)) -> String {
        let mut output = String::from(FATAL_HEADER);
        output.push('\n');
        output.push_str(&error.to_string());

        let mut current = error.source();
        if current.is_some() {
            output.push_str("\nCaused by:");
        }
        let mut level = 0;
        while let Some(source) = current {
            output.push_str(&format!("\n  {}: {}", level, source));
            current = source.source();
            level += 1;
        }

        if let Some(hint) = Self::hint(error) {
            output.push_str("\nSuggestion: ");
            output.push_str(&hint);
        }

        output
    }

    /// Print [`Self::format_fatal`] to stderr
    pub fn report_fatal(&self, error: &(dyn Error + 'static)) {
        eprintln!("{}", self.format_fatal(error));
    }

    /// First applicable hint found anywhere in the chain
    fn hint(error: &(dyn Error + 'static)) -> Option<String> {
        let mut current = Some(error);
        while let Some(err) = current {
            if let Some(batch) = err.downcast_ref::<BatchError>() {
                return Self::batch_hint(batch);
            }
            if let Some(config) = err.downcast_ref::<ConfigError>() {
                return Self::config_hint(config);
            }
            current = err.source();
        }
        None
    }

    fn batch_hint(error: &BatchError) -> Option<String> {
        match error {
            BatchError::DirectoryNotFound { path } => Some(format!(
                "Check that {} exists and is a directory",
                path.display()
            )),
            BatchError::SchemaCompilation { .. } => Some(
                "Check the schema path, or pass an empty string to use the bundled schema"
                    .to_string(),
            ),
            _ => None,
        }
    }

    fn config_hint(error: &ConfigError) -> Option<String> {
        match error {
            ConfigError::TomlParsing(_) | ConfigError::JsonParsing(_) => {
                Some("Check the configuration file syntax (TOML/JSON format expected)".to_string())
            }
            ConfigError::UnsupportedFormat(_) => {
                Some("Use a .toml or .json configuration file".to_string())
            }
            _ => None,
        }
    }
}
