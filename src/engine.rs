//! Schema Validator Engine
//!
//! Compiles the run's schema exactly once and hands out cheap [`Validator`] handles.
//! Validation diagnostics are delivered through the [`ErrorHandler`] capability so
//! that nothing above this module depends on libxml2's callback API.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libc::c_int;
use serde::{Deserialize, Serialize};

use crate::error::{BatchError, DocumentReadError, LibXml2Error, Result};
use crate::libxml2::{LibXml2Wrapper, XmlSchemaPtr};

/// Schema compiled into the binary, used when no schema path is given
pub const BUNDLED_SCHEMA: &str = include_str!("../schemas/default.xsd");

/// Display name of the bundled schema in logs and errors
pub const BUNDLED_SCHEMA_NAME: &str = "bundled:schemas/default.xsd";

/// Severity of a single diagnostic reported during validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

impl Severity {
    /// Map a libxml2 `xmlErrorLevel` (1 warning, 2 error, 3 fatal)
    pub fn from_level(level: c_int) -> Self {
        match level {
            1 => Severity::Warning,
            3 => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

/// One schema-constraint violation in one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub message: String,
    pub severity: Severity,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl ValidationError {
    pub fn new(message: impl Into<String>, severity: Severity) -> Self {
        Self {
            message: message.into(),
            severity,
            line: None,
            column: None,
        }
    }

    pub fn at(mut self, line: u32, column: Option<u32>) -> Self {
        self.line = Some(line);
        self.column = column;
        self
    }
}

/// Receives the diagnostics of one validation call
#[cfg_attr(test, mockall::automock)]
pub trait ErrorHandler {
    fn on_warning(&mut self, error: ValidationError);
    fn on_error(&mut self, error: ValidationError);
    fn on_fatal_error(&mut self, error: ValidationError);
}

/// Where the run's schema comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaSource {
    Bundled,
    Path(PathBuf),
}

impl SchemaSource {
    /// An empty or blank argument selects the bundled schema
    pub fn from_arg(arg: &str) -> Self {
        if arg.trim().is_empty() {
            SchemaSource::Bundled
        } else {
            SchemaSource::Path(PathBuf::from(arg))
        }
    }
}

impl fmt::Display for SchemaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaSource::Bundled => f.write_str(BUNDLED_SCHEMA_NAME),
            SchemaSource::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Compiles schemas through libxml2
#[derive(Clone)]
pub struct SchemaValidatorEngine {
    libxml2: Arc<LibXml2Wrapper>,
}

impl SchemaValidatorEngine {
    pub fn new() -> Self {
        Self {
            libxml2: Arc::new(LibXml2Wrapper::new()),
        }
    }

    /// Compile `source` into a [`Validator`].
    ///
    /// Not safe to call concurrently with another compilation.
    pub fn compile(&self, source: &SchemaSource) -> Result<Validator> {
        let compiled = match source {
            SchemaSource::Bundled => self.libxml2.parse_schema_from_memory(BUNDLED_SCHEMA.as_bytes()),
            SchemaSource::Path(path) => {
                if !path.is_file() {
                    return Err(BatchError::SchemaCompilation {
                        schema: source.to_string(),
                        details: "schema file does not exist or is not a regular file".to_string(),
                    });
                }
                self.libxml2.parse_schema_from_file(path)
            }
        };

        let schema = compiled.map_err(|e| BatchError::SchemaCompilation {
            schema: source.to_string(),
            details: match e {
                LibXml2Error::SchemaParseFailed { details } => details,
                other => other.to_string(),
            },
        })?;

        Ok(Validator {
            schema,
            libxml2: Arc::clone(&self.libxml2),
        })
    }
}

impl Default for SchemaValidatorEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a compiled schema; clones share the schema, each call gets its own
/// libxml2 contexts
#[derive(Clone)]
pub struct Validator {
    schema: XmlSchemaPtr,
    libxml2: Arc<LibXml2Wrapper>,
}

impl Validator {
    /// Validate one document, reporting every diagnostic to `handler`.
    ///
    /// Fails with [`DocumentReadError`] when the file cannot be read or is not
    /// well-formed XML; in that case `handler` receives nothing.
    pub fn validate(
        &self,
        path: &Path,
        handler: &mut dyn ErrorHandler,
    ) -> std::result::Result<(), DocumentReadError> {
        self.libxml2
            .validate_file(&self.schema, path, handler)
            .map(|_| ())
            .map_err(DocumentReadError::from)
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("schema_loaded", &self.schema.is_valid())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::function;
    use std::fs;
    use tempfile::TempDir;

    const ID_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
    <xs:element name="id" type="xs:integer"/>
</xs:schema>"#;

    fn compile_id_schema(dir: &TempDir) -> Validator {
        let schema_path = dir.path().join("id.xsd");
        fs::write(&schema_path, ID_XSD).unwrap();
        SchemaValidatorEngine::new()
            .compile(&SchemaSource::Path(schema_path))
            .unwrap()
    }

    #[test]
    fn test_schema_source_from_arg() {
        assert_eq!(SchemaSource::from_arg(""), SchemaSource::Bundled);
        assert_eq!(SchemaSource::from_arg("   "), SchemaSource::Bundled);
        assert_eq!(
            SchemaSource::from_arg("schemas/record.xsd"),
            SchemaSource::Path(PathBuf::from("schemas/record.xsd"))
        );
    }

    #[test]
    fn test_schema_source_display() {
        assert_eq!(SchemaSource::Bundled.to_string(), BUNDLED_SCHEMA_NAME);
        assert_eq!(
            SchemaSource::Path(PathBuf::from("/tmp/a.xsd")).to_string(),
            "/tmp/a.xsd"
        );
    }

    #[test]
    fn test_severity_from_level() {
        assert_eq!(Severity::from_level(1), Severity::Warning);
        assert_eq!(Severity::from_level(2), Severity::Error);
        assert_eq!(Severity::from_level(3), Severity::Fatal);
        assert_eq!(Severity::from_level(0), Severity::Error);
    }

    #[test]
    fn test_compile_bundled_schema() {
        let engine = SchemaValidatorEngine::new();
        assert!(engine.compile(&SchemaSource::Bundled).is_ok());
    }

    #[test]
    fn test_compile_missing_schema_fails() {
        let engine = SchemaValidatorEngine::new();
        let result = engine.compile(&SchemaSource::Path(PathBuf::from("/nonexistent/schema.xsd")));

        match result {
            Err(BatchError::SchemaCompilation { schema, details }) => {
                assert_eq!(schema, "/nonexistent/schema.xsd");
                assert!(details.contains("does not exist"));
            }
            other => panic!("Expected SchemaCompilation, got {:?}", other),
        }
    }

    #[test]
    fn test_compile_malformed_schema_fails_with_diagnostics() {
        let dir = TempDir::new().unwrap();
        let schema_path = dir.path().join("broken.xsd");
        fs::write(&schema_path, "<xs:schema xmlns:xs=\"http://www.w3.org/2001/XMLSchema\">").unwrap();

        let result = SchemaValidatorEngine::new().compile(&SchemaSource::Path(schema_path));
        match result {
            Err(BatchError::SchemaCompilation { details, .. }) => assert!(!details.is_empty()),
            other => panic!("Expected SchemaCompilation, got {:?}", other),
        }
    }

    #[test]
    fn test_errors_are_routed_to_on_error() {
        let dir = TempDir::new().unwrap();
        let validator = compile_id_schema(&dir);
        let doc = dir.path().join("a.xml");
        fs::write(&doc, "<id>abc</id>").unwrap();

        let mut handler = MockErrorHandler::new();
        handler
            .expect_on_error()
            .with(function(|e: &ValidationError| {
                e.message.contains("'abc'") && e.severity == Severity::Error
            }))
            .times(1)
            .return_const(());
        handler.expect_on_warning().never();
        handler.expect_on_fatal_error().never();

        validator.validate(&doc, &mut handler).unwrap();
    }

    #[test]
    fn test_valid_document_calls_no_handler() {
        let dir = TempDir::new().unwrap();
        let validator = compile_id_schema(&dir);
        let doc = dir.path().join("b.xml");
        fs::write(&doc, "<id>42</id>").unwrap();

        let mut handler = MockErrorHandler::new();
        handler.expect_on_error().never();
        handler.expect_on_warning().never();
        handler.expect_on_fatal_error().never();

        assert!(validator.validate(&doc, &mut handler).is_ok());
    }

    #[test]
    fn test_malformed_document_is_read_error_without_callbacks() {
        let dir = TempDir::new().unwrap();
        let validator = compile_id_schema(&dir);
        let doc = dir.path().join("c.xml");
        fs::write(&doc, "<id>42</i>").unwrap();

        let mut handler = MockErrorHandler::new();
        handler.expect_on_error().never();
        handler.expect_on_warning().never();
        handler.expect_on_fatal_error().never();

        let err = validator.validate(&doc, &mut handler).unwrap_err();
        assert_eq!(err.file, doc);
        assert!(!err.reason.is_empty());
    }

    #[test]
    fn test_validation_error_builder() {
        let error = ValidationError::new("boom", Severity::Fatal).at(7, Some(3));
        assert_eq!(error.message, "boom");
        assert_eq!(error.severity, Severity::Fatal);
        assert_eq!(error.line, Some(7));
        assert_eq!(error.column, Some(3));
    }
}
