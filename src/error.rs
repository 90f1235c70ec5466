use std::path::PathBuf;

use thiserror::Error;

/// Run-level error type. Only schema compilation and root resolution abort a batch;
/// the remaining variants cover configuration and worker plumbing.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Schema compilation failed: {schema} - {details}")]
    SchemaCompilation { schema: String, details: String },

    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system traversal error: {path} - {reason}")]
    FileSystemTraversal { path: PathBuf, reason: String },

    #[error("Concurrent operation error: {details}")]
    Concurrency { details: String },
}

/// A document that could not be opened or parsed as XML at all
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Document read failed: {file} - {reason}")]
pub struct DocumentReadError {
    pub file: PathBuf,
    pub reason: String,
}

/// Copying a valid document into the output directory failed
#[derive(Error, Debug)]
#[error("Copy failed: {file} -> {target}")]
pub struct CopyError {
    pub file: PathBuf,
    pub target: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Configuration-specific error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable error: {0}")]
    Environment(String),

    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),
}

/// LibXML2-specific error types
#[derive(Error, Debug)]
pub enum LibXml2Error {
    #[error("Schema parsing failed: {details}")]
    SchemaParseFailed { details: String },

    #[error("Memory allocation failed in libxml2")]
    MemoryAllocation,

    #[error("Validation context creation failed")]
    ValidationContextCreationFailed,

    #[error("Path is not representable as a C string: {file}")]
    InvalidPath { file: PathBuf },

    #[error("Document could not be parsed: {file} - {details}")]
    DocumentParseFailed { file: PathBuf, details: String },

    #[error("Schema validation internal error {code}: {file}")]
    InternalError { code: i32, file: PathBuf },
}

impl From<ConfigError> for BatchError {
    fn from(err: ConfigError) -> Self {
        BatchError::Config(err.to_string())
    }
}

impl From<LibXml2Error> for DocumentReadError {
    fn from(err: LibXml2Error) -> Self {
        match err {
            LibXml2Error::DocumentParseFailed { file, details } => DocumentReadError {
                file,
                reason: details,
            },
            LibXml2Error::InvalidPath { ref file } | LibXml2Error::InternalError { ref file, .. } => {
                DocumentReadError {
                    file: file.clone(),
                    reason: err.to_string(),
                }
            }
            other => DocumentReadError {
                file: PathBuf::new(),
                reason: other.to_string(),
            },
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, BatchError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// LibXML2 result type alias
pub type LibXml2Result<T> = std::result::Result<T, LibXml2Error>;
