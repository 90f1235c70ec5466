//! # xsd-batch-validator Library
//!
//! Validates every file under a directory tree against one XML Schema, copies the
//! valid ones aside, and groups validation errors by message text across the run.

pub mod aggregator;
pub mod checker;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod error_reporter;
pub mod file_discovery;
pub mod libxml2;
pub mod logging;
pub mod output;
pub mod runner;

pub use aggregator::{DocumentErrors, ErrorAggregator, ErrorFrequencies};
pub use checker::{DocumentChecker, DocumentStatus, FileCheckResult};
pub use cli::{Cli, OutputFormat};
pub use config::{Config, ConfigManager, RunConfiguration};
pub use engine::{
    ErrorHandler, SchemaSource, SchemaValidatorEngine, Severity, ValidationError, Validator,
};
pub use error::{BatchError, ConfigError, CopyError, DocumentReadError};
pub use error_reporter::ErrorReporter;
pub use file_discovery::FileDiscovery;
pub use libxml2::{LibXml2Wrapper, ValidationResult, XmlSchemaPtr};
pub use logging::{LoggingGuard, init_logging};
pub use output::Output;
pub use runner::{BatchRunner, ProgressCallback, RunPhase, RunProgress, RunSummary};
