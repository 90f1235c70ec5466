//! Per-document check: validate, classify, copy, log.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::aggregator::{DocumentErrors, ErrorAggregator};
use crate::config::RunConfiguration;
use crate::engine::Validator;
use crate::error::CopyError;

/// Outcome of checking a single file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentStatus {
    /// Parsed and matched the schema with no diagnostics
    Valid,
    /// Parsed, but produced schema diagnostics
    Invalid { error_count: usize },
    /// Could not be opened or is not well-formed XML
    ReadFailed { reason: String },
}

impl DocumentStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, DocumentStatus::Valid)
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, DocumentStatus::Invalid { .. })
    }

    pub fn is_read_failed(&self) -> bool {
        matches!(self, DocumentStatus::ReadFailed { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileCheckResult {
    pub path: PathBuf,
    pub status: DocumentStatus,
    /// Where the file was copied, when it was valid and copying succeeded
    pub copied_to: Option<PathBuf>,
    pub copy_error: Option<String>,
    pub duration: Duration,
}

impl FileCheckResult {
    pub fn read_failed(path: PathBuf, reason: impl Into<String>, duration: Duration) -> Self {
        Self {
            path,
            status: DocumentStatus::ReadFailed {
                reason: reason.into(),
            },
            copied_to: None,
            copy_error: None,
            duration,
        }
    }

    /// Final path component, as used in log and console lines
    pub fn file_name(&self) -> String {
        display_name(&self.path)
    }
}

pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Checks documents against the run's compiled schema
///
/// Clones share the record of copy targets written so far in the run.
#[derive(Debug, Clone)]
pub struct DocumentChecker {
    config: Arc<RunConfiguration>,
    /// Copy target -> source file that last wrote it
    copies: Arc<Mutex<HashMap<PathBuf, PathBuf>>>,
}

impl DocumentChecker {
    pub fn new(config: Arc<RunConfiguration>) -> Self {
        Self {
            config,
            copies: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Validate `path` and classify it.
    ///
    /// Only documents that parse contribute their errors to `aggregator`.
    pub fn check(
        &self,
        validator: &Validator,
        path: &Path,
        aggregator: &mut ErrorAggregator,
    ) -> FileCheckResult {
        let start = Instant::now();
        let name = display_name(path);
        let mut errors = DocumentErrors::new();

        if let Err(e) = validator.validate(path, &mut errors) {
            error!("{}\t read failed: {}", name, e.reason);
            return FileCheckResult::read_failed(path.to_path_buf(), e.reason, start.elapsed());
        }

        let errors = errors.commit(aggregator);

        if errors.is_empty() {
            let mut result = FileCheckResult {
                path: path.to_path_buf(),
                status: DocumentStatus::Valid,
                copied_to: None,
                copy_error: None,
                duration: Duration::ZERO,
            };

            if self.config.copy_valid_files {
                match self.copy_valid(path) {
                    Ok(target) => {
                        debug!("{}\t copied to {}", name, target.display());
                        result.copied_to = Some(target);
                    }
                    Err(e) => {
                        error!("{}\t {}: {}", name, e, e.source);
                        result.copy_error = Some(e.source.to_string());
                    }
                }
            }

            result.duration = start.elapsed();
            return result;
        }

        if self.config.log_all_errors {
            for validation_error in &errors {
                warn!("{}\t{}", name, validation_error.message);
            }
        }

        FileCheckResult {
            path: path.to_path_buf(),
            status: DocumentStatus::Invalid {
                error_count: errors.len(),
            },
            copied_to: None,
            copy_error: None,
            duration: start.elapsed(),
        }
    }

    /// Copy into the valid directory under the same file name, replacing any previous copy.
    ///
    /// Copies are serialized so two sources sharing a file name never interleave
    /// their writes; the later one wins and is logged at WARN.
    fn copy_valid(&self, path: &Path) -> Result<PathBuf, CopyError> {
        let valid_dir = self.config.valid_dir();
        let target = match path.file_name() {
            Some(name) => valid_dir.join(name),
            None => valid_dir.clone(),
        };

        let copy_error = |source| CopyError {
            file: path.to_path_buf(),
            target: target.clone(),
            source,
        };

        let mut copies = self
            .copies
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        std::fs::create_dir_all(&valid_dir).map_err(copy_error)?;
        std::fs::copy(path, &target).map_err(copy_error)?;

        if let Some(previous) = copies.insert(target.clone(), path.to_path_buf())
            && previous != path
        {
            warn!(
                "{}\t overwrites {} copied from {}",
                display_name(path),
                target.display(),
                previous.display()
            );
        }
        Ok(target)
    }
}
