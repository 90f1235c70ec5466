//! Batch Runner
//!
//! Drives one run end to end:
//! - **Schema**: compiled exactly once, on a blocking thread
//! - **Discovery**: async walk of the root, minus the output directory
//! - **Validation**: one `spawn_blocking` task per file, bounded by a semaphore
//! - **Aggregation**: each task returns its own partial [`ErrorAggregator`]; they are
//!   merged after `try_join_all` so workers never contend on shared counts

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::aggregator::{ErrorAggregator, ErrorFrequencies};
use crate::checker::{DocumentChecker, FileCheckResult};
use crate::config::RunConfiguration;
use crate::engine::{SchemaValidatorEngine, Validator};
use crate::error::{BatchError, Result};
use crate::file_discovery::FileDiscovery;

/// Phase of a batch run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunPhase {
    Init,
    CompilingSchema,
    Enumerating,
    Validating,
    Summarizing,
    Done,
    Failed,
}

/// Progress update for a batch run
#[derive(Debug, Clone)]
pub struct RunProgress {
    pub phase: RunPhase,
    /// File whose check just finished
    pub current_file: Option<PathBuf>,
    pub completed: usize,
    pub total: usize,
    /// Result of `current_file`, during [`RunPhase::Validating`]
    pub result: Option<FileCheckResult>,
}

impl RunProgress {
    fn phase(phase: RunPhase, completed: usize, total: usize) -> Self {
        Self {
            phase,
            current_file: None,
            completed,
            total,
            result: None,
        }
    }
}

/// Callback type for progress reporting
pub type ProgressCallback = Arc<dyn Fn(RunProgress) + Send + Sync>;

/// Totals and per-file results of a finished run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub root_directory: PathBuf,
    pub total_files: usize,
    pub valid_files: usize,
    pub invalid_files: usize,
    pub read_failed_files: usize,
    pub copy_failures: usize,
    pub error_frequencies: ErrorFrequencies,
    pub file_results: Vec<FileCheckResult>,
    pub duration: Duration,
}

impl RunSummary {
    fn build(
        root_directory: PathBuf,
        file_results: Vec<FileCheckResult>,
        error_frequencies: ErrorFrequencies,
        duration: Duration,
    ) -> Self {
        let mut summary = Self {
            root_directory,
            total_files: file_results.len(),
            valid_files: 0,
            invalid_files: 0,
            read_failed_files: 0,
            copy_failures: 0,
            error_frequencies,
            file_results: Vec::new(),
            duration,
        };

        for result in &file_results {
            if result.status.is_valid() {
                summary.valid_files += 1;
            } else if result.status.is_invalid() {
                summary.invalid_files += 1;
            } else {
                summary.read_failed_files += 1;
            }
            if result.copy_error.is_some() {
                summary.copy_failures += 1;
            }
        }

        summary.file_results = file_results;
        summary
    }

    pub fn all_valid(&self) -> bool {
        self.valid_files == self.total_files
    }

    pub fn result_for(&self, path: &Path) -> Option<&FileCheckResult> {
        self.file_results.iter().find(|r| r.path == path)
    }
}

/// Runs one batch over a directory tree
pub struct BatchRunner {
    config: Arc<RunConfiguration>,
    engine: SchemaValidatorEngine,
}

impl BatchRunner {
    pub fn new(config: RunConfiguration) -> Self {
        Self {
            config: Arc::new(config),
            engine: SchemaValidatorEngine::new(),
        }
    }

    pub fn config(&self) -> &RunConfiguration {
        &self.config
    }

    /// Run the batch.
    ///
    /// Fails only when the root cannot be resolved or the schema does not compile.
    pub async fn run(&self) -> Result<RunSummary> {
        self.run_with_progress(None).await
    }

    pub async fn run_with_progress(
        &self,
        progress_callback: Option<ProgressCallback>,
    ) -> Result<RunSummary> {
        let result = self.execute(progress_callback.clone()).await;
        if result.is_err()
            && let Some(ref callback) = progress_callback
        {
            callback(RunProgress::phase(RunPhase::Failed, 0, 0));
        }
        result
    }

    async fn execute(&self, progress_callback: Option<ProgressCallback>) -> Result<RunSummary> {
        let start = Instant::now();
        let report = |progress: RunProgress| {
            if let Some(ref callback) = progress_callback {
                callback(progress);
            }
        };

        report(RunProgress::phase(RunPhase::Init, 0, 0));
        let root = self.resolve_root().await?;

        report(RunProgress::phase(RunPhase::CompilingSchema, 0, 0));
        let validator = self.compile_schema().await?;

        report(RunProgress::phase(RunPhase::Enumerating, 0, 0));
        let files = self.discover(&root).await?;
        info!("Total count is {}", files.len());

        let total = files.len();
        report(RunProgress::phase(RunPhase::Validating, 0, total));
        let (file_results, aggregator) = self
            .check_files(validator, files, progress_callback.clone())
            .await?;

        report(RunProgress::phase(RunPhase::Summarizing, total, total));
        let frequencies = aggregator.into_snapshot();
        for (message, count) in frequencies.sorted() {
            info!("{}\t{}", count, message);
        }

        let summary = RunSummary::build(root, file_results, frequencies, start.elapsed());
        debug!(
            valid = summary.valid_files,
            invalid = summary.invalid_files,
            read_failed = summary.read_failed_files,
            "run finished"
        );

        report(RunProgress::phase(RunPhase::Done, total, total));
        Ok(summary)
    }

    async fn resolve_root(&self) -> Result<PathBuf> {
        let requested = &self.config.root_directory;
        let not_found = || BatchError::DirectoryNotFound {
            path: requested.clone(),
        };

        let root = tokio::fs::canonicalize(requested)
            .await
            .map_err(|_| not_found())?;
        let metadata = tokio::fs::metadata(&root).await.map_err(|_| not_found())?;
        if !metadata.is_dir() {
            return Err(not_found());
        }
        Ok(root)
    }

    async fn compile_schema(&self) -> Result<Validator> {
        let engine = self.engine.clone();
        let source = self.config.schema.clone();
        tokio::task::spawn_blocking(move || engine.compile(&source))
            .await
            .map_err(|e| BatchError::Concurrency {
                details: format!("Schema compilation task failed: {}", e),
            })?
    }

    async fn discover(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut discovery = FileDiscovery::new()
            .with_extensions(self.config.extensions.clone())
            .with_exclude_patterns(self.config.exclude_patterns.clone())?
            .with_follow_symlinks(self.config.follow_symlinks);

        if self.config.copy_valid_files {
            discovery = discovery.exclude_dir(root.join(&self.config.valid_dir_name));
        }

        discovery.discover_files(root).await.map_err(|e| match e {
            BatchError::Io(_) => BatchError::DirectoryNotFound {
                path: root.to_path_buf(),
            },
            other => other,
        })
    }

    async fn check_files(
        &self,
        validator: Validator,
        files: Vec<PathBuf>,
        progress_callback: Option<ProgressCallback>,
    ) -> Result<(Vec<FileCheckResult>, ErrorAggregator)> {
        let total_files = files.len();
        let completed = Arc::new(AtomicUsize::new(0));
        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.config.threads.max(1)));
        let checker = DocumentChecker::new(Arc::clone(&self.config));

        let tasks: Vec<_> = files
            .into_iter()
            .map(|file_path| {
                let validator = validator.clone();
                let checker = checker.clone();
                let semaphore = Arc::clone(&semaphore);
                let completed = Arc::clone(&completed);
                let progress_callback = progress_callback.clone();

                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.map_err(|_| {
                        BatchError::Concurrency {
                            details: "Failed to acquire validation semaphore".to_string(),
                        }
                    })?;

                    let path = file_path.clone();
                    let outcome = tokio::task::spawn_blocking(move || {
                        let mut partial = ErrorAggregator::new();
                        let result = checker.check(&validator, &path, &mut partial);
                        (result, partial)
                    })
                    .await;

                    // A panicking check counts as an unreadable file, not a failed run
                    let (result, partial) = match outcome {
                        Ok(pair) => pair,
                        Err(e) => (
                            FileCheckResult::read_failed(
                                file_path.clone(),
                                format!("validation task failed: {}", e),
                                Duration::ZERO,
                            ),
                            ErrorAggregator::new(),
                        ),
                    };

                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    if let Some(ref callback) = progress_callback {
                        callback(RunProgress {
                            phase: RunPhase::Validating,
                            current_file: Some(file_path),
                            completed: done,
                            total: total_files,
                            result: Some(result.clone()),
                        });
                    }

                    Ok::<_, BatchError>((result, partial))
                })
            })
            .collect();

        let task_results = try_join_all(tasks)
            .await
            .map_err(|e| BatchError::Concurrency {
                details: format!("Task join error: {}", e),
            })?;

        let mut aggregator = ErrorAggregator::new();
        let mut file_results = Vec::with_capacity(task_results.len());
        for task_result in task_results {
            let (result, partial) = task_result?;
            aggregator.merge(partial);
            file_results.push(result);
        }

        Ok((file_results, aggregator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::DocumentStatus;
    use crate::engine::SchemaSource;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const ID_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
    <xs:element name="id" type="xs:integer"/>
</xs:schema>"#;

    fn setup() -> (TempDir, PathBuf, PathBuf) {
        let dir = TempDir::new().unwrap();
        let schema = dir.path().join("id.xsd");
        fs::write(&schema, ID_XSD).unwrap();
        let root = dir.path().join("xml");
        fs::create_dir_all(&root).unwrap();
        (dir, schema, root)
    }

    fn runner(schema: &Path, root: &Path) -> BatchRunner {
        BatchRunner::new(RunConfiguration::new(
            SchemaSource::Path(schema.to_path_buf()),
            root,
        ))
    }

    #[tokio::test]
    async fn test_empty_root_reports_zero_files() {
        let (_dir, schema, root) = setup();
        let summary = runner(&schema, &root).run().await.unwrap();

        assert_eq!(summary.total_files, 0);
        assert!(summary.error_frequencies.is_empty());
        assert!(summary.all_valid());
    }

    #[tokio::test]
    async fn test_summary_counts_each_status() {
        let (_dir, schema, root) = setup();
        fs::write(root.join("a.xml"), "<id>abc</id>").unwrap();
        fs::write(root.join("b.xml"), "<id>42</id>").unwrap();
        fs::write(root.join("c.xml"), "<id>").unwrap();

        let summary = runner(&schema, &root).run().await.unwrap();

        assert_eq!(summary.total_files, 3);
        assert_eq!(summary.valid_files, 1);
        assert_eq!(summary.invalid_files, 1);
        assert_eq!(summary.read_failed_files, 1);
        assert_eq!(summary.copy_failures, 0);
        assert!(!summary.all_valid());
    }

    #[tokio::test]
    async fn test_valid_dir_is_not_revalidated() {
        let (_dir, schema, root) = setup();
        fs::write(root.join("b.xml"), "<id>42</id>").unwrap();

        let first = runner(&schema, &root).run().await.unwrap();
        assert_eq!(first.total_files, 1);
        assert!(root.join("valid").join("b.xml").exists());

        let second = runner(&schema, &root).run().await.unwrap();
        assert_eq!(second.total_files, 1);
    }

    #[tokio::test]
    async fn test_missing_root_is_directory_not_found() {
        let (_dir, schema, root) = setup();
        let result = runner(&schema, &root.join("missing")).run().await;

        assert!(matches!(result, Err(BatchError::DirectoryNotFound { .. })));
    }

    #[tokio::test]
    async fn test_file_as_root_is_directory_not_found() {
        let (_dir, schema, root) = setup();
        fs::write(root.join("b.xml"), "<id>42</id>").unwrap();
        let result = runner(&schema, &root.join("b.xml")).run().await;

        assert!(matches!(result, Err(BatchError::DirectoryNotFound { .. })));
    }

    #[tokio::test]
    async fn test_progress_phases_in_order() {
        let (_dir, schema, root) = setup();
        fs::write(root.join("b.xml"), "<id>42</id>").unwrap();

        let seen: Arc<Mutex<Vec<RunProgress>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: ProgressCallback = Arc::new(move |p| sink.lock().unwrap().push(p));

        runner(&schema, &root)
            .run_with_progress(Some(callback))
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        let phases: Vec<RunPhase> = seen.iter().map(|p| p.phase).collect();
        let mut distinct = phases.clone();
        distinct.dedup();
        assert_eq!(
            distinct,
            vec![
                RunPhase::Init,
                RunPhase::CompilingSchema,
                RunPhase::Enumerating,
                RunPhase::Validating,
                RunPhase::Summarizing,
                RunPhase::Done,
            ]
        );

        let file_update = seen.iter().find(|p| p.result.is_some()).unwrap();
        assert_eq!(file_update.completed, 1);
        assert_eq!(file_update.total, 1);
        assert_eq!(
            file_update.result.as_ref().unwrap().status,
            DocumentStatus::Valid
        );
    }

    #[tokio::test]
    async fn test_failed_phase_reported_on_schema_error() {
        let (dir, _schema, root) = setup();
        let broken = dir.path().join("broken.xsd");
        fs::write(&broken, "<not-a-schema/>").unwrap();

        let seen: Arc<Mutex<Vec<RunPhase>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: ProgressCallback = Arc::new(move |p| sink.lock().unwrap().push(p.phase));

        let result = runner(&broken, &root).run_with_progress(Some(callback)).await;

        assert!(matches!(result, Err(BatchError::SchemaCompilation { .. })));
        let seen = seen.lock().unwrap();
        assert_eq!(seen.last(), Some(&RunPhase::Failed));
        assert!(!seen.contains(&RunPhase::Enumerating));
    }
}
