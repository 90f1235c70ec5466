use crate::error::{BatchError, Result};
use globset::{GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Recursive async enumeration of the documents under a root directory
///
/// Symbolic links are followed by default. Each directory is entered at most
/// once, keyed by its canonical path, so link cycles terminate.
#[derive(Debug, Clone)]
pub struct FileDiscovery {
    /// Lowercase extensions to include; empty accepts every regular file
    extensions: Vec<String>,
    /// Exclude patterns set
    exclude_set: Option<GlobSet>,
    /// Directories whose whole subtree is skipped
    excluded_dirs: Vec<PathBuf>,
    /// Follow symbolic links
    follow_symlinks: bool,
}

impl Default for FileDiscovery {
    fn default() -> Self {
        Self {
            extensions: Vec::new(),
            exclude_set: None,
            excluded_dirs: Vec::new(),
            follow_symlinks: true,
        }
    }
}

impl FileDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict discovery to these extensions (case-insensitive, no leading dot)
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions.into_iter().map(|e| e.to_lowercase()).collect();
        self
    }

    /// Skip every path matching one of the glob patterns
    pub fn with_exclude_patterns(mut self, patterns: Vec<String>) -> Result<Self> {
        if patterns.is_empty() {
            self.exclude_set = None;
            return Ok(self);
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = globset::GlobBuilder::new(&pattern)
                .literal_separator(true)
                .build()
                .map_err(|e| {
                    BatchError::Config(format!("Invalid glob pattern '{}': {}", pattern, e))
                })?;
            builder.add(glob);
        }

        self.exclude_set = Some(builder.build().map_err(|e| {
            BatchError::Config(format!("Failed to build exclude glob set: {}", e))
        })?);
        Ok(self)
    }

    /// Never descend into `dir`
    pub fn exclude_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.excluded_dirs.push(dir.into());
        self
    }

    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Every matching regular file below `root`, sorted by path.
    ///
    /// Fails only when `root` itself cannot be read; unreadable entries below it are
    /// logged and skipped.
    pub async fn discover_files(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let metadata = fs::metadata(root).await?;
        if !metadata.is_dir() {
            return Err(BatchError::DirectoryNotFound {
                path: root.to_path_buf(),
            });
        }

        let mut files = Vec::new();
        let mut visited = HashSet::new();
        visited.insert(fs::canonicalize(root).await?);
        let mut read_dir = fs::read_dir(root).await?;

        while let Some(entry) = read_dir.next_entry().await? {
            let entry_path = entry.path();
            if let Err(e) = self.walk(&entry_path, &mut files, &mut visited).await {
                warn!("Error processing {}: {}", entry_path.display(), e);
            }
        }

        files.sort();
        Ok(files)
    }

    fn walk<'a>(
        &'a self,
        path: &'a Path,
        files: &'a mut Vec<PathBuf>,
        visited: &'a mut HashSet<PathBuf>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let link_metadata = fs::symlink_metadata(path).await?;
            if link_metadata.file_type().is_symlink() && !self.follow_symlinks {
                warn!("Skipping symbolic link {}", path.display());
                return Ok(());
            }

            let metadata = fs::metadata(path).await?;

            if metadata.is_file() {
                if self.should_process(path) {
                    files.push(path.to_path_buf());
                }
            } else if metadata.is_dir() {
                if self.is_excluded_dir(path) {
                    return Ok(());
                }

                let canonical = fs::canonicalize(path).await?;
                if self.is_excluded_dir(&canonical) {
                    return Ok(());
                }
                if !visited.insert(canonical) {
                    debug!("Skipping {}: directory already visited", path.display());
                    return Ok(());
                }

                let mut read_dir = fs::read_dir(path).await.map_err(|e| {
                    BatchError::FileSystemTraversal {
                        path: path.to_path_buf(),
                        reason: e.to_string(),
                    }
                })?;

                while let Some(entry) = read_dir.next_entry().await? {
                    let entry_path = entry.path();
                    if let Err(e) = self.walk(&entry_path, files, visited).await {
                        warn!("Error processing {}: {}", entry_path.display(), e);
                    }
                }
            }

            Ok(())
        })
    }

    fn is_excluded_dir(&self, path: &Path) -> bool {
        self.excluded_dirs.iter().any(|dir| dir == path)
    }

    /// Check if a file should be processed based on extensions and patterns
    pub fn should_process(&self, path: &Path) -> bool {
        if !self.extensions.is_empty() {
            match path.extension().and_then(|ext| ext.to_str()) {
                Some(extension) if self.extensions.contains(&extension.to_lowercase()) => {}
                _ => return false,
            }
        }

        if let Some(exclude_set) = &self.exclude_set
            && exclude_set.is_match(path)
        {
            return false;
        }

        true
    }
}
