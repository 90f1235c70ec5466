use crate::cli::{Cli, OutputFormat};
use crate::engine::SchemaSource;
use crate::error::{ConfigError, ConfigResult as Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the output directory for valid files, created under the root
pub const DEFAULT_VALID_DIR: &str = "valid";

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// System environment variable provider for production use
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Settings loadable from a configuration file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub validation: ValidationSettings,
    pub output: OutputSettings,
    pub files: FileSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidationSettings {
    /// Number of concurrent validation workers (None = one per CPU)
    pub threads: Option<usize>,
    /// Log every error of every invalid file
    pub log_all_errors: bool,
    /// Copy valid files into the output directory
    pub copy_valid_files: bool,
    /// Output directory name, relative to the root
    pub valid_dir_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputSettings {
    pub format: OutputFormat,
    /// Log sink file; stderr when unset
    pub log_file: Option<PathBuf>,
    /// Allow ANSI colors on the console when stdout is a terminal
    pub colors: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileSettings {
    /// Extensions to validate; empty means every file
    pub extensions: Vec<String>,
    /// Glob patterns of paths to skip
    pub exclude_patterns: Vec<String>,
    pub follow_symlinks: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            log_file: None,
            colors: true,
        }
    }
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            extensions: Vec::new(),
            exclude_patterns: Vec::new(),
            follow_symlinks: true,
        }
    }
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            threads: None,
            log_all_errors: true,
            copy_valid_files: true,
            valid_dir_name: DEFAULT_VALID_DIR.to_string(),
        }
    }
}

/// Immutable settings of one batch run
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfiguration {
    pub schema: SchemaSource,
    pub root_directory: PathBuf,
    pub log_all_errors: bool,
    pub copy_valid_files: bool,
    pub threads: usize,
    pub valid_dir_name: String,
    pub extensions: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub follow_symlinks: bool,
}

impl RunConfiguration {
    /// Defaults: log all errors, copy valid files, one worker per CPU
    pub fn new(schema: SchemaSource, root_directory: impl Into<PathBuf>) -> Self {
        Self {
            schema,
            root_directory: root_directory.into(),
            log_all_errors: true,
            copy_valid_files: true,
            threads: num_cpus::get().max(1),
            valid_dir_name: DEFAULT_VALID_DIR.to_string(),
            extensions: Vec::new(),
            exclude_patterns: Vec::new(),
            follow_symlinks: true,
        }
    }

    pub fn with_log_all_errors(mut self, enabled: bool) -> Self {
        self.log_all_errors = enabled;
        self
    }

    pub fn with_copy_valid_files(mut self, enabled: bool) -> Self {
        self.copy_valid_files = enabled;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn with_exclude_patterns(mut self, patterns: Vec<String>) -> Self {
        self.exclude_patterns = patterns;
        self
    }

    /// Directory that receives copies of valid files
    pub fn valid_dir(&self) -> PathBuf {
        self.root_directory.join(&self.valid_dir_name)
    }

    /// Multi-line dump of the input parameters, logged at startup
    pub fn describe(&self) -> String {
        format!(
            "Input params:\npathForXsd = {}\npathForXml = {}\nisActiveFullErrorLogging = {}\nisActiveValidFilesCopying = {}\nthreads = {}",
            self.schema,
            self.root_directory.display(),
            self.log_all_errors,
            self.copy_valid_files,
            self.threads
        )
    }
}

/// Configuration manager for loading and merging configurations
pub struct ConfigManager;

impl ConfigManager {
    const CONFIG_NAMES: [&'static str; 4] = [
        "xsd-batch.toml",
        "xsd-batch.json",
        ".xsd-batch.toml",
        ".xsd-batch.json",
    ];

    /// Load configuration with precedence: defaults -> file -> environment -> CLI
    pub async fn load_config(cli: &Cli) -> Result<Config> {
        let mut config = Config::default();

        if let Some(config_path) = &cli.config {
            let file_config = Self::load_from_file(config_path).await?;
            config = Self::merge_configs(config, file_config);
        } else if let Some(found_config) = Self::find_config_file().await? {
            config = Self::merge_configs(config, found_config);
        }

        config = Self::apply_environment_overrides(config)?;
        config = Self::merge_with_cli(config, cli);

        Self::validate_config(&config)?;

        Ok(config)
    }

    /// Load configuration from a file (TOML or JSON)
    pub async fn load_from_file(path: &Path) -> Result<Config> {
        let content = tokio::fs::read_to_string(path).await?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => {
                if let Ok(config) = toml::from_str::<Config>(&content) {
                    Ok(config)
                } else {
                    Ok(serde_json::from_str(&content)?)
                }
            }
        }
    }

    /// Find a configuration file in the working directory, then the user config dir
    pub async fn find_config_file() -> Result<Option<Config>> {
        for name in &Self::CONFIG_NAMES {
            let path = PathBuf::from(name);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Ok(Some(Self::load_from_file(&path).await?));
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let app_config_dir = config_dir.join("xsd-batch-validator");
            for name in &Self::CONFIG_NAMES {
                let path = app_config_dir.join(name);
                if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    return Ok(Some(Self::load_from_file(&path).await?));
                }
            }
        }

        Ok(None)
    }

    /// Apply environment variable overrides using the system environment
    pub fn apply_environment_overrides(config: Config) -> Result<Config> {
        Self::apply_environment_overrides_with(&SystemEnvProvider, config)
    }

    /// Apply environment variable overrides with a custom environment provider
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut config: Config,
    ) -> Result<Config> {
        if let Some(threads) = env.get("XSD_BATCH_THREADS") {
            config.validation.threads = Some(threads.parse().map_err(|_| {
                ConfigError::Environment(format!("Invalid XSD_BATCH_THREADS value: {}", threads))
            })?);
        }

        if let Some(log_all) = env.get("XSD_BATCH_LOG_ALL_ERRORS") {
            config.validation.log_all_errors = log_all.parse().map_err(|_| {
                ConfigError::Environment(format!(
                    "Invalid XSD_BATCH_LOG_ALL_ERRORS value: {}",
                    log_all
                ))
            })?;
        }

        if let Some(copy_valid) = env.get("XSD_BATCH_COPY_VALID") {
            config.validation.copy_valid_files = copy_valid.parse().map_err(|_| {
                ConfigError::Environment(format!(
                    "Invalid XSD_BATCH_COPY_VALID value: {}",
                    copy_valid
                ))
            })?;
        }

        if let Some(format) = env.get("XSD_BATCH_FORMAT") {
            config.output.format = match format.to_lowercase().as_str() {
                "human" => OutputFormat::Human,
                "json" => OutputFormat::Json,
                "summary" => OutputFormat::Summary,
                _ => {
                    return Err(ConfigError::Environment(format!(
                        "Invalid XSD_BATCH_FORMAT value: {}",
                        format
                    )));
                }
            };
        }

        if let Some(log_file) = env.get("XSD_BATCH_LOG_FILE") {
            config.output.log_file = Some(PathBuf::from(log_file));
        }

        if let Some(extensions) = env.get("XSD_BATCH_EXTENSIONS") {
            config.files.extensions = extensions
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        Ok(config)
    }

    /// Merge CLI arguments with configuration (CLI takes precedence)
    pub fn merge_with_cli(mut config: Config, cli: &Cli) -> Config {
        if cli.threads.is_some() {
            config.validation.threads = cli.threads;
        }
        if let Some(log_all) = cli.log_all_errors {
            config.validation.log_all_errors = log_all;
        }
        if let Some(copy_valid) = cli.copy_valid_files {
            config.validation.copy_valid_files = copy_valid;
        }

        if let Some(format) = cli.output_format {
            config.output.format = format;
        }
        if let Some(log_file) = &cli.log_file {
            config.output.log_file = Some(log_file.clone());
        }
        if cli.no_color {
            config.output.colors = false;
        }

        if let Some(extensions) = cli.get_extensions() {
            config.files.extensions = extensions;
        }
        if !cli.exclude_patterns.is_empty() {
            config.files.exclude_patterns = cli.exclude_patterns.clone();
        }

        config
    }

    /// Merge two configurations (second takes precedence for set values)
    pub fn merge_configs(mut base: Config, override_config: Config) -> Config {
        if override_config.validation.threads.is_some() {
            base.validation.threads = override_config.validation.threads;
        }
        base.validation.log_all_errors = override_config.validation.log_all_errors;
        base.validation.copy_valid_files = override_config.validation.copy_valid_files;
        if !override_config.validation.valid_dir_name.is_empty() {
            base.validation.valid_dir_name = override_config.validation.valid_dir_name;
        }

        base.output.format = override_config.output.format;
        if override_config.output.log_file.is_some() {
            base.output.log_file = override_config.output.log_file;
        }
        base.output.colors = override_config.output.colors;

        if !override_config.files.extensions.is_empty() {
            base.files.extensions = override_config.files.extensions;
        }
        if !override_config.files.exclude_patterns.is_empty() {
            base.files.exclude_patterns = override_config.files.exclude_patterns;
        }
        base.files.follow_symlinks = override_config.files.follow_symlinks;

        base
    }

    /// Validate configuration values
    pub fn validate_config(config: &Config) -> Result<()> {
        if let Some(threads) = config.validation.threads {
            if threads == 0 {
                return Err(ConfigError::Validation(
                    "Number of threads must be greater than 0".to_string(),
                ));
            }
            if threads > 1000 {
                return Err(ConfigError::Validation(
                    "Number of threads cannot exceed 1000".to_string(),
                ));
            }
        }

        let dir_name = &config.validation.valid_dir_name;
        if dir_name.is_empty()
            || dir_name == "."
            || dir_name == ".."
            || dir_name.contains('/')
            || dir_name.contains('\\')
        {
            return Err(ConfigError::Validation(format!(
                "Invalid valid directory name: '{}'",
                dir_name
            )));
        }

        for ext in &config.files.extensions {
            if ext.contains('/') || ext.contains('\\') || ext.contains('.') {
                return Err(ConfigError::Validation(format!(
                    "Invalid file extension: {}",
                    ext
                )));
            }
        }

        Ok(())
    }

    /// Get the effective thread count
    pub fn get_thread_count(config: &Config) -> usize {
        config
            .validation
            .threads
            .unwrap_or_else(|| num_cpus::get().max(1))
    }

    /// Build the run settings from the merged configuration and the positional arguments
    pub fn run_configuration(config: &Config, cli: &Cli) -> RunConfiguration {
        RunConfiguration {
            schema: SchemaSource::from_arg(&cli.schema),
            root_directory: cli.root.clone(),
            log_all_errors: config.validation.log_all_errors,
            copy_valid_files: config.validation.copy_valid_files,
            threads: Self::get_thread_count(config),
            valid_dir_name: config.validation.valid_dir_name.clone(),
            extensions: config
                .files
                .extensions
                .iter()
                .map(|e| e.to_lowercase())
                .collect(),
            exclude_patterns: config.files.exclude_patterns.clone(),
            follow_symlinks: config.files.follow_symlinks,
        }
    }
}
