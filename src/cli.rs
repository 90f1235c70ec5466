use clap::error::ErrorKind;
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::PathBuf;

/// Printed when a required positional argument is missing
pub const USAGE: &str = "Error. Required params are not filled.
You should enter values:
SCHEMA           - path to the xsd schema, string; an empty string selects the bundled schema
ROOT             - absolute path to the validated xml files, string
LOG_ALL_ERRORS   - flag to enable logging of all errors, optional, boolean, defaults to true
COPY_VALID_FILES - flag to enable copying valid files to the \"valid\" directory, optional, boolean, defaults to true
";

/// Format of the final report on stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
    Summary,
}

/// Lenient boolean: `true` in any case is true, every other value is false
pub fn parse_flag(value: &str) -> Result<bool, String> {
    Ok(value.trim().eq_ignore_ascii_case("true"))
}

/// Batch XML Schema validator
#[derive(Parser, Debug, Clone)]
#[command(name = "xsd-batch-validator")]
#[command(about = "Validate every file under a directory against one XSD and group the errors")]
#[command(version)]
pub struct Cli {
    /// Path to the XSD schema; pass an empty string to use the bundled schema
    #[arg(value_name = "SCHEMA")]
    pub schema: String,

    /// Root directory containing the XML files to validate
    #[arg(value_name = "ROOT")]
    pub root: PathBuf,

    /// Log every validation error of every invalid file (default true)
    #[arg(value_name = "LOG_ALL_ERRORS", value_parser = parse_flag)]
    pub log_all_errors: Option<bool>,

    /// Copy valid files into ROOT/valid (default true)
    #[arg(value_name = "COPY_VALID_FILES", value_parser = parse_flag)]
    pub copy_valid_files: Option<bool>,

    /// Number of concurrent validation workers
    #[arg(short = 't', long = "threads")]
    pub threads: Option<usize>,

    /// Write log lines to this file instead of stderr
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Format of the final report
    #[arg(long = "format", value_enum)]
    pub output_format: Option<OutputFormat>,

    /// Never color the console output
    #[arg(long = "no-color")]
    pub no_color: bool,

    /// Configuration file (TOML or JSON)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Only validate files with these extensions (comma-separated)
    #[arg(short = 'e', long = "extensions")]
    pub extensions: Option<String>,

    /// Skip paths matching this glob (repeatable)
    #[arg(long = "exclude", action = clap::ArgAction::Append)]
    pub exclude_patterns: Vec<String>,
}

impl Cli {
    /// Parse the process arguments.
    ///
    /// Returns `None` after printing [`USAGE`] when a required argument is missing;
    /// `--help`, `--version`, and malformed options exit through clap.
    pub fn parse_args() -> Option<Self> {
        match Self::try_parse_args_from(std::env::args_os()) {
            Ok(cli) => cli,
            Err(e) => e.exit(),
        }
    }

    pub fn try_parse_args_from<I, T>(args: I) -> Result<Option<Self>, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        match Self::try_parse_from(args) {
            Ok(cli) => Ok(Some(cli)),
            Err(e) if e.kind() == ErrorKind::MissingRequiredArgument => {
                println!("{}", USAGE);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(threads) = self.threads
            && threads == 0
        {
            return Err("Number of threads must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn get_extensions(&self) -> Option<Vec<String>> {
        self.extensions.as_ref().map(|list| {
            list.split(',')
                .map(|s| s.trim().trim_start_matches('.').to_lowercase())
                .filter(|s| !s.is_empty())
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_parsing_with_defaults() {
        let cli = Cli::try_parse_args_from(["xsd-batch-validator", "schema.xsd", "/data/xml"])
            .unwrap()
            .unwrap();

        assert_eq!(cli.schema, "schema.xsd");
        assert_eq!(cli.root, PathBuf::from("/data/xml"));
        assert_eq!(cli.log_all_errors, None);
        assert_eq!(cli.copy_valid_files, None);
    }

    #[test]
    fn test_all_four_positionals() {
        let cli = Cli::try_parse_args_from([
            "xsd-batch-validator",
            "schema.xsd",
            "/data/xml",
            "FALSE",
            "True",
        ])
        .unwrap()
        .unwrap();

        assert_eq!(cli.log_all_errors, Some(false));
        assert_eq!(cli.copy_valid_files, Some(true));
    }

    #[test]
    fn test_empty_schema_argument_is_accepted() {
        let cli = Cli::try_parse_args_from(["xsd-batch-validator", "", "/data/xml"])
            .unwrap()
            .unwrap();
        assert!(cli.schema.is_empty());
    }

    #[test]
    fn test_missing_root_yields_usage() {
        let parsed = Cli::try_parse_args_from(["xsd-batch-validator", "schema.xsd"]).unwrap();
        assert!(parsed.is_none());
    }

    #[test]
    fn test_parse_flag_is_lenient() {
        assert_eq!(parse_flag("true"), Ok(true));
        assert_eq!(parse_flag("TRUE"), Ok(true));
        assert_eq!(parse_flag("yes"), Ok(false));
        assert_eq!(parse_flag("1"), Ok(false));
        assert_eq!(parse_flag(""), Ok(false));
    }

    #[test]
    fn test_optional_flags() {
        let cli = Cli::try_parse_args_from([
            "xsd-batch-validator",
            "--threads",
            "2",
            "--format",
            "json",
            "--extensions",
            "xml, .CMDI",
            "--exclude",
            "**/*.bak",
            "schema.xsd",
            "/data/xml",
        ])
        .unwrap()
        .unwrap();

        assert_eq!(cli.threads, Some(2));
        assert_eq!(cli.output_format, Some(OutputFormat::Json));
        assert_eq!(
            cli.get_extensions(),
            Some(vec!["xml".to_string(), "cmdi".to_string()])
        );
        assert_eq!(cli.exclude_patterns, vec!["**/*.bak".to_string()]);
    }

    #[test]
    fn test_zero_threads_rejected() {
        let cli = Cli::try_parse_args_from(["xsd-batch-validator", "-t", "0", "s.xsd", "/d"])
            .unwrap()
            .unwrap();
        assert!(cli.validate().is_err());
    }
}
