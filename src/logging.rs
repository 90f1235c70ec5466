//! Log sink setup
//!
//! Every line is `<local time>\t<message>`; the level only drives filtering.
//! The filter comes from `XSD_BATCH_LOG` and defaults to `info`.

use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use tracing::{Event, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, MakeWriter};
use tracing_subscriber::registry::LookupSpan;

use crate::error::{BatchError, Result};

/// Environment variable holding the log filter directives
pub const LOG_ENV_VAR: &str = "XSD_BATCH_LOG";

static INITIALIZED: OnceLock<()> = OnceLock::new();

/// `HH:MM:SS.mmm` padded to 12 columns, a tab, then the message
#[derive(Debug, Clone, Copy, Default)]
pub struct TabbedTimeFormat;

impl<S, N> FormatEvent<S, N> for TabbedTimeFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let time = chrono::Local::now().format("%H:%M:%S%.3f").to_string();
        write!(writer, "{:<12}\t", time)?;
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Keeps the background log writer alive; dropping it flushes pending lines
#[must_use]
pub struct LoggingGuard {
    _worker: Option<WorkerGuard>,
}

/// Filter from `XSD_BATCH_LOG`, falling back to `info`
pub fn default_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Subscriber writing tab-separated lines to `writer`
pub fn build_subscriber<W>(filter: EnvFilter, writer: W) -> impl Subscriber + Send + Sync + 'static
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .event_format(TabbedTimeFormat)
        .finish()
}

/// Install the process-wide subscriber.
///
/// Logs go to `log_file` when given, stderr otherwise. Calling this again after a
/// successful setup is a no-op.
pub fn init_logging(log_file: Option<&Path>) -> Result<LoggingGuard> {
    if INITIALIZED.get().is_some() {
        return Ok(LoggingGuard { _worker: None });
    }

    let guard = match log_file {
        Some(path) => {
            let appender = file_appender(path)?;
            let (writer, worker) = tracing_appender::non_blocking(appender);
            install(build_subscriber(default_filter(), writer))?;
            LoggingGuard {
                _worker: Some(worker),
            }
        }
        None => {
            install(build_subscriber(default_filter(), std::io::stderr))?;
            LoggingGuard { _worker: None }
        }
    };

    let _ = INITIALIZED.set(());
    Ok(guard)
}

fn install<S>(subscriber: S) -> Result<()>
where
    S: Subscriber + Send + Sync + 'static,
{
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| BatchError::Config(format!("Could not install log subscriber: {}", e)))
}

fn file_appender(path: &Path) -> Result<RollingFileAppender> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| BatchError::Config(format!("Invalid log file path: {}", path.display())))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(dir)
        .map_err(|e| BatchError::Config(format!("Could not open log file {}: {}", path.display(), e)))
}
