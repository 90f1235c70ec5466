use std::process;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use xsd_batch_validator::{
    BatchRunner, Cli, ConfigManager, ErrorReporter, Output, OutputFormat, ProgressCallback,
    init_logging,
};

#[tokio::main]
async fn main() {
    let Some(cli) = Cli::parse_args() else {
        return;
    };

    if let Err(err) = run(cli).await {
        ErrorReporter::new().report_fatal(&*err);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    cli.validate().map_err(anyhow::Error::msg)?;

    let config = ConfigManager::load_config(&cli)
        .await
        .context("Could not load configuration")?;

    let _log_guard = init_logging(config.output.log_file.as_deref())
        .context("Could not set up logger configuration")?;

    let run_config = ConfigManager::run_configuration(&config, &cli);
    let mut output = Output::new(config.output.format);
    if !config.output.colors {
        output = output.with_colors(false);
    }

    let dump = run_config.describe();
    if output.format() == OutputFormat::Human {
        println!("{}", dump);
    }
    info!("{}", dump);

    let printer = output.clone();
    let progress: ProgressCallback = Arc::new(move |progress| {
        if let Some(line) = printer.progress_line(&progress) {
            println!("{}", line);
        }
    });

    let summary = BatchRunner::new(run_config)
        .run_with_progress(Some(progress))
        .await?;

    let report = output
        .format_report(&summary)
        .context("Could not render the report")?;
    println!("{}", report);

    Ok(())
}
