//! pdfload - Load PDF documents concurrently and report their metadata.

use anyhow::{Context, Result};
use clap::Parser;
use std::process;
use tracing_subscriber::EnvFilter;

use pdfload::cli::Cli;
use pdfload::controller::LoadController;
use pdfload::events::LoadEvent;
use pdfload::output::{OutputFormatter, display_event};
use pdfload::service::ShutdownMode;
use pdfload::{LoadStatus, PdfLoadError};

/// Exit code when the request could not be processed at all.
const BATCH_FAILURE_EXIT_CODE: i32 = 2;

/// Exit code when the run finished but not every document loaded.
const PARTIAL_FAILURE_EXIT_CODE: i32 = 3;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(0) => {}
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            let code = err
                .downcast_ref::<PdfLoadError>()
                .map_or(1, PdfLoadError::exit_code);
            process::exit(code);
        }
    }
}

/// Diagnostics go to stderr; `RUST_LOG` overrides the default level.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "pdfload=debug" } else { "pdfload=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Main application logic. Returns the process exit code.
async fn run(cli: Cli) -> Result<i32> {
    cli.validate()?;
    let config = cli.to_config()?;
    let request = cli.to_request()?;
    let owner = request.owner().clone();

    let formatter = OutputFormatter::new(cli.quiet || cli.json, cli.verbose);
    if formatter.should_print() {
        formatter.section(&format!("{} v{}", pdfload::NAME, pdfload::VERSION));
        formatter.info(&format!(
            "Loading {} source(s) with {} worker(s)...",
            request.sources().len(),
            config.effective_workers()
        ));
    }

    let controller = LoadController::new(config).context("failed to start load controller")?;
    let event = controller.load(request).await?;

    if cli.retry_failed
        && let LoadEvent::Completed(report) = &event
    {
        let retryable: Vec<_> = report
            .descriptors
            .iter()
            .filter(|descriptor| descriptor.status() == LoadStatus::LoadError)
            .map(|descriptor| descriptor.path().to_path_buf())
            .collect();

        if !retryable.is_empty() {
            formatter.info(&format!("Retrying {} document(s)...", retryable.len()));
            let mut stream = controller.subscribe(&owner);
            let batch = controller.retry(owner.as_str(), &retryable)?;
            while let Some(next) = stream.next().await {
                if next.batch() == batch {
                    break;
                }
            }
            // Report on the original batch: it holds every document.
        }
    }

    controller.shutdown(ShutdownMode::Drain).await;

    if cli.json {
        let json = match &event {
            LoadEvent::Completed(report) => serde_json::to_string_pretty(&report.summary()),
            LoadEvent::NothingToLoad { batch, skipped } => serde_json::to_string_pretty(
                &serde_json::json!({ "batch": batch, "nothingToLoad": true, "skipped": skipped }),
            ),
            LoadEvent::Failed { batch, message } => serde_json::to_string_pretty(
                &serde_json::json!({ "batch": batch, "failed": true, "message": message }),
            ),
        }
        .context("failed to serialize report")?;
        println!("{json}");
    } else {
        display_event(&formatter, &event);
    }

    let code = match &event {
        LoadEvent::Completed(report)
            if report.skipped.is_empty() && report.failed().next().is_none() =>
        {
            0
        }
        LoadEvent::Completed(_) | LoadEvent::NothingToLoad { .. } => PARTIAL_FAILURE_EXIT_CODE,
        LoadEvent::Failed { .. } => BATCH_FAILURE_EXIT_CODE,
    };
    Ok(code)
}
