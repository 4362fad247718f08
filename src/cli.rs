//! CLI argument parsing for pdfload.
//!
//! This module defines the command-line interface structure using `clap`.
//! It handles argument parsing, validation, and conversion into a
//! [`LoadConfig`] and a [`LoadRequest`].
//!
//! # Examples
//!
//! ```no_run
//! use pdfload::cli::Cli;
//! use clap::Parser;
//!
//! let cli = Cli::parse();
//! let request = cli.to_request()?;
//! println!("Loading {} source(s)", request.sources().len());
//! # Ok::<(), pdfload::PdfLoadError>(())
//! ```

use clap::Parser;
use std::path::PathBuf;

use crate::config::LoadConfig;
use crate::error::{PdfLoadError, Result};
use crate::io::RequiredData;
use crate::request::{LoadRequest, Source};
use crate::utils::collect_paths_for_patterns;

/// Load PDF documents and report their metadata.
///
/// pdfload reads every given document concurrently, tolerating missing or
/// broken files, and prints one line per document plus a summary.
#[derive(Parser, Debug)]
#[command(name = "pdfload")]
#[command(version)]
#[command(about = "Load PDF documents concurrently and report their metadata", long_about = None)]
#[command(author)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Input PDF files to load
    ///
    /// Specify multiple files or use glob patterns. Duplicates are loaded
    /// once; missing files are reported and skipped.
    ///
    /// Examples:
    ///   pdfload a.pdf b.pdf
    ///   pdfload 'scans/*.pdf'
    #[arg(value_name = "FILE", required_unless_present = "list")]
    pub inputs: Vec<String>,

    /// Read documents from a PDF list file (one path per line)
    ///
    /// Text or CSV; only the first column is used and it may be quoted.
    /// Lines starting with '#' are ignored. Relative paths are resolved
    /// against the list's directory. Can be repeated and combined with
    /// direct inputs.
    #[arg(short, long, value_name = "FILE")]
    pub list: Vec<PathBuf>,

    /// Name the request is submitted under
    #[arg(long, value_name = "NAME", env = "PDFLOAD_OWNER", default_value = "cli")]
    pub owner: String,

    /// Number of parallel load workers
    ///
    /// Default is number of CPU cores. Use 1 for sequential processing.
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Read full metadata (version, size, object count, page size)
    #[arg(long)]
    pub full: bool,

    /// Retry documents that failed with a load error once
    #[arg(long)]
    pub retry_failed: bool,

    /// Print the batch summary as JSON
    #[arg(long, conflicts_with = "quiet")]
    pub json: bool,

    /// Verbose output - show detailed metadata for each document
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Cli {
    /// Validate CLI arguments before processing.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No input or list is given
    /// - The job count is zero
    /// - The owner is blank
    pub fn validate(&self) -> Result<()> {
        if self.inputs.is_empty() && self.list.is_empty() {
            return Err(PdfLoadError::NoSources);
        }

        if let Some(jobs) = self.jobs
            && jobs == 0
        {
            return Err(PdfLoadError::invalid_config(
                "Number of jobs must be at least 1",
            ));
        }

        if self.owner.trim().is_empty() {
            return Err(PdfLoadError::BlankOwner);
        }

        Ok(())
    }

    /// Metadata fields selected on the command line.
    pub fn required_data(&self) -> RequiredData {
        if self.full {
            RequiredData::Full
        } else {
            RequiredData::Default
        }
    }

    /// Convert CLI arguments into a validated [`LoadConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if configuration validation fails.
    pub fn to_config(&self) -> Result<LoadConfig> {
        let config = LoadConfig {
            workers: self.jobs,
            required_data: self.required_data(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Build the load request: expanded inputs first, then list files.
    ///
    /// # Errors
    ///
    /// Returns an error for a blank owner, no sources, or a malformed glob
    /// pattern.
    pub fn to_request(&self) -> Result<LoadRequest> {
        let mut sources: Vec<Source> = collect_paths_for_patterns(&self.inputs)?
            .into_iter()
            .map(Source::Path)
            .collect();
        sources.extend(self.list.iter().cloned().map(Source::Manifest));

        Ok(LoadRequest::new(self.owner.clone(), sources)?.with_required_data(self.required_data()))
    }
}
