//! Output formatting and display for pdfload.
//!
//! This module handles all user-facing output of the CLI:
//! - Formatted status messages
//! - Batch notifications and per-document lines
//! - Quiet and verbose modes
//!
//! # Examples
//!
//! ```no_run
//! use pdfload::output::{OutputFormatter, display_event};
//! use pdfload::events::LoadEvent;
//!
//! # fn example(event: LoadEvent) {
//! let formatter = OutputFormatter::new(false, true);
//! display_event(&formatter, &event);
//! # }
//! ```

pub mod formatter;

pub use formatter::{MessageLevel, OutputFormatter};

use crate::descriptor::{DescriptorSnapshot, LoadStatus, SkippedEntry};
use crate::events::{LoadEvent, LoadReport};

/// Display a batch notification to the user.
pub fn display_event(formatter: &OutputFormatter, event: &LoadEvent) {
    match event {
        LoadEvent::Completed(report) => display_report(formatter, report),
        LoadEvent::NothingToLoad { batch, skipped } => {
            display_skipped(formatter, skipped);
            formatter.warning(&format!("Batch {batch}: nothing to load"));
        }
        LoadEvent::Failed { batch, message } => {
            formatter.error(&format!("Batch {batch} failed: {message}"));
        }
    }
}

/// Display a settled batch: one line per document, then a summary.
pub fn display_report(formatter: &OutputFormatter, report: &LoadReport) {
    let summary = report.summary();

    if formatter.should_print() {
        formatter.section(&format!("Batch {} ({})", summary.batch, summary.owner));
        for (index, document) in summary.documents.iter().enumerate() {
            formatter.list_item(index + 1, &describe(document));
            display_details(formatter, document);
        }
    }

    display_skipped(formatter, &summary.skipped);

    if summary.load_errors + summary.invalid > 0 {
        formatter.warning(&format!(
            "{} document(s) failed to load ({} load error(s), {} invalid)",
            summary.load_errors + summary.invalid,
            summary.load_errors,
            summary.invalid
        ));
    }

    formatter.blank_line();
    formatter.success(&format!(
        "Loaded {}/{} document(s) in {:.2}s: {} pages",
        summary.loaded,
        summary.total,
        report.elapsed.as_secs_f64(),
        summary.total_pages
    ));
}

fn display_skipped(formatter: &OutputFormatter, skipped: &[SkippedEntry]) {
    for entry in skipped {
        formatter.warning(&format!("Skipped {entry}"));
    }
}

fn display_details(formatter: &OutputFormatter, document: &DescriptorSnapshot) {
    let Some(metadata) = &document.metadata else {
        return;
    };

    if let Some(version) = &metadata.version {
        formatter.detail("Version", version);
    }
    if let Some(size) = metadata.file_size {
        formatter.detail("Size", &format_file_size(size));
    }
    if let Some(objects) = metadata.object_count {
        formatter.detail("Objects", &objects.to_string());
    }
    if let Some((width, height)) = metadata.page_dimensions {
        formatter.detail("Page size", &format!("{width:.0} x {height:.0} pt"));
    }
}

/// One-line description of a document's final state.
pub fn describe(document: &DescriptorSnapshot) -> String {
    let path = document.path.display();
    match (document.status, &document.metadata, &document.failure) {
        (LoadStatus::Loaded, Some(metadata), _) => {
            let lock = if metadata.is_encrypted { ", encrypted" } else { "" };
            format!("{path} [{}] {} page(s){lock}", document.status, metadata.page_count)
        }
        (_, _, Some(failure)) => format!("{path} [{}] {failure}", document.status),
        _ => format!("{path} [{}]", document.status),
    }
}

/// Format file size in human-readable format.
pub fn format_file_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{size} bytes")
    }
}
