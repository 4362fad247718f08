//! PDF list (manifest) files.
//!
//! A manifest is a UTF-8 text file naming one document per record. Records
//! are CSV compatible: only the first column is used, and it may be quoted.
//! Blank lines and lines starting with `#` are ignored. Relative paths are
//! resolved against the directory holding the manifest.
//!
//! ```text
//! # chapters to load
//! intro.pdf
//! "chapter, one.pdf",draft
//! /archive/appendix.pdf,final,2019
//! ```
//!
//! Reading the manifest is all-or-nothing only at the file level: if the file
//! itself cannot be read the whole submission fails, but a bad record only
//! turns into a [`Candidate::Malformed`] that is skipped later on.

use std::path::{Path, PathBuf};

use crate::descriptor::Candidate;
use crate::error::{PdfLoadError, Result};

/// Turns a manifest file into descriptor candidates.
pub trait ManifestReader: Send + Sync + 'static {
    /// Read every record of the manifest at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`PdfLoadError::ManifestUnreadable`] if the file cannot be read.
    fn parse(&self, path: &Path) -> Result<Vec<Candidate>>;
}

/// Default reader for text/CSV PDF lists.
#[derive(Debug, Clone, Default)]
pub struct ListFileReader;

impl ListFileReader {
    /// Create a new reader.
    pub fn new() -> Self {
        Self
    }
}

impl ManifestReader for ListFileReader {
    fn parse(&self, path: &Path) -> Result<Vec<Candidate>> {
        let bytes = std::fs::read(path)
            .map_err(|err| PdfLoadError::manifest_unreadable(path.to_path_buf(), err))?;
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();

        let mut candidates = Vec::new();
        for (index, raw_line) in bytes.split(|byte| *byte == b'\n').enumerate() {
            let line_number = index + 1;

            let Ok(line) = std::str::from_utf8(raw_line) else {
                candidates.push(Candidate::Malformed {
                    raw: String::from_utf8_lossy(raw_line).into_owned(),
                    line: line_number,
                    details: "not valid UTF-8".to_string(),
                });
                continue;
            };

            let line = line.trim_start_matches('\u{feff}').trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let candidate = match first_column(line) {
                Ok(value) => Candidate::Path {
                    path: resolve_relative(&base, value),
                    line: Some(line_number),
                },
                Err(details) => Candidate::Malformed {
                    raw: line.to_string(),
                    line: line_number,
                    details: details.to_string(),
                },
            };
            candidates.push(candidate);
        }

        tracing::trace!(manifest = %path.display(), records = candidates.len(), "manifest parsed");
        Ok(candidates)
    }
}

/// Extract the first CSV column of a record.
fn first_column(line: &str) -> std::result::Result<String, &'static str> {
    let value = if let Some(rest) = line.strip_prefix('"') {
        let mut value = String::new();
        let mut chars = rest.chars().peekable();
        let mut closed = false;

        while let Some(c) = chars.next() {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    value.push('"');
                    chars.next();
                } else {
                    closed = true;
                    break;
                }
            } else {
                value.push(c);
            }
        }

        if !closed {
            return Err("unterminated quoted field");
        }
        match chars.next() {
            None | Some(',') => {}
            Some(_) => return Err("unexpected characters after quoted field"),
        }
        value
    } else {
        line.split(',').next().unwrap_or_default().to_string()
    };

    let value = value.trim();
    if value.is_empty() {
        return Err("empty path");
    }
    Ok(value.to_string())
}

fn resolve_relative(base: &Path, value: String) -> PathBuf {
    let path = PathBuf::from(value);
    if path.is_relative() {
        base.join(path)
    } else {
        path
    }
}
