//! Command line input helpers.

use std::path::PathBuf;

use crate::error::{PdfLoadError, Result};

/// Expand glob patterns into paths, keeping their order.
///
/// Arguments without glob metacharacters, and patterns that match nothing,
/// are passed through unchanged so that the load pipeline can report them
/// as skipped entries instead of dropping them silently.
///
/// # Errors
///
/// Returns [`PdfLoadError::InvalidConfig`] for a malformed pattern.
pub fn collect_paths_for_patterns<T>(patterns: T) -> Result<Vec<PathBuf>>
where
    T: IntoIterator,
    T::Item: AsRef<str>,
{
    let mut resolved_paths = Vec::new();

    for pattern in patterns {
        resolved_paths.extend(collect_paths_for_pattern(pattern.as_ref())?);
    }

    Ok(resolved_paths)
}

fn collect_paths_for_pattern(pattern: &str) -> Result<Vec<PathBuf>> {
    if !is_glob(pattern) {
        return Ok(vec![PathBuf::from(pattern)]);
    }

    let paths = glob::glob(pattern)
        .map_err(|err| PdfLoadError::invalid_config(format!("Invalid pattern {pattern}: {err}")))?;

    let mut resolved_paths = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) => resolved_paths.push(path),
            Err(err) => tracing::warn!(%pattern, error = %err, "unreadable glob match"),
        }
    }

    if resolved_paths.is_empty() {
        tracing::debug!(%pattern, "pattern matched nothing");
        resolved_paths.push(PathBuf::from(pattern));
    }
    resolved_paths.sort();

    Ok(resolved_paths)
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}
