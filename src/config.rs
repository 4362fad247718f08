//! Configuration module for pdfload.
//!
//! [`LoadConfig`] holds the runtime knobs of the load pipeline: how many
//! documents may be opened at once and which metadata fields every load
//! reads at least.
//! The CLI builds one from its arguments; library users can start from
//! [`LoadConfig::default`].

use crate::error::{PdfLoadError, Result};
use crate::io::RequiredData;

/// Configuration of a load controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadConfig {
    /// Number of parallel load workers (None = auto-detect).
    pub workers: Option<usize>,

    /// Minimum metadata level of every load; a request may ask for more.
    pub required_data: RequiredData,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            workers: None,
            required_data: RequiredData::Default,
        }
    }
}

impl LoadConfig {
    /// Configuration with a fixed worker count.
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers: Some(workers),
            ..Self::default()
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker count is zero.
    pub fn validate(&self) -> Result<()> {
        if let Some(workers) = self.workers
            && workers == 0
        {
            return Err(PdfLoadError::invalid_config(
                "Number of workers must be at least 1",
            ));
        }

        Ok(())
    }

    /// Get the effective number of load workers.
    ///
    /// Returns the configured worker count, or the number of CPU cores if auto-detect.
    pub fn effective_workers(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}
