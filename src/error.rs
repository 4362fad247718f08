//! Error types for pdfload.
//!
//! Only two kinds of failure ever escape to a caller: malformed input at
//! submission time and an unreadable manifest. Everything below the batch
//! level (a bad manifest line, a corrupt document) is absorbed into the
//! state of the affected descriptor and reported through the completion
//! notification instead.
//!
//! # Error Categories
//!
//! - **Construction errors**: blank owner, empty source list
//! - **Manifest errors**: the manifest file could not be read
//! - **State errors**: illegal status transitions, rejected retries
//! - **Runtime errors**: the controller has been shut down

use std::io;
use std::path::PathBuf;

use crate::descriptor::LoadStatus;

/// Result type alias for pdfload operations.
pub type Result<T> = std::result::Result<T, PdfLoadError>;

/// Main error type for pdfload operations.
#[derive(Debug, thiserror::Error)]
pub enum PdfLoadError {
    /// A load request was built with a blank owner.
    #[error("Load request owner cannot be blank")]
    BlankOwner,

    /// A load request was built without any source.
    #[error("Load request must name at least one source")]
    NoSources,

    /// The manifest file could not be opened or read.
    #[error("Unable to read PDF list file: {}\n  Reason: {source}", .path.display())]
    ManifestUnreadable {
        /// Path to the manifest.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A descriptor was asked to take a transition the state machine forbids.
    #[error("Illegal status transition {from} -> {to} for {}", .path.display())]
    IllegalTransition {
        /// Path of the descriptor.
        path: PathBuf,
        /// Current status.
        from: LoadStatus,
        /// Requested status.
        to: LoadStatus,
    },

    /// A retry was requested for a descriptor that cannot be retried.
    #[error("Cannot retry {} while it is {status}", .path.display())]
    RetryRejected {
        /// Path of the descriptor.
        path: PathBuf,
        /// Status the descriptor was in.
        status: LoadStatus,
    },

    /// The controller no longer accepts requests.
    #[error("Load controller has been shut down")]
    ControllerClosed,

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Description of what's wrong with the configuration.
        message: String,
    },

    /// Generic I/O error.
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error.
        #[from]
        source: io::Error,
    },
}

impl PdfLoadError {
    /// Create a ManifestUnreadable error.
    pub fn manifest_unreadable(path: PathBuf, source: io::Error) -> Self {
        Self::ManifestUnreadable { path, source }
    }

    /// Create an InvalidConfig error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Construction errors are caller bugs reported synchronously at submit time.
    pub fn is_construction_error(&self) -> bool {
        matches!(self, Self::BlankOwner | Self::NoSources)
    }

    /// Get the exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::BlankOwner => 1,
            Self::NoSources => 1,
            Self::InvalidConfig { .. } => 1,
            Self::ManifestUnreadable { .. } => 2,
            Self::IllegalTransition { .. } => 70,
            Self::RetryRejected { .. } => 1,
            Self::ControllerClosed => 70,
            Self::Io { .. } => 5,
        }
    }
}
