//! Tracked document descriptors.
//!
//! A [`DocumentDescriptor`] represents one candidate document and its load
//! status. Descriptors are shared as `Arc<DocumentDescriptor>` between the
//! controller, the load service workers and whoever inspects a batch;
//! consumers only ever get read access. Status changes go through the
//! crate-private transition methods, which enforce the state machine in
//! [`status`] and keep `metadata` present if and only if the status is
//! [`LoadStatus::Loaded`].

pub mod factory;
pub mod status;

pub use factory::{Candidate, DescriptorFactory, Expansion, SkipReason, SkippedEntry};
pub use status::LoadStatus;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{PdfLoadError, Result};
use crate::io::{ExtractError, PdfMetadata, RequiredData};

/// Category of a per-descriptor load failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Not a recognizable document. Maps to [`LoadStatus::Invalid`].
    Invalid,
    /// The file could not be read. Maps to [`LoadStatus::LoadError`].
    Io,
    /// The document is protected. Maps to [`LoadStatus::LoadError`].
    Encrypted,
}

/// Failure detail kept on a descriptor in `LOAD_ERROR` or `INVALID`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadFailure {
    /// Failure category.
    pub kind: FailureKind,
    /// Human readable reason.
    pub message: String,
}

impl LoadFailure {
    /// Create a failure of the given kind.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Terminal status this failure leads to.
    pub fn status(&self) -> LoadStatus {
        match self.kind {
            FailureKind::Invalid => LoadStatus::Invalid,
            FailureKind::Io | FailureKind::Encrypted => LoadStatus::LoadError,
        }
    }

    /// Whether a later retry may succeed.
    pub fn is_retryable(&self) -> bool {
        self.status() == LoadStatus::LoadError
    }
}

impl From<&ExtractError> for LoadFailure {
    fn from(err: &ExtractError) -> Self {
        let kind = match err {
            ExtractError::InvalidFormat { .. } => FailureKind::Invalid,
            ExtractError::Encrypted { .. } => FailureKind::Encrypted,
            ExtractError::Io { .. } => FailureKind::Io,
        };
        Self::new(kind, err.to_string())
    }
}

impl fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug)]
struct DescriptorState {
    status: LoadStatus,
    metadata: Option<PdfMetadata>,
    failure: Option<LoadFailure>,
    attempt: u32,
    required: Option<RequiredData>,
    history: Vec<LoadStatus>,
}

/// One candidate document and its current load status.
#[derive(Debug)]
pub struct DocumentDescriptor {
    path: PathBuf,
    state: Mutex<DescriptorState>,
}

impl DocumentDescriptor {
    /// Create a descriptor in [`LoadStatus::Created`] for a canonical path.
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            path,
            state: Mutex::new(DescriptorState {
                status: LoadStatus::Created,
                metadata: None,
                failure: None,
                attempt: 0,
                required: None,
                history: vec![LoadStatus::Created],
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, DescriptorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Canonical path of the document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current status.
    pub fn status(&self) -> LoadStatus {
        self.state().status
    }

    /// Metadata, present only while the status is `LOADED`.
    pub fn metadata(&self) -> Option<PdfMetadata> {
        self.state().metadata.clone()
    }

    /// Failure detail, present only while the status is `LOAD_ERROR` or `INVALID`.
    pub fn failure(&self) -> Option<LoadFailure> {
        self.state().failure.clone()
    }

    /// Number of times the descriptor entered `REQUESTED`.
    pub fn attempt(&self) -> u32 {
        self.state().attempt
    }

    /// Metadata level of the most recent load, `None` before the first one
    /// starts.
    pub fn required_data(&self) -> Option<RequiredData> {
        self.state().required
    }

    /// Every status the descriptor has been in, oldest first.
    pub fn history(&self) -> Vec<LoadStatus> {
        self.state().history.clone()
    }

    /// Point-in-time copy of the descriptor, suitable for reports.
    pub fn snapshot(&self) -> DescriptorSnapshot {
        let state = self.state();
        DescriptorSnapshot {
            path: self.path.clone(),
            status: state.status,
            metadata: state.metadata.clone(),
            failure: state.failure.clone(),
        }
    }

    /// Move to `next`, which must not be a terminal status.
    ///
    /// Terminal statuses carry data and are reached through
    /// [`complete`](Self::complete) and [`fail`](Self::fail).
    ///
    /// # Errors
    ///
    /// Returns [`PdfLoadError::IllegalTransition`] when the state machine
    /// forbids the move or `next` is terminal.
    pub(crate) fn move_status_to(&self, next: LoadStatus) -> Result<()> {
        let mut state = self.state();
        if next.is_terminal() {
            return Err(self.illegal(state.status, next));
        }
        self.transition(&mut state, next)?;
        if next == LoadStatus::Requested {
            state.attempt += 1;
            state.metadata = None;
            state.failure = None;
        }
        Ok(())
    }

    /// Move `REQUESTED -> LOADING`, remembering which fields this load reads.
    pub(crate) fn start_loading(&self, required: RequiredData) -> Result<()> {
        let mut state = self.state();
        self.transition(&mut state, LoadStatus::Loading)?;
        state.required = Some(required);
        Ok(())
    }

    /// Move `LOADING -> LOADED`, storing the metadata.
    pub(crate) fn complete(&self, metadata: PdfMetadata) -> Result<()> {
        let mut state = self.state();
        self.transition(&mut state, LoadStatus::Loaded)?;
        state.metadata = Some(metadata);
        Ok(())
    }

    /// Move `LOADING -> LOAD_ERROR | INVALID` depending on the failure kind.
    pub(crate) fn fail(&self, failure: LoadFailure) -> Result<()> {
        let mut state = self.state();
        self.transition(&mut state, failure.status())?;
        state.failure = Some(failure);
        Ok(())
    }

    /// Like [`move_status_to`](Self::move_status_to) but treats an illegal
    /// move as the invariant violation it is.
    pub(crate) fn advance(&self, next: LoadStatus) {
        if let Err(err) = self.move_status_to(next) {
            panic!("descriptor state machine violated: {err}");
        }
    }

    fn transition(&self, state: &mut DescriptorState, next: LoadStatus) -> Result<()> {
        if !state.status.can_move_to(next) {
            return Err(self.illegal(state.status, next));
        }
        tracing::debug!(path = %self.path.display(), from = %state.status, to = %next, "status transition");
        state.status = next;
        state.history.push(next);
        Ok(())
    }

    fn illegal(&self, from: LoadStatus, to: LoadStatus) -> PdfLoadError {
        PdfLoadError::IllegalTransition {
            path: self.path.clone(),
            from,
            to,
        }
    }
}

/// Serializable copy of a descriptor at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptorSnapshot {
    /// Canonical path of the document.
    pub path: PathBuf,
    /// Status at snapshot time.
    pub status: LoadStatus,
    /// Metadata, if loaded.
    pub metadata: Option<PdfMetadata>,
    /// Failure detail, if failed.
    pub failure: Option<LoadFailure>,
}
