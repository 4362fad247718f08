//! Descriptor creation and deduplication.
//!
//! The factory turns raw candidates (literal paths or manifest records) into
//! descriptors in `CREATED`. Paths are canonicalized before use, so two
//! spellings of the same file collapse into one descriptor. The factory also
//! keeps a weak registry of live descriptors: asking for a path that still
//! has a live descriptor anywhere in the process returns that descriptor
//! instead of a new one. Registry entries die with the last batch holding
//! them, or earlier through [`DescriptorFactory::evict`].

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use super::DocumentDescriptor;

/// One raw input to descriptor creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    /// A path to resolve, with the manifest line it came from, if any.
    Path {
        /// Path as written by the caller or the manifest.
        path: PathBuf,
        /// 1-based manifest line.
        line: Option<usize>,
    },
    /// A manifest record that could not be turned into a path.
    Malformed {
        /// The record as read.
        raw: String,
        /// 1-based manifest line.
        line: usize,
        /// What is wrong with it.
        details: String,
    },
}

impl Candidate {
    /// Candidate for a literal path.
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path {
            path: path.into(),
            line: None,
        }
    }
}

/// Why a candidate produced no descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// The manifest record could not be parsed.
    Malformed {
        /// Parse diagnostic.
        details: String,
    },
    /// Nothing exists at the path.
    NotFound,
    /// The path exists but is not a regular file.
    NotAFile,
    /// The file exists but cannot be opened.
    Unreadable {
        /// Underlying I/O error message.
        message: String,
    },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { details } => write!(f, "malformed entry: {details}"),
            Self::NotFound => f.write_str("file not found"),
            Self::NotAFile => f.write_str("not a file"),
            Self::Unreadable { message } => write!(f, "unreadable: {message}"),
        }
    }
}

/// Per-entry diagnostic for a candidate that was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedEntry {
    /// The entry as given.
    pub source: String,
    /// 1-based manifest line, if the entry came from a manifest.
    pub line: Option<usize>,
    /// Why it was skipped.
    #[serde(flatten)]
    pub reason: SkipReason,
}

impl fmt::Display for SkippedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{} (line {}): {}", self.source, line, self.reason),
            None => write!(f, "{}: {}", self.source, self.reason),
        }
    }
}

/// Outcome of expanding a set of candidates.
#[derive(Debug, Default)]
pub struct Expansion {
    /// Resolved descriptors, deduplicated, in first-seen order.
    pub descriptors: Vec<Arc<DocumentDescriptor>>,
    /// Candidates that yielded no descriptor.
    pub skipped: Vec<SkippedEntry>,
}

impl Expansion {
    /// True when no candidate resolved.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Creates descriptors and tracks the live set by canonical path.
#[derive(Debug, Default)]
pub struct DescriptorFactory {
    live: Mutex<HashMap<PathBuf, Weak<DocumentDescriptor>>>,
}

impl DescriptorFactory {
    /// Create a factory with an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn live(&self) -> MutexGuard<'_, HashMap<PathBuf, Weak<DocumentDescriptor>>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve a path into a descriptor.
    ///
    /// Returns the live descriptor for the canonical path when one exists,
    /// otherwise a fresh one in `CREATED`.
    ///
    /// # Errors
    ///
    /// Returns the [`SkipReason`] when the path does not resolve to an
    /// existing, readable file.
    pub fn create(&self, path: &Path) -> Result<Arc<DocumentDescriptor>, SkipReason> {
        let canonical = resolve(path)?;

        let mut live = self.live();
        if let Some(existing) = live.get(&canonical).and_then(Weak::upgrade) {
            return Ok(existing);
        }

        live.retain(|_, descriptor| descriptor.strong_count() > 0);
        let descriptor = Arc::new(DocumentDescriptor::new(canonical.clone()));
        live.insert(canonical, Arc::downgrade(&descriptor));
        Ok(descriptor)
    }

    /// Resolve every candidate independently.
    ///
    /// A candidate that fails to resolve is recorded as skipped and the
    /// remaining candidates are still processed. Repeated paths are dropped
    /// silently after their first occurrence.
    pub fn expand<I>(&self, candidates: I) -> Expansion
    where
        I: IntoIterator<Item = Candidate>,
    {
        let mut expansion = Expansion::default();
        let mut seen = HashSet::new();

        for candidate in candidates {
            let (path, line) = match candidate {
                Candidate::Path { path, line } => (path, line),
                Candidate::Malformed { raw, line, details } => {
                    skip(&mut expansion, raw, Some(line), SkipReason::Malformed { details });
                    continue;
                }
            };

            match self.create(&path) {
                Ok(descriptor) => {
                    if seen.insert(descriptor.path().to_path_buf()) {
                        expansion.descriptors.push(descriptor);
                    }
                }
                Err(reason) => skip(&mut expansion, path.display().to_string(), line, reason),
            }
        }

        expansion
    }

    /// Live descriptor for `path`, without creating one.
    pub fn get(&self, path: &Path) -> Option<Arc<DocumentDescriptor>> {
        let key = path.canonicalize().ok()?;
        self.live().get(&key).and_then(Weak::upgrade)
    }

    /// Forget the live descriptor for `path`, if any.
    ///
    /// Batches still holding the descriptor keep it; later requests for the
    /// path get a fresh one. Returns whether an entry was removed.
    pub fn evict(&self, path: &Path) -> bool {
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.live().remove(&key).is_some()
    }

    /// Number of descriptors still alive somewhere in the process.
    pub fn live_count(&self) -> usize {
        self.live()
            .values()
            .filter(|descriptor| descriptor.strong_count() > 0)
            .count()
    }
}

fn skip(expansion: &mut Expansion, source: String, line: Option<usize>, reason: SkipReason) {
    tracing::warn!(%source, ?line, %reason, "skipping entry");
    expansion.skipped.push(SkippedEntry {
        source,
        line,
        reason,
    });
}

fn resolve(path: &Path) -> Result<PathBuf, SkipReason> {
    let canonical = path.canonicalize().map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => SkipReason::NotFound,
        _ => SkipReason::Unreadable {
            message: err.to_string(),
        },
    })?;

    if !canonical.is_file() {
        return Err(SkipReason::NotAFile);
    }

    File::open(&canonical).map_err(|err| SkipReason::Unreadable {
        message: err.to_string(),
    })?;

    Ok(canonical)
}
