//! Load requests.
//!
//! A [`LoadRequest`] names the subsystem that wants documents loaded (its
//! [`Owner`]) and where the documents come from. Requests are validated when
//! they are built, so a request that exists is always well formed: the owner
//! is not blank and there is at least one source.
//!
//! # Examples
//!
//! ```
//! use pdfload::request::{LoadRequest, Source};
//!
//! let request = LoadRequest::paths("rotate", ["a.pdf", "b.pdf"]).unwrap();
//! assert_eq!(request.owner().as_str(), "rotate");
//! assert_eq!(request.sources().len(), 2);
//!
//! assert!(LoadRequest::paths("  ", ["a.pdf"]).is_err());
//! assert!(LoadRequest::new("merge", Vec::<Source>::new()).is_err());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::error::{PdfLoadError, Result};
use crate::io::RequiredData;

/// Identifier of the subsystem a request and its notification belong to.
///
/// Used only as a routing key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Owner(String);

impl Owner {
    /// Create an owner from a non-blank identifier.
    ///
    /// # Errors
    ///
    /// Returns [`PdfLoadError::BlankOwner`] if `id` is empty or whitespace.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(PdfLoadError::BlankOwner);
        }
        Ok(Self(id))
    }

    /// The identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Owner {
    type Error = PdfLoadError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Owner> for String {
    fn from(owner: Owner) -> Self {
        owner.0
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where documents of a request come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A literal document path.
    Path(PathBuf),
    /// A text/CSV manifest to expand into document paths.
    Manifest(PathBuf),
}

/// Immutable request to load a set of documents for an owner.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    owner: Owner,
    sources: Vec<Source>,
    required_data: RequiredData,
}

impl LoadRequest {
    /// Build a request from an owner and an ordered list of sources.
    ///
    /// # Errors
    ///
    /// Returns [`PdfLoadError::BlankOwner`] for a blank owner and
    /// [`PdfLoadError::NoSources`] for an empty source list.
    pub fn new(owner: impl Into<String>, sources: Vec<Source>) -> Result<Self> {
        let owner = Owner::new(owner)?;
        if sources.is_empty() {
            return Err(PdfLoadError::NoSources);
        }
        Ok(Self {
            owner,
            sources,
            required_data: RequiredData::default(),
        })
    }

    /// Build a request for literal document paths.
    ///
    /// # Errors
    ///
    /// Same as [`LoadRequest::new`].
    pub fn paths<I, P>(owner: impl Into<String>, paths: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let sources = paths
            .into_iter()
            .map(|path| Source::Path(path.into()))
            .collect();
        Self::new(owner, sources)
    }

    /// Build a request that loads every document listed in a manifest.
    ///
    /// # Errors
    ///
    /// Returns [`PdfLoadError::BlankOwner`] for a blank owner.
    pub fn manifest(owner: impl Into<String>, manifest: impl Into<PathBuf>) -> Result<Self> {
        Self::new(owner, vec![Source::Manifest(manifest.into())])
    }

    /// Set which metadata fields the load must produce.
    pub fn with_required_data(mut self, required_data: RequiredData) -> Self {
        self.required_data = required_data;
        self
    }

    /// Owner of the request.
    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    /// Sources, in the order given.
    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// Metadata fields the load must produce.
    pub fn required_data(&self) -> RequiredData {
        self.required_data
    }
}
