//! PDF metadata extraction.
//!
//! The [`MetadataExtractor`] trait is the seam between the load pipeline and
//! whatever actually opens documents. [`PdfExtractor`] is the `lopdf` backed
//! implementation used in production; tests substitute scripted doubles.
//!
//! # Examples
//!
//! ```no_run
//! use pdfload::io::{MetadataExtractor, PdfExtractor, RequiredData};
//! use std::path::Path;
//!
//! let extractor = PdfExtractor::new();
//! let metadata = extractor.extract(Path::new("document.pdf"), RequiredData::Full)?;
//! println!("{} pages", metadata.page_count);
//! # Ok::<(), pdfload::io::ExtractError>(())
//! ```

use lopdf::{Document, Object};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Which metadata fields a load must produce.
///
/// Levels are ordered: `Full` reads everything `Default` reads.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RequiredData {
    /// Page count and encryption state only.
    #[default]
    Default,
    /// Everything in `Default` plus version, size, object count and page size.
    Full,
}

/// Metadata read from a PDF document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfMetadata {
    /// Number of pages in the document.
    pub page_count: usize,

    /// Whether the document carries an encryption dictionary.
    pub is_encrypted: bool,

    /// PDF version, e.g. `"1.7"`. Only with [`RequiredData::Full`].
    pub version: Option<String>,

    /// Size of the file in bytes. Only with [`RequiredData::Full`].
    pub file_size: Option<u64>,

    /// Number of objects in the document. Only with [`RequiredData::Full`].
    pub object_count: Option<usize>,

    /// First page dimensions (width, height) in points. Only with [`RequiredData::Full`].
    pub page_dimensions: Option<(f32, f32)>,
}

impl PdfMetadata {
    /// Minimal metadata with the given page count and no optional fields.
    pub fn with_pages(page_count: usize) -> Self {
        Self {
            page_count,
            is_encrypted: false,
            version: None,
            file_size: None,
            object_count: None,
            page_dimensions: None,
        }
    }

    fn from_document(doc: &Document, file_size: u64, required: RequiredData) -> Self {
        let pages = doc.get_pages();
        let mut metadata = Self::with_pages(pages.len());
        metadata.is_encrypted = doc.trailer.get(b"Encrypt").is_ok();

        if required == RequiredData::Full {
            metadata.version = Some(doc.version.clone());
            metadata.file_size = Some(file_size);
            metadata.object_count = Some(doc.objects.len());
            metadata.page_dimensions = pages
                .values()
                .next()
                .and_then(|page_id| first_page_dimensions(doc, *page_id));
        }

        metadata
    }
}

/// Page tree depth beyond which the `MediaBox` lookup gives up.
const MAX_TREE_DEPTH: usize = 32;

fn first_page_dimensions(doc: &Document, page_id: lopdf::ObjectId) -> Option<(f32, f32)> {
    let mut node = doc.get_dictionary(page_id).ok()?;

    // MediaBox is inheritable from the page tree.
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(mediabox) = node.get(b"MediaBox").and_then(Object::as_array) {
            let [x0, y0, x1, y1] = mediabox.as_slice() else {
                return None;
            };
            let width = x1.as_float().ok()? - x0.as_float().ok()?;
            let height = y1.as_float().ok()? - y0.as_float().ok()?;
            return Some((width.abs(), height.abs()));
        }
        let parent = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }

    None
}

/// Why a metadata read failed.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// The file is not a usable PDF (bad header, broken structure, no pages).
    #[error("Not a valid PDF document: {reason}")]
    InvalidFormat {
        /// Parser diagnostic.
        reason: String,
    },

    /// The document is protected and could not be opened.
    #[error("PDF is encrypted and cannot be opened: {reason}")]
    Encrypted {
        /// Parser diagnostic.
        reason: String,
    },

    /// The file could not be read.
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error.
        #[from]
        source: io::Error,
    },
}

impl ExtractError {
    /// Create an InvalidFormat error.
    pub fn invalid_format(reason: impl Into<String>) -> Self {
        Self::InvalidFormat {
            reason: reason.into(),
        }
    }

    fn from_lopdf(err: lopdf::Error) -> Self {
        if let lopdf::Error::IO(source) = err {
            return Self::Io { source };
        }

        let reason = err.to_string();
        let lowered = reason.to_lowercase();
        if lowered.contains("encrypt") || lowered.contains("password") {
            Self::Encrypted { reason }
        } else {
            Self::InvalidFormat { reason }
        }
    }
}

/// Reads document metadata from a path.
///
/// Implementations run on blocking worker threads and must release every
/// resource they acquire before returning, on success and on failure.
pub trait MetadataExtractor: Send + Sync + 'static {
    /// Extract the metadata of the document at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::InvalidFormat`] or [`ExtractError::Encrypted`]
    /// when the file is not a usable document, and [`ExtractError::Io`] when
    /// it could not be read.
    fn extract(&self, path: &Path, required: RequiredData) -> Result<PdfMetadata, ExtractError>;
}

/// `lopdf` backed metadata extractor.
#[derive(Debug, Clone, Default)]
pub struct PdfExtractor;

impl PdfExtractor {
    /// Create a new extractor.
    pub fn new() -> Self {
        Self
    }
}

impl MetadataExtractor for PdfExtractor {
    fn extract(&self, path: &Path, required: RequiredData) -> Result<PdfMetadata, ExtractError> {
        // The handle lives only inside this block.
        let buffer = {
            let mut file = File::open(path)?;
            let mut buffer = Vec::new();
            file.read_to_end(&mut buffer)?;
            buffer
        };

        if buffer.is_empty() {
            return Err(ExtractError::invalid_format("File is empty"));
        }

        let doc = Document::load_mem(&buffer).map_err(ExtractError::from_lopdf)?;
        let metadata = PdfMetadata::from_document(&doc, buffer.len() as u64, required);

        if metadata.page_count == 0 {
            return Err(ExtractError::invalid_format("PDF has no pages"));
        }

        Ok(metadata)
    }
}
