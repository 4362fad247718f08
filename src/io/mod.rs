//! Document I/O.
//!
//! Reading is the only I/O the pipeline does on documents: metadata is
//! extracted through the [`MetadataExtractor`] seam and nothing is ever
//! written back.

pub mod extractor;

pub use extractor::{ExtractError, MetadataExtractor, PdfExtractor, PdfMetadata, RequiredData};
