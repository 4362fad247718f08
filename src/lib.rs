//! pdfload - Load batches of PDF documents concurrently.
//!
//! This library turns a set of candidate documents (literal paths or a
//! text/CSV manifest) into status-tracked descriptors whose metadata is
//! loaded in parallel. It supports:
//!
//! - Deduplication by canonical path, within and across batches
//! - A checked per-document status state machine
//! - Bounded concurrent loading with at most one load per path
//! - Partial-failure tolerance: bad entries are skipped, bad documents are
//!   marked, the batch still settles
//! - Exactly one owner-scoped notification per submitted request
//!
//! # Examples
//!
//! ```no_run
//! use pdfload::config::LoadConfig;
//! use pdfload::controller::LoadController;
//! use pdfload::events::LoadEvent;
//! use pdfload::request::{LoadRequest, Owner};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let controller = LoadController::new(LoadConfig::default())?;
//! let mut events = controller.subscribe(&Owner::new("rotate")?);
//!
//! let batch = controller.submit(LoadRequest::paths("rotate", ["a.pdf", "b.pdf"])?)?;
//!
//! if let Some(LoadEvent::Completed(report)) = events.next().await {
//!     assert_eq!(report.batch, batch);
//!     for descriptor in report.succeeded() {
//!         println!("{}: {:?}", descriptor.path().display(), descriptor.metadata());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod config;
pub mod controller;
pub mod descriptor;
pub mod error;
pub mod events;
pub mod io;
pub mod manifest;
pub mod output;
pub mod request;
pub mod service;
pub(crate) mod utils;

// Re-export commonly used types
pub use config::LoadConfig;
pub use controller::{Batch, LoadController};
pub use descriptor::{DescriptorFactory, DocumentDescriptor, LoadStatus};
pub use error::{PdfLoadError, Result};
pub use events::{BatchId, EventBus, LoadEvent, LoadReport};
pub use io::{PdfMetadata, RequiredData};
pub use request::{LoadRequest, Owner, Source};
pub use service::{LoadService, ShutdownMode};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
