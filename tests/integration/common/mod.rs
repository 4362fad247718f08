//! Shared helpers for the integration suite.
//!
//! Fixtures are generated on the fly into temporary directories so the suite
//! needs no checked-in PDFs.

#![allow(dead_code)]

use lopdf::{Document, Object, Stream, dictionary};
use pdfload::config::LoadConfig;
use pdfload::controller::LoadController;
use pdfload::events::{EventStream, LoadEvent, LoadReport};
use pdfload::io::{ExtractError, MetadataExtractor, PdfExtractor, PdfMetadata, RequiredData};
use pdfload::manifest::ListFileReader;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// How long a test waits for a notification before failing.
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Write a minimal valid PDF with `pages` empty pages.
pub fn write_pdf(dir: &Path, name: &str, pages: usize) -> PathBuf {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let kids: Vec<Object> = (0..pages)
        .map(|_| {
            let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            Object::Reference(page_id)
        })
        .collect();

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let path = dir.join(name);
    doc.save(&path).expect("Failed to write PDF fixture");
    path
}

/// Write arbitrary bytes, e.g. a file that only pretends to be a PDF.
pub fn write_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("Failed to write fixture");
    path
}

/// Write a manifest with one record per line.
pub fn write_manifest(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
    let mut contents = lines.join("\n");
    contents.push('\n');
    write_file(dir, name, contents.as_bytes())
}

/// Controller backed by the real extractor.
pub fn controller(workers: usize) -> LoadController {
    LoadController::new(LoadConfig::with_workers(workers)).expect("Failed to start controller")
}

/// Controller backed by a custom extractor.
pub fn controller_with(workers: usize, extractor: Arc<dyn MetadataExtractor>) -> LoadController {
    LoadController::with_collaborators(
        LoadConfig::with_workers(workers),
        extractor,
        Arc::new(ListFileReader::new()),
    )
    .expect("Failed to start controller")
}

/// Receive the next notification or fail the test.
pub async fn next_event(stream: &mut EventStream) -> LoadEvent {
    tokio::time::timeout(SETTLE_TIMEOUT, stream.next())
        .await
        .expect("No notification in time")
        .expect("Event bus closed")
}

/// Unwrap a completion notification.
pub fn completed(event: LoadEvent) -> LoadReport {
    match event {
        LoadEvent::Completed(report) => report,
        other => panic!("Expected a completion, got {other:?}"),
    }
}

/// Real extractor wrapped with call accounting and an optional gate.
///
/// Records how often each path was extracted, the highest number of
/// simultaneous extractions, and whether any path was ever extracted by
/// two workers at once.
pub struct TrackingExtractor {
    inner: PdfExtractor,
    calls: Mutex<HashMap<PathBuf, usize>>,
    active_paths: Mutex<HashMap<PathBuf, usize>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    overlapping: AtomicUsize,
    open: Mutex<bool>,
    opened: Condvar,
    delay: Duration,
}

impl TrackingExtractor {
    /// Extractor that runs immediately, pausing `delay` per document.
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self::build(true, delay))
    }

    /// Extractor that blocks every call until [`open`](Self::open).
    pub fn gated() -> Arc<Self> {
        Arc::new(Self::build(false, Duration::ZERO))
    }

    fn build(open: bool, delay: Duration) -> Self {
        Self {
            inner: PdfExtractor::new(),
            calls: Mutex::new(HashMap::new()),
            active_paths: Mutex::new(HashMap::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            overlapping: AtomicUsize::new(0),
            open: Mutex::new(open),
            opened: Condvar::new(),
            delay,
        }
    }

    /// Release every blocked and future call.
    pub fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.opened.notify_all();
    }

    /// Number of extractions of `path`.
    pub fn calls(&self, path: &Path) -> usize {
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.calls.lock().unwrap().get(&key).copied().unwrap_or(0)
    }

    /// Number of extractions across all paths.
    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    /// Highest number of simultaneous extractions observed.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Number of times a path was entered while already being extracted.
    pub fn overlapping(&self) -> usize {
        self.overlapping.load(Ordering::SeqCst)
    }

    /// Wait until at least `expected` extractions have started.
    pub async fn wait_for_calls(&self, expected: usize) {
        tokio::time::timeout(SETTLE_TIMEOUT, async {
            while self.total_calls() < expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("Extractor was not reached");
    }
}

impl MetadataExtractor for TrackingExtractor {
    fn extract(&self, path: &Path, required: RequiredData) -> Result<PdfMetadata, ExtractError> {
        *self.calls.lock().unwrap().entry(path.to_path_buf()).or_default() += 1;
        {
            let mut active_paths = self.active_paths.lock().unwrap();
            let count = active_paths.entry(path.to_path_buf()).or_default();
            if *count > 0 {
                self.overlapping.fetch_add(1, Ordering::SeqCst);
            }
            *count += 1;
        }
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        {
            let mut open = self.open.lock().unwrap();
            while !*open {
                open = self.opened.wait(open).unwrap();
            }
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let result = self.inner.extract(path, required);

        self.active.fetch_sub(1, Ordering::SeqCst);
        *self.active_paths.lock().unwrap().get_mut(path).unwrap() -= 1;
        result
    }
}
