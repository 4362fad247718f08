//! Integration tests for explicit retry and eviction.

use pdfload::LoadStatus;
use pdfload::error::PdfLoadError;
use pdfload::request::{LoadRequest, Owner};
use std::time::Duration;
use tempfile::TempDir;

use crate::common::{
    TrackingExtractor, completed, controller, controller_with, next_event, write_file, write_pdf,
};

#[tokio::test]
async fn test_resubmitting_loaded_document_does_not_reload() {
    let dir = TempDir::new().unwrap();
    let a = write_pdf(dir.path(), "a.pdf", 1);

    let extractor = TrackingExtractor::new(Duration::ZERO);
    let controller = controller_with(1, extractor.clone());

    for _ in 0..3 {
        let report = completed(
            controller
                .load(LoadRequest::paths("rotate", [&a]).unwrap())
                .await
                .unwrap(),
        );
        assert_eq!(report.descriptors[0].status(), LoadStatus::Loaded);
    }
    assert_eq!(extractor.calls(&a), 1);
}

#[tokio::test]
async fn test_retry_picks_up_repaired_document() {
    let dir = TempDir::new().unwrap();
    let a = write_pdf(dir.path(), "a.pdf", 1);

    let extractor = TrackingExtractor::new(Duration::ZERO);
    let controller = controller_with(1, extractor.clone());
    let first = completed(
        controller
            .load(LoadRequest::paths("merge", [&a]).unwrap())
            .await
            .unwrap(),
    );
    assert_eq!(first.descriptors[0].metadata().unwrap().page_count, 1);

    // Replace the document, then ask for a fresh read.
    write_pdf(dir.path(), "a.pdf", 5);
    let mut events = controller.subscribe(&Owner::new("merge").unwrap());
    let batch = controller.retry("merge", [&a]).unwrap();
    let retried = completed(next_event(&mut events).await);

    assert_eq!(retried.batch, batch);
    let descriptor = &retried.descriptors[0];
    assert_eq!(descriptor.status(), LoadStatus::Loaded);
    assert_eq!(descriptor.metadata().unwrap().page_count, 5);
    assert_eq!(descriptor.attempt(), 2);
    assert_eq!(
        descriptor.history(),
        vec![
            LoadStatus::Created,
            LoadStatus::Requested,
            LoadStatus::Loading,
            LoadStatus::Loaded,
            LoadStatus::Requested,
            LoadStatus::Loading,
            LoadStatus::Loaded,
        ]
    );
    assert_eq!(extractor.calls(&a), 2);
}

#[tokio::test]
async fn test_retry_rejects_invalid_and_unknown_documents() {
    let dir = TempDir::new().unwrap();
    let broken = write_file(dir.path(), "broken.pdf", b"definitely not a pdf");
    let never = write_pdf(dir.path(), "never.pdf", 1);

    let controller = controller(1);
    let report = completed(
        controller
            .load(LoadRequest::paths("split", [&broken]).unwrap())
            .await
            .unwrap(),
    );
    assert_eq!(report.descriptors[0].status(), LoadStatus::Invalid);

    assert!(matches!(
        controller.retry("split", [&broken]),
        Err(PdfLoadError::RetryRejected {
            status: LoadStatus::Invalid,
            ..
        })
    ));
    assert!(matches!(
        controller.retry("split", [&never]),
        Err(PdfLoadError::RetryRejected { .. })
    ));
    assert!(matches!(
        controller.retry("  ", [&broken]),
        Err(PdfLoadError::BlankOwner)
    ));
    assert_eq!(report.descriptors[0].attempt(), 1);
}

#[tokio::test]
async fn test_retry_while_loading_is_rejected() {
    let dir = TempDir::new().unwrap();
    let a = write_pdf(dir.path(), "a.pdf", 1);

    let extractor = TrackingExtractor::gated();
    let controller = controller_with(1, extractor.clone());
    let mut events = controller.subscribe(&Owner::new("rotate").unwrap());
    controller
        .submit(LoadRequest::paths("rotate", [&a]).unwrap())
        .unwrap();
    extractor.wait_for_calls(1).await;

    assert!(matches!(
        controller.retry("rotate", [&a]),
        Err(PdfLoadError::RetryRejected {
            status: LoadStatus::Loading,
            ..
        })
    ));

    extractor.open();
    completed(next_event(&mut events).await);
}

#[tokio::test]
async fn test_evicted_path_gets_a_fresh_descriptor() {
    let dir = TempDir::new().unwrap();
    let a = write_pdf(dir.path(), "a.pdf", 1);

    let extractor = TrackingExtractor::new(Duration::ZERO);
    let controller = controller_with(1, extractor.clone());
    let first = completed(
        controller
            .load(LoadRequest::paths("rotate", [&a]).unwrap())
            .await
            .unwrap(),
    );

    assert!(controller.evict(&a).await.unwrap());
    let second = completed(
        controller
            .load(LoadRequest::paths("rotate", [&a]).unwrap())
            .await
            .unwrap(),
    );

    assert!(!std::sync::Arc::ptr_eq(
        &first.descriptors[0],
        &second.descriptors[0]
    ));
    assert_eq!(second.descriptors[0].attempt(), 1);
    assert_eq!(extractor.calls(&a), 2);
    // The old batch keeps its own descriptor.
    assert_eq!(first.descriptors[0].status(), LoadStatus::Loaded);
}

#[tokio::test]
async fn test_retry_reads_as_much_as_the_first_load() {
    let dir = TempDir::new().unwrap();
    let a = write_pdf(dir.path(), "a.pdf", 1);

    let controller = controller(1);
    let request = LoadRequest::paths("merge", [&a])
        .unwrap()
        .with_required_data(pdfload::RequiredData::Full);
    let first = completed(controller.load(request).await.unwrap());
    assert!(first.descriptors[0].metadata().unwrap().version.is_some());

    let mut events = controller.subscribe(&Owner::new("merge").unwrap());
    controller.retry("merge", [&a]).unwrap();
    let retried = completed(next_event(&mut events).await);

    let metadata = retried.descriptors[0].metadata().unwrap();
    assert_eq!(retried.descriptors[0].attempt(), 2);
    assert_eq!(metadata.version.as_deref(), Some("1.7"));
    assert!(metadata.file_size.is_some());
    assert_eq!(metadata.page_dimensions, Some((612.0, 792.0)));
}
