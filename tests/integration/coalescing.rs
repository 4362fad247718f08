//! Integration tests for concurrent requests naming the same documents.

use pdfload::LoadStatus;
use pdfload::request::{LoadRequest, Owner};
use pdfload::service::ShutdownMode;
use std::sync::Arc;
use tempfile::TempDir;

use crate::common::{TrackingExtractor, completed, controller_with, next_event, write_pdf};

#[tokio::test]
async fn test_same_path_in_flight_is_loaded_once() {
    let dir = TempDir::new().unwrap();
    let shared = write_pdf(dir.path(), "shared.pdf", 4);
    let own = write_pdf(dir.path(), "own.pdf", 1);

    let extractor = TrackingExtractor::gated();
    let controller = controller_with(4, extractor.clone());
    let owner = Owner::new("rotate").unwrap();
    let mut events = controller.subscribe(&owner);

    let first = controller
        .submit(LoadRequest::paths("rotate", [&shared]).unwrap())
        .unwrap();
    extractor.wait_for_calls(1).await;

    // Second spelling of the same file while the first load is blocked.
    let spelled = dir.path().join(".").join("shared.pdf");
    let second = controller
        .submit(LoadRequest::paths("rotate", [&spelled, &own]).unwrap())
        .unwrap();
    extractor.wait_for_calls(2).await;

    extractor.open();

    let mut reports = vec![
        completed(next_event(&mut events).await),
        completed(next_event(&mut events).await),
    ];
    reports.sort_by_key(|report| report.batch);

    assert_eq!(reports[0].batch, first);
    assert_eq!(reports[1].batch, second);
    assert!(Arc::ptr_eq(
        &reports[0].descriptors[0],
        &reports[1].descriptors[0]
    ));
    assert_eq!(reports[1].descriptors[0].status(), LoadStatus::Loaded);
    assert_eq!(extractor.calls(&shared), 1);
    assert_eq!(extractor.calls(&own), 1);
    assert_eq!(extractor.overlapping(), 0);
}

#[tokio::test]
async fn test_owners_share_in_flight_load() {
    let dir = TempDir::new().unwrap();
    let shared = write_pdf(dir.path(), "shared.pdf", 2);

    let extractor = TrackingExtractor::gated();
    let controller = controller_with(2, extractor.clone());
    let mut rotate = controller.subscribe(&Owner::new("rotate").unwrap());
    let mut merge = controller.subscribe(&Owner::new("merge").unwrap());

    controller
        .submit(LoadRequest::paths("rotate", [&shared]).unwrap())
        .unwrap();
    extractor.wait_for_calls(1).await;
    let merge_batch = controller
        .submit(LoadRequest::paths("merge", [&shared]).unwrap())
        .unwrap();

    tokio::time::timeout(crate::common::SETTLE_TIMEOUT, async {
        while controller.batch(merge_batch).is_none() {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    extractor.open();

    let rotate_report = completed(next_event(&mut rotate).await);
    let merge_report = completed(next_event(&mut merge).await);

    assert_eq!(merge_report.batch, merge_batch);
    assert!(Arc::ptr_eq(
        &rotate_report.descriptors[0],
        &merge_report.descriptors[0]
    ));
    assert_eq!(extractor.calls(&shared), 1);
}

#[tokio::test]
async fn test_drain_waits_for_every_accepted_request() {
    let dir = TempDir::new().unwrap();
    let paths: Vec<_> = (0..10)
        .map(|i| write_pdf(dir.path(), &format!("{i}.pdf"), 1))
        .collect();

    let extractor = TrackingExtractor::new(std::time::Duration::from_millis(5));
    let controller = controller_with(2, extractor.clone());
    let mut events = controller.subscribe(&Owner::new("split").unwrap());

    let first = controller
        .submit(LoadRequest::paths("split", &paths[..5]).unwrap())
        .unwrap();
    let second = controller
        .submit(LoadRequest::paths("split", &paths[5..]).unwrap())
        .unwrap();
    controller.shutdown(ShutdownMode::Drain).await;

    let mut settled = vec![
        completed(next_event(&mut events).await).batch,
        completed(next_event(&mut events).await).batch,
    ];
    settled.sort();
    assert_eq!(settled, vec![first, second]);
    assert_eq!(extractor.total_calls(), 10);
}
