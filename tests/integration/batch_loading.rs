//! Integration tests for direct path requests.

use pdfload::LoadStatus;
use pdfload::controller::LoadController;
use pdfload::descriptor::SkipReason;
use pdfload::events::LoadEvent;
use pdfload::request::{LoadRequest, Owner};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use crate::common::{
    TrackingExtractor, completed, controller, controller_with, next_event, write_file, write_pdf,
};

#[tokio::test]
async fn test_duplicate_and_missing_paths() {
    let dir = TempDir::new().unwrap();
    let a = write_pdf(dir.path(), "a.pdf", 2);
    let missing = dir.path().join("missing.pdf");

    let controller = controller(2);
    let mut events = controller.subscribe(&Owner::new("rotate").unwrap());
    let batch = controller
        .submit(LoadRequest::paths("rotate", [&a, &missing, &a]).unwrap())
        .unwrap();

    let report = completed(next_event(&mut events).await);

    assert_eq!(report.batch, batch);
    assert_eq!(report.len(), 1);
    assert_eq!(report.descriptors[0].path(), a.canonicalize().unwrap());
    assert_eq!(report.descriptors[0].status(), LoadStatus::Loaded);
    assert_eq!(report.descriptors[0].metadata().unwrap().page_count, 2);

    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].reason, SkipReason::NotFound);
    assert!(report.skipped[0].source.ends_with("missing.pdf"));
}

#[tokio::test]
async fn test_broken_documents_do_not_fail_the_batch() {
    let dir = TempDir::new().unwrap();
    let good = write_pdf(dir.path(), "good.pdf", 1);
    let text = write_file(dir.path(), "notes.pdf", b"just some text");
    let empty = write_file(dir.path(), "empty.pdf", b"");

    let controller = controller(2);
    let report = completed(
        controller
            .load(LoadRequest::paths("merge", [&good, &text, &empty]).unwrap())
            .await
            .unwrap(),
    );

    assert_eq!(report.len(), 3);
    assert_eq!(report.succeeded().count(), 1);
    let statuses: Vec<_> = report.descriptors.iter().map(|d| d.status()).collect();
    assert_eq!(
        statuses,
        vec![LoadStatus::Loaded, LoadStatus::Invalid, LoadStatus::Invalid]
    );
    for failed in report.failed() {
        assert!(failed.metadata().is_none());
        assert!(failed.failure().is_some());
    }
}

#[tokio::test]
async fn test_status_history_never_skips_a_state() {
    let dir = TempDir::new().unwrap();
    let good = write_pdf(dir.path(), "good.pdf", 1);
    let bad = write_file(dir.path(), "bad.pdf", b"%PDF-1.4 truncated");

    let controller = controller(2);
    let report = completed(
        controller
            .load(LoadRequest::paths("split", [&good, &bad]).unwrap())
            .await
            .unwrap(),
    );

    for descriptor in &report.descriptors {
        let history = descriptor.history();
        assert_eq!(
            &history[..3],
            &[
                LoadStatus::Created,
                LoadStatus::Requested,
                LoadStatus::Loading
            ]
        );
        assert_eq!(history.len(), 4);
        assert!(history[3].is_terminal());
        for pair in history.windows(2) {
            assert!(pair[0].can_move_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }
}

#[tokio::test]
async fn test_hundred_documents_with_four_workers() {
    let dir = TempDir::new().unwrap();
    let paths: Vec<_> = (0..100)
        .map(|i| write_pdf(dir.path(), &format!("doc{i:03}.pdf"), 1))
        .collect();

    let extractor = TrackingExtractor::new(Duration::from_millis(2));
    let controller = controller_with(4, extractor.clone());
    let report = completed(
        controller
            .load(LoadRequest::paths("merge", &paths).unwrap())
            .await
            .unwrap(),
    );

    assert_eq!(report.len(), 100);
    assert!(
        report
            .descriptors
            .iter()
            .all(|d| d.status() == LoadStatus::Loaded)
    );
    assert_eq!(extractor.total_calls(), 100);
    assert!(extractor.max_active() <= 4);
    assert_eq!(extractor.overlapping(), 0);
}

#[tokio::test]
async fn test_batch_is_requested_before_any_load() {
    let dir = TempDir::new().unwrap();
    let paths: Vec<_> = (0..6)
        .map(|i| write_pdf(dir.path(), &format!("{i}.pdf"), 1))
        .collect();

    let extractor = TrackingExtractor::gated();
    let controller = controller_with(2, extractor.clone());
    let mut events = controller.subscribe(&Owner::new("rotate").unwrap());
    let batch = controller
        .submit(LoadRequest::paths("rotate", &paths).unwrap())
        .unwrap();

    extractor.wait_for_calls(1).await;
    let view = controller.batch(batch).expect("batch is admitted once loading starts");
    assert!(!view.settled);
    assert_eq!(view.descriptors.len(), 6);
    for descriptor in &view.descriptors {
        assert!(descriptor.status().is_in_flight());
        assert!(!descriptor.history().contains(&LoadStatus::Loaded));
    }

    extractor.open();
    let report = completed(next_event(&mut events).await);
    assert_eq!(report.batch, batch);
    assert!(controller.batch(batch).unwrap().settled);
}

#[tokio::test]
async fn test_exactly_one_notification_per_request() {
    let dir = TempDir::new().unwrap();
    let a = write_pdf(dir.path(), "a.pdf", 1);
    let b = write_pdf(dir.path(), "b.pdf", 1);

    let controller = controller(2);
    let mut events = controller.subscribe(&Owner::new("merge").unwrap());
    let mut batches = vec![
        controller
            .submit(LoadRequest::paths("merge", [&a, &b]).unwrap())
            .unwrap(),
        controller
            .submit(LoadRequest::paths("merge", [&b]).unwrap())
            .unwrap(),
        controller
            .submit(LoadRequest::paths("merge", [dir.path().join("none.pdf")]).unwrap())
            .unwrap(),
    ];

    let mut notified = Vec::new();
    for _ in 0..3 {
        notified.push(next_event(&mut events).await.batch());
    }
    assert!(
        tokio::time::timeout(Duration::from_millis(200), events.next())
            .await
            .is_err(),
        "no further notification expected"
    );

    notified.sort();
    batches.sort();
    assert_eq!(notified, batches);
}

#[tokio::test]
async fn test_notifications_are_scoped_to_owner() {
    let dir = TempDir::new().unwrap();
    let a = write_pdf(dir.path(), "a.pdf", 1);

    let controller = controller(1);
    let mut rotate = controller.subscribe(&Owner::new("rotate").unwrap());
    let mut split = controller.subscribe(&Owner::new("split").unwrap());

    controller
        .submit(LoadRequest::paths("rotate", [&a]).unwrap())
        .unwrap();

    assert!(matches!(
        next_event(&mut rotate).await,
        LoadEvent::Completed(_)
    ));
    assert!(
        tokio::time::timeout(Duration::from_millis(200), split.next())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_full_metadata() {
    let dir = TempDir::new().unwrap();
    let a = write_pdf(dir.path(), "a.pdf", 3);

    let controller = controller(1);
    let request = LoadRequest::paths("merge", [&a])
        .unwrap()
        .with_required_data(pdfload::RequiredData::Full);
    let report = completed(controller.load(request).await.unwrap());

    let metadata = report.descriptors[0].metadata().unwrap();
    assert_eq!(metadata.page_count, 3);
    assert_eq!(metadata.version.as_deref(), Some("1.7"));
    assert!(metadata.file_size.is_some());
    assert_eq!(metadata.page_dimensions, Some((612.0, 792.0)));

    let summary = report.summary();
    assert_eq!(summary.total_pages, 3);
    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["loaded"], 1);
    assert_eq!(json["documents"][0]["status"], "LOADED");
}

#[tokio::test]
async fn test_descriptors_are_shared_across_live_batches() {
    let dir = TempDir::new().unwrap();
    let a = write_pdf(dir.path(), "a.pdf", 1);

    let controller = controller(1);
    let first = completed(
        controller
            .load(LoadRequest::paths("rotate", [&a]).unwrap())
            .await
            .unwrap(),
    );
    let second = completed(
        controller
            .load(LoadRequest::paths("merge", [&a]).unwrap())
            .await
            .unwrap(),
    );

    assert!(Arc::ptr_eq(&first.descriptors[0], &second.descriptors[0]));
    assert_eq!(second.descriptors[0].attempt(), 1);
}

#[tokio::test]
async fn test_configured_full_data_applies_to_plain_requests() {
    let dir = TempDir::new().unwrap();
    let a = write_pdf(dir.path(), "a.pdf", 2);

    let config = pdfload::LoadConfig {
        required_data: pdfload::RequiredData::Full,
        ..pdfload::LoadConfig::with_workers(1)
    };
    let controller = LoadController::new(config).unwrap();
    let report = completed(
        controller
            .load(LoadRequest::paths("rotate", [&a]).unwrap())
            .await
            .unwrap(),
    );

    let metadata = report.descriptors[0].metadata().unwrap();
    assert_eq!(metadata.version.as_deref(), Some("1.7"));
    assert!(metadata.file_size.is_some());
    assert_eq!(metadata.page_dimensions, Some((612.0, 792.0)));
}
