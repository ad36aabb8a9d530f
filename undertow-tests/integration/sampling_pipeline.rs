//! Integration tests for bounded sampling and content inspection
//!
//! Runs the full sample, extract, classify pipeline over the simulated store
//! and verifies offset accounting and scratch file cleanup.

use std::path::Path;
use std::sync::Arc;

use undertow_core::config::InspectionConfig;
use undertow_core::sampling::{
    BoundedSampler, ContentInspector, FrameExtractor, FrameSource, InspectionError, StubClassifier,
};
use undertow_core::{RemoteObjectHandle, StoreLimits};
use undertow_sim::{Fault, InMemoryChunkStore, SimulatedFrameExtractor, deterministic_content};

fn small_limits() -> StoreLimits {
    StoreLimits::new(16, 64, 128)
}

fn store_with_object(
    limits: StoreLimits,
    size: usize,
) -> (Arc<InMemoryChunkStore>, RemoteObjectHandle) {
    let store = Arc::new(InMemoryChunkStore::new(limits));
    let object = store.add_object(
        "video-1",
        deterministic_content(9, size),
        Some("video/mp4"),
        "v.mp4",
    );
    (store, object)
}

fn inspector(
    store: &Arc<InMemoryChunkStore>,
    extractor: Arc<dyn FrameExtractor>,
    temp_root: &Path,
) -> ContentInspector<InMemoryChunkStore> {
    let config = InspectionConfig {
        target_bytes: 1024,
        temp_root: Some(temp_root.to_path_buf()),
        ..Default::default()
    };
    ContentInspector::new(
        Arc::clone(store),
        store.limits(),
        extractor,
        Arc::new(StubClassifier),
        &config,
    )
}

fn assert_scratch_empty(root: &Path) {
    let entries: Vec<_> = std::fs::read_dir(root).unwrap().collect();
    assert!(entries.is_empty(), "leftover scratch entries: {entries:?}");
}

#[tokio::test]
async fn test_inspection_samples_the_middle() {
    let root = tempfile::tempdir().unwrap();
    let (store, object) = store_with_object(small_limits(), 10_000);
    let inspector = inspector(&store, Arc::new(SimulatedFrameExtractor::new()), root.path());

    let report = inspector.try_inspect(&object).await.unwrap();

    // mid 5000, raw start 4488, aligned down to 16
    assert_eq!(report.sample_start, 4480);
    assert_eq!(report.sample_bytes, 1024);
    assert_eq!(report.frame_source, FrameSource::PreferredTimestamp);
    assert!(!report.flagged);

    let log = store.fetch_log();
    assert_eq!(log.len(), 8);
    for record in &log {
        assert_eq!(record.offset % 16, 0);
        assert!(record.limit <= 128);
    }
    assert_scratch_empty(root.path());
}

#[tokio::test]
async fn test_inspection_falls_back_to_first_frame() {
    let root = tempfile::tempdir().unwrap();
    let (store, object) = store_with_object(small_limits(), 10_000);
    let extractor = Arc::new(SimulatedFrameExtractor::failing_seek());
    let inspector = inspector(&store, extractor.clone(), root.path());

    let report = inspector.try_inspect(&object).await.unwrap();

    assert_eq!(report.frame_source, FrameSource::FirstFrame);
    assert_eq!(extractor.calls(), vec![Some("00:00:02".to_string()), None]);
    assert_scratch_empty(root.path());
}

#[tokio::test]
async fn test_extraction_failure_reports_false_and_cleans_up() {
    let root = tempfile::tempdir().unwrap();
    let (store, object) = store_with_object(small_limits(), 10_000);
    let extractor = Arc::new(SimulatedFrameExtractor::broken());
    let inspector = inspector(&store, extractor.clone(), root.path());

    assert!(!inspector.inspect(&object).await);
    assert_eq!(extractor.calls().len(), 2);
    assert_scratch_empty(root.path());
}

#[tokio::test]
async fn test_store_failure_mid_sample() {
    let root = tempfile::tempdir().unwrap();
    let (store, object) = store_with_object(small_limits(), 10_000);
    store.inject_fault(3, Fault::Timeout);
    let extractor = Arc::new(SimulatedFrameExtractor::new());
    let inspector = inspector(&store, extractor.clone(), root.path());

    let result = inspector.try_inspect(&object).await;

    assert!(matches!(result, Err(InspectionError::Sample(_))));
    assert_eq!(store.fetch_count(), 4);
    assert!(extractor.calls().is_empty());
    assert_scratch_empty(root.path());
}

#[tokio::test]
async fn test_early_end_of_object_keeps_partial_sample() {
    let root = tempfile::tempdir().unwrap();
    let (store, object) = store_with_object(small_limits(), 10_000);
    store.inject_fault(2, Fault::Empty);
    let inspector = inspector(&store, Arc::new(SimulatedFrameExtractor::new()), root.path());

    let report = inspector.try_inspect(&object).await.unwrap();
    assert_eq!(report.sample_bytes, 256);
    assert_scratch_empty(root.path());
}

#[tokio::test]
async fn test_oversized_reply_is_a_protocol_failure() {
    let (store, object) = store_with_object(small_limits(), 10_000);
    store.inject_fault(0, Fault::Overflow);
    let sampler = BoundedSampler::new(Arc::clone(&store), store.limits());

    assert!(sampler.sample(&object, 1024).await.is_err());
    assert_eq!(store.fetch_count(), 1);
}

#[tokio::test]
async fn test_small_object_is_sampled_whole_with_production_limits() {
    let (store, object) = store_with_object(StoreLimits::default(), 4_000_000);
    let sampler = BoundedSampler::new(Arc::clone(&store), store.limits());

    let sample = sampler.sample(&object, 8 * 1024 * 1024).await.unwrap();

    assert_eq!(sample.start, 0);
    assert_eq!(sample.len(), 4_000_000);
    assert_eq!(sample.data, store.object_bytes(object.location()).unwrap());
}
