//! Content inspection pipeline
//!
//! Sample the middle of a remote object, spill it to a scratch directory,
//! pull one still frame out of it and hand that frame to a classifier. The
//! scratch directory is owned by the call and removed on every exit path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use super::classifier::{Classifier, ClassifierError, StubClassifier};
use super::frame::{
    ExtractionError, FfmpegFrameExtractor, FrameExtractor, FrameSource, StillFrameGrabber,
};
use super::sampler::{BoundedSampler, SampleError};
use crate::config::InspectionConfig;
use crate::object::RemoteObjectHandle;
use crate::store::{RemoteChunkClient, StoreLimits};

const SAMPLE_FILE: &str = "sample.mp4";
const FRAME_FILE: &str = "frame.jpg";

#[derive(Debug, thiserror::Error)]
pub enum InspectionError {
    #[error("sampling failed: {0}")]
    Sample(#[from] SampleError),

    #[error("frame extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("extracted frame is empty")]
    EmptyFrame,

    #[error("scratch space error: {0}")]
    Workspace(#[from] std::io::Error),

    #[error("classification failed: {0}")]
    Classifier(#[from] ClassifierError),
}

/// Outcome of a successful inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectionReport {
    pub sample_start: u64,
    pub sample_bytes: u64,
    pub frame_source: FrameSource,
    pub frame_bytes: u64,
    pub flagged: bool,
}

/// Scratch directory holding the sample and the extracted frame.
struct SampleWorkspace {
    dir: TempDir,
}

impl SampleWorkspace {
    fn create(root: Option<&Path>) -> std::io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("undertow-sample-");
        let dir = match root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        Ok(Self { dir })
    }

    fn sample_path(&self) -> PathBuf {
        self.dir.path().join(SAMPLE_FILE)
    }

    fn frame_path(&self) -> PathBuf {
        self.dir.path().join(FRAME_FILE)
    }

    /// Removes the directory, reporting failures that `Drop` would swallow.
    fn close(self) -> std::io::Result<()> {
        self.dir.close()
    }
}

/// Runs the sample, extract, classify pipeline for remote objects.
pub struct ContentInspector<C: RemoteChunkClient + ?Sized> {
    sampler: BoundedSampler<C>,
    grabber: StillFrameGrabber,
    classifier: Arc<dyn Classifier>,
    target_bytes: u64,
    temp_root: Option<PathBuf>,
}

impl<C: RemoteChunkClient + ?Sized> ContentInspector<C> {
    pub fn new(
        client: Arc<C>,
        limits: StoreLimits,
        extractor: Arc<dyn FrameExtractor>,
        classifier: Arc<dyn Classifier>,
        config: &InspectionConfig,
    ) -> Self {
        Self {
            sampler: BoundedSampler::new(client, limits),
            grabber: StillFrameGrabber::new(extractor, config.preferred_timestamp.clone()),
            classifier,
            target_bytes: config.target_bytes,
            temp_root: config.temp_root.clone(),
        }
    }

    /// Inspector using the configured ffmpeg binary and the stub classifier.
    pub fn from_config(client: Arc<C>, limits: StoreLimits, config: &InspectionConfig) -> Self {
        let extractor = FfmpegFrameExtractor::new(&config.ffmpeg_path, config.extraction_timeout);
        Self::new(
            client,
            limits,
            Arc::new(extractor),
            Arc::new(StubClassifier),
            config,
        )
    }

    /// Inspects `object`, returning the classifier verdict.
    ///
    /// Any failure is logged and reported as `false`.
    pub async fn inspect(&self, object: &RemoteObjectHandle) -> bool {
        match self.try_inspect(object).await {
            Ok(report) => report.flagged,
            Err(e) => {
                tracing::error!(
                    location = %object.location(),
                    size = object.size(),
                    error = %e,
                    "Content inspection failed"
                );
                false
            }
        }
    }

    /// Inspects `object`, exposing the failure cause.
    ///
    /// # Errors
    /// - `InspectionError::Sample` - The sample could not be drawn
    /// - `InspectionError::Workspace` - Scratch files could not be written
    /// - `InspectionError::Extraction` - No frame could be extracted
    /// - `InspectionError::EmptyFrame` - The extracted frame has no bytes
    /// - `InspectionError::Classifier` - The classifier failed
    pub async fn try_inspect(
        &self,
        object: &RemoteObjectHandle,
    ) -> Result<InspectionReport, InspectionError> {
        let sample = self.sampler.sample(object, self.target_bytes).await?;

        let workspace = SampleWorkspace::create(self.temp_root.as_deref())?;
        let sample_path = workspace.sample_path();
        let frame_path = workspace.frame_path();
        tokio::fs::write(&sample_path, &sample.data).await?;

        let frame_source = self.grabber.grab(&sample_path, &frame_path).await?;

        let frame_bytes = tokio::fs::metadata(&frame_path)
            .await
            .map(|meta| meta.len())
            .unwrap_or(0);
        if frame_bytes == 0 {
            return Err(InspectionError::EmptyFrame);
        }

        let flagged = self.classifier.classify(&frame_path).await?;
        workspace.close()?;

        tracing::info!(
            location = %object.location(),
            sample_start = sample.start,
            sample_bytes = sample.len(),
            ?frame_source,
            flagged,
            "Content inspection complete"
        );

        Ok(InspectionReport {
            sample_start: sample.start,
            sample_bytes: sample.len() as u64,
            frame_source,
            frame_bytes,
            flagged,
        })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;

    use super::*;
    use crate::object::ObjectLocation;
    use crate::store::ChunkClientError;

    struct VecStore {
        data: Bytes,
        fail: bool,
    }

    #[async_trait]
    impl RemoteChunkClient for VecStore {
        async fn fetch(
            &self,
            _location: &ObjectLocation,
            offset: u64,
            limit: u64,
        ) -> Result<Bytes, ChunkClientError> {
            if self.fail {
                return Err(ChunkClientError::Transport {
                    reason: "unreachable".to_string(),
                });
            }
            let start = (offset as usize).min(self.data.len());
            let end = (start + limit as usize).min(self.data.len());
            Ok(self.data.slice(start..end))
        }
    }

    #[derive(Clone, Copy)]
    enum FrameOutcome {
        Write,
        WriteEmpty,
        Fail,
    }

    struct FakeExtractor {
        outcome: FrameOutcome,
        seen_inputs: Mutex<Vec<u64>>,
    }

    impl FakeExtractor {
        fn new(outcome: FrameOutcome) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                seen_inputs: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl FrameExtractor for FakeExtractor {
        async fn extract(
            &self,
            input: &Path,
            output: &Path,
            _timestamp: Option<&str>,
        ) -> Result<(), ExtractionError> {
            let input_len = tokio::fs::metadata(input).await.unwrap().len();
            self.seen_inputs.lock().push(input_len);
            match self.outcome {
                FrameOutcome::Write => {
                    tokio::fs::write(output, b"\xff\xd8jpeg").await.unwrap();
                    Ok(())
                }
                FrameOutcome::WriteEmpty => {
                    tokio::fs::write(output, b"").await.unwrap();
                    Ok(())
                }
                FrameOutcome::Fail => Err(ExtractionError::NoFrame {
                    path: output.to_path_buf(),
                }),
            }
        }
    }

    struct AlwaysFlag;

    #[async_trait]
    impl Classifier for AlwaysFlag {
        async fn classify(&self, _image: &Path) -> Result<bool, ClassifierError> {
            Ok(true)
        }
    }

    fn object(size: u64) -> RemoteObjectHandle {
        RemoteObjectHandle::new(ObjectLocation::new("clip"), size, None, "clip.mp4")
    }

    fn inspector(
        store: VecStore,
        extractor: Arc<FakeExtractor>,
        classifier: Arc<dyn Classifier>,
        root: &Path,
    ) -> ContentInspector<VecStore> {
        let config = InspectionConfig {
            target_bytes: 256,
            temp_root: Some(root.to_path_buf()),
            ..Default::default()
        };
        ContentInspector::new(
            Arc::new(store),
            StoreLimits::new(16, 64, 64),
            extractor,
            classifier,
            &config,
        )
    }

    fn assert_no_leftovers(root: &Path) {
        let leftovers: Vec<_> = std::fs::read_dir(root).unwrap().collect();
        assert!(leftovers.is_empty(), "scratch files left behind: {leftovers:?}");
    }

    fn store(len: usize) -> VecStore {
        VecStore {
            data: Bytes::from(vec![7u8; len]),
            fail: false,
        }
    }

    #[tokio::test]
    async fn test_successful_inspection() {
        let root = tempfile::tempdir().unwrap();
        let extractor = FakeExtractor::new(FrameOutcome::Write);
        let inspector = inspector(
            store(1000),
            Arc::clone(&extractor),
            Arc::new(StubClassifier),
            root.path(),
        );

        let report = inspector.try_inspect(&object(1000)).await.unwrap();

        assert_eq!(report.sample_bytes, 256);
        assert_eq!(report.frame_source, FrameSource::PreferredTimestamp);
        assert!(report.frame_bytes > 0);
        assert!(!report.flagged);
        assert_eq!(*extractor.seen_inputs.lock(), vec![256]);
        assert_no_leftovers(root.path());
    }

    #[tokio::test]
    async fn test_flagged_verdict_propagates() {
        let root = tempfile::tempdir().unwrap();
        let inspector = inspector(
            store(1000),
            FakeExtractor::new(FrameOutcome::Write),
            Arc::new(AlwaysFlag),
            root.path(),
        );

        assert!(inspector.inspect(&object(1000)).await);
        assert_no_leftovers(root.path());
    }

    #[tokio::test]
    async fn test_sampling_failure_is_a_plain_false() {
        let root = tempfile::tempdir().unwrap();
        let inspector = inspector(
            VecStore {
                data: Bytes::new(),
                fail: true,
            },
            FakeExtractor::new(FrameOutcome::Write),
            Arc::new(AlwaysFlag),
            root.path(),
        );

        assert!(!inspector.inspect(&object(1000)).await);
        assert!(matches!(
            inspector.try_inspect(&object(1000)).await,
            Err(InspectionError::Sample(_))
        ));
        assert_no_leftovers(root.path());
    }

    #[tokio::test]
    async fn test_extraction_failure_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let extractor = FakeExtractor::new(FrameOutcome::Fail);
        let inspector = inspector(
            store(1000),
            Arc::clone(&extractor),
            Arc::new(AlwaysFlag),
            root.path(),
        );

        let result = inspector.try_inspect(&object(1000)).await;

        assert!(matches!(
            result,
            Err(InspectionError::Extraction(ExtractionError::Exhausted { .. }))
        ));
        assert_eq!(extractor.seen_inputs.lock().len(), 2);
        assert_no_leftovers(root.path());
    }

    #[tokio::test]
    async fn test_empty_frame_is_not_classified() {
        let root = tempfile::tempdir().unwrap();
        let inspector = inspector(
            store(1000),
            FakeExtractor::new(FrameOutcome::WriteEmpty),
            Arc::new(AlwaysFlag),
            root.path(),
        );

        assert!(matches!(
            inspector.try_inspect(&object(1000)).await,
            Err(InspectionError::EmptyFrame)
        ));
        assert!(!inspector.inspect(&object(1000)).await);
        assert_no_leftovers(root.path());
    }

    #[tokio::test]
    async fn test_empty_object_is_rejected_without_scratch_space() {
        let root = tempfile::tempdir().unwrap();
        let extractor = FakeExtractor::new(FrameOutcome::Write);
        let inspector = inspector(
            store(0),
            Arc::clone(&extractor),
            Arc::new(StubClassifier),
            root.path(),
        );

        assert!(!inspector.inspect(&object(0)).await);
        assert!(extractor.seen_inputs.lock().is_empty());
        assert_no_leftovers(root.path());
    }
}
