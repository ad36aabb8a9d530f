//! Frame extraction without ffmpeg.

use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;
use undertow_core::sampling::{ExtractionError, FrameExtractor};

/// JPEG start-of-image and end-of-image markers around a short payload.
const FAKE_JPEG: &[u8] = b"\xff\xd8\xff\xe0undertow-simulated-frame\xff\xd9";

/// Frame extractor that writes a fixed placeholder image.
///
/// Mirrors the real extractor's contract: the input must exist and be
/// non-empty, and success leaves a non-empty image at the output path.
#[derive(Debug, Default)]
pub struct SimulatedFrameExtractor {
    fail_seek: bool,
    fail_all: bool,
    calls: Mutex<Vec<Option<String>>>,
}

impl SimulatedFrameExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every attempt that seeks to a timestamp.
    pub fn failing_seek() -> Self {
        Self {
            fail_seek: true,
            ..Self::default()
        }
    }

    /// Fails every attempt.
    pub fn broken() -> Self {
        Self {
            fail_all: true,
            ..Self::default()
        }
    }

    /// Timestamps of every attempt so far.
    pub fn calls(&self) -> Vec<Option<String>> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl FrameExtractor for SimulatedFrameExtractor {
    async fn extract(
        &self,
        input: &Path,
        output: &Path,
        timestamp: Option<&str>,
    ) -> Result<(), ExtractionError> {
        self.calls.lock().push(timestamp.map(str::to_string));

        let input_len = tokio::fs::metadata(input)
            .await
            .map(|meta| meta.len())
            .unwrap_or(0);
        if input_len == 0 {
            return Err(ExtractionError::Failed {
                status: "exit status: 1".to_string(),
                stderr: format!("{}: Invalid data found when processing input", input.display()),
            });
        }

        if self.fail_all || (self.fail_seek && timestamp.is_some()) {
            return Err(ExtractionError::Failed {
                status: "exit status: 1".to_string(),
                stderr: "simulated extraction failure".to_string(),
            });
        }

        tokio::fs::write(output, FAKE_JPEG)
            .await
            .map_err(|source| ExtractionError::Spawn {
                binary: "simulated-ffmpeg".to_string(),
                source,
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_writes_placeholder_frame() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("sample.mp4");
        let output = dir.path().join("frame.jpg");
        std::fs::write(&input, b"data").unwrap();

        let extractor = SimulatedFrameExtractor::new();
        extractor.extract(&input, &output, Some("00:00:02")).await.unwrap();

        assert_eq!(std::fs::read(&output).unwrap(), FAKE_JPEG);
        assert_eq!(extractor.calls(), vec![Some("00:00:02".to_string())]);
    }

    #[tokio::test]
    async fn test_empty_input_fails() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("sample.mp4");
        std::fs::write(&input, b"").unwrap();

        let result = SimulatedFrameExtractor::new()
            .extract(&input, &dir.path().join("frame.jpg"), None)
            .await;
        assert!(matches!(result, Err(ExtractionError::Failed { .. })));
    }

    #[tokio::test]
    async fn test_seek_failure_mode() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("sample.mp4");
        std::fs::write(&input, b"data").unwrap();
        let extractor = SimulatedFrameExtractor::failing_seek();

        assert!(extractor
            .extract(&input, &dir.path().join("a.jpg"), Some("00:00:02"))
            .await
            .is_err());
        assert!(extractor
            .extract(&input, &dir.path().join("b.jpg"), None)
            .await
            .is_ok());
    }
}
