//! Still frame extraction from sampled media.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

/// Errors from extracting a still frame.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("failed to start {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("extractor exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("extractor produced no frame at {}", path.display())]
    NoFrame { path: PathBuf },

    #[error("extraction timed out after {after:?}")]
    TimedOut { after: Duration },

    #[error("both extraction attempts failed (seek: {preferred}; first frame: {fallback})")]
    Exhausted {
        preferred: Box<ExtractionError>,
        fallback: Box<ExtractionError>,
    },
}

/// Writes one still image from a video file.
///
/// Success means a non-empty image now exists at `output`.
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    /// Extracts a frame at `timestamp`, or the first decodable frame when
    /// `timestamp` is `None`.
    ///
    /// # Errors
    /// - `ExtractionError::Spawn` - Extractor could not be started
    /// - `ExtractionError::Failed` - Extractor reported failure
    /// - `ExtractionError::NoFrame` - Extractor succeeded but wrote nothing
    /// - `ExtractionError::TimedOut` - Extractor exceeded its time limit
    async fn extract(
        &self,
        input: &Path,
        output: &Path,
        timestamp: Option<&str>,
    ) -> Result<(), ExtractionError>;
}

/// Frame extractor backed by an `ffmpeg` executable.
#[derive(Debug, Clone)]
pub struct FfmpegFrameExtractor {
    binary: PathBuf,
    timeout: Duration,
}

impl FfmpegFrameExtractor {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    fn args(input: &Path, output: &Path, timestamp: Option<&str>) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-y".into(), "-i".into(), input.into()];
        if let Some(timestamp) = timestamp {
            args.push("-ss".into());
            args.push(timestamp.into());
        }
        args.extend(["-vframes", "1", "-q:v", "2"].map(OsString::from));
        args.push(output.into());
        args
    }
}

#[async_trait]
impl FrameExtractor for FfmpegFrameExtractor {
    async fn extract(
        &self,
        input: &Path,
        output: &Path,
        timestamp: Option<&str>,
    ) -> Result<(), ExtractionError> {
        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.args(Self::args(input, output, timestamp))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(
            binary = %self.binary.display(),
            input = %input.display(),
            timestamp = timestamp.unwrap_or("first frame"),
            "Extracting still frame"
        );

        let result = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ExtractionError::TimedOut {
                after: self.timeout,
            })?
            .map_err(|source| ExtractionError::Spawn {
                binary: self.binary.display().to_string(),
                source,
            })?;

        let stderr = String::from_utf8_lossy(&result.stderr);
        if !result.status.success() {
            return Err(ExtractionError::Failed {
                status: result.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }
        if !stderr.is_empty() {
            tracing::trace!("ffmpeg stderr: {}", stderr);
        }

        let written = tokio::fs::metadata(output)
            .await
            .map(|meta| meta.len())
            .unwrap_or(0);
        if written == 0 {
            return Err(ExtractionError::NoFrame {
                path: output.to_path_buf(),
            });
        }
        Ok(())
    }
}

/// Which attempt produced the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSource {
    PreferredTimestamp,
    FirstFrame,
}

/// Grabs a still frame, seeking first and falling back to the first frame.
///
/// A sample taken from the middle of a file often starts mid-GOP or is
/// shorter than the preferred timestamp, so the seek attempt may fail where
/// a plain first-frame decode succeeds. Exactly one fallback is attempted.
#[derive(Clone)]
pub struct StillFrameGrabber {
    extractor: Arc<dyn FrameExtractor>,
    preferred_timestamp: String,
}

impl StillFrameGrabber {
    pub fn new(extractor: Arc<dyn FrameExtractor>, preferred_timestamp: impl Into<String>) -> Self {
        Self {
            extractor,
            preferred_timestamp: preferred_timestamp.into(),
        }
    }

    /// # Errors
    /// - `ExtractionError::Exhausted` - Both attempts failed
    pub async fn grab(&self, input: &Path, output: &Path) -> Result<FrameSource, ExtractionError> {
        let preferred = match self
            .extractor
            .extract(input, output, Some(&self.preferred_timestamp))
            .await
        {
            Ok(()) => return Ok(FrameSource::PreferredTimestamp),
            Err(e) => e,
        };

        tracing::warn!(
            timestamp = %self.preferred_timestamp,
            error = %preferred,
            "Seeking extraction failed, retrying from the first frame"
        );
        // A failed attempt can leave a truncated image behind.
        let _ = tokio::fs::remove_file(output).await;

        match self.extractor.extract(input, output, None).await {
            Ok(()) => Ok(FrameSource::FirstFrame),
            Err(fallback) => Err(ExtractionError::Exhausted {
                preferred: Box::new(preferred),
                fallback: Box::new(fallback),
            }),
        }
    }
}
