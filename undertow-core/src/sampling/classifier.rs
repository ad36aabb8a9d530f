//! Image classification capability.

use std::path::Path;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("cannot read image {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Decides whether a still image should be flagged.
///
/// Implementations receive the path of a non-empty image and return `true`
/// when the image is flagged.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, image: &Path) -> Result<bool, ClassifierError>;
}

/// Placeholder classifier that never flags anything.
///
/// Still reads the image metadata so a missing file surfaces as an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubClassifier;

#[async_trait]
impl Classifier for StubClassifier {
    async fn classify(&self, image: &Path) -> Result<bool, ClassifierError> {
        let meta = tokio::fs::metadata(image)
            .await
            .map_err(|source| ClassifierError::Unreadable {
                path: image.display().to_string(),
                source,
            })?;
        tracing::debug!(
            image = %image.display(),
            bytes = meta.len(),
            "Stub classifier verdict: not flagged"
        );
        Ok(false)
    }
}
