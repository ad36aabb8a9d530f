//! Remote object handles
//!
//! A handle is the immutable description of one file held by the remote
//! store: where it lives, how large it is, and how it should be presented.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// Fallback media type for objects that carry no type hint.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Opaque token identifying an object in the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectLocation(String);

impl ObjectLocation {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable reference to a remote file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObjectHandle {
    location: ObjectLocation,
    size: u64,
    mime_type: Option<String>,
    name: String,
}

impl RemoteObjectHandle {
    /// Creates a handle. An empty mime type is treated as absent.
    pub fn new(
        location: ObjectLocation,
        size: u64,
        mime_type: Option<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            location,
            size,
            mime_type: mime_type.filter(|mime| !mime.trim().is_empty()),
            name: name.into(),
        }
    }

    pub fn location(&self) -> &ObjectLocation {
        &self.location
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Media type to advertise, falling back to a generic binary type.
    pub fn content_type(&self) -> &str {
        self.mime_type().unwrap_or(DEFAULT_CONTENT_TYPE)
    }

    /// Short hex digest that must accompany public stream links.
    ///
    /// Derived from the location token and size so that links cannot be
    /// forged by guessing object identifiers. `length` is clamped to the
    /// full digest width.
    pub fn link_hash(&self, length: usize) -> String {
        let mut hasher = Sha1::new();
        hasher.update(self.location.as_str().as_bytes());
        hasher.update(self.size.to_be_bytes());
        let digest = hex::encode(hasher.finalize());
        digest[..length.min(digest.len())].to_string()
    }

    /// Compares a link hash from a request against this object.
    pub fn verify_link_hash(&self, candidate: &str, length: usize) -> bool {
        !candidate.is_empty() && candidate.eq_ignore_ascii_case(&self.link_hash(length))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(mime: Option<&str>) -> RemoteObjectHandle {
        RemoteObjectHandle::new(
            ObjectLocation::new("doc-7781"),
            1000,
            mime.map(str::to_string),
            "clip.mp4",
        )
    }

    #[test]
    fn test_content_type_fallback() {
        assert_eq!(handle(None).content_type(), DEFAULT_CONTENT_TYPE);
        assert_eq!(handle(Some("  ")).content_type(), DEFAULT_CONTENT_TYPE);
        assert_eq!(handle(Some("video/mp4")).content_type(), "video/mp4");
    }

    #[test]
    fn test_link_hash_is_stable_and_truncated() {
        let object = handle(None);
        let hash = object.link_hash(6);

        assert_eq!(hash.len(), 6);
        assert_eq!(hash, object.link_hash(6));
        assert!(object.link_hash(100).len() == 40);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_link_hash_depends_on_size() {
        let small = handle(None);
        let large =
            RemoteObjectHandle::new(ObjectLocation::new("doc-7781"), 1001, None, "clip.mp4");
        assert_ne!(small.link_hash(40), large.link_hash(40));
    }

    #[test]
    fn test_verify_link_hash() {
        let object = handle(None);
        let hash = object.link_hash(6);

        assert!(object.verify_link_hash(&hash, 6));
        assert!(object.verify_link_hash(&hash.to_uppercase(), 6));
        assert!(!object.verify_link_hash("", 6));
        assert!(!object.verify_link_hash("zzzzzz", 6));
    }
}
