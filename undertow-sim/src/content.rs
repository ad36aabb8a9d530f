//! Deterministic demo content.

use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use undertow_core::{RemoteObjectHandle, StoreLimits};

use crate::store::InMemoryChunkStore;

/// Generates `len` pseudo-random bytes; the same seed always yields the same
/// bytes.
pub fn deterministic_content(seed: u64, len: usize) -> Bytes {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut buf = vec![0u8; len];
    rng.fill_bytes(&mut buf);
    Bytes::from(buf)
}

/// Deterministic bytes behind a minimal ISO-BMFF `ftyp` box, enough for
/// content sniffers to treat the object as MP4.
pub fn fake_mp4(seed: u64, len: usize) -> Bytes {
    const HEADER_LEN: usize = 24;
    if len < HEADER_LEN {
        return deterministic_content(seed, len);
    }

    let mut buf = BytesMut::with_capacity(len);
    buf.put_u32(HEADER_LEN as u32);
    buf.put_slice(b"ftypisom");
    buf.put_u32(0x200);
    buf.put_slice(b"isommp41");
    buf.put(deterministic_content(seed, len - HEADER_LEN));
    buf.freeze()
}

/// A demo object and the public id it is served under.
#[derive(Debug, Clone)]
pub struct DemoObject {
    pub id: String,
    pub handle: RemoteObjectHandle,
}

/// Builds a store preloaded with a handful of demo objects.
pub fn demo_store(limits: StoreLimits) -> (Arc<InMemoryChunkStore>, Vec<DemoObject>) {
    let store = InMemoryChunkStore::new(limits);
    let specs: [(&str, &str, Bytes, Option<&str>, &str); 3] = [
        (
            "1",
            "demo-video-1",
            fake_mp4(1, 3 * 1024 * 1024 + 517),
            Some("video/mp4"),
            "ocean-waves.mp4",
        ),
        (
            "2",
            "demo-video-2",
            fake_mp4(2, 12 * 1024 * 1024),
            Some("video/mp4"),
            "city-timelapse.mp4",
        ),
        (
            "3",
            "demo-notes-3",
            deterministic_content(3, 10_000),
            None,
            "notes.bin",
        ),
    ];

    let objects = specs
        .into_iter()
        .map(|(id, location, data, mime, name)| DemoObject {
            id: id.to_string(),
            handle: store.add_object(location, data, mime, name),
        })
        .collect();

    tracing::info!("Demo store ready");
    (Arc::new(store), objects)
}

#[cfg(test)]
mod tests {
    use undertow_core::RemoteChunkClient;

    use super::*;

    #[test]
    fn test_content_is_deterministic() {
        assert_eq!(deterministic_content(7, 4096), deterministic_content(7, 4096));
        assert_ne!(deterministic_content(7, 64), deterministic_content(8, 64));
    }

    #[test]
    fn test_fake_mp4_header() {
        let data = fake_mp4(1, 100);
        assert_eq!(data.len(), 100);
        assert_eq!(&data[4..8], b"ftyp");
    }

    #[tokio::test]
    async fn test_demo_store_serves_objects() {
        let (store, objects) = demo_store(StoreLimits::default());
        assert_eq!(objects.len(), 3);

        let first = &objects[0].handle;
        assert_eq!(first.content_type(), "video/mp4");
        let head = store.fetch(first.location(), 0, 4096).await.unwrap();
        assert_eq!(&head[4..8], b"ftyp");
    }
}
