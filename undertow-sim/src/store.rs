//! In-memory chunk store for simulation environments.
//!
//! Enforces the remote store contract exactly as a production store would,
//! records every call it receives, and can be told to misbehave on specific
//! calls so failure paths can be exercised deterministically.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use undertow_core::{
    ChunkClientError, ObjectLocation, RemoteChunkClient, RemoteObjectHandle, StoreLimits,
};

/// One call received by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRecord {
    pub location: ObjectLocation,
    pub offset: u64,
    pub limit: u64,
    /// Bytes returned, or `None` when the call failed.
    pub returned: Option<usize>,
}

/// Misbehaviour injected into a single call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Fail with a transport error.
    Transport,
    /// Fail with a timeout.
    Timeout,
    /// Return zero bytes regardless of position.
    Empty,
    /// Return at most this many bytes.
    Truncate(u64),
    /// Return one byte more than requested.
    Overflow,
}

/// Remote chunk store holding whole objects in memory.
pub struct InMemoryChunkStore {
    limits: StoreLimits,
    objects: RwLock<HashMap<ObjectLocation, Bytes>>,
    log: Mutex<Vec<FetchRecord>>,
    faults: Mutex<HashMap<usize, Fault>>,
}

impl InMemoryChunkStore {
    pub fn new(limits: StoreLimits) -> Self {
        Self {
            limits,
            objects: RwLock::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
            faults: Mutex::new(HashMap::new()),
        }
    }

    pub fn limits(&self) -> StoreLimits {
        self.limits
    }

    /// Stores an object and returns a handle describing it.
    pub fn add_object(
        &self,
        location: impl Into<String>,
        data: impl Into<Bytes>,
        mime_type: Option<&str>,
        name: impl Into<String>,
    ) -> RemoteObjectHandle {
        let location = ObjectLocation::new(location);
        let data = data.into();
        let handle = RemoteObjectHandle::new(
            location.clone(),
            data.len() as u64,
            mime_type.map(str::to_string),
            name,
        );

        tracing::debug!(%location, size = data.len(), "InMemoryChunkStore: added object");
        self.objects.write().insert(location, data);
        handle
    }

    /// Raw bytes of a stored object.
    pub fn object_bytes(&self, location: &ObjectLocation) -> Option<Bytes> {
        self.objects.read().get(location).cloned()
    }

    /// Makes the zero-based call number `call` misbehave.
    pub fn inject_fault(&self, call: usize, fault: Fault) {
        self.faults.lock().insert(call, fault);
    }

    pub fn fetch_log(&self) -> Vec<FetchRecord> {
        self.log.lock().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.log.lock().len()
    }

    fn record(&self, location: &ObjectLocation, offset: u64, limit: u64) -> usize {
        let mut log = self.log.lock();
        log.push(FetchRecord {
            location: location.clone(),
            offset,
            limit,
            returned: None,
        });
        log.len() - 1
    }

    fn complete(&self, call: usize, returned: usize) {
        if let Some(record) = self.log.lock().get_mut(call) {
            record.returned = Some(returned);
        }
    }

    fn serve(
        &self,
        location: &ObjectLocation,
        offset: u64,
        limit: u64,
    ) -> Result<Bytes, ChunkClientError> {
        let objects = self.objects.read();
        let data = objects
            .get(location)
            .ok_or_else(|| ChunkClientError::ObjectNotFound {
                location: location.to_string(),
            })?;

        let len = data.len() as u64;
        if offset >= len {
            return Ok(Bytes::new());
        }
        let end = (offset + limit).min(len);
        Ok(data.slice(offset as usize..end as usize))
    }
}

#[async_trait]
impl RemoteChunkClient for InMemoryChunkStore {
    async fn fetch(
        &self,
        location: &ObjectLocation,
        offset: u64,
        limit: u64,
    ) -> Result<Bytes, ChunkClientError> {
        let call = self.record(location, offset, limit);
        self.limits.check_request(offset, limit)?;

        let fault = self.faults.lock().remove(&call);
        let data = match fault {
            Some(Fault::Transport) => {
                return Err(ChunkClientError::Transport {
                    reason: format!("injected failure on call {call}"),
                });
            }
            Some(Fault::Timeout) => return Err(ChunkClientError::Timeout { offset }),
            Some(Fault::Empty) => Bytes::new(),
            Some(Fault::Truncate(max)) => {
                let data = self.serve(location, offset, limit)?;
                data.slice(..data.len().min(max as usize))
            }
            Some(Fault::Overflow) => {
                let mut data = self.serve(location, offset, limit)?.to_vec();
                data.resize(limit as usize + 1, 0);
                Bytes::from(data)
            }
            None => self.serve(location, offset, limit)?,
        };

        self.complete(call, data.len());
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> InMemoryChunkStore {
        InMemoryChunkStore::new(StoreLimits::new(16, 64, 128))
    }

    #[tokio::test]
    async fn test_serves_spans_and_end_of_object() {
        let store = store();
        let handle = store.add_object("a", (0u8..100).collect::<Vec<_>>(), None, "a.bin");

        let data = store.fetch(handle.location(), 96, 128).await.unwrap();
        assert_eq!(&data[..], &[96, 97, 98, 99]);

        let past_end = store.fetch(handle.location(), 112, 16).await.unwrap();
        assert!(past_end.is_empty());
    }

    #[tokio::test]
    async fn test_enforces_contract() {
        let store = store();
        let handle = store.add_object("a", vec![0u8; 100], None, "a.bin");

        assert!(matches!(
            store.fetch(handle.location(), 5, 16).await,
            Err(ChunkClientError::MisalignedOffset { .. })
        ));
        assert!(matches!(
            store.fetch(handle.location(), 0, 129).await,
            Err(ChunkClientError::LimitExceeded { .. })
        ));
        // Rejected calls are still recorded.
        assert_eq!(store.fetch_count(), 2);
        assert!(store.fetch_log().iter().all(|r| r.returned.is_none()));
    }

    #[tokio::test]
    async fn test_unknown_object() {
        let result = store().fetch(&ObjectLocation::new("missing"), 0, 16).await;
        assert!(matches!(result, Err(ChunkClientError::ObjectNotFound { .. })));
    }

    #[tokio::test]
    async fn test_injected_faults_hit_their_call_only() {
        let store = store();
        let handle = store.add_object("a", vec![1u8; 256], None, "a.bin");
        store.inject_fault(1, Fault::Transport);
        store.inject_fault(2, Fault::Truncate(3));

        assert_eq!(store.fetch(handle.location(), 0, 64).await.unwrap().len(), 64);
        assert!(store.fetch(handle.location(), 64, 64).await.is_err());
        assert_eq!(store.fetch(handle.location(), 64, 64).await.unwrap().len(), 3);
        assert_eq!(store.fetch(handle.location(), 64, 64).await.unwrap().len(), 64);

        let log = store.fetch_log();
        assert_eq!(log[0].returned, Some(64));
        assert_eq!(log[1].returned, None);
        assert_eq!(log[2].returned, Some(3));
    }

    #[tokio::test]
    async fn test_overflow_fault() {
        let store = store();
        let handle = store.add_object("a", vec![1u8; 256], None, "a.bin");
        store.inject_fault(0, Fault::Overflow);

        let data = store.fetch(handle.location(), 0, 64).await.unwrap();
        assert_eq!(data.len(), 65);
    }
}
