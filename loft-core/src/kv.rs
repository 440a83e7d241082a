//! Key-value seam: the distributed store as an opaque collaborator offering
//! whole-value get/put only. No compare-and-swap is available on this
//! contract, so read-modify-write callers (see the mailbox) carry a
//! lost-update window; a backend with conditional writes would have to
//! extend this trait to close it.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

/// Size ceiling a backend enforces per value, mirroring the record limits of
/// typical distributed stores.
pub const DEFAULT_MAX_VALUE_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("value too large: {size} bytes (limit {limit})")]
    ValueTooLarge { size: usize, limit: usize },
    #[error("backend error: {0}")]
    Backend(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Fetch the value at `key`; `Ok(None)` means the key was never written.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;

    /// Replace the whole value at `key`.
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), KvError>;
}

/// In-memory store double with the same size ceiling a real backend would
/// enforce.
pub struct MemoryKv {
    map: Mutex<HashMap<String, Vec<u8>>>,
    max_value_size: usize,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::with_max_value_size(DEFAULT_MAX_VALUE_SIZE)
    }

    pub fn with_max_value_size(max_value_size: usize) -> Self {
        Self {
            map: Mutex::new(HashMap::new()),
            max_value_size,
        }
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        Ok(self.map.lock().unwrap().get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), KvError> {
        if value.len() > self.max_value_size {
            return Err(KvError::ValueTooLarge {
                size: value.len(),
                limit: self.max_value_size,
            });
        }
        self.map.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_put_roundtrip() {
        let kv = MemoryKv::new();
        assert!(kv.get("k").await.unwrap().is_none());
        kv.put("k", b"value".to_vec()).await.unwrap();
        assert_eq!(kv.get("k").await.unwrap().unwrap(), b"value");
    }

    #[tokio::test]
    async fn oversized_value_is_rejected() {
        let kv = MemoryKv::with_max_value_size(8);
        let err = kv.put("k", vec![0u8; 9]).await.unwrap_err();
        match err {
            KvError::ValueTooLarge { size, limit } => {
                assert_eq!(size, 9);
                assert_eq!(limit, 8);
            }
            other => panic!("expected ValueTooLarge, got {other:?}"),
        }
    }
}
