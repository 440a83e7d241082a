//! Filesystem key-value backend: one file per key under a root directory.
//!
//! Stand-in for a real distributed store behind the same `KvStore` seam.
//! Keys are hashed to filenames; writes go through a temp file and rename so
//! a reader never observes a partial value.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::debug;

use loft_core::kv::{KvError, KvStore};

pub struct FsKvStore {
    root: PathBuf,
    max_value_size: usize,
}

impl FsKvStore {
    pub fn open(root: &Path, max_value_size: usize) -> std::io::Result<Self> {
        std::fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            max_value_size,
        })
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.root.join(hex::encode(Sha256::digest(key.as_bytes())))
    }

    /// Temp path unique to this write. Concurrent puts to one key (from this
    /// process or another sharing the directory) must not stage through the
    /// same file, or one writer's rename steals the other's partial bytes.
    fn tmp_path(&self, final_path: &Path) -> PathBuf {
        static SEQ: AtomicU64 = AtomicU64::new(0);
        let seq = SEQ.fetch_add(1, Ordering::Relaxed);
        final_path.with_extension(format!("{}-{seq}.tmp", std::process::id()))
    }
}

#[async_trait]
impl KvStore for FsKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        match tokio::fs::read(self.key_path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(KvError::Io(e)),
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), KvError> {
        if value.len() > self.max_value_size {
            return Err(KvError::ValueTooLarge {
                size: value.len(),
                limit: self.max_value_size,
            });
        }
        let path = self.key_path(key);
        let tmp = self.tmp_path(&path);
        tokio::fs::write(&tmp, &value).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(key = %key, size = value.len(), "kv value stored");
        Ok(())
    }
}
