//! Persistence for synthesized audio.
//!
//! Records are keyed by the human-readable `voice+text-instructions` string
//! and stored as JSON with base64 audio. Two backends:
//! - `RocksDbCacheStore` - on-disk, survives restarts
//! - `MemoryCacheStore` - tests and dry runs

use crate::cache::CacheKey;
use crate::{PlasticError, Result};
use dashmap::DashMap;
use rocksdb::{IteratorMode, Options, DB};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// One persisted synthesis result
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub voice: String,
    pub text: String,
    pub instructions: String,
    #[serde(with = "audio_b64")]
    pub audio: Vec<u8>,
}

impl CacheRecord {
    pub fn key(&self) -> CacheKey {
        CacheKey::new(&self.voice, &self.text, &self.instructions)
    }
}

/// Key/value backend for the synthesis cache.
pub trait CacheStore: Send + Sync {
    fn load_all(&self) -> Result<Vec<CacheRecord>>;

    fn put_batch(&self, records: &[CacheRecord]) -> Result<()>;

    fn delete(&self, key: &CacheKey) -> Result<()>;
}

/// Persistent cache storage using RocksDB
pub struct RocksDbCacheStore {
    db: DB,
}

impl RocksDbCacheStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = DB::open(&opts, path).map_err(|e| PlasticError::Storage(e.to_string()))?;

        info!(target = "cache", "Cache storage initialized");
        Ok(Self { db })
    }
}

impl CacheStore for RocksDbCacheStore {
    fn load_all(&self) -> Result<Vec<CacheRecord>> {
        let mut records = Vec::new();
        for item in self.db.iterator(IteratorMode::Start) {
            let (key, value) = item.map_err(|e| PlasticError::Storage(e.to_string()))?;
            match serde_json::from_slice::<CacheRecord>(&value) {
                Ok(record) => records.push(record),
                Err(e) => {
                    // Skip unreadable records rather than losing the whole cache
                    warn!(
                        target = "cache",
                        key = %String::from_utf8_lossy(&key),
                        error = %e,
                        "Skipping corrupt cache record"
                    );
                }
            }
        }
        Ok(records)
    }

    fn put_batch(&self, records: &[CacheRecord]) -> Result<()> {
        let mut batch = rocksdb::WriteBatch::default();
        for record in records {
            let serialized = serde_json::to_vec(record)?;
            batch.put(record.key().to_string(), serialized);
        }
        self.db
            .write(batch)
            .map_err(|e| PlasticError::Storage(e.to_string()))
    }

    fn delete(&self, key: &CacheKey) -> Result<()> {
        self.db
            .delete(key.to_string())
            .map_err(|e| PlasticError::Storage(e.to_string()))
    }
}

/// In-process store; contents vanish with the process.
#[derive(Default)]
pub struct MemoryCacheStore {
    records: DashMap<String, CacheRecord>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl CacheStore for MemoryCacheStore {
    fn load_all(&self) -> Result<Vec<CacheRecord>> {
        Ok(self.records.iter().map(|r| r.value().clone()).collect())
    }

    fn put_batch(&self, records: &[CacheRecord]) -> Result<()> {
        for record in records {
            self.records.insert(record.key().to_string(), record.clone());
        }
        Ok(())
    }

    fn delete(&self, key: &CacheKey) -> Result<()> {
        self.records.remove(&key.to_string());
        Ok(())
    }
}

mod audio_b64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
