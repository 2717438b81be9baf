//! Synthesis cache: deduplicates synthesized audio by (voice, text, instructions).
//!
//! Keys are taken exactly as given; no whitespace or case normalization.
//! Misses go to the configured `SpeechSynthesizer` and mark the entry dirty.
//! Dirty entries reach the `CacheStore` only on `flush`, which the scheduler
//! calls whenever it goes idle.

use crate::audio::{SpeechSynthesizer, SynthesisError};
use crate::storage::{CacheRecord, CacheStore};
use crate::Result;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Cache key; displays as `voice+text-instructions`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub voice: String,
    pub text: String,
    pub instructions: String,
}

impl CacheKey {
    pub fn new(voice: &str, text: &str, instructions: &str) -> Self {
        Self {
            voice: voice.to_string(),
            text: text.to_string(),
            instructions: instructions.to_string(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}-{}", self.voice, self.text, self.instructions)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<CacheKey, Arc<[u8]>>,
    // Insertion order, oldest first
    order: VecDeque<CacheKey>,
    // Written since last flush
    dirty: HashSet<CacheKey>,
    // Evicted since last flush, to be removed from the store
    evicted: HashSet<CacheKey>,
}

impl CacheInner {
    fn insert(&mut self, key: CacheKey, audio: Arc<[u8]>, mark_dirty: bool, max: Option<usize>) {
        if self.entries.insert(key.clone(), audio).is_none() {
            self.order.push_back(key.clone());
        }
        self.evicted.remove(&key);
        if mark_dirty {
            self.dirty.insert(key);
        }
        self.evict_over(max);
    }

    fn evict_over(&mut self, max: Option<usize>) {
        let Some(max) = max else { return };
        while self.entries.len() > max {
            let Some(oldest) = self.order.pop_front() else { break };
            self.entries.remove(&oldest);
            self.dirty.remove(&oldest);
            debug!(target = "cache", key = %oldest, "Evicted cache entry");
            self.evicted.insert(oldest);
        }
    }
}

pub struct SynthesisCache {
    inner: RwLock<CacheInner>,
    synthesizer: RwLock<Arc<dyn SpeechSynthesizer>>,
    store: Option<Arc<dyn CacheStore>>,
    max_entries: Option<usize>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SynthesisCache {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        store: Option<Arc<dyn CacheStore>>,
    ) -> Self {
        Self {
            inner: RwLock::new(CacheInner::default()),
            synthesizer: RwLock::new(synthesizer),
            store,
            max_entries: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Bound the number of entries; the oldest are evicted first. `None` is unbounded.
    pub fn with_max_entries(mut self, max_entries: Option<usize>) -> Self {
        self.max_entries = max_entries.filter(|m| *m > 0);
        self
    }

    /// Return cached audio for the key, synthesizing it on a miss.
    pub async fn get_or_create(
        &self,
        voice: &str,
        text: &str,
        instructions: &str,
    ) -> std::result::Result<Arc<[u8]>, SynthesisError> {
        let key = CacheKey::new(voice, text, instructions);
        if let Some(audio) = self.inner.read().await.entries.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(target = "cache", voice, bytes = audio.len(), "Cache hit");
            return Ok(Arc::clone(audio));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let synthesizer = Arc::clone(&*self.synthesizer.read().await);
        debug!(target = "cache", voice, "Cache miss; synthesizing");
        let audio: Arc<[u8]> = synthesizer
            .synthesize(voice, text, instructions)
            .await?
            .into();

        self.inner
            .write()
            .await
            .insert(key, Arc::clone(&audio), true, self.max_entries);
        Ok(audio)
    }

    /// Merge persisted records into memory. Entries already in memory win.
    pub async fn load(&self) -> Result<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let records = store.load_all()?;
        let mut inner = self.inner.write().await;
        let mut loaded = 0usize;
        for record in records {
            let key = record.key();
            if inner.entries.contains_key(&key) {
                continue;
            }
            inner.insert(key, record.audio.into(), false, self.max_entries);
            loaded += 1;
        }
        info!(target = "cache", loaded, total = inner.entries.len(), "Loaded synthesis cache");
        Ok(loaded)
    }

    /// Write dirty entries (and drop evicted ones) to the store.
    pub async fn flush(&self) -> Result<usize> {
        let (records, evicted) = {
            let mut inner = self.inner.write().await;
            if inner.dirty.is_empty() && inner.evicted.is_empty() {
                return Ok(0);
            }
            let dirty: Vec<CacheKey> = inner.dirty.drain().collect();
            let records: Vec<CacheRecord> = dirty
                .into_iter()
                .filter_map(|key| {
                    inner.entries.get(&key).map(|audio| CacheRecord {
                        voice: key.voice.clone(),
                        text: key.text.clone(),
                        instructions: key.instructions.clone(),
                        audio: audio.to_vec(),
                    })
                })
                .collect();
            let evicted: Vec<CacheKey> = inner.evicted.drain().collect();
            (records, evicted)
        };

        let Some(store) = &self.store else {
            return Ok(0);
        };

        if let Err(e) = store.put_batch(&records) {
            // Keep them dirty for the next idle flush
            let mut inner = self.inner.write().await;
            for record in &records {
                let key = record.key();
                if inner.entries.contains_key(&key) {
                    inner.dirty.insert(key);
                }
            }
            return Err(e);
        }
        for key in &evicted {
            if let Err(e) = store.delete(key) {
                warn!(target = "cache", key = %key, error = %e, "Failed to delete evicted entry");
            }
        }

        info!(
            target = "cache",
            written = records.len(),
            deleted = evicted.len(),
            "Flushed synthesis cache"
        );
        Ok(records.len())
    }

    /// Swap the synthesizer (e.g. new credentials) and reload persisted entries.
    pub async fn set_synthesizer(&self, synthesizer: Arc<dyn SpeechSynthesizer>) -> Result<usize> {
        *self.synthesizer.write().await = synthesizer;
        self.load().await
    }

    pub async fn contains(&self, voice: &str, text: &str, instructions: &str) -> bool {
        self.inner
            .read()
            .await
            .entries
            .contains_key(&CacheKey::new(voice, text, instructions))
    }

    pub async fn is_dirty(&self) -> bool {
        let inner = self.inner.read().await;
        !inner.dirty.is_empty() || !inner.evicted.is_empty()
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.inner.read().await.entries.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_display_is_human_readable() {
        let key = CacheKey::new("nova", "Hello there", "whisper");
        assert_eq!(key.to_string(), "nova+Hello there-whisper");
    }

    #[test]
    fn eviction_drops_oldest_first() {
        let mut inner = CacheInner::default();
        for text in ["a", "b", "c"] {
            inner.insert(CacheKey::new("v", text, ""), Arc::from(vec![1u8]), true, Some(2));
        }
        assert_eq!(inner.entries.len(), 2);
        assert!(!inner.entries.contains_key(&CacheKey::new("v", "a", "")));
        assert!(inner.evicted.contains(&CacheKey::new("v", "a", "")));
        assert!(!inner.dirty.contains(&CacheKey::new("v", "a", "")));
    }
}
