//! Token encoding cache.
//!
//! Interests and tags repeat across many users and activities, so the
//! vector for a token is computed once per model and reused.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingRequest, EmbeddingResponse};

/// Cache entry for an embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The token that was encoded.
    pub text: String,

    /// Model used to generate the embedding.
    pub model: String,

    /// The embedding vector.
    pub embedding: Embedding,

    /// Insertion order, used for eviction.
    pub sequence: u64,
}

/// Bounded cache of token encodings, optionally persisted as JSON.
///
/// Writes stay in memory; a persisted cache reaches disk only on
/// [`EmbeddingCache::flush`].
pub struct EmbeddingCache {
    /// In-memory cache.
    cache: Arc<RwLock<HashMap<String, CacheEntry>>>,

    /// Next insertion sequence number.
    next_sequence: AtomicU64,

    /// Path for persistent cache storage.
    cache_path: Option<PathBuf>,

    /// Maximum cache size.
    max_entries: usize,
}

impl EmbeddingCache {
    /// Create a new in-memory cache.
    pub fn new(max_entries: usize) -> Self {
        Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
            next_sequence: AtomicU64::new(0),
            cache_path: None,
            max_entries,
        }
    }

    /// Create a cache backed by a JSON file, loading it if present.
    ///
    /// A file holding more than `max_entries` encodings keeps only the
    /// newest ones.
    pub async fn with_persistence(path: impl AsRef<Path>, max_entries: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let cache = Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
            next_sequence: AtomicU64::new(0),
            cache_path: Some(path.clone()),
            max_entries,
        };

        if fs::try_exists(&path).await? {
            cache.load().await?;
        }

        Ok(cache)
    }

    fn key(text: &str, model: &str) -> String {
        format!("{model}\u{1f}{text}")
    }

    /// Get an embedding from the cache.
    pub async fn get(&self, text: &str, model: &str) -> Option<Embedding> {
        let cache = self.cache.read().await;
        cache
            .get(&Self::key(text, model))
            .map(|e| e.embedding.clone())
    }

    /// Put an embedding in the cache.
    pub async fn put(&self, text: &str, model: &str, embedding: Embedding) {
        self.put_many(model, vec![(text.to_string(), embedding)])
            .await;
    }

    /// Put several embeddings for one model.
    pub async fn put_many(&self, model: &str, items: Vec<(String, Embedding)>) {
        if self.max_entries == 0 {
            return;
        }

        let mut cache = self.cache.write().await;
        for (text, embedding) in items {
            let key = Self::key(&text, model);

            if !cache.contains_key(&key) && cache.len() >= self.max_entries {
                let oldest = cache
                    .iter()
                    .min_by_key(|(_, v)| v.sequence)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    cache.remove(&oldest);
                    debug!("Evicted oldest cached embedding");
                }
            }

            let entry = CacheEntry {
                text,
                model: model.to_string(),
                embedding,
                sequence: self.next_sequence.fetch_add(1, Ordering::Relaxed),
            };
            cache.insert(key, entry);
        }
    }

    /// Check if an embedding is cached.
    pub async fn contains(&self, text: &str, model: &str) -> bool {
        self.cache
            .read()
            .await
            .contains_key(&Self::key(text, model))
    }

    /// Remove an embedding from the cache.
    pub async fn remove(&self, text: &str, model: &str) {
        self.cache.write().await.remove(&Self::key(text, model));
    }

    /// Clear the entire cache.
    pub async fn clear(&self) {
        self.cache.write().await.clear();
        info!("Cleared embedding cache");
    }

    /// Get cache statistics.
    pub async fn stats(&self) -> CacheStats {
        let cache = self.cache.read().await;
        let mut models: Vec<String> = cache
            .values()
            .map(|e| e.model.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        models.sort();

        CacheStats {
            entries: cache.len(),
            max_entries: self.max_entries,
            models,
        }
    }

    /// Write the cache to its file. Does nothing for an in-memory cache.
    pub async fn flush(&self) -> Result<()> {
        let Some(path) = &self.cache_path else {
            return Ok(());
        };

        let content = {
            let cache = self.cache.read().await;
            let mut entries: Vec<&CacheEntry> = cache.values().collect();
            entries.sort_by_key(|e| e.sequence);
            serde_json::to_string(&entries)?
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, content).await?;
        fs::rename(&temp_path, path).await?;

        debug!("Saved embedding cache to {}", path.display());
        Ok(())
    }

    /// Load cache from disk.
    async fn load(&self) -> Result<()> {
        let Some(path) = &self.cache_path else {
            return Ok(());
        };

        let content = fs::read_to_string(path).await?;
        let mut entries: Vec<CacheEntry> = serde_json::from_str(&content)
            .map_err(|e| EmbeddingError::Cache(format!("{}: {e}", path.display())))?;

        if entries.len() > self.max_entries {
            entries.sort_by_key(|e| std::cmp::Reverse(e.sequence));
            entries.truncate(self.max_entries);
            debug!("Trimmed persisted cache to {} entries", self.max_entries);
        }

        let mut cache = self.cache.write().await;
        let mut next_sequence = 0;
        for entry in entries {
            next_sequence = next_sequence.max(entry.sequence + 1);
            cache.insert(Self::key(&entry.text, &entry.model), entry);
        }
        self.next_sequence.store(next_sequence, Ordering::Relaxed);

        info!("Loaded {} cached embeddings from disk", cache.len());
        Ok(())
    }
}

/// Statistics about the embedding cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of entries in cache.
    pub entries: usize,

    /// Maximum cache size.
    pub max_entries: usize,

    /// Models with cached embeddings.
    pub models: Vec<String>,
}

/// A provider that consults an [`EmbeddingCache`] before encoding.
pub struct CachedProvider<P> {
    provider: P,
    cache: EmbeddingCache,
}

impl<P> CachedProvider<P>
where
    P: EmbeddingProvider,
{
    /// Create a new cached provider.
    pub fn new(provider: P, cache: EmbeddingCache) -> Self {
        Self { provider, cache }
    }

    /// Get the underlying cache.
    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    fn model_for(&self, request: &EmbeddingRequest) -> String {
        request
            .model
            .clone()
            .unwrap_or_else(|| self.provider.default_model().to_string())
    }

    fn hit(model: String, embedding: Embedding) -> EmbeddingResponse {
        EmbeddingResponse {
            dimension: embedding.len(),
            embedding,
            model,
            tokens_used: None,
        }
    }
}

#[async_trait]
impl<P> EmbeddingProvider for CachedProvider<P>
where
    P: EmbeddingProvider,
{
    fn name(&self) -> &str {
        self.provider.name()
    }

    fn default_model(&self) -> &str {
        self.provider.default_model()
    }

    fn default_dimension(&self) -> usize {
        self.provider.default_dimension()
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        let model = self.model_for(&request);

        if let Some(embedding) = self.cache.get(&request.text, &model).await {
            debug!("Cache hit for token");
            return Ok(Self::hit(model, embedding));
        }

        let text = request.text.clone();
        let response = self.provider.embed(request).await?;
        self.cache
            .put(&text, &model, response.embedding.clone())
            .await;

        Ok(response)
    }

    async fn embed_batch(&self, requests: Vec<EmbeddingRequest>) -> Result<Vec<EmbeddingResponse>> {
        let Some(first) = requests.first() else {
            return Ok(Vec::new());
        };
        let model = self.model_for(first);

        let mut slots: Vec<Option<EmbeddingResponse>> = Vec::with_capacity(requests.len());
        let mut misses: Vec<(usize, EmbeddingRequest)> = Vec::new();
        for (position, request) in requests.into_iter().enumerate() {
            match self.cache.get(&request.text, &model).await {
                Some(embedding) => slots.push(Some(Self::hit(model.clone(), embedding))),
                None => {
                    slots.push(None);
                    misses.push((position, request));
                }
            }
        }

        debug!(
            "Cache served {} of {} tokens",
            slots.len() - misses.len(),
            slots.len()
        );

        if !misses.is_empty() {
            let (positions, miss_requests): (Vec<usize>, Vec<EmbeddingRequest>) =
                misses.into_iter().unzip();
            let texts: Vec<String> = miss_requests.iter().map(|r| r.text.clone()).collect();

            let responses = self.provider.embed_batch(miss_requests).await?;
            if responses.len() != positions.len() {
                return Err(EmbeddingError::InvalidResponse(format!(
                    "expected {} embeddings, got {}",
                    positions.len(),
                    responses.len()
                )));
            }

            let fresh = texts
                .into_iter()
                .zip(responses.iter().map(|r| r.embedding.clone()))
                .collect();
            self.cache.put_many(&model, fresh).await;

            for (position, response) in positions.into_iter().zip(responses) {
                slots[position] = Some(response);
            }
        }

        slots
            .into_iter()
            .map(|slot| {
                slot.ok_or_else(|| EmbeddingError::Cache("unfilled batch slot".to_string()))
            })
            .collect()
    }

    fn is_available(&self) -> bool {
        self.provider.is_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    /// Encodes a token as `[len, 1.0]` and counts how many tokens it saw.
    struct CountingProvider {
        encoded: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        fn default_model(&self) -> &str {
            "counting-v1"
        }

        fn default_dimension(&self) -> usize {
            2
        }

        async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
            self.encoded.fetch_add(1, Ordering::SeqCst);
            Ok(EmbeddingResponse {
                embedding: vec![request.text.len() as f32, 1.0],
                model: "counting-v1".to_string(),
                dimension: 2,
                tokens_used: None,
            })
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_cache_put_get() {
        let cache = EmbeddingCache::new(100);
        let embedding = vec![1.0, 2.0, 3.0];

        cache.put("hiking", "model-1", embedding.clone()).await;

        assert_eq!(cache.get("hiking", "model-1").await, Some(embedding));
        assert!(cache.get("hiking", "model-2").await.is_none());
    }

    #[tokio::test]
    async fn test_cache_evicts_oldest() {
        let cache = EmbeddingCache::new(2);

        cache.put("a", "model", vec![1.0]).await;
        cache.put("b", "model", vec![2.0]).await;
        cache.put("c", "model", vec![3.0]).await;

        let stats = cache.stats().await;
        assert_eq!(stats.entries, 2);
        assert!(!cache.contains("a", "model").await);
        assert!(cache.contains("c", "model").await);
    }

    #[tokio::test]
    async fn test_cache_persistence() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cache/embeddings.json");

        {
            let cache = EmbeddingCache::with_persistence(&path, 10).await.unwrap();
            cache.put("chess", "model", vec![0.5, 0.5]).await;
            assert!(!path.exists());
            cache.flush().await.unwrap();
        }

        let cache = EmbeddingCache::with_persistence(&path, 10).await.unwrap();
        assert_eq!(cache.get("chess", "model").await, Some(vec![0.5, 0.5]));
    }

    #[tokio::test]
    async fn test_load_keeps_newest_entries_within_bound() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("embeddings.json");

        {
            let cache = EmbeddingCache::with_persistence(&path, 10).await.unwrap();
            for (text, value) in [("a", 1.0), ("b", 2.0), ("c", 3.0)] {
                cache.put(text, "model", vec![value]).await;
            }
            cache.flush().await.unwrap();
        }

        let cache = EmbeddingCache::with_persistence(&path, 2).await.unwrap();
        assert_eq!(cache.stats().await.entries, 2);
        assert!(!cache.contains("a", "model").await);
        assert!(cache.contains("b", "model").await);
        assert!(cache.contains("c", "model").await);

        cache.put("d", "model", vec![4.0]).await;
        assert_eq!(cache.stats().await.entries, 2);
        assert!(!cache.contains("b", "model").await);
    }

    #[tokio::test]
    async fn test_encoding_succeeds_when_cache_file_is_unwritable() {
        let temp_dir = TempDir::new().unwrap();
        let blocked = temp_dir.path().join("blocked");
        let cache = EmbeddingCache::with_persistence(blocked.join("embeddings.json"), 10)
            .await
            .unwrap();
        std::fs::write(&blocked, "not a directory").unwrap();

        let provider = CachedProvider::new(
            CountingProvider {
                encoded: Arc::new(AtomicUsize::new(0)),
            },
            cache,
        );

        let response = provider.embed(EmbeddingRequest::new("chess")).await.unwrap();
        assert_eq!(response.embedding, vec![5.0, 1.0]);
        let batch = provider
            .embed_batch(vec![EmbeddingRequest::new("go")])
            .await
            .unwrap();
        assert_eq!(batch[0].embedding, vec![2.0, 1.0]);

        assert!(provider.cache().flush().await.is_err());
    }

    #[tokio::test]
    async fn test_cached_batch_only_encodes_misses() {
        let encoded = Arc::new(AtomicUsize::new(0));
        let provider = CachedProvider::new(
            CountingProvider {
                encoded: Arc::clone(&encoded),
            },
            EmbeddingCache::new(100),
        );

        let first = provider
            .embed_batch(vec![
                EmbeddingRequest::new("chess"),
                EmbeddingRequest::new("go"),
            ])
            .await
            .unwrap();
        assert_eq!(encoded.load(Ordering::SeqCst), 2);

        let second = provider
            .embed_batch(vec![
                EmbeddingRequest::new("go"),
                EmbeddingRequest::new("hiking"),
                EmbeddingRequest::new("chess"),
            ])
            .await
            .unwrap();
        assert_eq!(encoded.load(Ordering::SeqCst), 3);

        assert_eq!(second[0].embedding, first[1].embedding);
        assert_eq!(second[1].embedding, vec![6.0, 1.0]);
        assert_eq!(second[2].embedding, first[0].embedding);
    }
}
