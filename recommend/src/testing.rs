//! Test helpers: a deterministic keyword encoder and a seeded store.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use uplink_embeddings::{
    EmbeddingAggregator, EmbeddingError, EmbeddingProvider, EmbeddingRequest, EmbeddingResponse,
    Result,
};

use crate::model::{User, UserId};
use crate::profile::ProfileEmbedder;
use crate::store::{DataStore, InMemoryStore};

/// Encodes a small fixed vocabulary into 3-d vectors and counts the tokens
/// it was asked to encode.
#[derive(Default)]
pub(crate) struct KeywordProvider {
    encoded: AtomicUsize,
    yields: usize,
}

impl KeywordProvider {
    /// A provider that hands control back to the runtime `yields` times
    /// before every encode.
    pub(crate) fn yielding(yields: usize) -> Self {
        Self {
            yields,
            ..Self::default()
        }
    }

    /// Number of tokens encoded so far.
    pub(crate) fn encoded(&self) -> usize {
        self.encoded.load(Ordering::SeqCst)
    }

    fn lookup(token: &str) -> Option<Vec<f32>> {
        let v = match token {
            "hiking" => [1.0, 0.0, 0.0],
            "climbing" => [0.8, 0.6, 0.0],
            "chess" => [0.0, 1.0, 0.0],
            "cooking" => [0.0, 0.0, 1.0],
            "baking" => [0.0, 0.6, 0.8],
            _ => return None,
        };
        Some(v.to_vec())
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordProvider {
    fn name(&self) -> &str {
        "keyword"
    }

    fn default_model(&self) -> &str {
        "keyword-v1"
    }

    fn default_dimension(&self) -> usize {
        3
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        for _ in 0..self.yields {
            tokio::task::yield_now().await;
        }
        self.encoded.fetch_add(1, Ordering::SeqCst);
        let embedding = Self::lookup(&request.text).ok_or_else(|| {
            EmbeddingError::InvalidResponse(format!("unknown token: {}", request.text))
        })?;
        Ok(EmbeddingResponse {
            dimension: embedding.len(),
            embedding,
            model: "keyword-v1".to_string(),
            tokens_used: None,
        })
    }

    fn is_available(&self) -> bool {
        true
    }
}

pub(crate) fn keyword_embedder() -> ProfileEmbedder {
    counting_embedder().0
}

/// An embedder plus a handle to its provider's encode counter.
pub(crate) fn counting_embedder() -> (ProfileEmbedder, Arc<KeywordProvider>) {
    let provider = Arc::new(KeywordProvider::default());
    let embedder = ProfileEmbedder::new(EmbeddingAggregator::new(provider.clone()));
    (embedder, provider)
}

/// An embedder whose encodes suspend before completing.
pub(crate) fn yielding_embedder(yields: usize) -> ProfileEmbedder {
    ProfileEmbedder::new(EmbeddingAggregator::new(Arc::new(
        KeywordProvider::yielding(yields),
    )))
}

/// A bare user row named `username`.
pub(crate) fn user_row(username: &str) -> User {
    User {
        id: 0,
        email: format!("{username}@example.com"),
        username: username.to_string(),
        full_name: "Test User".to_string(),
        interests: Vec::new(),
        bio: None,
        country: None,
        city: None,
        embedding: None,
        created_at: Utc::now(),
    }
}

/// A store holding `count` users with ids `1..=count`.
pub(crate) async fn store_with_users(count: UserId) -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    for n in 1..=count {
        store.insert_user(user_row(&format!("user_{n}"))).await.unwrap();
    }
    store
}
