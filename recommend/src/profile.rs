//! Embedding lifecycle of users and activities.
//!
//! An entity's embedding is derived from its token list (interests or
//! tags). It is computed on creation, and on update only through an
//! [`EmbeddingTransition`] planned from the old and requested token lists,
//! so edits to other fields never touch it.

use tracing::debug;
use uplink_embeddings::{Embedding, EmbeddingAggregator, Result, normalize_tokens};

/// What an update does to an entity's embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbeddingTransition {
    /// Tokens untouched or equal after normalization.
    Unchanged,
    /// Tokens changed; recompute from these normalized tokens.
    Recompute(Vec<String>),
    /// Tokens became empty; drop the embedding.
    Clear,
}

impl EmbeddingTransition {
    /// Plan the transition from `current` tokens to an optional new list.
    pub fn plan<S: AsRef<str>>(current: &[String], requested: Option<&[S]>) -> Self {
        let Some(requested) = requested else {
            return Self::Unchanged;
        };

        let tokens = normalize_tokens(requested);
        if tokens == current {
            Self::Unchanged
        } else if tokens.is_empty() {
            Self::Clear
        } else {
            Self::Recompute(tokens)
        }
    }
}

/// Computes and maintains token embeddings for entities.
#[derive(Clone)]
pub struct ProfileEmbedder {
    aggregator: EmbeddingAggregator,
}

impl ProfileEmbedder {
    pub fn new(aggregator: EmbeddingAggregator) -> Self {
        Self { aggregator }
    }

    /// Embedding for a freshly created entity with normalized `tokens`.
    ///
    /// No tokens means no embedding, never a zero vector.
    pub async fn embed_new(&self, tokens: &[String]) -> Result<Option<Embedding>> {
        if tokens.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.aggregator.aggregate(tokens).await?))
    }

    /// Apply `transition` to an entity's tokens and embedding.
    ///
    /// Nothing is modified if encoding fails. Returns whether anything
    /// changed.
    pub async fn apply(
        &self,
        transition: EmbeddingTransition,
        tokens: &mut Vec<String>,
        embedding: &mut Option<Embedding>,
    ) -> Result<bool> {
        match transition {
            EmbeddingTransition::Unchanged => Ok(false),
            EmbeddingTransition::Clear => {
                debug!("Token list emptied, clearing embedding");
                tokens.clear();
                *embedding = None;
                Ok(true)
            }
            EmbeddingTransition::Recompute(new_tokens) => {
                let fresh = self.aggregator.aggregate(&new_tokens).await?;
                debug!("Recomputed embedding from {} tokens", new_tokens.len());
                *tokens = new_tokens;
                *embedding = Some(fresh);
                Ok(true)
            }
        }
    }
}
