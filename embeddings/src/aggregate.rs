//! Reduce a list of tokens to one representative embedding.

use std::sync::Arc;

use tracing::debug;

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingRequest};

/// Element-wise arithmetic mean of equal-length vectors.
///
/// Fails with [`EmbeddingError::EmptyInput`] for an empty slice rather than
/// returning a zero vector, and with [`EmbeddingError::DimensionMismatch`]
/// if any vector differs in length from the first.
pub fn mean(vectors: &[Embedding]) -> Result<Embedding> {
    let first = vectors.first().ok_or(EmbeddingError::EmptyInput)?;
    let dim = first.len();

    let sum = vectors.iter().try_fold(vec![0.0f32; dim], |mut acc, v| {
        if v.len() != dim {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dim,
                actual: v.len(),
            });
        }
        for (total, x) in acc.iter_mut().zip(v) {
            *total += x;
        }
        Ok(acc)
    })?;

    let n = vectors.len() as f32;
    Ok(sum.into_iter().map(|total| total / n).collect())
}

/// Trim and lowercase tokens, dropping blank ones.
///
/// Order and duplicates are kept: a repeated interest weighs more in the
/// mean.
pub fn normalize_tokens<S: AsRef<str>>(tokens: &[S]) -> Vec<String> {
    tokens
        .iter()
        .map(|t| t.as_ref().trim())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Encodes each token with a provider and averages the results.
#[derive(Clone)]
pub struct EmbeddingAggregator {
    provider: Arc<dyn EmbeddingProvider>,
}

impl EmbeddingAggregator {
    /// Create an aggregator over the given encoder.
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { provider }
    }

    /// Dimension of every vector this aggregator produces.
    pub fn dimension(&self) -> usize {
        self.provider.default_dimension()
    }

    /// Encode `tokens` in one batch and return their mean.
    ///
    /// The token list must be non-empty; callers decide upstream what an
    /// entity without tokens means.
    pub async fn aggregate<S: AsRef<str>>(&self, tokens: &[S]) -> Result<Embedding> {
        if tokens.is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let requests = tokens
            .iter()
            .map(|t| EmbeddingRequest::new(t.as_ref()))
            .collect();
        let responses = self.provider.embed_batch(requests).await?;

        if responses.len() != tokens.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                tokens.len(),
                responses.len()
            )));
        }

        let dim = self.dimension();
        let vectors = responses
            .into_iter()
            .map(|r| {
                if r.embedding.len() == dim {
                    Ok(r.embedding)
                } else {
                    Err(EmbeddingError::DimensionMismatch {
                        expected: dim,
                        actual: r.embedding.len(),
                    })
                }
            })
            .collect::<Result<Vec<_>>>()?;

        debug!("Aggregated {} tokens into a {dim}-d embedding", vectors.len());

        mean(&vectors)
    }
}
