//! Similarity scoring and top-k ranking.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Embedding;
use crate::error::{EmbeddingError, Result};

/// Compute the cosine similarity between two embeddings.
///
/// Returns a value between -1.0 and 1.0. If either vector has zero norm the
/// similarity is exactly 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(EmbeddingError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let dot_product: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let magnitude_a = norm(a);
    let magnitude_b = norm(b);

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return Ok(0.0);
    }

    Ok(dot_product / (magnitude_a * magnitude_b))
}

/// Euclidean norm of a vector.
pub fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// An item eligible for ranking.
#[derive(Debug, Clone)]
pub struct Candidate<I, P> {
    /// Identifier, also used to break score ties.
    pub id: I,

    /// Opaque data carried through to the result.
    pub payload: P,

    /// The candidate's embedding.
    pub embedding: Embedding,
}

impl<I, P> Candidate<I, P> {
    /// Create a new candidate.
    pub fn new(id: I, payload: P, embedding: Embedding) -> Self {
        Self {
            id,
            payload,
            embedding,
        }
    }
}

/// A ranked candidate with its similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate<I, P> {
    /// Identifier of the matched item.
    pub id: I,

    /// Data carried over from the candidate.
    pub payload: P,

    /// Cosine similarity to the query.
    pub score: f32,
}

/// Heap entry ordered so that a greater value is a better rank: higher score
/// first, then lower id.
struct Ranked<I, P> {
    score: OrderedFloat<f32>,
    id: I,
    payload: P,
}

impl<I: Ord, P> PartialEq for Ranked<I, P> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<I: Ord, P> Eq for Ranked<I, P> {}

impl<I: Ord, P> PartialOrd for Ranked<I, P> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<I: Ord, P> Ord for Ranked<I, P> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .cmp(&other.score)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Rank `candidates` by cosine similarity to `query` and keep the best `k`.
///
/// Results are ordered by descending score, ties broken by ascending id, so
/// identical inputs always produce identical output. Fewer than `k`
/// candidates yields all of them. Selection keeps a min-heap of at most `k`
/// entries instead of sorting every candidate.
pub fn rank<I, P>(
    query: &[f32],
    candidates: impl IntoIterator<Item = Candidate<I, P>>,
    k: usize,
) -> Result<Vec<ScoredCandidate<I, P>>>
where
    I: Ord,
{
    if k == 0 {
        return Err(EmbeddingError::InvalidLimit(k));
    }

    let mut heap: BinaryHeap<Reverse<Ranked<I, P>>> = BinaryHeap::new();
    let mut scored = 0usize;

    for candidate in candidates {
        let score = cosine_similarity(query, &candidate.embedding)?;
        scored += 1;

        let entry = Ranked {
            score: OrderedFloat(score),
            id: candidate.id,
            payload: candidate.payload,
        };

        if heap.len() < k {
            heap.push(Reverse(entry));
        } else if let Some(Reverse(worst)) = heap.peek()
            && entry > *worst
        {
            heap.pop();
            heap.push(Reverse(entry));
        }
    }

    debug!("Ranked {scored} candidates, keeping {}", heap.len());

    // Ascending order of `Reverse` is descending rank.
    Ok(heap
        .into_sorted_vec()
        .into_iter()
        .map(|Reverse(entry)| ScoredCandidate {
            id: entry.id,
            payload: entry.payload,
            score: entry.score.into_inner(),
        })
        .collect())
}
