//! # Embeddings
//!
//! This crate turns free-text tag and interest lists into fixed-size vectors
//! and ranks activities against a user's vector for Uplink.
//!
//! ## Features
//!
//! - **Text Encoding**: Convert a token to a dense vector through an encoder service
//! - **Aggregation**: Reduce a token list to one representative vector (element-wise mean)
//! - **Ranking**: Exhaustive cosine scoring with bounded top-k selection
//! - **Caching**: Reuse encodings of tokens that repeat across entities
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Embeddings System                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  tokens ──► EmbeddingProvider ──► EmbeddingAggregator ──► Embedding
//! │                  │                                          │   │
//! │                  ▼                                          ▼   │
//! │           CachedProvider                          rank(query, k)│
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod aggregate;
pub mod cache;
pub mod error;
pub mod provider;
pub mod similarity;

pub use aggregate::{EmbeddingAggregator, mean, normalize_tokens};
pub use cache::{CacheStats, CachedProvider, EmbeddingCache};
pub use error::{EmbeddingError, Result};
pub use provider::{EmbeddingProvider, EmbeddingRequest, EmbeddingResponse, HttpProvider};
pub use similarity::{Candidate, ScoredCandidate, cosine_similarity, rank};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;

/// Dimension of embeddings produced by all-MiniLM-L6-v2.
pub const DEFAULT_DIMENSION: usize = 384;
