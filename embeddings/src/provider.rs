//! Text encoder providers.
//!
//! An [`EmbeddingProvider`] maps a string to a fixed-length vector. The
//! encoder itself (model loading, versioning) lives outside this crate; the
//! shipped [`HttpProvider`] talks to any service exposing an
//! OpenAI-compatible `/embeddings` route.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{EmbeddingError, Result};
use crate::{DEFAULT_DIMENSION, Embedding};

/// Default environment variable holding the encoder API key.
pub const API_KEY_ENV: &str = "UPLINK_ENCODER_API_KEY";

/// Request for generating embeddings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    /// Text to embed.
    pub text: String,

    /// Model to use (provider-specific).
    pub model: Option<String>,

    /// Dimensions for the output (if supported by provider).
    pub dimensions: Option<usize>,
}

impl EmbeddingRequest {
    /// Create a new embedding request.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: None,
            dimensions: None,
        }
    }

    /// Set the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the output dimensions.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }
}

/// Response from embedding generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    /// The generated embedding.
    pub embedding: Embedding,

    /// Model used to generate the embedding.
    pub model: String,

    /// Dimension of the embedding.
    pub dimension: usize,

    /// Token usage (if available).
    pub tokens_used: Option<u64>,
}

/// Trait for text encoders.
///
/// Implementations must be deterministic for a given model version: the
/// aggregator relies on encoding the same string twice yielding the same
/// vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Get the name of this provider.
    fn name(&self) -> &str;

    /// Get the default model for this provider.
    fn default_model(&self) -> &str;

    /// Get the embedding dimension every returned vector has.
    fn default_dimension(&self) -> usize;

    /// Generate an embedding for the given text.
    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse>;

    /// Generate embeddings for multiple texts, in input order.
    async fn embed_batch(&self, requests: Vec<EmbeddingRequest>) -> Result<Vec<EmbeddingResponse>> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            results.push(self.embed(request).await?);
        }
        Ok(results)
    }

    /// Check if the provider is usable (endpoint set, etc.).
    fn is_available(&self) -> bool;
}

#[async_trait]
impl<T> EmbeddingProvider for Arc<T>
where
    T: EmbeddingProvider + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    fn default_model(&self) -> &str {
        (**self).default_model()
    }

    fn default_dimension(&self) -> usize {
        (**self).default_dimension()
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        (**self).embed(request).await
    }

    async fn embed_batch(&self, requests: Vec<EmbeddingRequest>) -> Result<Vec<EmbeddingResponse>> {
        (**self).embed_batch(requests).await
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }
}

/// Encoder backed by an OpenAI-compatible embeddings endpoint.
pub struct HttpProvider {
    /// API key, sent as a bearer token when present.
    api_key: Option<String>,

    /// API base URL.
    base_url: String,

    /// HTTP client.
    client: reqwest::Client,

    /// Default model.
    default_model: String,

    /// Dimension every response vector must have.
    dimension: usize,
}

impl HttpProvider {
    /// Create a provider pointing at a local encoder service, without an
    /// API key.
    pub fn new() -> Self {
        Self {
            api_key: None,
            base_url: "http://localhost:8080/v1".to_string(),
            client: reqwest::Client::new(),
            default_model: "all-MiniLM-L6-v2".to_string(),
            dimension: DEFAULT_DIMENSION,
        }
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Take the API key from the environment variable `name`, or send none
    /// when it is unset or empty.
    pub fn with_api_key_from_env(mut self, name: &str) -> Self {
        self.api_key = std::env::var(name).ok().filter(|key| !key.is_empty());
        self
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the default model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Set the expected output dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    async fn post(&self, body: serde_json::Value) -> Result<EncoderResponse> {
        if self.base_url.is_empty() {
            return Err(EmbeddingError::ProviderNotConfigured);
        }

        let mut builder = self
            .client
            .post(format!("{}/embeddings", self.base_url.trim_end_matches('/')))
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(api_key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {api_key}"));
        }

        let response = builder.send().await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);

            return Err(EmbeddingError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ApiRequest(format!(
                "encoder returned {status}: {error_text}"
            )));
        }

        Ok(response.json().await?)
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        Ok(())
    }
}

impl Default for HttpProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for HttpProvider {
    fn name(&self) -> &str {
        "http"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn default_dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        let model = request.model.unwrap_or_else(|| self.default_model.clone());

        debug!("Encoding text with model: {model}");

        let mut body = serde_json::json!({
            "input": request.text,
            "model": model
        });
        if let Some(dims) = request.dimensions {
            body["dimensions"] = serde_json::json!(dims);
        }

        let result = self.post(body).await?;

        let embedding = result
            .data
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("no embedding in response".to_string()))?
            .embedding;
        self.check_dimension(&embedding)?;

        Ok(EmbeddingResponse {
            dimension: embedding.len(),
            embedding,
            model: result.model,
            tokens_used: result.usage.map(|u| u.total_tokens),
        })
    }

    async fn embed_batch(&self, requests: Vec<EmbeddingRequest>) -> Result<Vec<EmbeddingResponse>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let model = requests[0]
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        let texts: Vec<&str> = requests.iter().map(|r| r.text.as_str()).collect();

        debug!("Encoding batch of {} texts with model: {model}", texts.len());

        let body = serde_json::json!({
            "input": texts,
            "model": model
        });

        let mut result = self.post(body).await?;

        if result.data.len() != requests.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                requests.len(),
                result.data.len()
            )));
        }

        // Servers may answer out of order; `index` refers to the input position.
        result.data.sort_by_key(|item| item.index);
        if let Some((position, item)) = result
            .data
            .iter()
            .enumerate()
            .find(|(position, item)| item.index != *position)
        {
            return Err(EmbeddingError::InvalidResponse(format!(
                "batch index {} does not match input position {position}",
                item.index
            )));
        }

        let mut responses = Vec::with_capacity(result.data.len());
        for item in result.data {
            self.check_dimension(&item.embedding)?;
            responses.push(EmbeddingResponse {
                dimension: item.embedding.len(),
                embedding: item.embedding,
                model: result.model.clone(),
                tokens_used: None,
            });
        }

        info!("Encoded {} texts in one batch", responses.len());

        Ok(responses)
    }

    fn is_available(&self) -> bool {
        !self.base_url.is_empty()
    }
}

/// Wire format of an OpenAI-compatible embeddings response.
#[derive(Debug, Deserialize)]
struct EncoderResponse {
    data: Vec<EncoderEmbedding>,
    model: String,
    usage: Option<EncoderUsage>,
}

#[derive(Debug, Deserialize)]
struct EncoderEmbedding {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct EncoderUsage {
    total_tokens: u64,
}
