//! Configuration for the Uplink engine.
//!
//! Every section has defaults, so a TOML file only needs the keys it
//! changes:
//!
//! ```toml
//! [encoder]
//! base_url = "http://encoder.internal:8080/v1"
//!
//! [limits]
//! default_recommendations = 10
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info};
use uplink_embeddings::DEFAULT_DIMENSION;

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UplinkConfig {
    /// Text encoder endpoint.
    pub encoder: EncoderConfig,

    /// Token encoding cache.
    pub cache: CacheConfig,

    /// Page and result limits.
    pub limits: LimitConfig,
}

impl UplinkConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).await?;
        let config = Self::from_toml_str(&text)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load `uplink/config.toml` from the user config directory, falling
    /// back to defaults when it does not exist.
    pub async fn discover() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if fs::try_exists(&path).await? => Self::load(path).await,
            _ => {
                debug!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Default location of the configuration file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("uplink").join("config.toml"))
    }

    /// Set the encoder configuration.
    pub fn with_encoder(mut self, encoder: EncoderConfig) -> Self {
        self.encoder = encoder;
        self
    }

    /// Set the cache configuration.
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Set the limit configuration.
    pub fn with_limits(mut self, limits: LimitConfig) -> Self {
        self.limits = limits;
        self
    }

    /// Check that every value is in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.encoder.dimension == 0 {
            return Err(ConfigError::Invalid {
                field: "encoder.dimension",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.limits.default_recommendations == 0 {
            return Err(ConfigError::Invalid {
                field: "limits.default_recommendations",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.limits.max_activity_page == 0 || self.limits.max_user_page == 0 {
            return Err(ConfigError::Invalid {
                field: "limits",
                reason: "page sizes must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Configuration for the text encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Base URL of an OpenAI-compatible embeddings service.
    pub base_url: String,

    /// Model name sent with each request.
    pub model: String,

    /// Dimension of every vector the model returns.
    pub dimension: usize,

    /// Environment variable holding the API key, if the service needs one.
    pub api_key_env: String,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/v1".to_string(),
            model: "all-MiniLM-L6-v2".to_string(),
            dimension: DEFAULT_DIMENSION,
            api_key_env: uplink_embeddings::provider::API_KEY_ENV.to_string(),
        }
    }
}

/// Configuration for the token encoding cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether to cache token encodings.
    pub enabled: bool,

    /// Maximum number of cached tokens.
    pub max_entries: usize,

    /// Cache file written by `Uplink::flush`; in memory only when unset.
    pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
            path: None,
        }
    }
}

/// Result and page size limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitConfig {
    /// Recommendations returned when the caller gives no limit.
    pub default_recommendations: usize,

    /// Largest page of activities a listing may return.
    pub max_activity_page: usize,

    /// Largest page of users a listing may return.
    pub max_user_page: usize,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            default_recommendations: 5,
            max_activity_page: 50,
            max_user_page: 100,
        }
    }
}
