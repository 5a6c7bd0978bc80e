//! # Recommend
//!
//! Activity recommendations for Uplink. Users describe themselves with
//! interests, hosts describe activities with tags, and both are embedded
//! with the same encoder so they can be compared directly.
//!
//! - **Users**: Registration and profile updates
//! - **Activities**: Hosting, membership and status changes
//! - **Recommendations**: Active activities ranked by cosine similarity
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           Uplink                                │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │ UserService  │  │  Activity    │  │ Recommender  │           │
//! │  │              │  │  Service     │  │              │           │
//! │  └──────────────┘  └──────────────┘  └──────────────┘           │
//! │         │                 │                 │                   │
//! │         ▼                 ▼                 │                   │
//! │  ┌─────────────────────────────┐            │                   │
//! │  │      ProfileEmbedder        │            │                   │
//! │  └─────────────────────────────┘            │                   │
//! │         │                 │                 │                   │
//! │         └────────────────►▼◄────────────────┘                   │
//! │                    ┌──────────────┐                             │
//! │                    │  DataStore   │                             │
//! │                    └──────────────┘                             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use uplink_recommend::{Uplink, UplinkConfig};
//!
//! let uplink = Uplink::new(UplinkConfig::discover().await?).await?;
//!
//! let user = uplink.users().register(new_user).await?;
//! let picks = uplink.recommend(user.id, None).await?;
//! ```

pub mod activities;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod profile;
pub mod store;
pub mod users;

#[cfg(test)]
mod testing;

pub use activities::ActivityService;
pub use config::{CacheConfig, EncoderConfig, LimitConfig, UplinkConfig};
pub use engine::{Recommender, Uplink, UplinkBuilder};
pub use error::{
    ActivityError, ConfigError, ErrorKind, RecommendError, Result, StoreError, UserError,
};
pub use model::{
    Activity, ActivityId, ActivityRecommendation, ActivityStatus, ActivityUpdate, NewActivity,
    NewUser, User, UserId, UserUpdate,
};
pub use profile::{EmbeddingTransition, ProfileEmbedder};
pub use store::{DataStore, InMemoryStore};
pub use users::UserService;

// Re-export from dependencies for convenience
pub use uplink_embeddings::{Embedding, EmbeddingProvider};
