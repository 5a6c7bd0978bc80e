//! Error types for users, activities and recommendations.
//!
//! Membership rules ([`ActivityError`]) and profile rules ([`UserError`])
//! are kept apart from [`RecommendError`] so a ranking failure is never
//! reported as, or confused with, a business-rule rejection.

use thiserror::Error;
use uplink_embeddings::EmbeddingError;

use crate::model::{ActivityId, UserId};

/// Result type alias for recommendation operations.
pub type Result<T> = std::result::Result<T, RecommendError>;

/// Errors surfaced by the recommendation engine.
#[derive(Error, Debug)]
pub enum RecommendError {
    /// The requesting user does not exist.
    #[error("user not found: {0}")]
    UserNotFound(UserId),

    /// The user has no interests, so there is nothing to rank against.
    #[error("user {0} has no interest embedding")]
    NoEmbedding(UserId),

    /// Aggregation or ranking failed.
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Data store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl RecommendError {
    /// The stable kind of this error, for mapping to user-facing states.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UserNotFound(_) => ErrorKind::UserNotFound,
            Self::NoEmbedding(_) => ErrorKind::NoEmbedding,
            Self::Embedding(EmbeddingError::InvalidLimit(_)) => ErrorKind::InvalidLimit,
            Self::Embedding(EmbeddingError::DimensionMismatch { .. }) => {
                ErrorKind::DimensionMismatch
            }
            Self::Embedding(EmbeddingError::EmptyInput) => ErrorKind::EmptyInput,
            Self::Embedding(_) => ErrorKind::Encoder,
            Self::Store(_) => ErrorKind::Store,
            Self::Config(_) => ErrorKind::Config,
        }
    }
}

/// Coarse classification of [`RecommendError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UserNotFound,
    NoEmbedding,
    InvalidLimit,
    DimensionMismatch,
    EmptyInput,
    Encoder,
    Store,
    Config,
}

/// Data store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A write targeted a row that does not exist.
    #[error("row not found: {0}")]
    Missing(String),

    /// A write violated a uniqueness constraint.
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Configuration loading errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML.
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Errors from user profile operations.
#[derive(Error, Debug)]
pub enum UserError {
    /// User not found.
    #[error("user not found: {0}")]
    NotFound(UserId),

    /// Another account already uses this email.
    #[error("email already registered")]
    EmailTaken,

    /// Another account already uses this username.
    #[error("username already taken")]
    UsernameTaken,

    /// Users cannot be deleted while they host activities.
    #[error("user {0} still hosts activities")]
    HostsActivities(UserId),

    /// A field failed validation.
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// Page size above the configured maximum.
    #[error("limit cannot exceed {max}")]
    LimitTooLarge { requested: usize, max: usize },

    /// Interest embedding failed.
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Data store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors from activity and membership operations.
#[derive(Error, Debug)]
pub enum ActivityError {
    /// Activity not found.
    #[error("activity not found: {0}")]
    NotFound(ActivityId),

    /// The host given for a new activity does not exist.
    #[error("host not found: {0}")]
    HostNotFound(UserId),

    /// The joining user does not exist.
    #[error("user not found: {0}")]
    UserNotFound(UserId),

    /// Only the host may change or delete an activity.
    #[error("only the host can modify activity {0}")]
    NotHost(ActivityId),

    /// The activity is completed or cancelled.
    #[error("cannot join inactive activity {0}")]
    Inactive(ActivityId),

    /// Hosts are not participants of their own activity.
    #[error("host cannot join their own activity")]
    HostCannotJoin,

    /// The user is already a participant.
    #[error("already joined this activity")]
    AlreadyJoined,

    /// No free places left.
    #[error("activity is full ({current}/{max})")]
    Full { current: usize, max: u32 },

    /// The user is not a participant.
    #[error("not a participant in this activity")]
    NotParticipant,

    /// Capacity cannot drop below the number already joined.
    #[error("cannot reduce max participants to {requested}: activity already has {current}")]
    CapacityBelowParticipants { requested: u32, current: usize },

    /// A field failed validation.
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// Page size above the configured maximum.
    #[error("limit cannot exceed {max}")]
    LimitTooLarge { requested: usize, max: usize },

    /// Tag embedding failed.
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Data store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
