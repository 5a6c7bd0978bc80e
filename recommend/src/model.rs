//! Users, activities and the recommendation record.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uplink_embeddings::{Embedding, ScoredCandidate};

/// Identifier of a user.
pub type UserId = i64;

/// Identifier of an activity.
pub type ActivityId = i64;

/// Lifecycle state of an activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    /// Open for joining and eligible for recommendation.
    #[default]
    Active,
    /// Took place.
    Completed,
    /// Called off by the host.
    Cancelled,
}

impl ActivityStatus {
    /// Whether activities in this state can be joined and recommended.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// A registered user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub username: String,
    pub full_name: String,

    /// Normalized interests the embedding is derived from.
    pub interests: Vec<String>,

    pub bio: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,

    /// Mean interest embedding; absent when the user has no interests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Embedding>,

    pub created_at: DateTime<Utc>,
}

/// Registration input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub full_name: String,
    pub interests: Vec<String>,
    pub bio: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
}

/// Partial update of a user; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub interests: Option<Vec<String>>,
    pub bio: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
}

/// A social activity users can join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub host_id: UserId,
    pub title: String,
    pub description: String,

    /// Normalized tags the embedding is derived from.
    pub tags: Vec<String>,

    pub location: String,
    pub date_time: DateTime<Utc>,
    pub max_participants: u32,
    pub participants: Vec<UserId>,
    pub status: ActivityStatus,

    /// Mean tag embedding; absent when the activity has no tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Embedding>,

    pub created_at: DateTime<Utc>,
}

impl Activity {
    /// Whether `user` has joined.
    pub fn has_participant(&self, user: UserId) -> bool {
        self.participants.contains(&user)
    }

    /// Whether every place is taken.
    pub fn is_full(&self) -> bool {
        self.participants.len() >= self.max_participants as usize
    }
}

/// Input for creating an activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewActivity {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub tags: Vec<String>,
    pub location: String,
    pub date_time: DateTime<Utc>,
    pub max_participants: u32,
}

/// Partial update of an activity; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub location: Option<String>,
    pub date_time: Option<DateTime<Utc>>,
    pub max_participants: Option<u32>,
}

/// An activity recommended to a user, with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecommendation {
    pub activity_id: ActivityId,
    pub title: String,
    pub description: String,
    pub date_time: DateTime<Utc>,
    pub location: String,
    pub max_participants: u32,
    pub tags: Vec<String>,
    pub similarity: f32,
}

impl From<ScoredCandidate<ActivityId, Activity>> for ActivityRecommendation {
    fn from(scored: ScoredCandidate<ActivityId, Activity>) -> Self {
        let activity = scored.payload;
        Self {
            activity_id: scored.id,
            title: activity.title,
            description: activity.description,
            date_time: activity.date_time,
            location: activity.location,
            max_participants: activity.max_participants,
            tags: activity.tags,
            similarity: scored.score,
        }
    }
}
