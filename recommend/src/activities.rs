//! Activity lifecycle and membership.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uplink_embeddings::normalize_tokens;

use crate::config::LimitConfig;
use crate::error::ActivityError;
use crate::model::{Activity, ActivityId, ActivityStatus, ActivityUpdate, NewActivity, UserId};
use crate::profile::{EmbeddingTransition, ProfileEmbedder};
use crate::store::DataStore;

/// Result type alias for activity operations.
pub type ActivityResult<T> = std::result::Result<T, ActivityError>;

const TITLE_CHARS: std::ops::RangeInclusive<usize> = 3..=100;
const MAX_DESCRIPTION_CHARS: usize = 1000;
const PARTICIPANT_RANGE: std::ops::RangeInclusive<u32> = 1..=100;

/// Creates activities, enforces host and membership rules, and keeps tag
/// embeddings current.
#[derive(Clone)]
pub struct ActivityService {
    store: Arc<dyn DataStore>,
    embedder: ProfileEmbedder,
    max_page: usize,
}

impl ActivityService {
    /// Create a new activity service.
    pub fn new(store: Arc<dyn DataStore>, embedder: ProfileEmbedder, limits: &LimitConfig) -> Self {
        Self {
            store,
            embedder,
            max_page: limits.max_activity_page,
        }
    }

    /// Create an activity hosted by `host_id`.
    pub async fn create(&self, host_id: UserId, new: NewActivity) -> ActivityResult<Activity> {
        let title = validate_title(&new.title)?;
        let description = validate_description(&new.description)?;
        let location = validate_location(&new.location)?;
        validate_capacity(new.max_participants)?;

        if self.store.fetch_user(host_id).await?.is_none() {
            return Err(ActivityError::HostNotFound(host_id));
        }

        let tags = normalize_tokens(&new.tags);
        let embedding = self.embedder.embed_new(&tags).await?;

        let activity = self
            .store
            .insert_activity(Activity {
                id: 0,
                host_id,
                title,
                description,
                tags,
                location,
                date_time: new.date_time,
                max_participants: new.max_participants,
                participants: Vec::new(),
                status: ActivityStatus::Active,
                embedding,
                created_at: Utc::now(),
            })
            .await?;

        info!("User {host_id} created activity {}", activity.id);
        Ok(activity)
    }

    /// Get an activity by id.
    pub async fn get(&self, id: ActivityId) -> ActivityResult<Activity> {
        self.store
            .fetch_activity(id)
            .await?
            .ok_or(ActivityError::NotFound(id))
    }

    /// Page through all activities.
    pub async fn list(&self, skip: usize, limit: usize) -> ActivityResult<Vec<Activity>> {
        self.check_limit(limit)?;
        Ok(self.store.list_activities(skip, limit).await?)
    }

    /// Activities hosted by `user`, newest first.
    pub async fn hosted_by(
        &self,
        user: UserId,
        skip: usize,
        limit: usize,
    ) -> ActivityResult<Vec<Activity>> {
        self.check_limit(limit)?;
        Ok(self.store.activities_hosted_by(user, skip, limit).await?)
    }

    /// Activities `user` has joined, soonest first.
    pub async fn joined_by(
        &self,
        user: UserId,
        skip: usize,
        limit: usize,
    ) -> ActivityResult<Vec<Activity>> {
        self.check_limit(limit)?;
        Ok(self.store.activities_joined_by(user, skip, limit).await?)
    }

    /// Apply a partial update on behalf of `caller`, who must be the host.
    ///
    /// New tags are encoded before the row is locked; only the fields named
    /// in `update` are written, so concurrent joins and leaves are kept.
    pub async fn update(
        &self,
        id: ActivityId,
        caller: UserId,
        update: ActivityUpdate,
    ) -> ActivityResult<Activity> {
        let current = self.hosted(id, caller).await?;

        let title = update.title.as_deref().map(validate_title).transpose()?;
        let description = update
            .description
            .as_deref()
            .map(validate_description)
            .transpose()?;
        let location = update
            .location
            .as_deref()
            .map(validate_location)
            .transpose()?;
        if let Some(max) = update.max_participants {
            validate_capacity(max)?;
        }

        let mut tags = current.tags.clone();
        let mut embedding = current.embedding.clone();
        let transition = EmbeddingTransition::plan(&current.tags, update.tags.as_deref());
        if self
            .embedder
            .apply(transition, &mut tags, &mut embedding)
            .await?
        {
            debug!("Retagging activity {id}");
        }
        let retag = update.tags.is_some().then_some((tags, embedding));
        let date_time = update.date_time;
        let max_participants = update.max_participants;

        let activity = self
            .store
            .modify_activity(
                id,
                Box::new(move |activity: &mut Activity| {
                    if activity.host_id != caller {
                        return Err(ActivityError::NotHost(id));
                    }
                    if let Some(max) = max_participants
                        && (max as usize) < activity.participants.len()
                    {
                        return Err(ActivityError::CapacityBelowParticipants {
                            requested: max,
                            current: activity.participants.len(),
                        });
                    }

                    if let Some(title) = title {
                        activity.title = title;
                    }
                    if let Some(description) = description {
                        activity.description = description;
                    }
                    if let Some(location) = location {
                        activity.location = location;
                    }
                    if let Some(date_time) = date_time {
                        activity.date_time = date_time;
                    }
                    if let Some(max) = max_participants {
                        activity.max_participants = max;
                    }
                    if let Some((tags, embedding)) = retag {
                        activity.tags = tags;
                        activity.embedding = embedding;
                    }
                    Ok(())
                }),
            )
            .await?;

        info!("User {caller} updated activity {id}");
        Ok(activity)
    }

    /// Delete an activity on behalf of `caller`, who must be the host.
    pub async fn delete(&self, id: ActivityId, caller: UserId) -> ActivityResult<()> {
        self.hosted(id, caller).await?;
        if !self.store.delete_activity(id).await? {
            return Err(ActivityError::NotFound(id));
        }
        info!("User {caller} deleted activity {id}");
        Ok(())
    }

    /// Add `user` to the participants.
    ///
    /// The membership rules are checked against the row as it is written,
    /// so concurrent joins never exceed capacity.
    pub async fn join(&self, id: ActivityId, user: UserId) -> ActivityResult<Activity> {
        if self.store.fetch_user(user).await?.is_none() {
            return Err(ActivityError::UserNotFound(user));
        }

        let activity = self
            .store
            .modify_activity(
                id,
                Box::new(move |activity: &mut Activity| {
                    if !activity.status.is_active() {
                        return Err(ActivityError::Inactive(id));
                    }
                    if activity.host_id == user {
                        return Err(ActivityError::HostCannotJoin);
                    }
                    if activity.has_participant(user) {
                        return Err(ActivityError::AlreadyJoined);
                    }
                    if activity.is_full() {
                        return Err(ActivityError::Full {
                            current: activity.participants.len(),
                            max: activity.max_participants,
                        });
                    }
                    activity.participants.push(user);
                    Ok(())
                }),
            )
            .await?;

        info!("User {user} joined activity {id}");
        Ok(activity)
    }

    /// Remove `user` from the participants.
    pub async fn leave(&self, id: ActivityId, user: UserId) -> ActivityResult<Activity> {
        let activity = self
            .store
            .modify_activity(
                id,
                Box::new(move |activity: &mut Activity| {
                    let Some(position) = activity.participants.iter().position(|&p| p == user)
                    else {
                        return Err(ActivityError::NotParticipant);
                    };
                    activity.participants.remove(position);
                    Ok(())
                }),
            )
            .await?;

        info!("User {user} left activity {id}");
        Ok(activity)
    }

    /// Move an activity to `status` on behalf of its host.
    ///
    /// Completed and cancelled activities drop out of recommendations.
    pub async fn set_status(
        &self,
        id: ActivityId,
        caller: UserId,
        status: ActivityStatus,
    ) -> ActivityResult<Activity> {
        let activity = self
            .store
            .modify_activity(
                id,
                Box::new(move |activity: &mut Activity| {
                    if activity.host_id != caller {
                        return Err(ActivityError::NotHost(id));
                    }
                    activity.status = status;
                    Ok(())
                }),
            )
            .await?;

        info!("Activity {id} is now {status}");
        Ok(activity)
    }

    async fn hosted(&self, id: ActivityId, caller: UserId) -> ActivityResult<Activity> {
        let activity = self.get(id).await?;
        if activity.host_id != caller {
            return Err(ActivityError::NotHost(id));
        }
        Ok(activity)
    }

    fn check_limit(&self, limit: usize) -> ActivityResult<()> {
        if limit > self.max_page {
            return Err(ActivityError::LimitTooLarge {
                requested: limit,
                max: self.max_page,
            });
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: String) -> ActivityError {
    ActivityError::Invalid { field, reason }
}

fn validate_title(raw: &str) -> ActivityResult<String> {
    let title = raw.trim();
    if !TITLE_CHARS.contains(&title.chars().count()) {
        return Err(invalid(
            "title",
            format!(
                "must be {} to {} characters",
                TITLE_CHARS.start(),
                TITLE_CHARS.end()
            ),
        ));
    }
    Ok(title.to_string())
}

fn validate_description(raw: &str) -> ActivityResult<String> {
    let description = raw.trim();
    if description.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(invalid(
            "description",
            format!("must be at most {MAX_DESCRIPTION_CHARS} characters"),
        ));
    }
    Ok(description.to_string())
}

fn validate_location(raw: &str) -> ActivityResult<String> {
    let location = raw.trim();
    if location.is_empty() {
        return Err(invalid("location", "must not be empty".to_string()));
    }
    Ok(location.to_string())
}

fn validate_capacity(max: u32) -> ActivityResult<()> {
    if !PARTICIPANT_RANGE.contains(&max) {
        return Err(invalid(
            "max_participants",
            format!(
                "must be between {} and {}",
                PARTICIPANT_RANGE.start(),
                PARTICIPANT_RANGE.end()
            ),
        ));
    }
    Ok(())
}
