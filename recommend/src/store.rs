//! Data store boundary.
//!
//! The engine reads and writes users and activities through [`DataStore`];
//! the relational backend behind it is not part of this crate.
//! [`InMemoryStore`] backs tests and single-process deployments.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{ActivityError, StoreError};
use crate::model::{Activity, ActivityId, ActivityStatus, User, UserId};

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A change to one activity, run while the store holds the row exclusively.
///
/// Returning an error rejects the change and leaves the row as it was.
pub type ActivityEdit = Box<dyn FnOnce(&mut Activity) -> Result<(), ActivityError> + Send>;

/// Row access for users and activities.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Fetch a user by id.
    async fn fetch_user(&self, id: UserId) -> StoreResult<Option<User>>;

    /// Fetch the user registered with `email`, if any.
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// Fetch the user registered with `username`, if any.
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;

    /// Page through users in id order.
    async fn list_users(&self, skip: usize, limit: usize) -> StoreResult<Vec<User>>;

    /// Insert a user. The store assigns `id`; the incoming value is ignored.
    async fn insert_user(&self, user: User) -> StoreResult<User>;

    /// Overwrite an existing user.
    async fn update_user(&self, user: User) -> StoreResult<User>;

    /// Delete a user and drop them from every participant list, returning
    /// whether the user existed.
    ///
    /// Fails with [`StoreError::Conflict`] while the user hosts activities.
    async fn delete_user(&self, id: UserId) -> StoreResult<bool>;

    /// Fetch an activity by id.
    async fn fetch_activity(&self, id: ActivityId) -> StoreResult<Option<Activity>>;

    /// All activities in `status`, in id order.
    async fn fetch_activities_by_status(
        &self,
        status: ActivityStatus,
    ) -> StoreResult<Vec<Activity>>;

    /// Page through activities in id order.
    async fn list_activities(&self, skip: usize, limit: usize) -> StoreResult<Vec<Activity>>;

    /// Activities hosted by `host`, newest first.
    async fn activities_hosted_by(
        &self,
        host: UserId,
        skip: usize,
        limit: usize,
    ) -> StoreResult<Vec<Activity>>;

    /// Activities `user` has joined, soonest first.
    async fn activities_joined_by(
        &self,
        user: UserId,
        skip: usize,
        limit: usize,
    ) -> StoreResult<Vec<Activity>>;

    /// Insert an activity. The store assigns `id`; the incoming value is ignored.
    ///
    /// Fails with [`StoreError::Missing`] when the host does not exist.
    async fn insert_activity(&self, activity: Activity) -> StoreResult<Activity>;

    /// Apply `edit` to an activity atomically and return the stored row.
    ///
    /// Concurrent edits of the same activity are serialized, so checks made
    /// inside `edit` hold when the change is written.
    async fn modify_activity(
        &self,
        id: ActivityId,
        edit: ActivityEdit,
    ) -> Result<Activity, ActivityError>;

    /// Delete an activity, returning whether it existed.
    async fn delete_activity(&self, id: ActivityId) -> StoreResult<bool>;
}

/// A [`DataStore`] held entirely in memory.
pub struct InMemoryStore {
    users: RwLock<HashMap<UserId, User>>,
    activities: RwLock<HashMap<ActivityId, Activity>>,
    next_user_id: AtomicI64,
    next_activity_id: AtomicI64,
}

impl InMemoryStore {
    /// Create an empty store. Ids start at 1.
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            activities: RwLock::new(HashMap::new()),
            next_user_id: AtomicI64::new(1),
            next_activity_id: AtomicI64::new(1),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn page<T>(rows: Vec<T>, skip: usize, limit: usize) -> Vec<T> {
    rows.into_iter().skip(skip).take(limit).collect()
}

#[async_trait]
impl DataStore for InMemoryStore {
    async fn fetch_user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.username == username).cloned())
    }

    async fn list_users(&self, skip: usize, limit: usize) -> StoreResult<Vec<User>> {
        let mut rows: Vec<User> = self.users.read().await.values().cloned().collect();
        rows.sort_by_key(|u| u.id);
        Ok(page(rows, skip, limit))
    }

    async fn insert_user(&self, mut user: User) -> StoreResult<User> {
        let mut users = self.users.write().await;
        if users
            .values()
            .any(|u| u.email == user.email || u.username == user.username)
        {
            return Err(StoreError::Conflict(format!(
                "user {} already exists",
                user.username
            )));
        }

        user.id = self.next_user_id.fetch_add(1, Ordering::Relaxed);
        users.insert(user.id, user.clone());
        debug!("Inserted user {}", user.id);
        Ok(user)
    }

    async fn update_user(&self, user: User) -> StoreResult<User> {
        let mut users = self.users.write().await;
        if users
            .values()
            .any(|u| u.id != user.id && u.username == user.username)
        {
            return Err(StoreError::Conflict(format!(
                "username {} already exists",
                user.username
            )));
        }

        match users.get_mut(&user.id) {
            Some(row) => {
                *row = user.clone();
                Ok(user)
            }
            None => Err(StoreError::Missing(format!("user {}", user.id))),
        }
    }

    async fn delete_user(&self, id: UserId) -> StoreResult<bool> {
        let mut users = self.users.write().await;
        let mut activities = self.activities.write().await;

        let hosted = activities.values().filter(|a| a.host_id == id).count();
        if hosted > 0 {
            return Err(StoreError::Conflict(format!(
                "user {id} still hosts {hosted} activities"
            )));
        }
        if users.remove(&id).is_none() {
            return Ok(false);
        }

        for activity in activities.values_mut() {
            activity.participants.retain(|&p| p != id);
        }
        debug!("Deleted user {id}");
        Ok(true)
    }

    async fn fetch_activity(&self, id: ActivityId) -> StoreResult<Option<Activity>> {
        Ok(self.activities.read().await.get(&id).cloned())
    }

    async fn fetch_activities_by_status(
        &self,
        status: ActivityStatus,
    ) -> StoreResult<Vec<Activity>> {
        let mut rows: Vec<Activity> = self
            .activities
            .read()
            .await
            .values()
            .filter(|a| a.status == status)
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.id);
        Ok(rows)
    }

    async fn list_activities(&self, skip: usize, limit: usize) -> StoreResult<Vec<Activity>> {
        let mut rows: Vec<Activity> = self.activities.read().await.values().cloned().collect();
        rows.sort_by_key(|a| a.id);
        Ok(page(rows, skip, limit))
    }

    async fn activities_hosted_by(
        &self,
        host: UserId,
        skip: usize,
        limit: usize,
    ) -> StoreResult<Vec<Activity>> {
        let mut rows: Vec<Activity> = self
            .activities
            .read()
            .await
            .values()
            .filter(|a| a.host_id == host)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(page(rows, skip, limit))
    }

    async fn activities_joined_by(
        &self,
        user: UserId,
        skip: usize,
        limit: usize,
    ) -> StoreResult<Vec<Activity>> {
        let mut rows: Vec<Activity> = self
            .activities
            .read()
            .await
            .values()
            .filter(|a| a.has_participant(user))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.date_time.cmp(&b.date_time).then(a.id.cmp(&b.id)));
        Ok(page(rows, skip, limit))
    }

    async fn insert_activity(&self, mut activity: Activity) -> StoreResult<Activity> {
        // Held until the row is in, so the host cannot be deleted meanwhile.
        let users = self.users.read().await;
        if !users.contains_key(&activity.host_id) {
            return Err(StoreError::Missing(format!("user {}", activity.host_id)));
        }

        activity.id = self.next_activity_id.fetch_add(1, Ordering::Relaxed);
        self.activities
            .write()
            .await
            .insert(activity.id, activity.clone());
        debug!("Inserted activity {}", activity.id);
        Ok(activity)
    }

    async fn modify_activity(
        &self,
        id: ActivityId,
        edit: ActivityEdit,
    ) -> Result<Activity, ActivityError> {
        let mut activities = self.activities.write().await;
        let row = activities
            .get_mut(&id)
            .ok_or(ActivityError::NotFound(id))?;

        let mut draft = row.clone();
        edit(&mut draft)?;
        *row = draft.clone();
        Ok(draft)
    }

    async fn delete_activity(&self, id: ActivityId) -> StoreResult<bool> {
        Ok(self.activities.write().await.remove(&id).is_some())
    }
}
