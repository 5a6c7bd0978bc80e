//! User registration and profile updates.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uplink_embeddings::normalize_tokens;

use crate::config::LimitConfig;
use crate::error::UserError;
use crate::model::{NewUser, User, UserId, UserUpdate};
use crate::profile::{EmbeddingTransition, ProfileEmbedder};
use crate::store::DataStore;

/// Result type alias for user operations.
pub type UserResult<T> = std::result::Result<T, UserError>;

/// Registers users and keeps their interest embeddings current.
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn DataStore>,
    embedder: ProfileEmbedder,
    max_page: usize,
}

impl UserService {
    /// Create a new user service.
    pub fn new(store: Arc<dyn DataStore>, embedder: ProfileEmbedder, limits: &LimitConfig) -> Self {
        Self {
            store,
            embedder,
            max_page: limits.max_user_page,
        }
    }

    /// Register a user, embedding their interests.
    ///
    /// A user without interests is stored without an embedding and cannot
    /// receive recommendations until interests are added.
    pub async fn register(&self, new_user: NewUser) -> UserResult<User> {
        let email = validate_email(&new_user.email)?;
        let username = validate_username(&new_user.username)?;
        let full_name = validate_full_name(&new_user.full_name)?;

        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(UserError::EmailTaken);
        }
        if self.store.find_user_by_username(&username).await?.is_some() {
            return Err(UserError::UsernameTaken);
        }

        let interests = normalize_tokens(&new_user.interests);
        let embedding = self.embedder.embed_new(&interests).await?;

        let user = self
            .store
            .insert_user(User {
                id: 0,
                email,
                username,
                full_name,
                interests,
                bio: new_user.bio,
                country: trimmed(new_user.country),
                city: trimmed(new_user.city),
                embedding,
                created_at: Utc::now(),
            })
            .await?;

        info!(
            "Registered user {} ({} interests)",
            user.id,
            user.interests.len()
        );
        Ok(user)
    }

    /// Get a user by id.
    pub async fn get(&self, id: UserId) -> UserResult<User> {
        self.store
            .fetch_user(id)
            .await?
            .ok_or(UserError::NotFound(id))
    }

    /// Page through users.
    pub async fn list(&self, skip: usize, limit: usize) -> UserResult<Vec<User>> {
        if limit > self.max_page {
            return Err(UserError::LimitTooLarge {
                requested: limit,
                max: self.max_page,
            });
        }
        Ok(self.store.list_users(skip, limit).await?)
    }

    /// Apply a partial update.
    ///
    /// The embedding is recomputed only when the normalized interest list
    /// actually changes.
    pub async fn update(&self, id: UserId, update: UserUpdate) -> UserResult<User> {
        let mut user = self.get(id).await?;

        if let Some(username) = &update.username {
            let username = validate_username(username)?;
            if username != user.username
                && self.store.find_user_by_username(&username).await?.is_some()
            {
                return Err(UserError::UsernameTaken);
            }
            user.username = username;
        }
        if let Some(full_name) = &update.full_name {
            user.full_name = validate_full_name(full_name)?;
        }
        if update.bio.is_some() {
            user.bio = update.bio;
        }
        if update.country.is_some() {
            user.country = trimmed(update.country);
        }
        if update.city.is_some() {
            user.city = trimmed(update.city);
        }

        let transition = EmbeddingTransition::plan(&user.interests, update.interests.as_deref());
        if self
            .embedder
            .apply(transition, &mut user.interests, &mut user.embedding)
            .await?
        {
            info!("Updated interests of user {id}");
        }

        Ok(self.store.update_user(user).await?)
    }

    /// Delete a user and drop them from every activity they joined.
    ///
    /// Refused while the user still hosts activities.
    pub async fn delete(&self, id: UserId) -> UserResult<()> {
        if !self.store.activities_hosted_by(id, 0, 1).await?.is_empty() {
            return Err(UserError::HostsActivities(id));
        }
        if !self.store.delete_user(id).await? {
            return Err(UserError::NotFound(id));
        }
        info!("Deleted user {id}");
        Ok(())
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn invalid(field: &'static str, reason: &str) -> UserError {
    UserError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

fn validate_email(raw: &str) -> UserResult<String> {
    let email = raw.trim();
    match email.split_once('@') {
        Some((local, domain))
            if !local.is_empty() && domain.contains('.') && !domain.contains('@') =>
        {
            Ok(email.to_string())
        }
        _ => Err(invalid("email", "not a valid address")),
    }
}

/// 4-32 ASCII letters, digits or underscores, with at least one letter.
fn validate_username(raw: &str) -> UserResult<String> {
    let username = raw.trim();
    if !(4..=32).contains(&username.chars().count()) {
        return Err(invalid("username", "must be 4 to 32 characters"));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
        || !username.chars().any(|c| c.is_ascii_alphabetic())
    {
        return Err(invalid(
            "username",
            "must contain a letter and only letters, digits or underscores",
        ));
    }
    Ok(username.to_string())
}

/// 4-64 letters, spaces, hyphens or apostrophes, with at least one letter.
fn validate_full_name(raw: &str) -> UserResult<String> {
    let full_name = raw.trim();
    if !(4..=64).contains(&full_name.chars().count()) {
        return Err(invalid("full_name", "must be 4 to 64 characters"));
    }
    if !full_name
        .chars()
        .all(|c| c.is_alphabetic() || matches!(c, ' ' | '-' | '\''))
        || !full_name.chars().any(char::is_alphabetic)
    {
        return Err(invalid(
            "full_name",
            "may only contain letters, spaces, hyphens and apostrophes",
        ));
    }
    Ok(full_name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Activity, ActivityStatus};
    use crate::store::InMemoryStore;
    use crate::testing::counting_embedder;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn service() -> UserService {
        UserService::new(
            Arc::new(InMemoryStore::new()),
            crate::testing::keyword_embedder(),
            &LimitConfig::default(),
        )
    }

    fn new_user(username: &str, interests: &[&str]) -> NewUser {
        NewUser {
            email: format!("{username}@example.com"),
            username: username.to_string(),
            full_name: "Mario Alexandru".to_string(),
            interests: interests.iter().map(ToString::to_string).collect(),
            ..NewUser::default()
        }
    }

    #[tokio::test]
    async fn test_register_embeds_normalized_interests() {
        let user = service()
            .register(new_user("mario", &[" Hiking", "CHESS", "  "]))
            .await
            .unwrap();

        assert_eq!(user.interests, vec!["hiking", "chess"]);
        assert_eq!(user.embedding, Some(vec![0.5, 0.5, 0.0]));
    }

    #[tokio::test]
    async fn test_register_without_interests_has_no_embedding() {
        let user = service().register(new_user("mario", &[])).await.unwrap();
        assert!(user.interests.is_empty());
        assert_eq!(user.embedding, None);
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates() {
        let service = service();
        service.register(new_user("mario", &[])).await.unwrap();

        let mut same_email = new_user("luigi", &[]);
        same_email.email = "mario@example.com".to_string();
        assert!(matches!(
            service.register(same_email).await,
            Err(UserError::EmailTaken)
        ));

        let mut same_username = new_user("mario", &[]);
        same_username.email = "other@example.com".to_string();
        assert!(matches!(
            service.register(same_username).await,
            Err(UserError::UsernameTaken)
        ));
    }

    #[test]
    fn test_username_rules() {
        assert_eq!(validate_username(" mario_123 ").unwrap(), "mario_123");
        assert!(validate_username("1234").is_err());
        assert!(validate_username("__123__").is_err());
        assert!(validate_username("mario!!!").is_err());
        assert!(validate_username("abc").is_err());
    }

    #[test]
    fn test_full_name_rules() {
        assert!(validate_full_name("Mario-Alexandru").is_ok());
        assert!(validate_full_name("O'Connor").is_ok());
        assert!(validate_full_name("R2-D2 Unit").is_err());
        assert!(validate_full_name("- '-").is_err());
    }

    #[test]
    fn test_email_rules() {
        assert!(validate_email("a@b.io").is_ok());
        assert!(validate_email("no-at-sign.io").is_err());
        assert!(validate_email("@b.io").is_err());
        assert!(validate_email("a@localhost").is_err());
    }

    #[tokio::test]
    async fn test_update_other_fields_keeps_embedding() {
        let (embedder, provider) = counting_embedder();
        let service = UserService::new(
            Arc::new(InMemoryStore::new()),
            embedder,
            &LimitConfig::default(),
        );
        let user = service
            .register(new_user("mario", &["hiking"]))
            .await
            .unwrap();
        let encoded = provider.encoded();

        let updated = service
            .update(
                user.id,
                UserUpdate {
                    bio: Some("Weekend hiker".to_string()),
                    interests: Some(vec!["HIKING".to_string()]),
                    ..UserUpdate::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(provider.encoded(), encoded);
        assert_eq!(updated.bio.as_deref(), Some("Weekend hiker"));
        assert_eq!(updated.embedding, user.embedding);
    }

    #[tokio::test]
    async fn test_update_interests_recomputes_embedding() {
        let service = service();
        let user = service
            .register(new_user("mario", &["hiking"]))
            .await
            .unwrap();

        let updated = service
            .update(
                user.id,
                UserUpdate {
                    interests: Some(vec!["cooking".to_string()]),
                    ..UserUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.embedding, Some(vec![0.0, 0.0, 1.0]));

        let cleared = service
            .update(
                user.id,
                UserUpdate {
                    interests: Some(Vec::new()),
                    ..UserUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(cleared.embedding, None);
        assert_eq!(service.get(user.id).await.unwrap().embedding, None);
    }

    #[tokio::test]
    async fn test_update_username_conflict() {
        let service = service();
        service.register(new_user("mario", &[])).await.unwrap();
        let luigi = service.register(new_user("luigi", &[])).await.unwrap();

        let result = service
            .update(
                luigi.id,
                UserUpdate {
                    username: Some("mario".to_string()),
                    ..UserUpdate::default()
                },
            )
            .await;
        assert!(matches!(result, Err(UserError::UsernameTaken)));
    }

    #[tokio::test]
    async fn test_list_limit_and_delete() {
        let service = service();
        let user = service.register(new_user("mario", &[])).await.unwrap();

        assert!(matches!(
            service.list(0, 101).await,
            Err(UserError::LimitTooLarge { max: 100, .. })
        ));
        assert_eq!(service.list(0, 10).await.unwrap().len(), 1);

        service.delete(user.id).await.unwrap();
        assert!(matches!(
            service.get(user.id).await,
            Err(UserError::NotFound(_))
        ));
        assert!(matches!(
            service.delete(user.id).await,
            Err(UserError::NotFound(_))
        ));
    }

    fn activity(host_id: UserId, participants: Vec<UserId>) -> Activity {
        Activity {
            id: 0,
            host_id,
            title: "Chess in the park".to_string(),
            description: String::new(),
            tags: vec!["chess".to_string()],
            location: "Central Park".to_string(),
            date_time: Utc::now() + Duration::days(2),
            max_participants: 6,
            participants,
            status: ActivityStatus::Active,
            embedding: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_delete_refused_while_hosting() {
        let store = Arc::new(InMemoryStore::new());
        let service = UserService::new(
            store.clone(),
            crate::testing::keyword_embedder(),
            &LimitConfig::default(),
        );
        let host = service.register(new_user("host", &[])).await.unwrap();
        let hosted = store.insert_activity(activity(host.id, Vec::new())).await.unwrap();

        assert!(matches!(
            service.delete(host.id).await,
            Err(UserError::HostsActivities(id)) if id == host.id
        ));
        assert!(service.get(host.id).await.is_ok());

        store.delete_activity(hosted.id).await.unwrap();
        service.delete(host.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_removes_user_from_participants() {
        let store = Arc::new(InMemoryStore::new());
        let service = UserService::new(
            store.clone(),
            crate::testing::keyword_embedder(),
            &LimitConfig::default(),
        );
        let host = service.register(new_user("host", &[])).await.unwrap();
        let guest = service.register(new_user("guest", &[])).await.unwrap();
        let other = service.register(new_user("other", &[])).await.unwrap();
        let hosted = store
            .insert_activity(activity(host.id, vec![guest.id, other.id]))
            .await
            .unwrap();

        service.delete(guest.id).await.unwrap();

        let stored = store.fetch_activity(hosted.id).await.unwrap().unwrap();
        assert_eq!(stored.participants, vec![other.id]);
        assert!(
            store
                .activities_joined_by(guest.id, 0, 10)
                .await
                .unwrap()
                .is_empty()
        );
    }
}
