//! Recommendation engine and the Uplink entry point.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uplink_embeddings::{
    CachedProvider, Candidate, EmbeddingAggregator, EmbeddingCache, EmbeddingProvider,
    HttpProvider, rank,
};

use crate::activities::ActivityService;
use crate::config::UplinkConfig;
use crate::error::{RecommendError, Result};
use crate::model::{ActivityRecommendation, ActivityStatus, UserId};
use crate::profile::ProfileEmbedder;
use crate::store::{DataStore, InMemoryStore};
use crate::users::UserService;

/// Ranks active activities against a user's interest embedding.
///
/// Recommending is read-only: it never writes to the store and returns the
/// same list for the same stored state.
#[derive(Clone)]
pub struct Recommender {
    store: Arc<dyn DataStore>,
}

impl Recommender {
    /// Create a recommender reading from `store`.
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    /// The `k` active activities most similar to the user's interests,
    /// best match first.
    ///
    /// A user without interests is an error rather than an empty list; no
    /// active activities is an empty list.
    pub async fn recommend(
        &self,
        user_id: UserId,
        k: usize,
    ) -> Result<Vec<ActivityRecommendation>> {
        let user = self
            .store
            .fetch_user(user_id)
            .await?
            .ok_or(RecommendError::UserNotFound(user_id))?;
        let query = user
            .embedding
            .ok_or(RecommendError::NoEmbedding(user_id))?;

        let activities = self
            .store
            .fetch_activities_by_status(ActivityStatus::Active)
            .await?;
        let total = activities.len();

        let candidates: Vec<_> = activities
            .into_iter()
            .filter_map(|mut activity| {
                let embedding = activity.embedding.take()?;
                Some(Candidate::new(activity.id, activity, embedding))
            })
            .collect();
        if candidates.len() < total {
            debug!(
                "Skipping {} active activities without tags",
                total - candidates.len()
            );
        }

        let ranked = rank(&query, candidates, k)?;
        debug!(
            "Ranked {total} active activities for user {user_id}, returning {}",
            ranked.len()
        );

        Ok(ranked.into_iter().map(ActivityRecommendation::from).collect())
    }
}

type SharedCachedProvider = Arc<CachedProvider<Arc<dyn EmbeddingProvider>>>;

/// Uplink: user and activity lifecycle plus recommendations over one store
/// and one encoder.
#[derive(Clone)]
pub struct Uplink {
    config: UplinkConfig,
    users: UserService,
    activities: ActivityService,
    recommender: Recommender,
    cache: Option<SharedCachedProvider>,
}

impl Uplink {
    /// Create a new builder.
    pub fn builder() -> UplinkBuilder {
        UplinkBuilder::new()
    }

    /// Build an engine from `config` with the default store and encoder.
    pub async fn new(config: UplinkConfig) -> Result<Self> {
        UplinkBuilder::new().with_config(config).build().await
    }

    /// Active configuration.
    pub fn config(&self) -> &UplinkConfig {
        &self.config
    }

    /// User operations.
    pub fn users(&self) -> &UserService {
        &self.users
    }

    /// Activity and membership operations.
    pub fn activities(&self) -> &ActivityService {
        &self.activities
    }

    /// The underlying recommender.
    pub fn recommender(&self) -> &Recommender {
        &self.recommender
    }

    /// Recommend activities to a user, returning `limit` results or the
    /// configured default.
    pub async fn recommend(
        &self,
        user_id: UserId,
        limit: Option<usize>,
    ) -> Result<Vec<ActivityRecommendation>> {
        let k = limit.unwrap_or(self.config.limits.default_recommendations);
        self.recommender.recommend(user_id, k).await
    }

    /// Write cached token embeddings to the configured cache file.
    ///
    /// A no-op when caching is disabled or the cache has no file.
    pub async fn flush(&self) -> Result<()> {
        if let Some(cached) = &self.cache {
            cached.cache().flush().await?;
        }
        Ok(())
    }
}

/// Builder for [`Uplink`].
pub struct UplinkBuilder {
    config: UplinkConfig,
    store: Option<Arc<dyn DataStore>>,
    provider: Option<Arc<dyn EmbeddingProvider>>,
}

impl UplinkBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: UplinkConfig::default(),
            store: None,
            provider: None,
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: UplinkConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `store` instead of an in-memory store.
    pub fn with_store(mut self, store: Arc<dyn DataStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use `provider` instead of the configured HTTP encoder.
    pub fn with_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Build the engine.
    pub async fn build(self) -> Result<Uplink> {
        let Self {
            config,
            store,
            provider,
        } = self;
        config.validate()?;

        let provider: Arc<dyn EmbeddingProvider> = match provider {
            Some(provider) => provider,
            None => Arc::new(http_provider(&config)),
        };
        let cache: Option<SharedCachedProvider> = if config.cache.enabled {
            let max_entries = config.cache.max_entries;
            let cache = match &config.cache.path {
                Some(path) => EmbeddingCache::with_persistence(path, max_entries).await?,
                None => EmbeddingCache::new(max_entries),
            };
            Some(Arc::new(CachedProvider::new(provider.clone(), cache)))
        } else {
            None
        };
        let provider: Arc<dyn EmbeddingProvider> = match &cache {
            Some(cached) => cached.clone(),
            None => provider,
        };
        if !provider.is_available() {
            warn!("Encoder {} is not configured", provider.name());
        }

        let store: Arc<dyn DataStore> = match store {
            Some(store) => store,
            None => Arc::new(InMemoryStore::new()),
        };
        let embedder = ProfileEmbedder::new(EmbeddingAggregator::new(provider.clone()));

        info!(
            "Uplink engine ready (encoder: {}, model: {}, dimension: {})",
            provider.name(),
            provider.default_model(),
            provider.default_dimension()
        );

        Ok(Uplink {
            users: UserService::new(store.clone(), embedder.clone(), &config.limits),
            activities: ActivityService::new(store.clone(), embedder, &config.limits),
            recommender: Recommender::new(store),
            cache,
            config,
        })
    }
}

impl Default for UplinkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn http_provider(config: &UplinkConfig) -> HttpProvider {
    let encoder = &config.encoder;
    HttpProvider::new()
        .with_base_url(&encoder.base_url)
        .with_model(&encoder.model)
        .with_dimension(encoder.dimension)
        .with_api_key_from_env(&encoder.api_key_env)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, LimitConfig};
    use crate::error::ErrorKind;
    use crate::model::{Activity, NewActivity, NewUser, UserUpdate};
    use crate::testing::{KeywordProvider, keyword_embedder, store_with_users};
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const HOST: UserId = 1;

    struct Fixture {
        users: UserService,
        activities: ActivityService,
        recommender: Recommender,
    }

    /// Services over a store that already holds the host.
    async fn fixture() -> Fixture {
        let store: Arc<dyn DataStore> = store_with_users(HOST).await;
        let limits = LimitConfig::default();
        Fixture {
            users: UserService::new(store.clone(), keyword_embedder(), &limits),
            activities: ActivityService::new(store.clone(), keyword_embedder(), &limits),
            recommender: Recommender::new(store),
        }
    }

    fn new_user(username: &str, interests: &[&str]) -> NewUser {
        NewUser {
            email: format!("{username}@example.com"),
            username: username.to_string(),
            full_name: "Test Person".to_string(),
            interests: interests.iter().map(ToString::to_string).collect(),
            ..NewUser::default()
        }
    }

    fn new_activity(title: &str, tags: &[&str]) -> NewActivity {
        NewActivity {
            title: title.to_string(),
            description: String::new(),
            tags: tags.iter().map(ToString::to_string).collect(),
            location: "Cluj".to_string(),
            date_time: Utc::now() + Duration::days(2),
            max_participants: 10,
        }
    }

    async fn host(f: &Fixture, title: &str, tags: &[&str]) -> Activity {
        f.activities
            .create(HOST, new_activity(title, tags))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_ranks_by_similarity() {
        let f = fixture().await;
        let user = f.users.register(new_user("hiker", &["hiking"])).await.unwrap();
        let chess = host(&f, "Chess night", &["chess"]).await;
        let hike = host(&f, "Ridge hike", &["hiking"]).await;
        let climb = host(&f, "Bouldering", &["climbing"]).await;

        let results = f.recommender.recommend(user.id, 5).await.unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.activity_id).collect();

        assert_eq!(ids, vec![hike.id, climb.id, chess.id]);
        assert!((results[0].similarity - 1.0).abs() < 1e-6);
        assert!((results[1].similarity - 0.8).abs() < 1e-6);
        assert!(results[2].similarity.abs() < 1e-6);
        assert_eq!(results[0].title, "Ridge hike");
    }

    #[tokio::test]
    async fn test_limit_truncates() {
        let f = fixture().await;
        let user = f.users.register(new_user("hiker", &["hiking"])).await.unwrap();
        host(&f, "Chess night", &["chess"]).await;
        let hike = host(&f, "Ridge hike", &["hiking"]).await;

        let results = f.recommender.recommend(user.id, 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].activity_id, hike.id);
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let f = fixture().await;
        let err = f.recommender.recommend(42, 5).await.unwrap_err();
        assert!(matches!(err, RecommendError::UserNotFound(42)));
    }

    #[tokio::test]
    async fn test_user_without_interests_is_an_error() {
        let f = fixture().await;
        let user = f.users.register(new_user("blank", &[])).await.unwrap();
        host(&f, "Chess night", &["chess"]).await;

        let err = f.recommender.recommend(user.id, 5).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoEmbedding);
    }

    #[tokio::test]
    async fn test_zero_limit_is_invalid() {
        let f = fixture().await;
        let user = f.users.register(new_user("hiker", &["hiking"])).await.unwrap();

        let err = f.recommender.recommend(user.id, 0).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidLimit);
    }

    #[tokio::test]
    async fn test_only_active_tagged_activities_are_candidates() {
        let f = fixture().await;
        let user = f.users.register(new_user("hiker", &["hiking"])).await.unwrap();
        let done = host(&f, "Old hike", &["hiking"]).await;
        f.activities
            .set_status(done.id, HOST, ActivityStatus::Completed)
            .await
            .unwrap();
        host(&f, "Mystery meetup", &[]).await;

        let results = f.recommender.recommend(user.id, 5).await.unwrap();
        assert!(results.is_empty());

        let open = host(&f, "Chess night", &["chess"]).await;
        let results = f.recommender.recommend(user.id, 5).await.unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.activity_id).collect();
        assert_eq!(ids, vec![open.id]);
    }

    #[tokio::test]
    async fn test_interest_change_moves_ranking() {
        let f = fixture().await;
        let user = f.users.register(new_user("hiker", &["hiking"])).await.unwrap();
        let chess = host(&f, "Chess night", &["chess"]).await;
        host(&f, "Ridge hike", &["hiking"]).await;

        f.users
            .update(
                user.id,
                UserUpdate {
                    interests: Some(vec!["chess".to_string()]),
                    ..UserUpdate::default()
                },
            )
            .await
            .unwrap();

        let results = f.recommender.recommend(user.id, 1).await.unwrap();
        assert_eq!(results[0].activity_id, chess.id);
    }

    #[tokio::test]
    async fn test_recommend_is_repeatable() {
        let f = fixture().await;
        let user = f
            .users
            .register(new_user("mixed", &["hiking", "cooking"]))
            .await
            .unwrap();
        host(&f, "Bake off", &["baking"]).await;
        host(&f, "Bouldering", &["climbing"]).await;
        host(&f, "Chess night", &["chess"]).await;

        let first = f.recommender.recommend(user.id, 3).await.unwrap();
        let second = f.recommender.recommend(user.id, 3).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_uplink_uses_default_limit() {
        let dir = TempDir::new().unwrap();
        let config = UplinkConfig::default()
            .with_cache(CacheConfig {
                path: Some(dir.path().join("tokens.json")),
                ..CacheConfig::default()
            })
            .with_limits(LimitConfig {
                default_recommendations: 2,
                ..LimitConfig::default()
            });
        let uplink = Uplink::builder()
            .with_config(config)
            .with_provider(Arc::new(KeywordProvider::default()))
            .build()
            .await
            .unwrap();

        let host = uplink
            .users()
            .register(new_user("host", &[]))
            .await
            .unwrap();
        let user = uplink
            .users()
            .register(new_user("hiker", &["hiking"]))
            .await
            .unwrap();
        for (title, tag) in [("Hike", "hiking"), ("Chess", "chess"), ("Cook", "cooking")] {
            uplink
                .activities()
                .create(host.id, new_activity(title, &[tag]))
                .await
                .unwrap();
        }

        assert_eq!(uplink.recommend(user.id, None).await.unwrap().len(), 2);
        assert_eq!(uplink.recommend(user.id, Some(3)).await.unwrap().len(), 3);

        let cache_file = dir.path().join("tokens.json");
        assert!(!cache_file.exists());
        uplink.flush().await.unwrap();
        assert!(cache_file.exists());
    }

    #[tokio::test]
    async fn test_flush_without_cache_is_a_no_op() {
        let config = UplinkConfig::default().with_cache(CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        });
        let uplink = Uplink::builder()
            .with_config(config)
            .with_provider(Arc::new(KeywordProvider::default()))
            .build()
            .await
            .unwrap();
        uplink.flush().await.unwrap();
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_config() {
        let config = UplinkConfig::default().with_limits(LimitConfig {
            default_recommendations: 0,
            ..LimitConfig::default()
        });
        let err = Uplink::builder()
            .with_config(config)
            .with_provider(Arc::new(KeywordProvider::default()))
            .build()
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
