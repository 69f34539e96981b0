//! Watch statistics aggregated from the watchlist and catalog metadata
//!
//! Metadata is fetched in small concurrent batches with a per-fetch timeout.
//! A title whose metadata cannot be fetched still counts toward totals; it is
//! only left out of genre, cast and collection breakdowns.

use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::{
    db::WatchlistRepository,
    error::AppResult,
    models::{
        ActorStat, Collection, CollectionProgress, DisplayType, GenreStat, MediaDetails,
        MediaKey, MediaType, ProfileStats, WatchListItem, WatchlistFilter, WeightedRatingEntry,
        WeightedRatings,
    },
    services::providers::MetadataProvider,
};

pub const DEFAULT_ACTOR_LIMIT: usize = 20;
pub const MAX_ACTOR_LIMIT: usize = 50;
/// Cast members per title that count toward favorite actors
const TOP_BILLED: usize = 10;
const JAPANESE: &str = "ja";

#[derive(Debug, Clone)]
pub struct StatsSettings {
    /// Metadata fetches in flight per batch
    pub concurrency: usize,
    pub fetch_timeout: Duration,
    /// Pause between batches to stay under the catalog's rate limit
    pub batch_pause: Duration,
}

impl Default for StatsSettings {
    fn default() -> Self {
        Self {
            concurrency: 5,
            fetch_timeout: Duration::from_secs(5),
            batch_pause: Duration::from_millis(100),
        }
    }
}

/// Display category of a title: animated titles become anime (Japanese
/// original language) or cartoon, everything else keeps its stored type
pub fn classify(stored_type: MediaType, details: Option<&MediaDetails>) -> DisplayType {
    match details {
        Some(d) if d.is_animation() => {
            if d.original_language.as_deref() == Some(JAPANESE) {
                DisplayType::Anime
            } else {
                DisplayType::Cartoon
            }
        }
        _ => DisplayType::from(stored_type),
    }
}

#[derive(Clone)]
pub struct StatsService {
    watchlist: Arc<dyn WatchlistRepository>,
    metadata: Arc<dyn MetadataProvider>,
    settings: StatsSettings,
}

impl StatsService {
    pub fn new(
        watchlist: Arc<dyn WatchlistRepository>,
        metadata: Arc<dyn MetadataProvider>,
        settings: StatsSettings,
    ) -> Self {
        Self {
            watchlist,
            metadata,
            settings,
        }
    }

    async fn all_items(&self, user_id: Uuid) -> AppResult<Vec<WatchListItem>> {
        self.watchlist
            .list_items(user_id, &WatchlistFilter::default())
            .await
    }

    async fn seen_items(&self, user_id: Uuid) -> AppResult<Vec<WatchListItem>> {
        let mut items = self.all_items(user_id).await?;
        items.retain(|item| item.status.is_seen());
        Ok(items)
    }

    /// Metadata for each key; failed or timed-out fetches are simply absent
    pub async fn fetch_details_batched(&self, keys: &[MediaKey]) -> HashMap<MediaKey, MediaDetails> {
        let metadata = &self.metadata;
        fetch_batched(keys, &self.settings, "details", |key| metadata.details(key)).await
    }

    async fn fetch_collections_batched(&self, ids: &[i64]) -> HashMap<i64, Collection> {
        let metadata = &self.metadata;
        fetch_batched(ids, &self.settings, "collection", |id| metadata.collection(id)).await
    }

    pub async fn profile_stats(&self, user_id: Uuid) -> AppResult<ProfileStats> {
        let items = self.all_items(user_id).await?;
        let keys: Vec<MediaKey> = items.iter().map(|i| i.key()).collect();
        let details = self.fetch_details_batched(&keys).await;

        let mut stats = ProfileStats {
            total: items.len() as u64,
            ..Default::default()
        };

        for item in &items {
            stats.by_status.increment(item.status);

            let item_details = details.get(&item.key());
            stats.by_type.increment(classify(item.media_type, item_details));
            if item_details.is_some() {
                stats.classified_count += 1;
            } else {
                stats.unclassified_count += 1;
            }
        }

        let ratings: Vec<f64> = items
            .iter()
            .filter_map(|i| i.user_rating)
            .map(f64::from)
            .collect();
        stats.rated_count = ratings.len() as u64;
        stats.average_rating = mean(&ratings);

        tracing::info!(
            user_id = %user_id,
            total = stats.total,
            unclassified = stats.unclassified_count,
            "Computed profile stats"
        );

        Ok(stats)
    }

    /// Per-genre counts over watched and rewatched titles
    pub async fn genre_breakdown(&self, user_id: Uuid) -> AppResult<Vec<GenreStat>> {
        let items = self.seen_items(user_id).await?;
        let keys: Vec<MediaKey> = items.iter().map(|i| i.key()).collect();
        let details = self.fetch_details_batched(&keys).await;

        let mut genres: HashMap<i64, (String, u64, Vec<f64>)> = HashMap::new();
        for item in &items {
            let Some(item_details) = details.get(&item.key()) else {
                continue;
            };
            for genre in &item_details.genres {
                let entry = genres
                    .entry(genre.id)
                    .or_insert_with(|| (genre.name.clone(), 0, Vec::new()));
                entry.1 += 1;
                if let Some(rating) = item.user_rating {
                    entry.2.push(f64::from(rating));
                }
            }
        }

        let mut stats: Vec<GenreStat> = genres
            .into_iter()
            .map(|(id, (name, count, ratings))| GenreStat {
                id,
                name,
                count,
                average_rating: mean(&ratings),
            })
            .collect();
        stats.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));

        Ok(stats)
    }

    /// Most frequent top-billed actors over watched and rewatched titles
    pub async fn favorite_actors(
        &self,
        user_id: Uuid,
        limit: Option<usize>,
    ) -> AppResult<Vec<ActorStat>> {
        let limit = limit
            .unwrap_or(DEFAULT_ACTOR_LIMIT)
            .clamp(1, MAX_ACTOR_LIMIT);

        let items = self.seen_items(user_id).await?;
        let keys: Vec<MediaKey> = items.iter().map(|i| i.key()).collect();
        let details = self.fetch_details_batched(&keys).await;

        struct Appearances {
            name: String,
            profile_path: Option<String>,
            titles: Vec<String>,
            ratings: Vec<f64>,
        }

        let mut actors: HashMap<i64, Appearances> = HashMap::new();
        for item in &items {
            let Some(item_details) = details.get(&item.key()) else {
                continue;
            };
            let mut credited = HashSet::new();
            for member in item_details.cast.iter().take(TOP_BILLED) {
                if !credited.insert(member.id) {
                    continue;
                }
                let entry = actors.entry(member.id).or_insert_with(|| Appearances {
                    name: member.name.clone(),
                    profile_path: member.profile_path.clone(),
                    titles: Vec::new(),
                    ratings: Vec::new(),
                });
                entry.titles.push(item_details.title.clone());
                if let Some(rating) = item.user_rating {
                    entry.ratings.push(f64::from(rating));
                }
            }
        }

        let mut stats: Vec<ActorStat> = actors
            .into_iter()
            .map(|(id, a)| ActorStat {
                id,
                name: a.name,
                profile_path: a.profile_path,
                appearances: a.titles.len() as u64,
                average_rating: mean(&a.ratings),
                titles: a.titles,
            })
            .collect();
        stats.sort_by(|a, b| {
            b.appearances
                .cmp(&a.appearances)
                .then_with(|| {
                    b.average_rating
                        .unwrap_or(f64::MIN)
                        .total_cmp(&a.average_rating.unwrap_or(f64::MIN))
                })
                .then_with(|| a.name.cmp(&b.name))
        });
        stats.truncate(limit);

        Ok(stats)
    }

    /// Completion of each franchise the user has at least one tracked movie in
    pub async fn collection_progress(&self, user_id: Uuid) -> AppResult<Vec<CollectionProgress>> {
        let movies: Vec<WatchListItem> = self
            .all_items(user_id)
            .await?
            .into_iter()
            .filter(|i| i.media_type == MediaType::Movie)
            .collect();
        let keys: Vec<MediaKey> = movies.iter().map(|i| i.key()).collect();
        let details = self.fetch_details_batched(&keys).await;

        let collection_ids: Vec<i64> = details
            .values()
            .filter_map(|d| d.collection.as_ref().map(|c| c.id))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let collections = self.fetch_collections_batched(&collection_ids).await;

        let tracked: HashSet<i64> = movies.iter().map(|i| i.media_id).collect();
        let watched: HashSet<i64> = movies
            .iter()
            .filter(|i| i.status.is_seen())
            .map(|i| i.media_id)
            .collect();

        let mut progress: Vec<CollectionProgress> = collections
            .into_values()
            .filter(|c| !c.parts.is_empty())
            .map(|collection| {
                let total_parts = collection.parts.len() as u64;
                let watched_parts = collection
                    .parts
                    .iter()
                    .filter(|p| watched.contains(&p.media_id))
                    .count() as u64;
                let tracked_parts = collection
                    .parts
                    .iter()
                    .filter(|p| tracked.contains(&p.media_id))
                    .count() as u64;
                let missing = collection
                    .parts
                    .iter()
                    .filter(|p| !watched.contains(&p.media_id))
                    .map(|p| p.title.clone())
                    .collect();

                CollectionProgress {
                    id: collection.id,
                    name: collection.name,
                    total_parts,
                    watched_parts,
                    tracked_parts,
                    completion: round2(watched_parts as f64 / total_parts as f64),
                    missing,
                }
            })
            .collect();
        progress.sort_by(|a, b| {
            b.completion
                .total_cmp(&a.completion)
                .then_with(|| a.name.cmp(&b.name))
        });

        Ok(progress)
    }

    /// Rated titles with their effective rating, highest first
    pub async fn weighted_ratings(&self, user_id: Uuid) -> AppResult<WeightedRatings> {
        let mut items: Vec<WeightedRatingEntry> = self
            .all_items(user_id)
            .await?
            .into_iter()
            .filter_map(|item| {
                let effective_rating = item.effective_rating()?;
                Some(WeightedRatingEntry {
                    media_id: item.media_id,
                    media_type: item.media_type,
                    title: item.title,
                    user_rating: item.user_rating,
                    weighted_rating: item.weighted_rating,
                    effective_rating,
                })
            })
            .collect();
        items.sort_by(|a, b| {
            b.effective_rating
                .total_cmp(&a.effective_rating)
                .then_with(|| a.title.cmp(&b.title))
        });

        let effective: Vec<f64> = items.iter().map(|i| f64::from(i.effective_rating)).collect();

        Ok(WeightedRatings {
            average_effective_rating: mean(&effective),
            items,
        })
    }
}

/// Runs `fetch` for every distinct key in batches of `settings.concurrency`,
/// each bounded by `settings.fetch_timeout`. Failures are logged and dropped.
async fn fetch_batched<K, T, F, Fut>(
    keys: &[K],
    settings: &StatsSettings,
    what: &str,
    fetch: F,
) -> HashMap<K, T>
where
    K: Copy + Eq + Hash + std::fmt::Debug,
    F: Fn(K) -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut seen = HashSet::new();
    let unique: Vec<K> = keys.iter().copied().filter(|k| seen.insert(*k)).collect();

    let mut fetched = HashMap::with_capacity(unique.len());
    let mut failures = 0usize;

    for (index, batch) in unique.chunks(settings.concurrency.max(1)).enumerate() {
        if index > 0 && !settings.batch_pause.is_zero() {
            tokio::time::sleep(settings.batch_pause).await;
        }

        let results = join_all(
            batch
                .iter()
                .map(|key| tokio::time::timeout(settings.fetch_timeout, fetch(*key))),
        )
        .await;

        for (key, result) in batch.iter().zip(results) {
            match result {
                Ok(Ok(value)) => {
                    fetched.insert(*key, value);
                }
                Ok(Err(e)) => {
                    failures += 1;
                    tracing::warn!(key = ?key, error = %e, what, "Metadata fetch failed");
                }
                Err(_) => {
                    failures += 1;
                    tracing::warn!(key = ?key, what, "Metadata fetch timed out");
                }
            }
        }
    }

    if failures > 0 {
        tracing::warn!(
            requested = unique.len(),
            failed = failures,
            what,
            "Aggregating with partial metadata"
        );
    }

    fetched
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(round2(values.iter().sum::<f64>() / values.len() as f64))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::MockWatchlistRepository;
    use crate::error::AppError;
    use crate::models::{
        CastMember, CollectionPart, CollectionRef, Genre, SearchPage, WatchStatus,
    };
    use crate::services::providers::MockMetadataProvider;
    use chrono::Utc;

    fn item(media_id: i64, media_type: MediaType, status: WatchStatus, rating: Option<f32>) -> WatchListItem {
        WatchListItem {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            media_id,
            media_type,
            title: format!("Title {}", media_id),
            poster_path: None,
            vote_average: None,
            status,
            user_rating: rating,
            weighted_rating: None,
            tags: vec![],
            added_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn details(key: MediaKey, genres: &[(i64, &str)], language: &str, cast: &[(i64, &str)]) -> MediaDetails {
        MediaDetails {
            key,
            title: format!("Title {}", key.media_id),
            overview: None,
            original_language: Some(language.to_string()),
            genres: genres
                .iter()
                .map(|(id, name)| Genre {
                    id: *id,
                    name: name.to_string(),
                })
                .collect(),
            cast: cast
                .iter()
                .enumerate()
                .map(|(order, (id, name))| CastMember {
                    id: *id,
                    name: name.to_string(),
                    character: None,
                    order: order as i32,
                    profile_path: None,
                })
                .collect(),
            collection: None,
            adult: false,
            vote_average: None,
            poster_path: None,
            release_date: None,
            runtime_minutes: None,
        }
    }

    fn settings() -> StatsSettings {
        StatsSettings {
            concurrency: 3,
            fetch_timeout: Duration::from_millis(200),
            batch_pause: Duration::ZERO,
        }
    }

    fn service(items: Vec<WatchListItem>, metadata: MockMetadataProvider) -> StatsService {
        let mut watchlist = MockWatchlistRepository::new();
        watchlist
            .expect_list_items()
            .returning(move |_, _| Ok(items.clone()));
        StatsService::new(Arc::new(watchlist), Arc::new(metadata), settings())
    }

    #[test]
    fn test_classify_animation() {
        let key = MediaKey::new(1, MediaType::Tv);
        let anime = details(key, &[(16, "Animation")], "ja", &[]);
        let cartoon = details(key, &[(16, "Animation")], "en", &[]);
        let drama = details(key, &[(18, "Drama")], "ja", &[]);

        assert_eq!(classify(MediaType::Tv, Some(&anime)), DisplayType::Anime);
        assert_eq!(classify(MediaType::Movie, Some(&cartoon)), DisplayType::Cartoon);
        assert_eq!(classify(MediaType::Tv, Some(&drama)), DisplayType::Tv);
        assert_eq!(classify(MediaType::Movie, None), DisplayType::Movie);
    }

    #[tokio::test]
    async fn test_profile_stats_empty_watchlist() {
        let mut metadata = MockMetadataProvider::new();
        metadata.expect_details().never();

        let stats = service(vec![], metadata).profile_stats(Uuid::nil()).await.unwrap();

        assert_eq!(stats.total, 0);
        assert_eq!(stats.by_status.watched, 0);
        assert_eq!(stats.by_type.movie, 0);
        assert_eq!(stats.rated_count, 0);
        assert_eq!(stats.average_rating, None);
    }

    #[tokio::test]
    async fn test_profile_stats_single_rated_title() {
        let mut metadata = MockMetadataProvider::new();
        metadata
            .expect_details()
            .returning(|key| Ok(details(key, &[(28, "Action")], "en", &[])));

        let items = vec![item(603, MediaType::Movie, WatchStatus::Watched, Some(8.0))];
        let stats = service(items, metadata).profile_stats(Uuid::nil()).await.unwrap();

        assert_eq!(stats.total, 1);
        assert_eq!(stats.by_status.watched, 1);
        assert_eq!(stats.by_type.movie, 1);
        assert_eq!(stats.rated_count, 1);
        assert_eq!(stats.average_rating, Some(8.0));
        assert_eq!(stats.classified_count, 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_falls_back_to_stored_type() {
        let mut metadata = MockMetadataProvider::new();
        metadata.expect_details().returning(|key| {
            if key.media_id == 1 {
                Err(AppError::ExternalApi("boom".to_string()))
            } else {
                Ok(details(key, &[(16, "Animation")], "ja", &[]))
            }
        });

        let items = vec![
            item(1, MediaType::Tv, WatchStatus::Watched, None),
            item(2, MediaType::Tv, WatchStatus::WantToWatch, None),
        ];
        let stats = service(items, metadata).profile_stats(Uuid::nil()).await.unwrap();

        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_type.tv, 1);
        assert_eq!(stats.by_type.anime, 1);
        assert_eq!(stats.unclassified_count, 1);
        assert_eq!(stats.classified_count, 1);
    }

    struct SlowProvider;

    #[async_trait::async_trait]
    impl MetadataProvider for SlowProvider {
        async fn search(&self, _: &str, _: u32, _: bool) -> AppResult<SearchPage> {
            unimplemented!()
        }

        async fn details(&self, key: MediaKey) -> AppResult<MediaDetails> {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok(details(key, &[], "en", &[]))
        }

        async fn collection(&self, _: i64) -> AppResult<Collection> {
            unimplemented!()
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_slow_fetch_times_out_per_item() {
        let mut watchlist = MockWatchlistRepository::new();
        watchlist
            .expect_list_items()
            .returning(|_, _| Ok(vec![item(1, MediaType::Movie, WatchStatus::Watched, Some(6.0))]));
        let service = StatsService::new(Arc::new(watchlist), Arc::new(SlowProvider), settings());

        let stats = service.profile_stats(Uuid::nil()).await.unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.unclassified_count, 1);
        assert_eq!(stats.average_rating, Some(6.0));
    }

    #[tokio::test]
    async fn test_genre_breakdown_counts_seen_titles_only() {
        let mut metadata = MockMetadataProvider::new();
        metadata.expect_details().returning(|key| match key.media_id {
            1 => Ok(details(key, &[(28, "Action"), (18, "Drama")], "en", &[])),
            2 => Ok(details(key, &[(28, "Action")], "en", &[])),
            _ => Ok(details(key, &[(35, "Comedy")], "en", &[])),
        });

        let items = vec![
            item(1, MediaType::Movie, WatchStatus::Watched, Some(9.0)),
            item(2, MediaType::Movie, WatchStatus::Rewatched, Some(7.0)),
            item(3, MediaType::Movie, WatchStatus::WantToWatch, None),
        ];
        let genres = service(items, metadata).genre_breakdown(Uuid::nil()).await.unwrap();

        assert_eq!(genres.len(), 2);
        assert_eq!(genres[0].name, "Action");
        assert_eq!(genres[0].count, 2);
        assert_eq!(genres[0].average_rating, Some(8.0));
        assert_eq!(genres[1].name, "Drama");
    }

    fn cast_metadata() -> MockMetadataProvider {
        let mut metadata = MockMetadataProvider::new();
        metadata.expect_details().returning(|key| {
            let base = key.media_id * 100;
            let mut cast: Vec<(i64, &str)> = vec![(1, "Lead")];
            if key.media_id == 1 {
                cast.push((2, "Second"));
            }
            cast.extend((base..base + 9).map(|id| (id, "Extra")));
            if key.media_id == 2 {
                // billed eleventh, so not counted
                cast.push((2, "Second"));
            }
            Ok(details(key, &[], "en", &cast))
        });
        metadata
    }

    #[tokio::test]
    async fn test_favorite_actors_uses_top_billed_cast() {
        let items = vec![
            item(1, MediaType::Movie, WatchStatus::Watched, Some(6.0)),
            item(2, MediaType::Movie, WatchStatus::Watched, Some(9.0)),
        ];
        let actors = service(items, cast_metadata())
            .favorite_actors(Uuid::nil(), Some(50))
            .await
            .unwrap();

        assert_eq!(actors.len(), 19);
        assert_eq!(actors[0].name, "Lead");
        assert_eq!(actors[0].appearances, 2);
        assert_eq!(actors[0].average_rating, Some(7.5));
        let second = actors.iter().find(|a| a.id == 2).unwrap();
        assert_eq!(second.appearances, 1);
        assert_eq!(second.titles, vec!["Title 1"]);
    }

    #[tokio::test]
    async fn test_favorite_actors_limit() {
        let items = vec![
            item(1, MediaType::Movie, WatchStatus::Watched, Some(6.0)),
            item(2, MediaType::Movie, WatchStatus::Watched, Some(9.0)),
        ];
        let actors = service(items, cast_metadata())
            .favorite_actors(Uuid::nil(), Some(2))
            .await
            .unwrap();

        assert_eq!(actors.len(), 2);
        assert_eq!(actors[0].name, "Lead");
        // ties on appearances break on the higher average rating
        assert_eq!(actors[1].average_rating, Some(9.0));
    }

    #[tokio::test]
    async fn test_collection_progress() {
        let mut metadata = MockMetadataProvider::new();
        metadata.expect_details().returning(|key| {
            let mut d = details(key, &[], "en", &[]);
            d.collection = Some(CollectionRef {
                id: 119,
                name: "The Lord of the Rings Collection".to_string(),
            });
            Ok(d)
        });
        metadata.expect_collection().times(1).returning(|id| {
            Ok(Collection {
                id,
                name: "The Lord of the Rings Collection".to_string(),
                parts: [(120, "Fellowship"), (121, "Two Towers"), (122, "Return")]
                    .iter()
                    .map(|(id, title)| CollectionPart {
                        media_id: *id,
                        title: title.to_string(),
                        release_date: None,
                    })
                    .collect(),
            })
        });

        let items = vec![
            item(120, MediaType::Movie, WatchStatus::Watched, None),
            item(121, MediaType::Movie, WatchStatus::WantToWatch, None),
        ];
        let progress = service(items, metadata)
            .collection_progress(Uuid::nil())
            .await
            .unwrap();

        assert_eq!(progress.len(), 1);
        assert_eq!(progress[0].total_parts, 3);
        assert_eq!(progress[0].watched_parts, 1);
        assert_eq!(progress[0].tracked_parts, 2);
        assert_eq!(progress[0].completion, 0.33);
        assert_eq!(progress[0].missing, vec!["Two Towers", "Return"]);
    }

    #[tokio::test]
    async fn test_weighted_ratings_prefer_weighted_value() {
        let mut rated = item(1, MediaType::Movie, WatchStatus::Watched, Some(6.0));
        rated.weighted_rating = Some(7.0);
        let items = vec![
            rated,
            item(2, MediaType::Movie, WatchStatus::Watched, Some(9.0)),
            item(3, MediaType::Movie, WatchStatus::Watched, None),
        ];

        let ratings = service(items, MockMetadataProvider::new())
            .weighted_ratings(Uuid::nil())
            .await
            .unwrap();

        assert_eq!(ratings.items.len(), 2);
        assert_eq!(ratings.items[0].effective_rating, 9.0);
        assert_eq!(ratings.items[1].effective_rating, 7.0);
        assert_eq!(ratings.average_effective_rating, Some(8.0));
    }
}
