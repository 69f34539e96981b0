//! In-memory stores and a stub catalog for router-level tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue};
use axum_test::TestServer;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use watchlog::{
    db::{
        BlacklistRepository, RateLimitStore, TagRepository, TelemetryRepository, UserRepository,
        WatchlistRepository,
    },
    error::{AppError, AppResult},
    models::{
        BlacklistEntry, Collection, CommunityRating, FilterSession, IntentSignal, Invitation,
        MediaDetails, MediaKey, NewUser, PredictionLog, ProfileUpdate, RecommendationEvent,
        SearchPage, SearchResult, StatusUpsert, Tag, TagSummary, User, WatchListItem,
        WatchlistFilter,
    },
    routes::{create_router, AppState, AuthSettings, Stores},
    services::{MetadataProvider, SessionKeys, StatsSettings},
};

pub const SECRET: &str = "test-secret-test-secret-test-secret";

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    invitations: Vec<Invitation>,
    items: Vec<WatchListItem>,
    blacklist: Vec<BlacklistEntry>,
    tags: Vec<Tag>,
    events: Vec<(Uuid, RecommendationEvent, DateTime<Utc>)>,
    signals: Vec<(Uuid, IntentSignal)>,
    filter_sessions: Vec<(Uuid, FilterSession)>,
    predictions: Vec<(Uuid, PredictionLog)>,
}

/// Every repository trait backed by one mutex-guarded set of tables
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn event_count(&self) -> usize {
        self.tables.lock().unwrap().events.len()
    }

    pub fn item_count(&self) -> usize {
        self.tables.lock().unwrap().items.len()
    }
}

fn upsert_in(tables: &mut Tables, user_id: Uuid, upsert: &StatusUpsert) -> WatchListItem {
    let now = Utc::now();
    let snapshot = &upsert.snapshot;

    if let Some(item) = tables
        .items
        .iter_mut()
        .find(|i| i.user_id == user_id && i.key() == upsert.key)
    {
        item.status = upsert.status;
        if !snapshot.title.trim().is_empty() {
            item.title = snapshot.title.trim().to_string();
        }
        item.poster_path = snapshot.poster_path.clone().or(item.poster_path.take());
        item.vote_average = snapshot.vote_average.or(item.vote_average);
        if snapshot.user_rating.is_some() {
            item.user_rating = snapshot.user_rating;
            item.weighted_rating = None;
        }
        item.updated_at = now;
        return item.clone();
    }

    let item = WatchListItem {
        id: Uuid::new_v4(),
        user_id,
        media_id: upsert.key.media_id,
        media_type: upsert.key.media_type,
        title: snapshot.title.trim().to_string(),
        poster_path: snapshot.poster_path.clone(),
        vote_average: snapshot.vote_average,
        status: upsert.status,
        user_rating: snapshot.user_rating,
        weighted_rating: None,
        tags: Vec::new(),
        added_at: now,
        updated_at: now,
    };
    tables.items.push(item.clone());
    item
}

fn usage_count(tables: &Tables, tag_id: Uuid) -> i64 {
    tables
        .items
        .iter()
        .filter(|i| i.tags.iter().any(|t| t.id == tag_id))
        .count() as i64
}

#[async_trait]
impl WatchlistRepository for MemoryStore {
    async fn find_item(&self, user_id: Uuid, key: &MediaKey) -> AppResult<Option<WatchListItem>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .items
            .iter()
            .find(|i| i.user_id == user_id && i.key() == *key)
            .cloned())
    }

    async fn find_items(&self, user_id: Uuid, keys: &[MediaKey]) -> AppResult<Vec<WatchListItem>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .items
            .iter()
            .filter(|i| i.user_id == user_id && keys.contains(&i.key()))
            .cloned()
            .collect())
    }

    async fn upsert_status(
        &self,
        user_id: Uuid,
        upsert: &StatusUpsert,
    ) -> AppResult<WatchListItem> {
        let mut tables = self.tables.lock().unwrap();
        Ok(upsert_in(&mut tables, user_id, upsert))
    }

    async fn delete_item(&self, user_id: Uuid, key: &MediaKey) -> AppResult<bool> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.items.len();
        tables
            .items
            .retain(|i| !(i.user_id == user_id && i.key() == *key));
        Ok(tables.items.len() < before)
    }

    async fn set_rating(
        &self,
        user_id: Uuid,
        key: &MediaKey,
        rating: Option<f32>,
    ) -> AppResult<Option<WatchListItem>> {
        let mut tables = self.tables.lock().unwrap();
        Ok(tables
            .items
            .iter_mut()
            .find(|i| i.user_id == user_id && i.key() == *key)
            .map(|item| {
                item.user_rating = rating;
                item.weighted_rating = None;
                item.updated_at = Utc::now();
                item.clone()
            }))
    }

    async fn set_tags(
        &self,
        user_id: Uuid,
        key: &MediaKey,
        tag_ids: &[Uuid],
    ) -> AppResult<Option<WatchListItem>> {
        let mut tables = self.tables.lock().unwrap();
        let summaries: Vec<TagSummary> = tables
            .tags
            .iter()
            .filter(|t| t.user_id == user_id && tag_ids.contains(&t.id))
            .map(|t| TagSummary {
                id: t.id,
                name: t.name.clone(),
            })
            .collect();

        Ok(tables
            .items
            .iter_mut()
            .find(|i| i.user_id == user_id && i.key() == *key)
            .map(|item| {
                item.tags = summaries;
                item.clone()
            }))
    }

    async fn list_items(
        &self,
        user_id: Uuid,
        filter: &WatchlistFilter,
    ) -> AppResult<Vec<WatchListItem>> {
        let tables = self.tables.lock().unwrap();
        let mut items: Vec<WatchListItem> = tables
            .items
            .iter()
            .filter(|i| i.user_id == user_id && filter.matches(i))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.added_at.cmp(&a.added_at));
        Ok(items)
    }

    async fn community_ratings(&self, keys: &[MediaKey]) -> AppResult<Vec<CommunityRating>> {
        let tables = self.tables.lock().unwrap();
        let mut ratings = Vec::new();
        for key in keys {
            let rated: Vec<f64> = tables
                .items
                .iter()
                .filter(|i| i.key() == *key)
                .filter_map(|i| i.user_rating.map(f64::from))
                .collect();
            if !rated.is_empty() {
                ratings.push(CommunityRating {
                    key: *key,
                    average: rated.iter().sum::<f64>() / rated.len() as f64,
                    count: rated.len() as i64,
                });
            }
        }
        Ok(ratings)
    }

    async fn backfill_weighted_ratings(&self, dry_run: bool) -> AppResult<u64> {
        let mut tables = self.tables.lock().unwrap();
        let mut touched = 0;
        for item in tables
            .items
            .iter_mut()
            .filter(|i| i.weighted_rating.is_none() && i.user_rating.is_some())
        {
            if !dry_run {
                item.weighted_rating = item.user_rating;
            }
            touched += 1;
        }
        Ok(touched)
    }
}

#[async_trait]
impl BlacklistRepository for MemoryStore {
    async fn add(&self, user_id: Uuid, key: &MediaKey, title: &str) -> AppResult<BlacklistEntry> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(entry) = tables
            .blacklist
            .iter_mut()
            .find(|e| e.user_id == user_id && e.key() == *key)
        {
            if !title.is_empty() {
                entry.title = title.to_string();
            }
            return Ok(entry.clone());
        }

        let entry = BlacklistEntry {
            user_id,
            media_id: key.media_id,
            media_type: key.media_type,
            title: title.to_string(),
            created_at: Utc::now(),
        };
        tables.blacklist.push(entry.clone());
        Ok(entry)
    }

    async fn remove(&self, user_id: Uuid, key: &MediaKey) -> AppResult<bool> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.blacklist.len();
        tables
            .blacklist
            .retain(|e| !(e.user_id == user_id && e.key() == *key));
        Ok(tables.blacklist.len() < before)
    }

    async fn list(&self, user_id: Uuid) -> AppResult<Vec<BlacklistEntry>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .blacklist
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn blacklisted_among(
        &self,
        user_id: Uuid,
        keys: &[MediaKey],
    ) -> AppResult<Vec<MediaKey>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .blacklist
            .iter()
            .filter(|e| e.user_id == user_id && keys.contains(&e.key()))
            .map(BlacklistEntry::key)
            .collect())
    }
}

#[async_trait]
impl TagRepository for MemoryStore {
    async fn list(&self, user_id: Uuid) -> AppResult<Vec<Tag>> {
        let tables = self.tables.lock().unwrap();
        let mut tags: Vec<Tag> = tables
            .tags
            .iter()
            .filter(|t| t.user_id == user_id)
            .map(|t| Tag {
                usage_count: usage_count(&tables, t.id),
                ..t.clone()
            })
            .collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    async fn create(&self, user_id: Uuid, name: &str) -> AppResult<Tag> {
        let mut tables = self.tables.lock().unwrap();
        if tables
            .tags
            .iter()
            .any(|t| t.user_id == user_id && t.name.eq_ignore_ascii_case(name))
        {
            return Err(AppError::Conflict(format!("Tag '{}' already exists", name)));
        }

        let tag = Tag {
            id: Uuid::new_v4(),
            user_id,
            name: name.to_string(),
            usage_count: 0,
            created_at: Utc::now(),
        };
        tables.tags.push(tag.clone());
        Ok(tag)
    }

    async fn delete(&self, user_id: Uuid, tag_id: Uuid) -> AppResult<bool> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.tags.len();
        tables
            .tags
            .retain(|t| !(t.user_id == user_id && t.id == tag_id));
        let removed = tables.tags.len() < before;
        if removed {
            for item in tables.items.iter_mut() {
                item.tags.retain(|t| t.id != tag_id);
            }
        }
        Ok(removed)
    }

    async fn find_owned(&self, user_id: Uuid, tag_ids: &[Uuid]) -> AppResult<Vec<Tag>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .tags
            .iter()
            .filter(|t| t.user_id == user_id && tag_ids.contains(&t.id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn find_by_id(&self, user_id: Uuid) -> AppResult<Option<User>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.users.iter().find(|u| u.id == user_id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn create_with_invitation(
        &self,
        user: &NewUser,
        invitation_token: &str,
    ) -> AppResult<User> {
        let mut tables = self.tables.lock().unwrap();
        let now = Utc::now();

        if tables
            .users
            .iter()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(AppError::Conflict("Email is already registered".to_string()));
        }

        let invitation = tables
            .invitations
            .iter_mut()
            .find(|i| i.token == invitation_token)
            .filter(|i| i.is_usable(now) && i.email.eq_ignore_ascii_case(&user.email))
            .ok_or_else(|| AppError::InvalidInput("Invalid invitation".to_string()))?;
        invitation.used_at = Some(now);

        let created = User {
            id: Uuid::new_v4(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            display_name: user.display_name.clone(),
            birth_date: user.birth_date,
            created_at: now,
            updated_at: now,
        };
        tables.users.push(created.clone());
        Ok(created)
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        update: &ProfileUpdate,
    ) -> AppResult<Option<User>> {
        let mut tables = self.tables.lock().unwrap();
        Ok(tables.users.iter_mut().find(|u| u.id == user_id).map(|user| {
            if let Some(name) = &update.display_name {
                user.display_name = name.clone();
            }
            if let Some(birth_date) = update.birth_date {
                user.birth_date = birth_date;
            }
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn delete(&self, user_id: Uuid) -> AppResult<bool> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.users.len();
        tables.users.retain(|u| u.id != user_id);
        if tables.users.len() == before {
            return Ok(false);
        }
        tables.invitations.retain(|i| i.created_by != Some(user_id));
        tables.items.retain(|i| i.user_id != user_id);
        tables.blacklist.retain(|e| e.user_id != user_id);
        tables.tags.retain(|t| t.user_id != user_id);
        tables.events.retain(|(owner, _, _)| *owner != user_id);
        tables.signals.retain(|(owner, _)| *owner != user_id);
        tables.filter_sessions.retain(|(owner, _)| *owner != user_id);
        tables.predictions.retain(|(owner, _)| *owner != user_id);
        Ok(true)
    }

    async fn create_invitation(
        &self,
        email: &str,
        created_by: Option<Uuid>,
        expires_at: DateTime<Utc>,
    ) -> AppResult<Invitation> {
        let mut tables = self.tables.lock().unwrap();
        // Mirrors the foreign key on invitations.created_by
        if let Some(creator) = created_by {
            if !tables.users.iter().any(|u| u.id == creator) {
                return Err(AppError::NotFound("Inviting user not found".to_string()));
            }
        }
        let invitation = Invitation {
            token: Uuid::new_v4().simple().to_string(),
            email: email.to_string(),
            created_by,
            expires_at,
            used_at: None,
        };
        tables.invitations.push(invitation.clone());
        Ok(invitation)
    }

    async fn find_invitation(&self, token: &str) -> AppResult<Option<Invitation>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.invitations.iter().find(|i| i.token == token).cloned())
    }
}

#[async_trait]
impl TelemetryRepository for MemoryStore {
    async fn record_events(&self, user_id: Uuid, events: &[RecommendationEvent]) -> AppResult<u64> {
        let mut tables = self.tables.lock().unwrap();
        let now = Utc::now();
        tables
            .events
            .extend(events.iter().map(|e| (user_id, e.clone(), now)));
        Ok(events.len() as u64)
    }

    async fn record_signals(&self, user_id: Uuid, signals: &[IntentSignal]) -> AppResult<u64> {
        let mut tables = self.tables.lock().unwrap();
        tables
            .signals
            .extend(signals.iter().map(|s| (user_id, s.clone())));
        Ok(signals.len() as u64)
    }

    async fn record_filter_session(
        &self,
        user_id: Uuid,
        session: &FilterSession,
    ) -> AppResult<()> {
        let mut tables = self.tables.lock().unwrap();
        tables.filter_sessions.push((user_id, session.clone()));
        Ok(())
    }

    async fn record_predictions(
        &self,
        user_id: Uuid,
        predictions: &[PredictionLog],
    ) -> AppResult<u64> {
        let mut tables = self.tables.lock().unwrap();
        tables
            .predictions
            .extend(predictions.iter().map(|p| (user_id, p.clone())));
        Ok(predictions.len() as u64)
    }

    async fn record_action(
        &self,
        user_id: Uuid,
        event: &RecommendationEvent,
        upsert: Option<&StatusUpsert>,
    ) -> AppResult<Option<WatchListItem>> {
        let mut tables = self.tables.lock().unwrap();
        tables.events.push((user_id, event.clone(), Utc::now()));
        Ok(upsert.map(|u| upsert_in(&mut tables, user_id, u)))
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.events.len();
        tables.events.retain(|(_, _, at)| *at >= cutoff);
        Ok((before - tables.events.len()) as u64)
    }
}

/// Fixed catalog answering searches by case-insensitive title match
#[derive(Default)]
pub struct StubCatalog {
    pub titles: Vec<SearchResult>,
    pub details: HashMap<MediaKey, MediaDetails>,
}

#[async_trait]
impl MetadataProvider for StubCatalog {
    async fn search(&self, query: &str, page: u32, include_adult: bool) -> AppResult<SearchPage> {
        let needle = query.to_lowercase();
        let results: Vec<SearchResult> = self
            .titles
            .iter()
            .filter(|r| r.title.to_lowercase().contains(&needle))
            .filter(|r| include_adult || !r.adult)
            .cloned()
            .collect();

        Ok(SearchPage {
            page,
            total_pages: 1,
            total_results: results.len() as u32,
            results,
        })
    }

    async fn details(&self, key: MediaKey) -> AppResult<MediaDetails> {
        self.details
            .get(&key)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("{} not found", key)))
    }

    async fn collection(&self, collection_id: i64) -> AppResult<Collection> {
        Err(AppError::NotFound(format!(
            "Collection {} not found",
            collection_id
        )))
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

/// Sliding-window log kept in memory
#[derive(Default)]
pub struct MemoryRateLimitStore {
    hits: Mutex<HashMap<String, Vec<i64>>>,
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn record_hit(
        &self,
        key: &str,
        now_ms: i64,
        window: Duration,
        limit: u64,
    ) -> AppResult<u64> {
        let mut hits = self.hits.lock().unwrap();
        let log = hits.entry(key.to_string()).or_default();
        let floor = now_ms - window.as_millis() as i64;
        log.retain(|at| *at > floor);
        log.push(now_ms);
        let count = log.len() as u64;
        if count > limit {
            log.pop();
        }
        Ok(count)
    }
}

pub fn search_result(media_id: i64, title: &str, adult: bool) -> SearchResult {
    SearchResult {
        media_id,
        media_type: watchlog::models::MediaType::Movie,
        title: title.to_string(),
        overview: None,
        poster_path: None,
        release_date: None,
        vote_average: Some(7.0),
        genre_ids: Vec::new(),
        original_language: Some("en".to_string()),
        adult,
    }
}

pub struct TestApp {
    pub server: TestServer,
    pub store: Arc<MemoryStore>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_catalog(StubCatalog::default())
    }

    pub fn with_catalog(catalog: StubCatalog) -> Self {
        let store = Arc::new(MemoryStore::default());
        let stores = Stores {
            watchlist: store.clone(),
            blacklist: store.clone(),
            tags: store.clone(),
            users: store.clone(),
            telemetry: store.clone(),
        };

        let state = AppState::new(
            stores,
            Arc::new(catalog),
            Arc::new(MemoryRateLimitStore::default()),
            AuthSettings {
                sessions: SessionKeys::new(SECRET, 1),
                bcrypt_cost: 4,
            },
            StatsSettings {
                batch_pause: Duration::ZERO,
                ..StatsSettings::default()
            },
        );

        let server = TestServer::new(create_router(Arc::new(state))).unwrap();
        Self { server, store }
    }

    /// Seeds an operator invitation for `email`, as the maintenance binary does
    pub async fn invite(&self, email: &str) -> Invitation {
        self.store
            .create_invitation(email, None, Utc::now() + ChronoDuration::days(7))
            .await
            .unwrap()
    }

    /// Signs up a new account and returns its session token
    pub async fn sign_up(&self, email: &str, birth_date: Option<&str>) -> String {
        let invitation = self.invite(email).await;
        let response = self
            .server
            .post("/api/v1/auth/signup")
            .json(&json!({
                "invitationToken": invitation.token,
                "email": email,
                "password": "correct horse battery",
                "displayName": "Tester",
                "birthDate": birth_date,
            }))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
        let body: Value = response.json();
        body["token"].as_str().unwrap().to_string()
    }
}

pub fn bearer(token: &str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("authorization"),
        HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    )
}
