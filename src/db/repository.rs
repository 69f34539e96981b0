//! Storage seams for the relational store
//!
//! Handlers and services only see these traits. The Postgres implementation
//! lives in `db::postgres`; tests provide their own in-memory stores.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        BlacklistEntry, CommunityRating, FilterSession, IntentSignal, Invitation, MediaKey,
        NewUser, PredictionLog, ProfileUpdate, RecommendationEvent, StatusUpsert, Tag, User,
        WatchListItem, WatchlistFilter,
    },
};

/// Watchlist rows keyed by (user, media id, media type)
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait WatchlistRepository: Send + Sync {
    async fn find_item(&self, user_id: Uuid, key: &MediaKey) -> AppResult<Option<WatchListItem>>;

    /// Fetches the user's rows for all `keys` in a single round trip
    async fn find_items(&self, user_id: Uuid, keys: &[MediaKey]) -> AppResult<Vec<WatchListItem>>;

    /// Inserts or updates the row for `upsert.key`; never creates a duplicate
    async fn upsert_status(&self, user_id: Uuid, upsert: &StatusUpsert)
        -> AppResult<WatchListItem>;

    /// Returns whether a row was deleted
    async fn delete_item(&self, user_id: Uuid, key: &MediaKey) -> AppResult<bool>;

    /// Returns `None` when the title is not tracked
    async fn set_rating(
        &self,
        user_id: Uuid,
        key: &MediaKey,
        rating: Option<f32>,
    ) -> AppResult<Option<WatchListItem>>;

    /// Replaces the item's tags; `None` when the title is not tracked
    async fn set_tags(
        &self,
        user_id: Uuid,
        key: &MediaKey,
        tag_ids: &[Uuid],
    ) -> AppResult<Option<WatchListItem>>;

    /// Newest first
    async fn list_items(&self, user_id: Uuid, filter: &WatchlistFilter)
        -> AppResult<Vec<WatchListItem>>;

    /// Average rating across all users for each key that has ratings
    async fn community_ratings(&self, keys: &[MediaKey]) -> AppResult<Vec<CommunityRating>>;

    /// Sets `weighted_rating = user_rating` where it is missing; returns rows touched
    async fn backfill_weighted_ratings(&self, dry_run: bool) -> AppResult<u64>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait BlacklistRepository: Send + Sync {
    /// Idempotent; re-adding an existing key returns the stored entry
    async fn add(&self, user_id: Uuid, key: &MediaKey, title: &str) -> AppResult<BlacklistEntry>;

    async fn remove(&self, user_id: Uuid, key: &MediaKey) -> AppResult<bool>;

    async fn list(&self, user_id: Uuid) -> AppResult<Vec<BlacklistEntry>>;

    /// Subset of `keys` the user has blacklisted
    async fn blacklisted_among(&self, user_id: Uuid, keys: &[MediaKey])
        -> AppResult<Vec<MediaKey>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TagRepository: Send + Sync {
    async fn list(&self, user_id: Uuid) -> AppResult<Vec<Tag>>;

    /// Fails with a conflict when the name is already used by this user
    async fn create(&self, user_id: Uuid, name: &str) -> AppResult<Tag>;

    async fn delete(&self, user_id: Uuid, tag_id: Uuid) -> AppResult<bool>;

    /// Tags among `tag_ids` that belong to the user
    async fn find_owned(&self, user_id: Uuid, tag_ids: &[Uuid]) -> AppResult<Vec<Tag>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, user_id: Uuid) -> AppResult<Option<User>>;

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;

    /// Creates the user and marks the invitation used atomically
    async fn create_with_invitation(&self, user: &NewUser, invitation_token: &str)
        -> AppResult<User>;

    async fn update_profile(&self, user_id: Uuid, update: &ProfileUpdate)
        -> AppResult<Option<User>>;

    /// Cascades to every row owned by the user
    async fn delete(&self, user_id: Uuid) -> AppResult<bool>;

    async fn create_invitation(
        &self,
        email: &str,
        created_by: Option<Uuid>,
        expires_at: DateTime<Utc>,
    ) -> AppResult<Invitation>;

    async fn find_invitation(&self, token: &str) -> AppResult<Option<Invitation>>;
}

/// Append-only recommendation telemetry sinks
#[async_trait::async_trait]
pub trait TelemetryRepository: Send + Sync {
    async fn record_events(&self, user_id: Uuid, events: &[RecommendationEvent]) -> AppResult<u64>;

    async fn record_signals(&self, user_id: Uuid, signals: &[IntentSignal]) -> AppResult<u64>;

    async fn record_filter_session(&self, user_id: Uuid, session: &FilterSession)
        -> AppResult<()>;

    async fn record_predictions(&self, user_id: Uuid, predictions: &[PredictionLog])
        -> AppResult<u64>;

    /// Records the event and applies the optional watchlist change in one transaction
    async fn record_action(
        &self,
        user_id: Uuid,
        event: &RecommendationEvent,
        upsert: Option<&StatusUpsert>,
    ) -> AppResult<Option<WatchListItem>>;

    /// Deletes telemetry rows created before `cutoff`; returns rows removed
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64>;
}
