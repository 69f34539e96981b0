use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{MediaKey, MediaType, WatchStatus};
use crate::error::{AppError, AppResult};

pub const MAX_RATING: f32 = 10.0;

/// Tag reference embedded in a watchlist item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagSummary {
    pub id: Uuid,
    pub name: String,
}

/// A user's tracked record for one title
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchListItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub media_id: i64,
    pub media_type: MediaType,
    pub title: String,
    pub poster_path: Option<String>,
    /// Catalog rating at the time the item was last written
    pub vote_average: Option<f32>,
    pub status: WatchStatus,
    pub user_rating: Option<f32>,
    pub weighted_rating: Option<f32>,
    pub tags: Vec<TagSummary>,
    pub added_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WatchListItem {
    pub fn key(&self) -> MediaKey {
        MediaKey::new(self.media_id, self.media_type)
    }

    /// Weighted rating when derived, else the raw user rating
    pub fn effective_rating(&self) -> Option<f32> {
        self.weighted_rating.or(self.user_rating)
    }
}

/// Title and rating snapshot written alongside a status change
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaSnapshot {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f32>,
    #[serde(default)]
    pub user_rating: Option<f32>,
}

/// Insert-or-update of a watchlist row keyed by (user, media, type)
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpsert {
    pub key: MediaKey,
    pub status: WatchStatus,
    pub snapshot: MediaSnapshot,
}

/// Body of `POST /watchlist/status`; a null status removes the item
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetStatusRequest {
    #[serde(flatten)]
    pub key: MediaKey,
    pub status: Option<WatchStatus>,
    #[serde(flatten)]
    pub snapshot: MediaSnapshot,
}

/// Result of a status change: the stored item, or `None` when untracked
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingState {
    pub tracked: bool,
    pub item: Option<WatchListItem>,
}

impl From<Option<WatchListItem>> for TrackingState {
    fn from(item: Option<WatchListItem>) -> Self {
        Self {
            tracked: item.is_some(),
            item,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistFilter {
    pub status: Option<WatchStatus>,
    pub media_type: Option<MediaType>,
    pub tag_id: Option<Uuid>,
}

impl WatchlistFilter {
    pub fn matches(&self, item: &WatchListItem) -> bool {
        self.status.map_or(true, |s| item.status == s)
            && self.media_type.map_or(true, |t| item.media_type == t)
            && self
                .tag_id
                .map_or(true, |id| item.tags.iter().any(|tag| tag.id == id))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetRatingRequest {
    pub rating: Option<f32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetTagsRequest {
    pub tag_ids: Vec<Uuid>,
}

/// Validates a 0–10 user rating
pub fn validate_rating(rating: Option<f32>) -> AppResult<()> {
    match rating {
        Some(r) if !r.is_finite() || !(0.0..=MAX_RATING).contains(&r) => Err(
            AppError::InvalidInput(format!("Rating must be between 0 and {}", MAX_RATING)),
        ),
        _ => Ok(()),
    }
}

/// Average of all users' ratings for one title
#[derive(Debug, Clone, PartialEq)]
pub struct CommunityRating {
    pub key: MediaKey,
    pub average: f64,
    pub count: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchLookupRequest {
    pub items: Vec<MediaKey>,
}

/// One entry of a batch lookup, in request order
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchLookupEntry {
    pub media_id: i64,
    pub media_type: MediaType,
    pub status: Option<WatchStatus>,
    pub user_rating: Option<f32>,
    pub blacklisted: bool,
    pub community_rating: Option<f64>,
    pub community_count: i64,
}
