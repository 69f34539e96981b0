use serde::{Deserialize, Serialize};

use super::{DisplayType, MediaType, WatchStatus};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub want_to_watch: u64,
    pub watched: u64,
    pub rewatched: u64,
    pub dropped: u64,
}

impl StatusCounts {
    pub fn increment(&mut self, status: WatchStatus) {
        match status {
            WatchStatus::WantToWatch => self.want_to_watch += 1,
            WatchStatus::Watched => self.watched += 1,
            WatchStatus::Rewatched => self.rewatched += 1,
            WatchStatus::Dropped => self.dropped += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TypeCounts {
    pub movie: u64,
    pub tv: u64,
    pub cartoon: u64,
    pub anime: u64,
}

impl TypeCounts {
    pub fn increment(&mut self, display_type: DisplayType) {
        match display_type {
            DisplayType::Movie => self.movie += 1,
            DisplayType::Tv => self.tv += 1,
            DisplayType::Cartoon => self.cartoon += 1,
            DisplayType::Anime => self.anime += 1,
        }
    }
}

/// Profile overview counts
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileStats {
    pub total: u64,
    pub by_status: StatusCounts,
    pub by_type: TypeCounts,
    pub average_rating: Option<f64>,
    pub rated_count: u64,
    /// Titles whose metadata was available for classification
    pub classified_count: u64,
    pub unclassified_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenreStat {
    pub id: i64,
    pub name: String,
    pub count: u64,
    pub average_rating: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorStat {
    pub id: i64,
    pub name: String,
    pub profile_path: Option<String>,
    pub appearances: u64,
    pub average_rating: Option<f64>,
    pub titles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionProgress {
    pub id: i64,
    pub name: String,
    pub total_parts: u64,
    pub watched_parts: u64,
    pub tracked_parts: u64,
    pub completion: f64,
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightedRatingEntry {
    pub media_id: i64,
    pub media_type: MediaType,
    pub title: String,
    pub user_rating: Option<f32>,
    pub weighted_rating: Option<f32>,
    pub effective_rating: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightedRatings {
    pub items: Vec<WeightedRatingEntry>,
    pub average_effective_rating: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActorQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}
