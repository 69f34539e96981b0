use serde::{Deserialize, Serialize};

use super::{MediaKey, MediaType, WatchStatus};

/// Catalog genre id for animation
pub const ANIMATION_GENRE_ID: i64 = 16;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Genre {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastMember {
    pub id: i64,
    pub name: String,
    pub character: Option<String>,
    /// Billing position, 0 is top-billed
    pub order: i32,
    pub profile_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionRef {
    pub id: i64,
    pub name: String,
}

/// Title metadata needed by search and the statistics pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaDetails {
    pub key: MediaKey,
    pub title: String,
    pub overview: Option<String>,
    pub original_language: Option<String>,
    pub genres: Vec<Genre>,
    pub cast: Vec<CastMember>,
    pub collection: Option<CollectionRef>,
    pub adult: bool,
    pub vote_average: Option<f32>,
    pub poster_path: Option<String>,
    pub release_date: Option<String>,
    pub runtime_minutes: Option<i32>,
}

impl MediaDetails {
    pub fn is_animation(&self) -> bool {
        self.genres.iter().any(|g| g.id == ANIMATION_GENRE_ID)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionPart {
    pub media_id: i64,
    pub title: String,
    pub release_date: Option<String>,
}

/// A franchise grouping of movies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: i64,
    pub name: String,
    pub parts: Vec<CollectionPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub media_id: i64,
    pub media_type: MediaType,
    pub title: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub release_date: Option<String>,
    pub vote_average: Option<f32>,
    pub genre_ids: Vec<i64>,
    pub original_language: Option<String>,
    pub adult: bool,
}

impl SearchResult {
    pub fn key(&self) -> MediaKey {
        MediaKey::new(self.media_id, self.media_type)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    pub page: u32,
    pub total_pages: u32,
    pub total_results: u32,
    pub results: Vec<SearchResult>,
}

/// Search result annotated with the caller's tracking state
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotatedResult {
    #[serde(flatten)]
    pub result: SearchResult,
    pub status: Option<WatchStatus>,
    pub user_rating: Option<f32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotatedSearchPage {
    pub page: u32,
    pub total_pages: u32,
    pub total_results: u32,
    pub results: Vec<AnnotatedResult>,
}

/// Details of one title with the caller's tracking state
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaView {
    pub details: MediaDetails,
    pub status: Option<WatchStatus>,
    pub user_rating: Option<f32>,
    pub blacklisted: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    #[serde(default)]
    pub page: Option<u32>,
}
