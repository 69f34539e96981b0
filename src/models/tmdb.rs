use serde::Deserialize;

use super::{
    CastMember, Collection, CollectionPart, CollectionRef, Genre, MediaDetails, MediaKey,
    MediaType, SearchPage, SearchResult,
};

// ============================================================================
// TMDB API Types
// ============================================================================

/// Response envelope of `/search/multi`
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbSearchResponse {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub results: Vec<TmdbSearchItem>,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub total_results: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbSearchItem {
    pub id: i64,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub first_air_date: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f32>,
    #[serde(default)]
    pub genre_ids: Vec<i64>,
    #[serde(default)]
    pub original_language: Option<String>,
    #[serde(default)]
    pub adult: bool,
}

impl TmdbSearchItem {
    /// Converts a multi-search hit; people and unknown kinds are dropped
    pub fn into_result(self) -> Option<SearchResult> {
        let media_type = match self.media_type.as_deref() {
            Some("movie") => MediaType::Movie,
            Some("tv") => MediaType::Tv,
            _ => return None,
        };

        Some(SearchResult {
            media_id: self.id,
            media_type,
            title: self.title.or(self.name).unwrap_or_default(),
            overview: self.overview.filter(|o| !o.is_empty()),
            poster_path: self.poster_path,
            release_date: non_empty(self.release_date.or(self.first_air_date)),
            vote_average: self.vote_average,
            genre_ids: self.genre_ids,
            original_language: self.original_language,
            adult: self.adult,
        })
    }
}

impl From<TmdbSearchResponse> for SearchPage {
    fn from(response: TmdbSearchResponse) -> Self {
        let results: Vec<SearchResult> = response
            .results
            .into_iter()
            .filter_map(TmdbSearchItem::into_result)
            .collect();

        SearchPage {
            page: response.page,
            total_pages: response.total_pages,
            total_results: response.total_results,
            results,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbGenre {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbCast {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub character: Option<String>,
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub profile_path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TmdbCredits {
    #[serde(default)]
    pub cast: Vec<TmdbCast>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbCollectionRef {
    pub id: i64,
    pub name: String,
}

/// Response of `/movie/{id}` and `/tv/{id}` with `append_to_response=credits`
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbDetails {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub original_language: Option<String>,
    #[serde(default)]
    pub genres: Vec<TmdbGenre>,
    #[serde(default)]
    pub credits: Option<TmdbCredits>,
    #[serde(default)]
    pub belongs_to_collection: Option<TmdbCollectionRef>,
    #[serde(default)]
    pub adult: bool,
    #[serde(default)]
    pub vote_average: Option<f32>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub first_air_date: Option<String>,
    #[serde(default)]
    pub runtime: Option<i32>,
    #[serde(default)]
    pub episode_run_time: Vec<i32>,
}

impl TmdbDetails {
    pub fn into_details(self, media_type: MediaType) -> MediaDetails {
        let mut cast: Vec<CastMember> = self
            .credits
            .unwrap_or_default()
            .cast
            .into_iter()
            .map(|c| CastMember {
                id: c.id,
                name: c.name,
                character: c.character.filter(|s| !s.is_empty()),
                order: c.order,
                profile_path: c.profile_path,
            })
            .collect();
        cast.sort_by_key(|c| c.order);

        MediaDetails {
            key: MediaKey::new(self.id, media_type),
            title: self.title.or(self.name).unwrap_or_default(),
            overview: self.overview.filter(|o| !o.is_empty()),
            original_language: self.original_language,
            genres: self
                .genres
                .into_iter()
                .map(|g| Genre {
                    id: g.id,
                    name: g.name,
                })
                .collect(),
            cast,
            collection: self.belongs_to_collection.map(|c| CollectionRef {
                id: c.id,
                name: c.name,
            }),
            adult: self.adult,
            vote_average: self.vote_average,
            poster_path: self.poster_path,
            release_date: non_empty(self.release_date.or(self.first_air_date)),
            runtime_minutes: self.runtime.or(self.episode_run_time.first().copied()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbCollectionPart {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
}

/// Response of `/collection/{id}`
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbCollection {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub parts: Vec<TmdbCollectionPart>,
}

impl From<TmdbCollection> for Collection {
    fn from(collection: TmdbCollection) -> Self {
        Collection {
            id: collection.id,
            name: collection.name,
            parts: collection
                .parts
                .into_iter()
                .map(|p| CollectionPart {
                    media_id: p.id,
                    title: p.title.unwrap_or_default(),
                    release_date: non_empty(p.release_date),
                })
                .collect(),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
