//! Title metadata sources
//!
//! Search, statistics and the media endpoint only talk to `MetadataProvider`,
//! so the catalog backend can be swapped (or stubbed in tests) without touching
//! them.

use crate::{
    error::AppResult,
    models::{Collection, MediaDetails, MediaKey, SearchPage},
};

pub mod tmdb;

pub use tmdb::TmdbProvider;

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Multi-search over movies and TV; people are never returned
    async fn search(&self, query: &str, page: u32, include_adult: bool) -> AppResult<SearchPage>;

    /// Full metadata for one title, including top-billed cast
    ///
    /// Fails with `NotFound` when the catalog has no such title.
    async fn details(&self, key: MediaKey) -> AppResult<MediaDetails>;

    /// Franchise grouping with all of its parts
    async fn collection(&self, collection_id: i64) -> AppResult<Collection>;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}
