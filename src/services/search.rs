use chrono::Utc;
use std::collections::{HashMap, HashSet};

use crate::{
    db::{BlacklistRepository, WatchlistRepository},
    error::{AppError, AppResult},
    models::{
        AnnotatedResult, AnnotatedSearchPage, MediaKey, MediaView, SearchQuery, User,
        WatchListItem,
    },
    services::providers::MetadataProvider,
};

const MAX_QUERY_LENGTH: usize = 200;
/// Highest page the catalog serves
const MAX_PAGE: u32 = 500;

/// Searches the catalog for the user, hiding blacklisted and (when not allowed) adult titles
pub async fn search(
    metadata: &dyn MetadataProvider,
    watchlist: &dyn WatchlistRepository,
    blacklist: &dyn BlacklistRepository,
    user: &User,
    query: SearchQuery,
) -> AppResult<AnnotatedSearchPage> {
    let q = query.q.trim();
    if q.is_empty() || q.chars().count() > MAX_QUERY_LENGTH {
        return Err(AppError::InvalidInput(format!(
            "Query must be 1-{} characters",
            MAX_QUERY_LENGTH
        )));
    }
    let page = query.page.unwrap_or(1);
    if !(1..=MAX_PAGE).contains(&page) {
        return Err(AppError::InvalidInput(format!(
            "Page must be between 1 and {}",
            MAX_PAGE
        )));
    }

    let include_adult = user.allows_adult_content(Utc::now().date_naive());
    let mut found = metadata.search(q, page, include_adult).await?;
    if !include_adult {
        found.results.retain(|r| !r.adult);
    }

    let keys: Vec<MediaKey> = found.results.iter().map(|r| r.key()).collect();
    let (blacklisted, items) = if keys.is_empty() {
        (Vec::new(), Vec::new())
    } else {
        tokio::try_join!(
            blacklist.blacklisted_among(user.id, &keys),
            watchlist.find_items(user.id, &keys),
        )?
    };

    let blacklisted: HashSet<MediaKey> = blacklisted.into_iter().collect();
    let items: HashMap<MediaKey, WatchListItem> =
        items.into_iter().map(|item| (item.key(), item)).collect();

    let hidden = found
        .results
        .iter()
        .filter(|r| blacklisted.contains(&r.key()))
        .count();

    let results: Vec<AnnotatedResult> = found
        .results
        .into_iter()
        .filter(|r| !blacklisted.contains(&r.key()))
        .map(|result| {
            let item = items.get(&result.key());
            AnnotatedResult {
                status: item.map(|i| i.status),
                user_rating: item.and_then(|i| i.user_rating),
                result,
            }
        })
        .collect();

    tracing::info!(
        user_id = %user.id,
        provider = metadata.name(),
        page,
        results = results.len(),
        hidden,
        "Search completed"
    );

    Ok(AnnotatedSearchPage {
        page: found.page,
        total_pages: found.total_pages,
        total_results: found.total_results,
        results,
    })
}

/// Catalog details of one title with the user's tracking state
pub async fn media_view(
    metadata: &dyn MetadataProvider,
    watchlist: &dyn WatchlistRepository,
    blacklist: &dyn BlacklistRepository,
    user: &User,
    key: MediaKey,
) -> AppResult<MediaView> {
    key.validate()?;

    let details = metadata.details(key).await?;
    if details.adult && !user.allows_adult_content(Utc::now().date_naive()) {
        return Err(AppError::NotFound(format!("{} not found", key)));
    }

    let (item, blacklisted) = tokio::try_join!(
        watchlist.find_item(user.id, &key),
        blacklist.blacklisted_among(user.id, std::slice::from_ref(&key)),
    )?;

    Ok(MediaView {
        details,
        status: item.as_ref().map(|i| i.status),
        user_rating: item.as_ref().and_then(|i| i.user_rating),
        blacklisted: !blacklisted.is_empty(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::{MockBlacklistRepository, MockWatchlistRepository};
    use crate::models::{MediaDetails, MediaType, SearchPage, SearchResult, WatchStatus};
    use crate::services::providers::MockMetadataProvider;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn user(birth_date: Option<NaiveDate>) -> User {
        User {
            id: Uuid::new_v4(),
            email: "ana@example.com".to_string(),
            password_hash: String::new(),
            display_name: "Ana".to_string(),
            birth_date,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn result(id: i64, adult: bool) -> SearchResult {
        SearchResult {
            media_id: id,
            media_type: MediaType::Movie,
            title: format!("Movie {}", id),
            overview: None,
            poster_path: None,
            release_date: None,
            vote_average: None,
            genre_ids: vec![],
            original_language: Some("en".to_string()),
            adult,
        }
    }

    fn metadata_with(results: Vec<SearchResult>, expect_adult: bool) -> MockMetadataProvider {
        let mut metadata = MockMetadataProvider::new();
        metadata.expect_name().return_const("mock");
        metadata
            .expect_search()
            .withf(move |_, _, include_adult| *include_adult == expect_adult)
            .times(1)
            .returning(move |_, page, _| {
                Ok(SearchPage {
                    page,
                    total_pages: 1,
                    total_results: results.len() as u32,
                    results: results.clone(),
                })
            });
        metadata
    }

    #[tokio::test]
    async fn test_minor_never_sees_adult_results() {
        let minor = user(Some(Utc::now().date_naive() - chrono::Duration::days(365 * 10)));
        let metadata = metadata_with(vec![result(1, false), result(2, true)], false);

        let mut watchlist = MockWatchlistRepository::new();
        watchlist.expect_find_items().returning(|_, _| Ok(vec![]));
        let mut blacklist = MockBlacklistRepository::new();
        blacklist.expect_blacklisted_among().returning(|_, _| Ok(vec![]));

        let page = search(
            &metadata,
            &watchlist,
            &blacklist,
            &minor,
            SearchQuery {
                q: "movie".to_string(),
                page: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].result.media_id, 1);
    }

    #[tokio::test]
    async fn test_blacklisted_results_are_removed_and_rest_annotated() {
        let adult = user(NaiveDate::from_ymd_opt(1980, 1, 1));
        let metadata = metadata_with(vec![result(1, false), result(2, false)], true);

        let mut watchlist = MockWatchlistRepository::new();
        watchlist.expect_find_items().returning(|user_id, _| {
            Ok(vec![WatchListItem {
                id: Uuid::new_v4(),
                user_id,
                media_id: 1,
                media_type: MediaType::Movie,
                title: "Movie 1".to_string(),
                poster_path: None,
                vote_average: None,
                status: WatchStatus::WantToWatch,
                user_rating: None,
                weighted_rating: None,
                tags: vec![],
                added_at: Utc::now(),
                updated_at: Utc::now(),
            }])
        });
        let mut blacklist = MockBlacklistRepository::new();
        blacklist
            .expect_blacklisted_among()
            .returning(|_, _| Ok(vec![MediaKey::new(2, MediaType::Movie)]));

        let page = search(
            &metadata,
            &watchlist,
            &blacklist,
            &adult,
            SearchQuery {
                q: "movie".to_string(),
                page: Some(1),
            },
        )
        .await
        .unwrap();

        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].status, Some(WatchStatus::WantToWatch));
    }

    #[tokio::test]
    async fn test_blank_query_is_rejected() {
        let metadata = MockMetadataProvider::new();
        let watchlist = MockWatchlistRepository::new();
        let blacklist = MockBlacklistRepository::new();

        let result = search(
            &metadata,
            &watchlist,
            &blacklist,
            &user(None),
            SearchQuery {
                q: "   ".to_string(),
                page: None,
            },
        )
        .await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_adult_details_hidden_without_birth_date() {
        let key = MediaKey::new(9, MediaType::Movie);
        let mut metadata = MockMetadataProvider::new();
        metadata.expect_details().returning(move |key| {
            Ok(MediaDetails {
                key,
                title: "Adult".to_string(),
                overview: None,
                original_language: None,
                genres: vec![],
                cast: vec![],
                collection: None,
                adult: true,
                vote_average: None,
                poster_path: None,
                release_date: None,
                runtime_minutes: None,
            })
        });
        let watchlist = MockWatchlistRepository::new();
        let blacklist = MockBlacklistRepository::new();

        let result = media_view(&metadata, &watchlist, &blacklist, &user(None), key).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
