/// TMDB metadata provider
///
/// Endpoints used:
/// 1. `/search/multi`: movie and TV search (person hits are dropped)
/// 2. `/movie/{id}` and `/tv/{id}` with `append_to_response=credits`
/// 3. `/collection/{id}`: franchise parts
///
/// Every response is cached in Redis for `cache_ttl` seconds.
use crate::{
    cached,
    config::TmdbAuth,
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::{
        tmdb::{TmdbCollection, TmdbDetails, TmdbSearchResponse},
        Collection, MediaDetails, MediaKey, SearchPage,
    },
    services::{
        providers::MetadataProvider,
        retry::{fetch_with_retry, RetryConfig},
    },
};
use reqwest::{Client as HttpClient, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

#[derive(Clone)]
pub struct TmdbProvider {
    http_client: HttpClient,
    api_url: String,
    auth: TmdbAuth,
    cache: Cache,
    cache_ttl: u64,
    retry: RetryConfig,
}

impl TmdbProvider {
    pub fn new(
        cache: Cache,
        api_url: String,
        auth: TmdbAuth,
        timeout: Duration,
        cache_ttl: u64,
    ) -> AppResult<Self> {
        let http_client = HttpClient::builder()
            .timeout(timeout)
            .user_agent(concat!("watchlog/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http_client,
            api_url: api_url.trim_end_matches('/').to_string(),
            auth,
            cache,
            cache_ttl,
            retry: RetryConfig::interactive(),
        })
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn request(&self, path: &str) -> RequestBuilder {
        let builder = self.http_client.get(format!("{}{}", self.api_url, path));
        match &self.auth {
            TmdbAuth::Bearer(token) => builder.bearer_auth(token),
            TmdbAuth::ApiKey(key) => builder.query(&[("api_key", key.as_str())]),
        }
    }

    /// GET with retry and status mapping; 404 becomes `NotFound`
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        operation: &str,
    ) -> AppResult<T> {
        let response =
            fetch_with_retry(|| self.request(path).query(query).send(), &self.retry, operation)
                .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(format!("No catalog entry at {}", path)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, operation, "TMDB request failed");
            return Err(AppError::ExternalApi(format!(
                "TMDB returned status {} for {}",
                status, operation
            )));
        }

        Ok(response.json().await?)
    }

    async fn fetch_search(
        &self,
        query: &str,
        page: u32,
        include_adult: bool,
    ) -> AppResult<SearchPage> {
        tracing::debug!(query, page, "Cache miss, searching TMDB");
        let response: TmdbSearchResponse = self
            .get_json(
                "/search/multi",
                &[
                    ("query", query.to_string()),
                    ("page", page.to_string()),
                    ("include_adult", include_adult.to_string()),
                ],
                "tmdb search",
            )
            .await?;

        let mut page = SearchPage::from(response);
        if !include_adult {
            page.results.retain(|r| !r.adult);
        }
        Ok(page)
    }

    async fn fetch_details(&self, key: MediaKey) -> AppResult<MediaDetails> {
        tracing::debug!(media = %key, "Cache miss, fetching TMDB details");
        let path = format!("/{}/{}", key.media_type, key.media_id);
        let details: TmdbDetails = self
            .get_json(
                &path,
                &[("append_to_response", "credits".to_string())],
                "tmdb details",
            )
            .await?;

        Ok(details.into_details(key.media_type))
    }

    async fn fetch_collection(&self, collection_id: i64) -> AppResult<Collection> {
        tracing::debug!(collection_id, "Cache miss, fetching TMDB collection");
        let collection: TmdbCollection = self
            .get_json(
                &format!("/collection/{}", collection_id),
                &[],
                "tmdb collection",
            )
            .await?;

        Ok(collection.into())
    }
}

#[async_trait::async_trait]
impl MetadataProvider for TmdbProvider {
    async fn search(&self, query: &str, page: u32, include_adult: bool) -> AppResult<SearchPage> {
        let key = CacheKey::Search {
            query: query.to_string(),
            page,
            include_adult,
        };
        cached!(
            self.cache,
            key,
            self.cache_ttl,
            self.fetch_search(query, page, include_adult)
        )
    }

    async fn details(&self, key: MediaKey) -> AppResult<MediaDetails> {
        cached!(
            self.cache,
            CacheKey::Details(key),
            self.cache_ttl,
            self.fetch_details(key)
        )
    }

    async fn collection(&self, collection_id: i64) -> AppResult<Collection> {
        cached!(
            self.cache,
            CacheKey::Collection(collection_id),
            self.cache_ttl,
            self.fetch_collection(collection_id)
        )
    }

    fn name(&self) -> &'static str {
        "tmdb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_redis_client;
    use crate::models::MediaType;
    use axum::{
        extract::{Path, Query},
        http::{HeaderMap, StatusCode as AxumStatus},
        response::IntoResponse,
        routing::get,
        Json, Router,
    };
    use serde_json::json;
    use std::collections::HashMap;

    async fn fake_tmdb() -> String {
        async fn search(headers: HeaderMap, Query(q): Query<HashMap<String, String>>) -> impl IntoResponse {
            if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer token") {
                return AxumStatus::UNAUTHORIZED.into_response();
            }
            Json(json!({
                "page": 1,
                "total_pages": 1,
                "total_results": 3,
                "results": [
                    { "id": 603, "media_type": "movie", "title": q.get("query").cloned().unwrap_or_default() },
                    { "id": 1, "media_type": "movie", "title": "Adult", "adult": true },
                    { "id": 6384, "media_type": "person", "name": "Keanu Reeves" }
                ]
            }))
            .into_response()
        }

        async fn movie(Path(id): Path<i64>) -> impl IntoResponse {
            if id != 603 {
                return AxumStatus::NOT_FOUND.into_response();
            }
            Json(json!({
                "id": 603,
                "title": "The Matrix",
                "original_language": "en",
                "genres": [{ "id": 28, "name": "Action" }],
                "credits": { "cast": [{ "id": 6384, "name": "Keanu Reeves", "order": 0 }] }
            }))
            .into_response()
        }

        let app = Router::new()
            .route("/search/multi", get(search))
            .route("/movie/:id", get(movie));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn provider(api_url: String) -> TmdbProvider {
        // nothing listens here, so every cache read is a miss
        let client = create_redis_client("redis://127.0.0.1:1").unwrap();
        let (cache, _handle) = Cache::new(client);
        TmdbProvider::new(
            cache,
            api_url,
            TmdbAuth::Bearer("token".to_string()),
            Duration::from_secs(2),
            60,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_search_filters_people_and_adult_titles() {
        let provider = provider(fake_tmdb().await).await;

        let page = provider.search("matrix", 1, false).await.unwrap();
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].title, "matrix");
    }

    #[tokio::test]
    async fn test_search_keeps_adult_titles_when_allowed() {
        let provider = provider(fake_tmdb().await).await;

        let page = provider.search("matrix", 1, true).await.unwrap();
        assert_eq!(page.results.len(), 2);
    }

    #[tokio::test]
    async fn test_details_maps_cast() {
        let provider = provider(fake_tmdb().await).await;

        let details = provider
            .details(MediaKey::new(603, MediaType::Movie))
            .await
            .unwrap();
        assert_eq!(details.title, "The Matrix");
        assert_eq!(details.cast[0].name, "Keanu Reeves");
    }

    #[tokio::test]
    async fn test_unknown_title_is_not_found() {
        let provider = provider(fake_tmdb().await).await;

        let result = provider.details(MediaKey::new(42, MediaType::Movie)).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_wrong_credentials_are_an_upstream_error() {
        let provider = provider(fake_tmdb().await)
            .await
            .with_retry_config(RetryConfig {
                max_retries: 0,
                ..RetryConfig::default()
            });
        let provider = TmdbProvider {
            auth: TmdbAuth::ApiKey("wrong".to_string()),
            ..provider
        };

        let result = provider.search("matrix", 1, false).await;
        assert!(matches!(result, Err(AppError::ExternalApi(_))));
    }
}
