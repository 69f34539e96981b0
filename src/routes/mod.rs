use axum::{
    http::StatusCode,
    middleware,
    routing::{get, post, put, MethodRouter},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    db::{
        BlacklistRepository, PgStore, RateLimitStore, TagRepository, TelemetryRepository,
        UserRepository, WatchlistRepository,
    },
    error::AppResult,
    middleware::{
        rate_limit::{rate_limit, EndpointClass, RateLimiter},
        request_id::{make_span_with_request_id, request_id_middleware},
    },
    models::{MediaKey, MediaType},
    services::{AccountService, MetadataProvider, SessionKeys, StatsService, StatsSettings},
};

pub mod auth;
pub mod blacklist;
pub mod extract;
pub mod media;
pub mod me;
pub mod recommendations;
pub mod stats;
pub mod tags;
pub mod watchlist;

/// Storage backends behind the repository traits
#[derive(Clone)]
pub struct Stores {
    pub watchlist: Arc<dyn WatchlistRepository>,
    pub blacklist: Arc<dyn BlacklistRepository>,
    pub tags: Arc<dyn TagRepository>,
    pub users: Arc<dyn UserRepository>,
    pub telemetry: Arc<dyn TelemetryRepository>,
}

impl Stores {
    /// Every repository served by one Postgres pool
    pub fn postgres(store: PgStore) -> Self {
        let store = Arc::new(store);
        Self {
            watchlist: store.clone(),
            blacklist: store.clone(),
            tags: store.clone(),
            users: store.clone(),
            telemetry: store,
        }
    }
}

/// Authentication settings shared by the account flows
#[derive(Clone)]
pub struct AuthSettings {
    pub sessions: SessionKeys,
    pub bcrypt_cost: u32,
}

/// Shared application state
pub struct AppState {
    pub watchlist: Arc<dyn WatchlistRepository>,
    pub blacklist: Arc<dyn BlacklistRepository>,
    pub tags: Arc<dyn TagRepository>,
    pub telemetry: Arc<dyn TelemetryRepository>,
    pub metadata: Arc<dyn MetadataProvider>,
    pub accounts: AccountService,
    pub stats: StatsService,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(
        stores: Stores,
        metadata: Arc<dyn MetadataProvider>,
        rate_limit_store: Arc<dyn RateLimitStore>,
        auth: AuthSettings,
        stats: StatsSettings,
    ) -> Self {
        Self {
            accounts: AccountService::new(stores.users.clone(), auth.sessions, auth.bcrypt_cost),
            stats: StatsService::new(stores.watchlist.clone(), metadata.clone(), stats),
            rate_limiter: RateLimiter::new(rate_limit_store),
            watchlist: stores.watchlist,
            blacklist: stores.blacklist,
            tags: stores.tags,
            telemetry: stores.telemetry,
            metadata,
        }
    }
}

/// Parses the `{type}/{id}` path segments used by per-title routes
pub(crate) fn media_key(media_type: &str, media_id: &str) -> AppResult<MediaKey> {
    let media_type: MediaType = media_type.parse()?;
    let media_id: i64 = media_id.parse().map_err(|_| {
        crate::error::AppError::InvalidInput(format!("Invalid media id: {}", media_id))
    })?;
    let key = MediaKey::new(media_id, media_type);
    key.validate()?;
    Ok(key)
}

/// Creates the application router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes(&state))
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Wraps `route` in the rate limit of `class`
fn limited(
    state: &Arc<AppState>,
    class: EndpointClass,
    route: MethodRouter<Arc<AppState>>,
) -> MethodRouter<Arc<AppState>> {
    route.route_layer(middleware::from_fn_with_state(
        (state.clone(), class),
        rate_limit,
    ))
}

/// API routes under /api/v1
fn api_routes(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    use EndpointClass::{Auth, Search, Stats, Telemetry, Write};

    Router::new()
        // Accounts
        .route("/auth/signup", limited(state, Auth, post(auth::signup)))
        .route("/auth/login", limited(state, Auth, post(auth::login)))
        .route(
            "/me",
            get(me::profile)
                .patch(me::update_profile)
                .delete(me::delete_account),
        )
        .route(
            "/invitations",
            limited(state, Write, post(auth::create_invitation)),
        )
        .route("/invitations/:token", get(auth::invitation_status))
        // Catalog
        .route("/search", limited(state, Search, get(media::search)))
        .route("/media/:media_type/:media_id", limited(state, Search, get(media::details)))
        // Watchlist
        .route("/watchlist", get(watchlist::list))
        .route("/watchlist/status", limited(state, Write, post(watchlist::set_status)))
        .route("/watchlist/batch", limited(state, Search, post(watchlist::batch_lookup)))
        .route(
            "/watchlist/:media_type/:media_id",
            limited(state, Write, axum::routing::delete(watchlist::remove)).get(watchlist::get_status),
        )
        .route(
            "/watchlist/:media_type/:media_id/rating",
            limited(state, Write, put(watchlist::set_rating)),
        )
        .route(
            "/watchlist/:media_type/:media_id/tags",
            limited(state, Write, put(watchlist::set_tags)),
        )
        // Blacklist and tags
        .route(
            "/blacklist",
            limited(state, Write, post(blacklist::add)).get(blacklist::list),
        )
        .route(
            "/blacklist/:media_type/:media_id",
            limited(state, Write, axum::routing::delete(blacklist::remove)),
        )
        .route("/tags", limited(state, Write, post(tags::create)).get(tags::list))
        .route("/tags/:tag_id", limited(state, Write, axum::routing::delete(tags::delete)))
        // Statistics
        .route("/stats/profile", limited(state, Stats, get(stats::profile)))
        .route("/stats/genres", limited(state, Stats, get(stats::genres)))
        .route("/stats/actors", limited(state, Stats, get(stats::actors)))
        .route("/stats/collections", limited(state, Stats, get(stats::collections)))
        .route("/stats/ratings", limited(state, Stats, get(stats::ratings)))
        // Recommendation telemetry
        .route(
            "/recommendations/events",
            limited(state, Telemetry, post(recommendations::record_events)),
        )
        .route(
            "/recommendations/signals",
            limited(state, Telemetry, post(recommendations::record_signals)),
        )
        .route(
            "/recommendations/filter-sessions",
            limited(state, Telemetry, post(recommendations::record_filter_session)),
        )
        .route(
            "/recommendations/predictions",
            limited(state, Telemetry, post(recommendations::record_predictions)),
        )
        .route(
            "/recommendations/actions",
            limited(state, Telemetry, post(recommendations::record_action)),
        )
}

/// Health check endpoint
async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}
