use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use std::sync::Arc;

use crate::{
    error::AppResult,
    middleware::{AuthUser, RequestId},
    models::{
        BatchLookupEntry, BatchLookupRequest, SetRatingRequest, SetStatusRequest, SetTagsRequest,
        TrackingState, WatchListItem, WatchlistFilter,
    },
    routes::{
        extract::{AppJson, AppQuery},
        media_key, AppState,
    },
    services::watchlist,
};

pub async fn list(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppQuery(filter): AppQuery<WatchlistFilter>,
) -> AppResult<Json<Vec<WatchListItem>>> {
    let items = watchlist::list(state.watchlist.as_ref(), user.id(), &filter).await?;
    Ok(Json(items))
}

/// Sets or clears the status of one title
pub async fn set_status(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    user: AuthUser,
    AppJson(request): AppJson<SetStatusRequest>,
) -> AppResult<Json<TrackingState>> {
    tracing::debug!(
        request_id = %request_id,
        media = %request.key,
        status = ?request.status,
        "Updating watch status"
    );

    let tracking = watchlist::set_status(state.watchlist.as_ref(), user.id(), request).await?;
    Ok(Json(tracking))
}

pub async fn get_status(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((media_type, media_id)): Path<(String, String)>,
) -> AppResult<Json<TrackingState>> {
    let key = media_key(&media_type, &media_id)?;
    let tracking = watchlist::get_status(state.watchlist.as_ref(), user.id(), key).await?;
    Ok(Json(tracking))
}

pub async fn remove(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((media_type, media_id)): Path<(String, String)>,
) -> AppResult<StatusCode> {
    let key = media_key(&media_type, &media_id)?;
    watchlist::remove(state.watchlist.as_ref(), user.id(), key).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_rating(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((media_type, media_id)): Path<(String, String)>,
    AppJson(request): AppJson<SetRatingRequest>,
) -> AppResult<Json<WatchListItem>> {
    let key = media_key(&media_type, &media_id)?;
    let item =
        watchlist::set_rating(state.watchlist.as_ref(), user.id(), key, request.rating).await?;
    Ok(Json(item))
}

pub async fn set_tags(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((media_type, media_id)): Path<(String, String)>,
    AppJson(request): AppJson<SetTagsRequest>,
) -> AppResult<Json<WatchListItem>> {
    let key = media_key(&media_type, &media_id)?;
    let item = watchlist::set_tags(
        state.watchlist.as_ref(),
        state.tags.as_ref(),
        user.id(),
        key,
        request.tag_ids,
    )
    .await?;
    Ok(Json(item))
}

/// Tracking state for a page of titles, in request order
pub async fn batch_lookup(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    user: AuthUser,
    AppJson(request): AppJson<BatchLookupRequest>,
) -> AppResult<Json<Vec<BatchLookupEntry>>> {
    tracing::debug!(
        request_id = %request_id,
        count = request.items.len(),
        "Batch status lookup"
    );

    let entries = watchlist::batch_lookup(
        state.watchlist.as_ref(),
        state.blacklist.as_ref(),
        user.id(),
        &request.items,
    )
    .await?;

    Ok(Json(entries))
}
