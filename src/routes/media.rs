use axum::{
    extract::{Path, State},
    Extension, Json,
};
use std::sync::Arc;

use crate::{
    error::AppResult,
    middleware::{AuthUser, RequestId},
    models::{AnnotatedSearchPage, MediaView, SearchQuery},
    routes::{extract::AppQuery, media_key, AppState},
    services::search,
};

/// Handler for title search
pub async fn search(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    user: AuthUser,
    AppQuery(query): AppQuery<SearchQuery>,
) -> AppResult<Json<AnnotatedSearchPage>> {
    tracing::info!(
        request_id = %request_id,
        query = %query.q,
        page = ?query.page,
        "Searching titles"
    );

    let page = search::search(
        state.metadata.as_ref(),
        state.watchlist.as_ref(),
        state.blacklist.as_ref(),
        &user.0,
        query,
    )
    .await?;

    Ok(Json(page))
}

pub async fn details(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((media_type, media_id)): Path<(String, String)>,
) -> AppResult<Json<MediaView>> {
    let key = media_key(&media_type, &media_id)?;

    let view = search::media_view(
        state.metadata.as_ref(),
        state.watchlist.as_ref(),
        state.blacklist.as_ref(),
        &user.0,
        key,
    )
    .await?;

    Ok(Json(view))
}
