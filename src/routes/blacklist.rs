use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    middleware::AuthUser,
    models::{AddBlacklistRequest, BlacklistEntry},
    routes::{extract::AppJson, media_key, AppState},
};

const MAX_TITLE_LENGTH: usize = 300;

pub async fn list(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> AppResult<Json<Vec<BlacklistEntry>>> {
    Ok(Json(state.blacklist.list(user.id()).await?))
}

/// Hides a title from search results; adding it twice is a no-op
pub async fn add(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppJson(request): AppJson<AddBlacklistRequest>,
) -> AppResult<(StatusCode, Json<BlacklistEntry>)> {
    request.key.validate()?;
    let title = request.title.trim();
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(AppError::InvalidInput(format!(
            "Title cannot exceed {} characters",
            MAX_TITLE_LENGTH
        )));
    }

    let entry = state.blacklist.add(user.id(), &request.key, title).await?;
    tracing::info!(user_id = %user.id(), media = %request.key, "Title blacklisted");

    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn remove(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((media_type, media_id)): Path<(String, String)>,
) -> AppResult<StatusCode> {
    let key = media_key(&media_type, &media_id)?;
    if !state.blacklist.remove(user.id(), &key).await? {
        return Err(AppError::NotFound(format!("{} is not blacklisted", key)));
    }
    Ok(StatusCode::NO_CONTENT)
}
