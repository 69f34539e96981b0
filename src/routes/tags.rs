use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    middleware::AuthUser,
    models::{normalize_tag_name, CreateTagRequest, Tag},
    routes::{extract::AppJson, AppState},
};

/// The user's tags with usage counts
pub async fn list(State(state): State<Arc<AppState>>, user: AuthUser) -> AppResult<Json<Vec<Tag>>> {
    Ok(Json(state.tags.list(user.id()).await?))
}

/// Creates a tag; a name the user already has is a conflict
pub async fn create(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppJson(request): AppJson<CreateTagRequest>,
) -> AppResult<(StatusCode, Json<Tag>)> {
    let name = normalize_tag_name(&request.name)?;
    let tag = state.tags.create(user.id(), &name).await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

/// Deleting a tag detaches it from every item
pub async fn delete(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(tag_id): Path<String>,
) -> AppResult<StatusCode> {
    let tag_id = Uuid::parse_str(&tag_id)
        .map_err(|_| AppError::InvalidInput(format!("Invalid tag id: {}", tag_id)))?;

    if !state.tags.delete(user.id(), tag_id).await? {
        return Err(AppError::NotFound("Tag not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}
