use axum::{extract::State, http::StatusCode, Extension, Json};
use std::sync::Arc;

use crate::{
    error::AppResult,
    middleware::{AuthUser, RequestId},
    models::{Profile, ProfileUpdate},
    routes::{extract::AppJson, AppState},
};

pub async fn profile(user: AuthUser) -> Json<Profile> {
    Json(Profile::from(&user.0))
}

pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppJson(update): AppJson<ProfileUpdate>,
) -> AppResult<Json<Profile>> {
    Ok(Json(state.accounts.update_profile(user.id(), update).await?))
}

/// Deletes the account and every row it owns
pub async fn delete_account(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    user: AuthUser,
) -> AppResult<StatusCode> {
    state.accounts.delete_account(user.id()).await?;

    tracing::info!(request_id = %request_id, user_id = %user.id(), "Account removed on request");

    Ok(StatusCode::NO_CONTENT)
}
