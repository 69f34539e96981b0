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
        CreateInvitationRequest, Invitation, InvitationStatus, LoginRequest, SessionResponse,
        SignupRequest,
    },
    routes::{extract::AppJson, AppState},
};

/// Creates an account from an invitation and signs it in
pub async fn signup(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    AppJson(request): AppJson<SignupRequest>,
) -> AppResult<(StatusCode, Json<SessionResponse>)> {
    let session = state.accounts.signup(request).await?;

    tracing::info!(
        request_id = %request_id,
        user_id = %session.user.id,
        "Account created"
    );

    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    AppJson(request): AppJson<LoginRequest>,
) -> AppResult<Json<SessionResponse>> {
    let session = state.accounts.login(request).await?;

    tracing::info!(
        request_id = %request_id,
        user_id = %session.user.id,
        "Signed in"
    );

    Ok(Json(session))
}

pub async fn create_invitation(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppJson(request): AppJson<CreateInvitationRequest>,
) -> AppResult<(StatusCode, Json<Invitation>)> {
    let invitation = state.accounts.create_invitation(user.id(), request).await?;
    Ok((StatusCode::CREATED, Json(invitation)))
}

/// Public check used by the signup form
pub async fn invitation_status(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> AppResult<Json<InvitationStatus>> {
    Ok(Json(state.accounts.invitation_status(&token).await?))
}
