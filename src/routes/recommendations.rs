use axum::{extract::State, http::StatusCode, Extension, Json};
use std::sync::Arc;

use crate::{
    error::AppResult,
    middleware::{AuthUser, RequestId},
    models::{
        FilterSession, IntentSignal, PredictionLog, RecommendationAction, RecommendationEvent,
        Recorded, TrackingState,
    },
    routes::{extract::AppJson, AppState},
    services::telemetry,
};

pub async fn record_events(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppJson(events): AppJson<Vec<RecommendationEvent>>,
) -> AppResult<(StatusCode, Json<Recorded>)> {
    let recorded = telemetry::record_events(state.telemetry.as_ref(), user.id(), events).await?;
    Ok((StatusCode::ACCEPTED, Json(recorded)))
}

pub async fn record_signals(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppJson(signals): AppJson<Vec<IntentSignal>>,
) -> AppResult<(StatusCode, Json<Recorded>)> {
    let recorded = telemetry::record_signals(state.telemetry.as_ref(), user.id(), signals).await?;
    Ok((StatusCode::ACCEPTED, Json(recorded)))
}

pub async fn record_filter_session(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppJson(session): AppJson<FilterSession>,
) -> AppResult<(StatusCode, Json<Recorded>)> {
    let recorded =
        telemetry::record_filter_session(state.telemetry.as_ref(), user.id(), session).await?;
    Ok((StatusCode::ACCEPTED, Json(recorded)))
}

pub async fn record_predictions(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppJson(predictions): AppJson<Vec<PredictionLog>>,
) -> AppResult<(StatusCode, Json<Recorded>)> {
    let recorded =
        telemetry::record_predictions(state.telemetry.as_ref(), user.id(), predictions).await?;
    Ok((StatusCode::ACCEPTED, Json(recorded)))
}

/// Records an action on a recommendation, applying its watchlist change if any
pub async fn record_action(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    user: AuthUser,
    AppJson(action): AppJson<RecommendationAction>,
) -> AppResult<Json<TrackingState>> {
    tracing::info!(
        request_id = %request_id,
        event_type = %action.event.event_type,
        status = ?action.status,
        "Recording recommendation action"
    );

    let tracking = telemetry::record_action(state.telemetry.as_ref(), user.id(), action).await?;
    Ok(Json(tracking))
}
