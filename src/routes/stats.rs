use axum::{extract::State, Extension, Json};
use std::sync::Arc;

use crate::{
    error::AppResult,
    middleware::{AuthUser, RequestId},
    models::{ActorQuery, ActorStat, CollectionProgress, GenreStat, ProfileStats, WeightedRatings},
    routes::{extract::AppQuery, AppState},
};

/// Handler for the profile summary
pub async fn profile(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    user: AuthUser,
) -> AppResult<Json<ProfileStats>> {
    tracing::info!(request_id = %request_id, user_id = %user.id(), "Computing profile stats");

    let stats = state.stats.profile_stats(user.id()).await?;
    Ok(Json(stats))
}

pub async fn genres(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> AppResult<Json<Vec<GenreStat>>> {
    Ok(Json(state.stats.genre_breakdown(user.id()).await?))
}

pub async fn actors(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppQuery(query): AppQuery<ActorQuery>,
) -> AppResult<Json<Vec<ActorStat>>> {
    Ok(Json(state.stats.favorite_actors(user.id(), query.limit).await?))
}

pub async fn collections(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> AppResult<Json<Vec<CollectionProgress>>> {
    Ok(Json(state.stats.collection_progress(user.id()).await?))
}

pub async fn ratings(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> AppResult<Json<WeightedRatings>> {
    Ok(Json(state.stats.weighted_ratings(user.id()).await?))
}
