use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::{
    db::TelemetryRepository,
    error::{AppError, AppResult},
    models::{
        FilterSession, IntentSignal, PredictionLog, RecommendationAction, RecommendationEvent,
        Recorded, StatusUpsert, TrackingState,
    },
};

/// Rows accepted per ingestion request
pub const MAX_BATCH_ROWS: usize = 100;

fn check_batch<T>(rows: &[T], validate: impl Fn(&T) -> AppResult<()>) -> AppResult<()> {
    if rows.is_empty() || rows.len() > MAX_BATCH_ROWS {
        return Err(AppError::InvalidInput(format!(
            "Send between 1 and {} rows per request",
            MAX_BATCH_ROWS
        )));
    }
    rows.iter().try_for_each(validate)
}

pub async fn record_events(
    telemetry: &dyn TelemetryRepository,
    user_id: Uuid,
    events: Vec<RecommendationEvent>,
) -> AppResult<Recorded> {
    check_batch(&events, RecommendationEvent::validate)?;
    let recorded = telemetry.record_events(user_id, &events).await?;
    tracing::debug!(user_id = %user_id, recorded, "Recorded recommendation events");
    Ok(Recorded { recorded })
}

pub async fn record_signals(
    telemetry: &dyn TelemetryRepository,
    user_id: Uuid,
    signals: Vec<IntentSignal>,
) -> AppResult<Recorded> {
    check_batch(&signals, IntentSignal::validate)?;
    let recorded = telemetry.record_signals(user_id, &signals).await?;
    tracing::debug!(user_id = %user_id, recorded, "Recorded intent signals");
    Ok(Recorded { recorded })
}

pub async fn record_filter_session(
    telemetry: &dyn TelemetryRepository,
    user_id: Uuid,
    session: FilterSession,
) -> AppResult<Recorded> {
    session.validate()?;
    telemetry.record_filter_session(user_id, &session).await?;
    Ok(Recorded { recorded: 1 })
}

pub async fn record_predictions(
    telemetry: &dyn TelemetryRepository,
    user_id: Uuid,
    predictions: Vec<PredictionLog>,
) -> AppResult<Recorded> {
    check_batch(&predictions, PredictionLog::validate)?;
    let recorded = telemetry.record_predictions(user_id, &predictions).await?;
    tracing::debug!(user_id = %user_id, recorded, "Recorded prediction logs");
    Ok(Recorded { recorded })
}

/// Records the event and, when it carries a status, the watchlist change with it
pub async fn record_action(
    telemetry: &dyn TelemetryRepository,
    user_id: Uuid,
    action: RecommendationAction,
) -> AppResult<TrackingState> {
    action.validate()?;

    let upsert = match (action.status, action.event.key) {
        (Some(status), Some(key)) => Some(StatusUpsert {
            key,
            status,
            snapshot: action.snapshot,
        }),
        _ => None,
    };

    let item = telemetry
        .record_action(user_id, &action.event, upsert.as_ref())
        .await?;

    tracing::info!(
        user_id = %user_id,
        event_type = %action.event.event_type,
        status_changed = item.is_some(),
        "Recorded recommendation action"
    );

    Ok(TrackingState::from(item))
}

/// Deletes telemetry older than `retention_days`; returns rows removed
pub async fn purge_telemetry(
    telemetry: &dyn TelemetryRepository,
    retention_days: i64,
) -> AppResult<u64> {
    if retention_days < 1 {
        return Err(AppError::InvalidInput(
            "Retention must be at least one day".to_string(),
        ));
    }
    let cutoff = Utc::now() - Duration::days(retention_days);
    let removed = telemetry.purge_before(cutoff).await?;
    tracing::info!(removed, cutoff = %cutoff, "Purged telemetry");
    Ok(removed)
}
