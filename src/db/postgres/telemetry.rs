use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::{watchlist::upsert_status_in, PgStore};
use crate::{
    db::repository::TelemetryRepository,
    error::AppResult,
    models::{
        FilterSession, IntentSignal, PredictionLog, RecommendationEvent, StatusUpsert,
        WatchListItem,
    },
};

const TELEMETRY_TABLES: [&str; 4] = [
    "recommendation_events",
    "intent_signals",
    "filter_sessions",
    "prediction_logs",
];

fn events_insert(user_id: Uuid, events: &[RecommendationEvent]) -> QueryBuilder<'_, Postgres> {
    let mut builder = QueryBuilder::new(
        "INSERT INTO recommendation_events \
         (user_id, event_type, media_id, media_type, source, position, payload) ",
    );
    builder.push_values(events, |mut row, event| {
        row.push_bind(user_id)
            .push_bind(event.event_type.trim())
            .push_bind(event.key.map(|k| k.media_id))
            .push_bind(event.key.map(|k| k.media_type.as_str()))
            .push_bind(event.source.as_deref())
            .push_bind(event.position)
            .push_bind(&event.payload);
    });
    builder
}

#[async_trait::async_trait]
impl TelemetryRepository for PgStore {
    async fn record_events(
        &self,
        user_id: Uuid,
        events: &[RecommendationEvent],
    ) -> AppResult<u64> {
        if events.is_empty() {
            return Ok(0);
        }

        let result = events_insert(user_id, events)
            .build()
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn record_signals(&self, user_id: Uuid, signals: &[IntentSignal]) -> AppResult<u64> {
        if signals.is_empty() {
            return Ok(0);
        }

        let mut builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO intent_signals (user_id, signal, media_id, media_type, strength, payload) ",
        );
        builder.push_values(signals, |mut row, signal| {
            row.push_bind(user_id)
                .push_bind(signal.signal.trim())
                .push_bind(signal.key.map(|k| k.media_id))
                .push_bind(signal.key.map(|k| k.media_type.as_str()))
                .push_bind(signal.strength)
                .push_bind(&signal.payload);
        });

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn record_filter_session(
        &self,
        user_id: Uuid,
        session: &FilterSession,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO filter_sessions (user_id, filters, result_count, duration_ms)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user_id)
        .bind(&session.filters)
        .bind(session.result_count)
        .bind(session.duration_ms)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_predictions(
        &self,
        user_id: Uuid,
        predictions: &[PredictionLog],
    ) -> AppResult<u64> {
        if predictions.is_empty() {
            return Ok(0);
        }

        let mut builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO prediction_logs \
             (user_id, media_id, media_type, predicted_score, model_version, features) ",
        );
        builder.push_values(predictions, |mut row, prediction| {
            row.push_bind(user_id)
                .push_bind(prediction.key.media_id)
                .push_bind(prediction.key.media_type.as_str())
                .push_bind(prediction.predicted_score)
                .push_bind(prediction.model_version.trim())
                .push_bind(&prediction.features);
        });

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn record_action(
        &self,
        user_id: Uuid,
        event: &RecommendationEvent,
        upsert: Option<&StatusUpsert>,
    ) -> AppResult<Option<WatchListItem>> {
        let mut tx = self.pool.begin().await?;

        events_insert(user_id, std::slice::from_ref(event))
            .build()
            .execute(&mut *tx)
            .await?;

        let item = match upsert {
            Some(upsert) => Some(upsert_status_in(&mut tx, user_id, upsert).await?),
            None => None,
        };

        tx.commit().await?;
        Ok(item)
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let mut removed = 0;
        for table in TELEMETRY_TABLES {
            let sql = format!("DELETE FROM {table} WHERE created_at < $1");
            let result = sqlx::query(&sql).bind(cutoff).execute(&self.pool).await?;
            tracing::info!(table, rows = result.rows_affected(), "Purged telemetry rows");
            removed += result.rows_affected();
        }
        Ok(removed)
    }
}
