use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::models::{MediaKey, MediaType, WatchStatus};

mod catalog;
mod telemetry;
mod users;
mod watchlist;

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Applies the embedded schema migrations
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}

/// Postgres-backed implementation of every repository trait
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Splits keys into parallel arrays for `UNNEST($1::bigint[], $2::text[])`
fn key_arrays(keys: &[MediaKey]) -> (Vec<i64>, Vec<String>) {
    keys.iter()
        .map(|k| (k.media_id, k.media_type.as_str().to_string()))
        .unzip()
}

fn parse_media_type(value: &str) -> Result<MediaType, sqlx::Error> {
    value
        .parse()
        .map_err(|e: crate::error::AppError| sqlx::Error::Decode(e.to_string().into()))
}

fn parse_status(value: &str) -> Result<WatchStatus, sqlx::Error> {
    value
        .parse()
        .map_err(|e: crate::error::AppError| sqlx::Error::Decode(e.to_string().into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_arrays_preserve_order() {
        let keys = vec![
            MediaKey::new(603, MediaType::Movie),
            MediaKey::new(1399, MediaType::Tv),
        ];
        let (ids, types) = key_arrays(&keys);
        assert_eq!(ids, vec![603, 1399]);
        assert_eq!(types, vec!["movie".to_string(), "tv".to_string()]);
    }

    #[test]
    fn test_parse_status_rejects_unknown_values() {
        assert!(parse_status("watched").is_ok());
        assert!(matches!(parse_status("bogus"), Err(sqlx::Error::Decode(_))));
    }
}
