use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use std::collections::HashMap;
use uuid::Uuid;

use super::{key_arrays, parse_media_type, parse_status, PgStore};
use crate::{
    db::repository::WatchlistRepository,
    error::AppResult,
    models::{
        CommunityRating, MediaKey, StatusUpsert, TagSummary, WatchListItem, WatchlistFilter,
    },
};

const ITEM_COLUMNS: &str = "id, user_id, media_id, media_type, title, poster_path, vote_average, \
     status, user_rating, weighted_rating, added_at, updated_at";

#[derive(Debug, FromRow)]
struct ItemRow {
    id: Uuid,
    user_id: Uuid,
    media_id: i64,
    media_type: String,
    title: String,
    poster_path: Option<String>,
    vote_average: Option<f32>,
    status: String,
    user_rating: Option<f32>,
    weighted_rating: Option<f32>,
    added_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ItemRow {
    fn into_item(self, tags: Vec<TagSummary>) -> Result<WatchListItem, sqlx::Error> {
        Ok(WatchListItem {
            id: self.id,
            user_id: self.user_id,
            media_id: self.media_id,
            media_type: parse_media_type(&self.media_type)?,
            title: self.title,
            poster_path: self.poster_path,
            vote_average: self.vote_average,
            status: parse_status(&self.status)?,
            user_rating: self.user_rating,
            weighted_rating: self.weighted_rating,
            tags,
            added_at: self.added_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ItemTagRow {
    item_id: Uuid,
    id: Uuid,
    name: String,
}

#[derive(Debug, FromRow)]
struct CommunityRow {
    media_id: i64,
    media_type: String,
    average: f64,
    count: i64,
}

/// Loads tags for `rows` and converts them into domain items
async fn attach_tags(
    conn: &mut PgConnection,
    rows: Vec<ItemRow>,
) -> AppResult<Vec<WatchListItem>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let tag_rows: Vec<ItemTagRow> = sqlx::query_as(
        r#"
        SELECT it.item_id, t.id, t.name
        FROM watchlist_item_tags it
        JOIN tags t ON t.id = it.tag_id
        WHERE it.item_id = ANY($1)
        ORDER BY lower(t.name)
        "#,
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut by_item: HashMap<Uuid, Vec<TagSummary>> = HashMap::new();
    for row in tag_rows {
        by_item.entry(row.item_id).or_default().push(TagSummary {
            id: row.id,
            name: row.name,
        });
    }

    let items = rows
        .into_iter()
        .map(|row| {
            let tags = by_item.remove(&row.id).unwrap_or_default();
            row.into_item(tags)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(items)
}

/// Single-statement upsert; the unique key resolves concurrent writers
pub(super) async fn upsert_status_in(
    conn: &mut PgConnection,
    user_id: Uuid,
    upsert: &StatusUpsert,
) -> AppResult<WatchListItem> {
    let sql = format!(
        r#"
        INSERT INTO watchlist_items
            (id, user_id, media_id, media_type, title, poster_path, vote_average, status, user_rating)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (user_id, media_id, media_type) DO UPDATE SET
            status = EXCLUDED.status,
            title = CASE WHEN EXCLUDED.title <> '' THEN EXCLUDED.title ELSE watchlist_items.title END,
            poster_path = COALESCE(EXCLUDED.poster_path, watchlist_items.poster_path),
            vote_average = COALESCE(EXCLUDED.vote_average, watchlist_items.vote_average),
            user_rating = COALESCE(EXCLUDED.user_rating, watchlist_items.user_rating),
            weighted_rating = CASE WHEN EXCLUDED.user_rating IS NULL
                THEN watchlist_items.weighted_rating END,
            updated_at = now()
        RETURNING {ITEM_COLUMNS}
        "#
    );

    let row: ItemRow = sqlx::query_as(&sql)
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(upsert.key.media_id)
        .bind(upsert.key.media_type.as_str())
        .bind(upsert.snapshot.title.trim())
        .bind(&upsert.snapshot.poster_path)
        .bind(upsert.snapshot.vote_average)
        .bind(upsert.status.as_str())
        .bind(upsert.snapshot.user_rating)
        .fetch_one(&mut *conn)
        .await?;

    let mut items = attach_tags(conn, vec![row]).await?;
    Ok(items.remove(0))
}

/// Keeps `tags.usage_count` equal to the number of attached items
async fn recount_tags(conn: &mut PgConnection, tag_ids: &[Uuid]) -> AppResult<()> {
    if tag_ids.is_empty() {
        return Ok(());
    }

    sqlx::query(
        r#"
        UPDATE tags
        SET usage_count = (SELECT COUNT(*) FROM watchlist_item_tags it WHERE it.tag_id = tags.id)
        WHERE id = ANY($1)
        "#,
    )
    .bind(tag_ids)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn find_item_row(
    conn: &mut PgConnection,
    user_id: Uuid,
    key: &MediaKey,
) -> AppResult<Option<ItemRow>> {
    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM watchlist_items \
         WHERE user_id = $1 AND media_id = $2 AND media_type = $3"
    );
    let row = sqlx::query_as(&sql)
        .bind(user_id)
        .bind(key.media_id)
        .bind(key.media_type.as_str())
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

#[async_trait::async_trait]
impl WatchlistRepository for PgStore {
    async fn find_item(&self, user_id: Uuid, key: &MediaKey) -> AppResult<Option<WatchListItem>> {
        let mut conn = self.pool.acquire().await?;
        match find_item_row(&mut conn, user_id, key).await? {
            Some(row) => Ok(attach_tags(&mut conn, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn find_items(&self, user_id: Uuid, keys: &[MediaKey]) -> AppResult<Vec<WatchListItem>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let (ids, types) = key_arrays(keys);
        let sql = format!(
            r#"
            SELECT {ITEM_COLUMNS} FROM watchlist_items
            WHERE user_id = $1
              AND (media_id, media_type) IN (SELECT * FROM UNNEST($2::bigint[], $3::text[]))
            "#
        );

        let mut conn = self.pool.acquire().await?;
        let rows: Vec<ItemRow> = sqlx::query_as(&sql)
            .bind(user_id)
            .bind(&ids)
            .bind(&types)
            .fetch_all(&mut *conn)
            .await?;

        attach_tags(&mut conn, rows).await
    }

    async fn upsert_status(
        &self,
        user_id: Uuid,
        upsert: &StatusUpsert,
    ) -> AppResult<WatchListItem> {
        let mut conn = self.pool.acquire().await?;
        let item = upsert_status_in(&mut conn, user_id, upsert).await?;

        tracing::debug!(
            user_id = %user_id,
            media = %upsert.key,
            status = %upsert.status,
            "Watchlist status upserted"
        );

        Ok(item)
    }

    async fn delete_item(&self, user_id: Uuid, key: &MediaKey) -> AppResult<bool> {
        let mut tx = self.pool.begin().await?;

        let tag_ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT it.tag_id FROM watchlist_item_tags it
            JOIN watchlist_items w ON w.id = it.item_id
            WHERE w.user_id = $1 AND w.media_id = $2 AND w.media_type = $3
            "#,
        )
        .bind(user_id)
        .bind(key.media_id)
        .bind(key.media_type.as_str())
        .fetch_all(&mut *tx)
        .await?;

        let result = sqlx::query(
            "DELETE FROM watchlist_items WHERE user_id = $1 AND media_id = $2 AND media_type = $3",
        )
        .bind(user_id)
        .bind(key.media_id)
        .bind(key.media_type.as_str())
        .execute(&mut *tx)
        .await?;

        recount_tags(&mut tx, &tag_ids).await?;
        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_rating(
        &self,
        user_id: Uuid,
        key: &MediaKey,
        rating: Option<f32>,
    ) -> AppResult<Option<WatchListItem>> {
        let sql = format!(
            r#"
            UPDATE watchlist_items SET user_rating = $4, weighted_rating = NULL, updated_at = now()
            WHERE user_id = $1 AND media_id = $2 AND media_type = $3
            RETURNING {ITEM_COLUMNS}
            "#
        );

        let mut conn = self.pool.acquire().await?;
        let row: Option<ItemRow> = sqlx::query_as(&sql)
            .bind(user_id)
            .bind(key.media_id)
            .bind(key.media_type.as_str())
            .bind(rating)
            .fetch_optional(&mut *conn)
            .await?;

        match row {
            Some(row) => Ok(attach_tags(&mut conn, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn set_tags(
        &self,
        user_id: Uuid,
        key: &MediaKey,
        tag_ids: &[Uuid],
    ) -> AppResult<Option<WatchListItem>> {
        let mut tx = self.pool.begin().await?;

        let Some(row) = find_item_row(&mut tx, user_id, key).await? else {
            return Ok(None);
        };

        let previous: Vec<Uuid> =
            sqlx::query_scalar("DELETE FROM watchlist_item_tags WHERE item_id = $1 RETURNING tag_id")
                .bind(row.id)
                .fetch_all(&mut *tx)
                .await?;

        // Only the caller's own tags can be attached
        sqlx::query(
            r#"
            INSERT INTO watchlist_item_tags (item_id, tag_id)
            SELECT $1, id FROM tags WHERE user_id = $2 AND id = ANY($3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(row.id)
        .bind(user_id)
        .bind(tag_ids)
        .execute(&mut *tx)
        .await?;

        let mut affected = previous;
        affected.extend_from_slice(tag_ids);
        affected.sort();
        affected.dedup();
        recount_tags(&mut tx, &affected).await?;

        let item = attach_tags(&mut tx, vec![row]).await?.pop();
        tx.commit().await?;

        Ok(item)
    }

    async fn list_items(
        &self,
        user_id: Uuid,
        filter: &WatchlistFilter,
    ) -> AppResult<Vec<WatchListItem>> {
        let sql = format!(
            r#"
            SELECT {ITEM_COLUMNS} FROM watchlist_items w
            WHERE w.user_id = $1
              AND ($2::text IS NULL OR w.status = $2)
              AND ($3::text IS NULL OR w.media_type = $3)
              AND ($4::uuid IS NULL OR EXISTS (
                    SELECT 1 FROM watchlist_item_tags it WHERE it.item_id = w.id AND it.tag_id = $4))
            ORDER BY w.added_at DESC, w.id
            "#
        );

        let mut conn = self.pool.acquire().await?;
        let rows: Vec<ItemRow> = sqlx::query_as(&sql)
            .bind(user_id)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.media_type.map(|t| t.as_str()))
            .bind(filter.tag_id)
            .fetch_all(&mut *conn)
            .await?;

        attach_tags(&mut conn, rows).await
    }

    async fn community_ratings(&self, keys: &[MediaKey]) -> AppResult<Vec<CommunityRating>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let (ids, types) = key_arrays(keys);
        let rows: Vec<CommunityRow> = sqlx::query_as(
            r#"
            SELECT media_id, media_type,
                   AVG(user_rating)::float8 AS average,
                   COUNT(user_rating) AS count
            FROM watchlist_items
            WHERE user_rating IS NOT NULL
              AND (media_id, media_type) IN (SELECT * FROM UNNEST($1::bigint[], $2::text[]))
            GROUP BY media_id, media_type
            "#,
        )
        .bind(&ids)
        .bind(&types)
        .fetch_all(&self.pool)
        .await?;

        let ratings = rows
            .into_iter()
            .map(|row| {
                Ok(CommunityRating {
                    key: MediaKey::new(row.media_id, parse_media_type(&row.media_type)?),
                    average: row.average,
                    count: row.count,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        Ok(ratings)
    }

    async fn backfill_weighted_ratings(&self, dry_run: bool) -> AppResult<u64> {
        if dry_run {
            let pending: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM watchlist_items \
                 WHERE weighted_rating IS NULL AND user_rating IS NOT NULL",
            )
            .fetch_one(&self.pool)
            .await?;
            return Ok(pending.max(0) as u64);
        }

        let result = sqlx::query(
            "UPDATE watchlist_items SET weighted_rating = user_rating \
             WHERE weighted_rating IS NULL AND user_rating IS NOT NULL",
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
