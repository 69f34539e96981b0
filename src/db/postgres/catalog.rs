use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::{key_arrays, parse_media_type, PgStore};
use crate::{
    db::repository::{BlacklistRepository, TagRepository},
    error::{AppError, AppResult},
    models::{BlacklistEntry, MediaKey, Tag},
};

#[derive(Debug, FromRow)]
struct BlacklistRow {
    user_id: Uuid,
    media_id: i64,
    media_type: String,
    title: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<BlacklistRow> for BlacklistEntry {
    type Error = sqlx::Error;

    fn try_from(row: BlacklistRow) -> Result<Self, Self::Error> {
        Ok(BlacklistEntry {
            user_id: row.user_id,
            media_id: row.media_id,
            media_type: parse_media_type(&row.media_type)?,
            title: row.title,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct TagRow {
    id: Uuid,
    user_id: Uuid,
    name: String,
    usage_count: i64,
    created_at: DateTime<Utc>,
}

impl From<TagRow> for Tag {
    fn from(row: TagRow) -> Self {
        Tag {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            usage_count: row.usage_count,
            created_at: row.created_at,
        }
    }
}

#[async_trait::async_trait]
impl BlacklistRepository for PgStore {
    async fn add(&self, user_id: Uuid, key: &MediaKey, title: &str) -> AppResult<BlacklistEntry> {
        // DO UPDATE (rather than DO NOTHING) so RETURNING yields the existing row
        let row: BlacklistRow = sqlx::query_as(
            r#"
            INSERT INTO blacklist_entries (user_id, media_id, media_type, title)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, media_id, media_type) DO UPDATE SET
                title = CASE WHEN EXCLUDED.title <> '' THEN EXCLUDED.title
                             ELSE blacklist_entries.title END
            RETURNING user_id, media_id, media_type, title, created_at
            "#,
        )
        .bind(user_id)
        .bind(key.media_id)
        .bind(key.media_type.as_str())
        .bind(title.trim())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_into()?)
    }

    async fn remove(&self, user_id: Uuid, key: &MediaKey) -> AppResult<bool> {
        let result = sqlx::query(
            "DELETE FROM blacklist_entries WHERE user_id = $1 AND media_id = $2 AND media_type = $3",
        )
        .bind(user_id)
        .bind(key.media_id)
        .bind(key.media_type.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, user_id: Uuid) -> AppResult<Vec<BlacklistEntry>> {
        let rows: Vec<BlacklistRow> = sqlx::query_as(
            r#"
            SELECT user_id, media_id, media_type, title, created_at
            FROM blacklist_entries WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let entries = rows
            .into_iter()
            .map(BlacklistEntry::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    async fn blacklisted_among(
        &self,
        user_id: Uuid,
        keys: &[MediaKey],
    ) -> AppResult<Vec<MediaKey>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let (ids, types) = key_arrays(keys);
        let rows: Vec<(i64, String)> = sqlx::query_as(
            r#"
            SELECT media_id, media_type FROM blacklist_entries
            WHERE user_id = $1
              AND (media_id, media_type) IN (SELECT * FROM UNNEST($2::bigint[], $3::text[]))
            "#,
        )
        .bind(user_id)
        .bind(&ids)
        .bind(&types)
        .fetch_all(&self.pool)
        .await?;

        let keys = rows
            .into_iter()
            .map(|(id, media_type)| Ok(MediaKey::new(id, parse_media_type(&media_type)?)))
            .collect::<Result<Vec<_>, sqlx::Error>>()?;
        Ok(keys)
    }
}

#[async_trait::async_trait]
impl TagRepository for PgStore {
    async fn list(&self, user_id: Uuid) -> AppResult<Vec<Tag>> {
        let rows: Vec<TagRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, name, usage_count, created_at
            FROM tags WHERE user_id = $1
            ORDER BY usage_count DESC, lower(name)
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Tag::from).collect())
    }

    async fn create(&self, user_id: Uuid, name: &str) -> AppResult<Tag> {
        let result: Result<TagRow, sqlx::Error> = sqlx::query_as(
            r#"
            INSERT INTO tags (id, user_id, name)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, name, usage_count, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await;

        match result.map_err(AppError::from) {
            Ok(row) => Ok(row.into()),
            Err(e) if e.is_unique_violation() => {
                Err(AppError::Conflict(format!("Tag '{}' already exists", name)))
            }
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, user_id: Uuid, tag_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM tags WHERE id = $1 AND user_id = $2")
            .bind(tag_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_owned(&self, user_id: Uuid, tag_ids: &[Uuid]) -> AppResult<Vec<Tag>> {
        if tag_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<TagRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, name, usage_count, created_at
            FROM tags WHERE user_id = $1 AND id = ANY($2)
            "#,
        )
        .bind(user_id)
        .bind(tag_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Tag::from).collect())
    }
}
