use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::PgStore;
use crate::{
    db::repository::UserRepository,
    error::{AppError, AppResult},
    models::{Invitation, NewUser, ProfileUpdate, User},
};

const USER_COLUMNS: &str =
    "id, email, password_hash, display_name, birth_date, created_at, updated_at";

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    password_hash: String,
    display_name: String,
    birth_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            display_name: row.display_name,
            birth_date: row.birth_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct InvitationRow {
    token: String,
    email: String,
    created_by: Option<Uuid>,
    expires_at: DateTime<Utc>,
    used_at: Option<DateTime<Utc>>,
}

impl From<InvitationRow> for Invitation {
    fn from(row: InvitationRow) -> Self {
        Invitation {
            token: row.token,
            email: row.email,
            created_by: row.created_by,
            expires_at: row.expires_at,
            used_at: row.used_at,
        }
    }
}

#[async_trait::async_trait]
impl UserRepository for PgStore {
    async fn find_by_id(&self, user_id: Uuid) -> AppResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = lower($1)");
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(email.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn create_with_invitation(
        &self,
        user: &NewUser,
        invitation_token: &str,
    ) -> AppResult<User> {
        let mut tx = self.pool.begin().await?;

        // Row lock so two signups cannot consume the same invitation
        let invitation: Option<InvitationRow> = sqlx::query_as(
            r#"
            SELECT token, email, created_by, expires_at, used_at
            FROM invitations WHERE token = $1
            FOR UPDATE
            "#,
        )
        .bind(invitation_token)
        .fetch_optional(&mut *tx)
        .await?;

        let invitation: Invitation = invitation
            .map(Invitation::from)
            .ok_or_else(|| AppError::InvalidInput("Invalid invitation".to_string()))?;

        if !invitation.is_usable(Utc::now())
            || !invitation.email.eq_ignore_ascii_case(user.email.trim())
        {
            return Err(AppError::InvalidInput(
                "Invitation is expired, used, or issued for another email".to_string(),
            ));
        }

        let sql = format!(
            r#"
            INSERT INTO users (id, email, password_hash, display_name, birth_date)
            VALUES ($1, lower($2), $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        );
        let inserted: Result<UserRow, sqlx::Error> = sqlx::query_as(&sql)
            .bind(Uuid::new_v4())
            .bind(user.email.trim())
            .bind(&user.password_hash)
            .bind(&user.display_name)
            .bind(user.birth_date)
            .fetch_one(&mut *tx)
            .await;

        let row = match inserted.map_err(AppError::from) {
            Ok(row) => row,
            Err(e) if e.is_unique_violation() => {
                return Err(AppError::Conflict("Email is already registered".to_string()))
            }
            Err(e) => return Err(e),
        };

        sqlx::query("UPDATE invitations SET used_at = now() WHERE token = $1")
            .bind(invitation_token)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(row.into())
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        update: &ProfileUpdate,
    ) -> AppResult<Option<User>> {
        let sql = format!(
            r#"
            UPDATE users SET
                display_name = COALESCE($2, display_name),
                birth_date = CASE WHEN $3::boolean THEN $4::date ELSE birth_date END,
                updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(user_id)
            .bind(update.display_name.as_deref().map(str::trim))
            .bind(update.birth_date.is_some())
            .bind(update.birth_date.flatten())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(User::from))
    }

    async fn delete(&self, user_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            tracing::info!(user_id = %user_id, "User deleted with all owned rows");
        }

        Ok(result.rows_affected() > 0)
    }

    async fn create_invitation(
        &self,
        email: &str,
        created_by: Option<Uuid>,
        expires_at: DateTime<Utc>,
    ) -> AppResult<Invitation> {
        let token = Uuid::new_v4().simple().to_string();
        let row: InvitationRow = sqlx::query_as(
            r#"
            INSERT INTO invitations (token, email, created_by, expires_at)
            VALUES ($1, lower($2), $3, $4)
            RETURNING token, email, created_by, expires_at, used_at
            "#,
        )
        .bind(&token)
        .bind(email.trim())
        .bind(created_by)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn find_invitation(&self, token: &str) -> AppResult<Option<Invitation>> {
        let row: Option<InvitationRow> = sqlx::query_as(
            "SELECT token, email, created_by, expires_at, used_at FROM invitations WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Invitation::from))
    }
}
