use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    db::UserRepository,
    error::{AppError, AppResult},
    models::{
        CreateInvitationRequest, Invitation, InvitationStatus, LoginRequest, NewUser, Profile,
        ProfileUpdate, SessionResponse, SignupRequest, User,
    },
    services::session::SessionKeys,
};

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const DEFAULT_INVITATION_DAYS: i64 = 7;
const MAX_INVITATION_DAYS: i64 = 90;
const MAX_DISPLAY_NAME_LENGTH: usize = 80;

/// Signup, login, profile and invitation flows
#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UserRepository>,
    sessions: SessionKeys,
    bcrypt_cost: u32,
}

impl AccountService {
    pub fn new(users: Arc<dyn UserRepository>, sessions: SessionKeys, bcrypt_cost: u32) -> Self {
        Self {
            users,
            sessions,
            bcrypt_cost,
        }
    }

    pub fn sessions(&self) -> &SessionKeys {
        &self.sessions
    }

    /// Creates an account from an invitation and opens a session for it
    pub async fn signup(&self, request: SignupRequest) -> AppResult<SessionResponse> {
        let email = normalize_email(&request.email)?;
        validate_password(&request.password)?;
        let display_name = normalize_display_name(&request.display_name)?;

        let invitation = self
            .users
            .find_invitation(request.invitation_token.trim())
            .await?
            .filter(|inv| inv.is_usable(Utc::now()) && inv.email.eq_ignore_ascii_case(&email))
            .ok_or_else(|| {
                AppError::InvalidInput(
                    "Invitation is invalid, expired, or issued for another email".to_string(),
                )
            })?;

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict("Email is already registered".to_string()));
        }

        let password_hash = hash_password(request.password, self.bcrypt_cost).await?;
        let user = self
            .users
            .create_with_invitation(
                &NewUser {
                    email,
                    password_hash,
                    display_name,
                    birth_date: request.birth_date,
                },
                &invitation.token,
            )
            .await?;

        tracing::info!(user_id = %user.id, invited_by = ?invitation.created_by, "User signed up");

        self.session_for(&user)
    }

    pub async fn login(&self, request: LoginRequest) -> AppResult<SessionResponse> {
        let rejected = || AppError::Unauthorized("Invalid email or password".to_string());

        let email = request.email.trim().to_lowercase();
        let user = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or_else(rejected)?;

        if !verify_password(request.password, user.password_hash.clone()).await? {
            tracing::info!(user_id = %user.id, "Rejected login with wrong password");
            return Err(rejected());
        }

        self.session_for(&user)
    }

    fn session_for(&self, user: &User) -> AppResult<SessionResponse> {
        let (token, expires_at) = self.sessions.issue(user, Utc::now())?;
        Ok(SessionResponse {
            token,
            expires_at,
            user: Profile::from(user),
        })
    }

    /// Loads the session's user; a deleted account invalidates its tokens
    pub async fn current_user(&self, user_id: Uuid) -> AppResult<User> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Account no longer exists".to_string()))
    }

    pub async fn update_profile(&self, user_id: Uuid, update: ProfileUpdate) -> AppResult<Profile> {
        let update = ProfileUpdate {
            display_name: update
                .display_name
                .as_deref()
                .map(normalize_display_name)
                .transpose()?,
            birth_date: update.birth_date,
        };
        if let Some(Some(birth_date)) = update.birth_date {
            if birth_date > Utc::now().date_naive() {
                return Err(AppError::InvalidInput(
                    "Birth date cannot be in the future".to_string(),
                ));
            }
        }

        let user = self
            .users
            .update_profile(user_id, &update)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        Ok(Profile::from(&user))
    }

    /// Deletes the account and everything it owns
    pub async fn delete_account(&self, user_id: Uuid) -> AppResult<()> {
        if !self.users.delete(user_id).await? {
            return Err(AppError::NotFound("User not found".to_string()));
        }
        tracing::info!(user_id = %user_id, "Account deleted");
        Ok(())
    }

    pub async fn create_invitation(
        &self,
        created_by: Uuid,
        request: CreateInvitationRequest,
    ) -> AppResult<Invitation> {
        issue_invitation(self.users.as_ref(), Some(created_by), request).await
    }

    /// Reports whether a token can still be used to sign up
    pub async fn invitation_status(&self, token: &str) -> AppResult<InvitationStatus> {
        let status = match self.users.find_invitation(token.trim()).await? {
            Some(inv) if inv.is_usable(Utc::now()) => InvitationStatus {
                valid: true,
                email: Some(inv.email),
                expires_at: Some(inv.expires_at),
            },
            _ => InvitationStatus {
                valid: false,
                email: None,
                expires_at: None,
            },
        };
        Ok(status)
    }
}

/// Issues an invitation for `request.email`. Operators bootstrapping an empty
/// deployment pass no creator.
pub async fn issue_invitation(
    users: &dyn UserRepository,
    created_by: Option<Uuid>,
    request: CreateInvitationRequest,
) -> AppResult<Invitation> {
    let email = normalize_email(&request.email)?;
    let days = request.expires_in_days.unwrap_or(DEFAULT_INVITATION_DAYS);
    if !(1..=MAX_INVITATION_DAYS).contains(&days) {
        return Err(AppError::InvalidInput(format!(
            "expiresInDays must be between 1 and {}",
            MAX_INVITATION_DAYS
        )));
    }

    if users.find_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict("Email is already registered".to_string()));
    }

    let invitation = users
        .create_invitation(&email, created_by, Utc::now() + Duration::days(days))
        .await?;

    tracing::info!(created_by = ?created_by, expires_at = %invitation.expires_at, "Invitation created");

    Ok(invitation)
}

fn normalize_email(email: &str) -> AppResult<String> {
    let email = email.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.contains('@'),
        None => false,
    };
    if !valid || email.len() > 254 {
        return Err(AppError::InvalidInput("Invalid email address".to_string()));
    }
    Ok(email)
}

fn validate_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::InvalidInput(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

fn normalize_display_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_DISPLAY_NAME_LENGTH {
        return Err(AppError::InvalidInput(format!(
            "Display name must be 1-{} characters",
            MAX_DISPLAY_NAME_LENGTH
        )));
    }
    Ok(name.to_string())
}

/// bcrypt is CPU bound, so it runs on the blocking pool
async fn hash_password(password: String, cost: u32) -> AppResult<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

async fn verify_password(password: String, hash: String) -> AppResult<bool> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))
}
