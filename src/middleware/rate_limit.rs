use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    db::RateLimitStore,
    error::{AppError, AppResult},
    middleware::auth::bearer_token,
    routes::AppState,
    services::SessionKeys,
};

/// Length of the sliding window every class is measured over
pub const WINDOW: Duration = Duration::from_secs(60);

/// How long a request waits on the store before it is let through
pub const STORE_TIMEOUT: Duration = Duration::from_millis(250);

/// Groups of endpoints sharing a request budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    Auth,
    Search,
    Write,
    Stats,
    Telemetry,
}

impl EndpointClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointClass::Auth => "auth",
            EndpointClass::Search => "search",
            EndpointClass::Write => "write",
            EndpointClass::Stats => "stats",
            EndpointClass::Telemetry => "telemetry",
        }
    }

    /// Requests allowed per window
    pub fn limit(&self) -> u64 {
        match self {
            EndpointClass::Auth => 10,
            EndpointClass::Search => 60,
            EndpointClass::Write => 120,
            EndpointClass::Stats => 30,
            EndpointClass::Telemetry => 300,
        }
    }
}

/// Sliding-window limiter that lets traffic through when its store is down
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    window: Duration,
    store_timeout: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self {
            store,
            window: WINDOW,
            store_timeout: STORE_TIMEOUT,
        }
    }

    pub fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    pub fn key(class: EndpointClass, identity: &str) -> String {
        format!("rl:{}:{}", class.as_str(), identity)
    }

    /// Counts one request for `identity` and rejects it past the class limit
    pub async fn check(&self, class: EndpointClass, identity: &str) -> AppResult<()> {
        let key = Self::key(class, identity);
        let now_ms = Utc::now().timestamp_millis();

        let hit = tokio::time::timeout(
            self.store_timeout,
            self.store.record_hit(&key, now_ms, self.window, class.limit()),
        )
        .await
        .unwrap_or_else(|_| Err(AppError::Timeout("rate limit store".to_string())));

        match hit {
            Ok(count) if count > class.limit() => {
                tracing::info!(key = %key, count, limit = class.limit(), "Rate limit exceeded");
                Err(AppError::RateLimited {
                    retry_after_secs: self.window.as_secs(),
                })
            }
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Rate limit store unavailable, allowing request");
                Ok(())
            }
        }
    }
}

/// Who a request is counted against: the session's user id when the bearer
/// token verifies, else the client address from proxy headers
pub fn client_identity(headers: &HeaderMap, sessions: &SessionKeys) -> String {
    if let Some(claims) = bearer_token(headers).and_then(|t| sessions.verify(t, Utc::now()).ok()) {
        return claims.sub.to_string();
    }

    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| header("x-real-ip"))
        .unwrap_or("anonymous")
        .to_string()
}

/// Route layer enforcing one endpoint class
pub async fn rate_limit(
    State((state, class)): State<(Arc<AppState>, EndpointClass)>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = client_identity(request.headers(), state.accounts.sessions());
    state.rate_limiter.check(class, &identity).await?;
    Ok(next.run(request).await)
}
