use reqwest::StatusCode;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{AppError, AppResult};

/// Backoff settings for upstream calls
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Fewer, shorter retries for calls made while a user waits
    pub fn interactive() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    /// Delay before retry number `attempt + 1`
    fn delay_for(&self, attempt: u32) -> Duration {
        let exponential =
            self.base_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        let mut delay = Duration::from_millis(exponential as u64).min(self.max_delay);

        if self.jitter {
            // up to 10% extra so concurrent callers spread out
            let jitter_ms = (delay.as_millis() as f64 * 0.1 * rand::random::<f64>()) as u64;
            delay += Duration::from_millis(jitter_ms);
        }

        delay
    }
}

/// Errors worth another attempt: transport failures, timeouts and upstream 429/5xx
fn is_retryable(error: &AppError) -> bool {
    match error {
        AppError::HttpClient(e) => e.is_connect() || e.is_request() || e.is_timeout(),
        AppError::Timeout(_) | AppError::ExternalApi(_) => true,
        _ => false,
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// `config.max_retries` retries have been spent. Returns the last error then.
pub async fn with_retry<F, Fut, T>(
    operation: F,
    config: &RetryConfig,
    operation_name: &str,
) -> AppResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::debug!(
                        operation = operation_name,
                        attempts = attempt + 1,
                        "Succeeded after retrying"
                    );
                }
                return Ok(result);
            }
            Err(error) if attempt < config.max_retries && is_retryable(&error) => {
                let delay = config.delay_for(attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    error = %error,
                    delay_ms = delay.as_millis() as u64,
                    "Upstream call failed, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(error) => {
                if attempt > 0 {
                    tracing::warn!(
                        operation = operation_name,
                        attempts = attempt + 1,
                        error = %error,
                        "Giving up on upstream call"
                    );
                }
                return Err(error);
            }
        }
    }
}

/// HTTP flavor of `with_retry`: 429, 408 and 5xx responses are retried like
/// transport errors. Any other response, including 4xx, is handed back to the
/// caller untouched.
pub async fn fetch_with_retry<F, Fut>(
    request_fn: F,
    config: &RetryConfig,
    operation_name: &str,
) -> AppResult<reqwest::Response>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    let request_fn = &request_fn;
    with_retry(
        move || async move {
            match request_fn().await {
                Ok(response) if is_retryable_status(response.status()) => Err(
                    AppError::ExternalApi(format!("{} returned {}", operation_name, response.status())),
                ),
                Ok(response) => Ok(response),
                Err(e) if e.is_timeout() => Err(AppError::Timeout(operation_name.to_string())),
                Err(e) => Err(AppError::HttpClient(e)),
            }
        },
        config,
        operation_name,
    )
    .await
}
