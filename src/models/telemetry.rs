use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{MediaKey, MediaSnapshot, WatchStatus};
use crate::error::{AppError, AppResult};

/// Largest accepted serialized payload per telemetry row
pub const MAX_PAYLOAD_BYTES: usize = 16 * 1024;
const MAX_KIND_LENGTH: usize = 64;

/// User interaction with a recommended title (impression, click, dismiss, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationEvent {
    pub event_type: String,
    #[serde(flatten)]
    pub key: Option<MediaKey>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub position: Option<i32>,
    #[serde(default)]
    pub payload: Value,
}

/// Implicit preference signal such as dwell time or trailer views
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentSignal {
    pub signal: String,
    #[serde(flatten)]
    pub key: Option<MediaKey>,
    #[serde(default = "default_strength")]
    pub strength: f32,
    #[serde(default)]
    pub payload: Value,
}

fn default_strength() -> f32 {
    1.0
}

/// One browse session over the filter UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSession {
    pub filters: Value,
    #[serde(default)]
    pub result_count: i32,
    #[serde(default)]
    pub duration_ms: i64,
}

/// Score emitted by an external recommender for a title
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionLog {
    #[serde(flatten)]
    pub key: MediaKey,
    pub predicted_score: f32,
    pub model_version: String,
    #[serde(default)]
    pub features: Value,
}

/// Event that may also change the watchlist, written in one transaction
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationAction {
    pub event: RecommendationEvent,
    #[serde(default)]
    pub status: Option<WatchStatus>,
    #[serde(default)]
    pub snapshot: MediaSnapshot,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recorded {
    pub recorded: u64,
}

fn validate_kind(field: &str, value: &str) -> AppResult<()> {
    let value = value.trim();
    if value.is_empty() || value.len() > MAX_KIND_LENGTH {
        return Err(AppError::InvalidInput(format!(
            "{} must be 1-{} characters",
            field, MAX_KIND_LENGTH
        )));
    }
    Ok(())
}

fn validate_payload(field: &str, value: &Value) -> AppResult<()> {
    let size = serde_json::to_vec(value)
        .map_err(|e| AppError::InvalidInput(format!("Invalid {}: {}", field, e)))?
        .len();
    if size > MAX_PAYLOAD_BYTES {
        return Err(AppError::InvalidInput(format!(
            "{} exceeds {} bytes",
            field, MAX_PAYLOAD_BYTES
        )));
    }
    Ok(())
}

impl RecommendationEvent {
    pub fn validate(&self) -> AppResult<()> {
        validate_kind("eventType", &self.event_type)?;
        if let Some(key) = &self.key {
            key.validate()?;
        }
        validate_payload("payload", &self.payload)
    }
}

impl IntentSignal {
    pub fn validate(&self) -> AppResult<()> {
        validate_kind("signal", &self.signal)?;
        if let Some(key) = &self.key {
            key.validate()?;
        }
        if !self.strength.is_finite() {
            return Err(AppError::InvalidInput("strength must be finite".to_string()));
        }
        validate_payload("payload", &self.payload)
    }
}

impl FilterSession {
    pub fn validate(&self) -> AppResult<()> {
        if self.result_count < 0 || self.duration_ms < 0 {
            return Err(AppError::InvalidInput(
                "resultCount and durationMs cannot be negative".to_string(),
            ));
        }
        validate_payload("filters", &self.filters)
    }
}

impl PredictionLog {
    pub fn validate(&self) -> AppResult<()> {
        self.key.validate()?;
        validate_kind("modelVersion", &self.model_version)?;
        if !self.predicted_score.is_finite() {
            return Err(AppError::InvalidInput(
                "predictedScore must be finite".to_string(),
            ));
        }
        validate_payload("features", &self.features)
    }
}

impl RecommendationAction {
    pub fn validate(&self) -> AppResult<()> {
        self.event.validate()?;
        if self.status.is_some() && self.event.key.is_none() {
            return Err(AppError::InvalidInput(
                "A status change requires mediaId and mediaType".to_string(),
            ));
        }
        super::validate_rating(self.snapshot.user_rating)
    }
}
