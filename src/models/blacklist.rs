use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{MediaKey, MediaType};

/// Per-user hidden-title marker
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlacklistEntry {
    pub user_id: Uuid,
    pub media_id: i64,
    pub media_type: MediaType,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

impl BlacklistEntry {
    pub fn key(&self) -> MediaKey {
        MediaKey::new(self.media_id, self.media_type)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddBlacklistRequest {
    #[serde(flatten)]
    pub key: MediaKey,
    #[serde(default)]
    pub title: String,
}
