use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub const MAX_TAG_LENGTH: usize = 40;

/// User-scoped label with a usage counter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub usage_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTagRequest {
    pub name: String,
}

/// Trims and length-checks a tag name
pub fn normalize_tag_name(name: &str) -> AppResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidInput("Tag name cannot be empty".to_string()));
    }
    if trimmed.chars().count() > MAX_TAG_LENGTH {
        return Err(AppError::InvalidInput(format!(
            "Tag name cannot exceed {} characters",
            MAX_TAG_LENGTH
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_trims() {
        assert_eq!(normalize_tag_name("  noir ").unwrap(), "noir");
    }

    #[test]
    fn test_normalize_rejects_empty_and_long() {
        assert!(normalize_tag_name("   ").is_err());
        assert!(normalize_tag_name(&"x".repeat(MAX_TAG_LENGTH + 1)).is_err());
        assert!(normalize_tag_name(&"x".repeat(MAX_TAG_LENGTH)).is_ok());
    }
}
