use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

use crate::error::AppError;

/// Kind of title as stored in the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Tv,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Tv => "tv",
        }
    }
}

impl Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(MediaType::Movie),
            "tv" => Ok(MediaType::Tv),
            other => Err(AppError::InvalidInput(format!(
                "Unknown media type: {}",
                other
            ))),
        }
    }
}

/// Natural key of a title in the external catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaKey {
    pub media_id: i64,
    pub media_type: MediaType,
}

impl MediaKey {
    pub fn new(media_id: i64, media_type: MediaType) -> Self {
        Self {
            media_id,
            media_type,
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.media_id <= 0 {
            return Err(AppError::InvalidInput(format!(
                "Invalid media id: {}",
                self.media_id
            )));
        }
        Ok(())
    }
}

impl Display for MediaKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.media_type, self.media_id)
    }
}

/// Tracking state of a watchlist item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchStatus {
    WantToWatch,
    Watched,
    Rewatched,
    Dropped,
}

impl WatchStatus {
    pub const ALL: [WatchStatus; 4] = [
        WatchStatus::WantToWatch,
        WatchStatus::Watched,
        WatchStatus::Rewatched,
        WatchStatus::Dropped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WatchStatus::WantToWatch => "want_to_watch",
            WatchStatus::Watched => "watched",
            WatchStatus::Rewatched => "rewatched",
            WatchStatus::Dropped => "dropped",
        }
    }

    /// Watched at least once
    pub fn is_seen(&self) -> bool {
        matches!(self, WatchStatus::Watched | WatchStatus::Rewatched)
    }
}

impl Display for WatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WatchStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WatchStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| AppError::InvalidInput(format!("Unknown watch status: {}", s)))
    }
}

/// Classification used by the statistics endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayType {
    Movie,
    Tv,
    Cartoon,
    Anime,
}

impl From<MediaType> for DisplayType {
    fn from(media_type: MediaType) -> Self {
        match media_type {
            MediaType::Movie => DisplayType::Movie,
            MediaType::Tv => DisplayType::Tv,
        }
    }
}
