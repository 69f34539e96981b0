use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::{
    db::{BlacklistRepository, TagRepository, WatchlistRepository},
    error::{AppError, AppResult},
    models::{
        validate_rating, BatchLookupEntry, MediaKey, SetStatusRequest, StatusUpsert,
        TrackingState, WatchListItem, WatchlistFilter,
    },
};

/// Largest accepted batch lookup
pub const MAX_BATCH_SIZE: usize = 100;

/// Sets the tracking status of a title; a `None` status stops tracking it
pub async fn set_status(
    watchlist: &dyn WatchlistRepository,
    user_id: Uuid,
    request: SetStatusRequest,
) -> AppResult<TrackingState> {
    request.key.validate()?;

    let Some(status) = request.status else {
        let removed = watchlist.delete_item(user_id, &request.key).await?;
        tracing::info!(user_id = %user_id, media = %request.key, removed, "Cleared watch status");
        return Ok(TrackingState::from(None));
    };

    validate_rating(request.snapshot.user_rating)?;

    let item = watchlist
        .upsert_status(
            user_id,
            &StatusUpsert {
                key: request.key,
                status,
                snapshot: request.snapshot,
            },
        )
        .await?;

    tracing::info!(
        user_id = %user_id,
        media = %item.key(),
        status = status.as_str(),
        "Watch status saved"
    );

    Ok(TrackingState::from(Some(item)))
}

pub async fn get_status(
    watchlist: &dyn WatchlistRepository,
    user_id: Uuid,
    key: MediaKey,
) -> AppResult<TrackingState> {
    key.validate()?;
    Ok(watchlist.find_item(user_id, &key).await?.into())
}

pub async fn set_rating(
    watchlist: &dyn WatchlistRepository,
    user_id: Uuid,
    key: MediaKey,
    rating: Option<f32>,
) -> AppResult<WatchListItem> {
    key.validate()?;
    validate_rating(rating)?;

    watchlist
        .set_rating(user_id, &key, rating)
        .await?
        .ok_or_else(|| not_tracked(&key))
}

pub async fn remove(
    watchlist: &dyn WatchlistRepository,
    user_id: Uuid,
    key: MediaKey,
) -> AppResult<()> {
    key.validate()?;
    if !watchlist.delete_item(user_id, &key).await? {
        return Err(not_tracked(&key));
    }
    Ok(())
}

pub async fn list(
    watchlist: &dyn WatchlistRepository,
    user_id: Uuid,
    filter: &WatchlistFilter,
) -> AppResult<Vec<WatchListItem>> {
    watchlist.list_items(user_id, filter).await
}

/// Replaces the tags on a tracked title; every id must be one of the user's tags
pub async fn set_tags(
    watchlist: &dyn WatchlistRepository,
    tags: &dyn TagRepository,
    user_id: Uuid,
    key: MediaKey,
    tag_ids: Vec<Uuid>,
) -> AppResult<WatchListItem> {
    key.validate()?;

    let mut seen = HashSet::new();
    let tag_ids: Vec<Uuid> = tag_ids.into_iter().filter(|id| seen.insert(*id)).collect();

    if !tag_ids.is_empty() {
        let owned = tags.find_owned(user_id, &tag_ids).await?;
        if owned.len() != tag_ids.len() {
            return Err(AppError::InvalidInput(
                "One or more tags do not exist".to_string(),
            ));
        }
    }

    watchlist
        .set_tags(user_id, &key, &tag_ids)
        .await?
        .ok_or_else(|| not_tracked(&key))
}

/// Tracking state for many titles at once, one entry per input key in input order
///
/// Runs exactly three store queries (own rows, blacklist, community ratings)
/// whatever the number of keys.
pub async fn batch_lookup(
    watchlist: &dyn WatchlistRepository,
    blacklist: &dyn BlacklistRepository,
    user_id: Uuid,
    keys: &[MediaKey],
) -> AppResult<Vec<BatchLookupEntry>> {
    if keys.is_empty() {
        return Ok(Vec::new());
    }
    if keys.len() > MAX_BATCH_SIZE {
        return Err(AppError::InvalidInput(format!(
            "At most {} items per batch",
            MAX_BATCH_SIZE
        )));
    }
    for key in keys {
        key.validate()?;
    }

    let mut seen = HashSet::new();
    let unique: Vec<MediaKey> = keys.iter().copied().filter(|k| seen.insert(*k)).collect();

    let (items, blacklisted, community) = tokio::try_join!(
        watchlist.find_items(user_id, &unique),
        blacklist.blacklisted_among(user_id, &unique),
        watchlist.community_ratings(&unique),
    )?;

    let items: HashMap<MediaKey, WatchListItem> =
        items.into_iter().map(|item| (item.key(), item)).collect();
    let blacklisted: HashSet<MediaKey> = blacklisted.into_iter().collect();
    let community: HashMap<MediaKey, (f64, i64)> = community
        .into_iter()
        .map(|c| (c.key, (c.average, c.count)))
        .collect();

    tracing::debug!(
        user_id = %user_id,
        requested = keys.len(),
        tracked = items.len(),
        "Batch lookup"
    );

    Ok(keys
        .iter()
        .map(|key| {
            let item = items.get(key);
            let (community_rating, community_count) = match community.get(key) {
                Some((average, count)) => (Some(*average), *count),
                None => (None, 0),
            };
            BatchLookupEntry {
                media_id: key.media_id,
                media_type: key.media_type,
                status: item.map(|i| i.status),
                user_rating: item.and_then(|i| i.user_rating),
                blacklisted: blacklisted.contains(key),
                community_rating,
                community_count,
            }
        })
        .collect())
}

fn not_tracked(key: &MediaKey) -> AppError {
    AppError::NotFound(format!("{} is not on the watchlist", key))
}
