/// Cache-aside helper over the Redis `Cache`.
///
/// Looks the key up first and returns the cached value on a hit. On a miss,
/// or when the cache cannot be read, it awaits `$block`, queues the result for
/// a background write with the given TTL and returns it. Errors from `$block`
/// propagate with `?`; nothing is cached for them.
///
/// # Arguments
/// * `$cache`: a value with `get_or_miss` and `set_in_background` methods.
/// * `$key`: the `CacheKey` to read and write.
/// * `$ttl`: time-to-live for the stored value in seconds.
/// * `$block`: future computing the value on a miss.
///
/// # Example
/// ```rust,ignore
/// let details: MediaDetails = cached!(self.cache, CacheKey::Details(key), ttl, async move {
///     self.fetch_details_uncached(key).await
/// })?;
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        let key = $key;
        if let Some(cached) = $cache.get_or_miss(&key).await {
            Ok(cached)
        } else {
            let value = $block.await?;
            $cache.set_in_background(&key, &value, $ttl);
            Ok(value)
        }
    }};
}
