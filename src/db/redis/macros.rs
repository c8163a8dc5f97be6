/// Read-through caching over [`Cache`](crate::db::Cache).
///
/// Returns the cached value under `$key` when present. Otherwise awaits
/// `$block` (a future yielding `AppResult<T>`), queues the value for a
/// background write with `$ttl` seconds to live, and returns it. Errors from
/// the cache read or the block propagate with `?`, so the macro must be used
/// inside a function returning `AppResult<T>`.
///
/// # Example
/// ```rust,ignore
/// let urls: AppResult<Vec<String>> = cached!(cache, CacheKey::images(&name, 3), 3600, async move {
///     Ok(source.find_images(&name, &[], 3).await)
/// });
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        if let Some(cached) = $cache.get_from_cache(&$key).await? {
            Ok(cached)
        } else {
            let value = $block.await?;
            $cache.set_in_background(&$key, &value, $ttl);
            Ok(value)
        }
    }};
}
