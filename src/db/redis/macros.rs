/// Cache-aside helper around the Redis [`Cache`](super::Cache).
///
/// Looks the key up first; on a miss it runs the block, schedules a
/// background write of the result, and returns it.
///
/// # Arguments
/// * `$cache`: cache instance with `get_from_cache` and `set_in_background`.
/// * `$key`: the [`CacheKey`](super::CacheKey) to look up.
/// * `$ttl`: time-to-live for the cached value in seconds.
/// * `$block`: async block computing the value on a miss.
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
