use std::sync::Arc;

use crate::{
    cached,
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
};

use super::ImageSource;

const IMAGE_CACHE_TTL: u64 = 604800; // 1 week

/// Redis read-through cache in front of another source.
///
/// Entries are keyed by name and requested count. Empty results are not
/// cached so a source outage is not remembered for a week; wrap remote
/// sources only, never one that always answers. Cache errors bypass the
/// cache.
pub struct CachedImageLookup {
    cache: Cache,
    inner: Arc<dyn ImageSource>,
}

impl CachedImageLookup {
    pub fn new(cache: Cache, inner: Arc<dyn ImageSource>) -> Self {
        Self { cache, inner }
    }

    async fn lookup(&self, name: &str, hints: &[String], count: usize) -> AppResult<Vec<String>> {
        cached!(
            self.cache,
            CacheKey::images(name, count),
            IMAGE_CACHE_TTL,
            async move {
                let urls = self.inner.find_images(name, hints, count).await;
                if urls.is_empty() {
                    return Err(AppError::NotFound(format!("no images for {}", name)));
                }
                Ok(urls)
            }
        )
    }
}

#[async_trait::async_trait]
impl ImageSource for CachedImageLookup {
    async fn find_images(&self, name: &str, hints: &[String], count: usize) -> Vec<String> {
        match self.lookup(name, hints, count).await {
            Ok(mut urls) => {
                urls.truncate(count);
                urls
            }
            Err(AppError::NotFound(_)) => Vec::new(),
            Err(e) => {
                tracing::warn!(recipe = %name, error = %e, "Image cache unavailable, bypassing");
                self.inner.find_images(name, hints, count).await
            }
        }
    }

    fn name(&self) -> &'static str {
        "cached"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_redis_client;
    use crate::services::images::MockImageSource;

    fn redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
    }

    #[tokio::test]
    async fn test_unreachable_redis_bypasses_cache() {
        // nothing listens on the discard port
        let client = create_redis_client("redis://127.0.0.1:9").unwrap();
        let (cache, _handle) = Cache::new(client).await;

        let mut inner = MockImageSource::new();
        inner
            .expect_find_images()
            .times(1)
            .returning(|_, _, _| vec!["https://img.example/soup.jpg".to_string()]);

        let lookup = CachedImageLookup::new(cache, Arc::new(inner));
        let found = lookup.find_images("Soup", &[], 3).await;
        assert_eq!(found, vec!["https://img.example/soup.jpg"]);
    }

    #[tokio::test]
    #[ignore = "requires a running Redis"]
    async fn test_second_lookup_is_served_from_cache() {
        let client = create_redis_client(&redis_url()).unwrap();
        let (cache, _handle) = Cache::new(client.clone()).await;

        let mut inner = MockImageSource::new();
        inner
            .expect_find_images()
            .times(1)
            .returning(|_, _, _| vec!["https://img.example/stew.jpg".to_string()]);

        let lookup = CachedImageLookup::new(cache, Arc::new(inner));
        let name = "cached lookup test stew";
        let first = lookup.find_images(name, &[], 3).await;
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        let second = lookup.find_images(name, &[], 3).await;
        assert_eq!(first, second);

        let mut conn = client.get_multiplexed_async_connection().await.unwrap();
        let _: () = redis::AsyncCommands::del(
            &mut conn,
            format!("{}", CacheKey::images(name, 3)),
        )
        .await
        .unwrap();
    }
}
