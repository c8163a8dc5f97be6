use std::sync::Arc;
use std::time::Duration;

use crate::{
    config::Config,
    db::{create_redis_client, Cache, CacheWriterHandle},
    services::{
        images::{
            CachedImageLookup, FallbackImageLookup, HintImageSource, ImageSource,
            PlaceholderImageSource, WikimediaImageSource,
        },
        AttributeExtractor, DisabledDescriber, DisabledExtractor, EngineHandle, EnrichmentOptions,
        GeminiDescriber, ImageDescriber, OpenAiExtractor,
    },
};

/// Request-surface limits
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub default_top_n: usize,
    pub max_top_n: usize,
    pub enrichment: EnrichmentOptions,
    pub request_timeout: Duration,
    /// Budget for one extractor or vision call
    pub collaborator_timeout: Duration,
    pub max_image_bytes: usize,
    pub cors_origin: String,
}

impl ApiSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_top_n: 5,
            max_top_n: config.max_top_n,
            enrichment: EnrichmentOptions {
                images_per_recipe: config.images_per_recipe,
                timeout: config.image_lookup_timeout(),
            },
            request_timeout: config.request_timeout(),
            collaborator_timeout: config.collaborator_timeout(),
            max_image_bytes: config.max_image_bytes,
            cors_origin: config.cors_origin.clone(),
        }
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            default_top_n: 5,
            max_top_n: 50,
            enrichment: EnrichmentOptions {
                images_per_recipe: 3,
                timeout: Duration::from_secs(4),
            },
            request_timeout: Duration::from_secs(30),
            collaborator_timeout: Duration::from_secs(10),
            max_image_bytes: 10 * 1024 * 1024,
            cors_origin: "http://localhost:3000".to_string(),
        }
    }
}

/// Shared application state
///
/// Nothing here is mutated per request: the engine handle swaps whole
/// engines, and the collaborators are stateless or internally synchronized.
#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
    pub images: Arc<dyn ImageSource>,
    pub extractor: Arc<dyn AttributeExtractor>,
    pub describer: Arc<dyn ImageDescriber>,
    pub settings: Arc<ApiSettings>,
}

impl AppState {
    pub fn new(
        engine: EngineHandle,
        images: Arc<dyn ImageSource>,
        extractor: Arc<dyn AttributeExtractor>,
        settings: ApiSettings,
    ) -> Self {
        Self {
            engine,
            images,
            extractor,
            describer: Arc::new(DisabledDescriber),
            settings: Arc::new(settings),
        }
    }

    /// Replaces the photo describer, disabled by default
    pub fn with_describer(mut self, describer: Arc<dyn ImageDescriber>) -> Self {
        self.describer = describer;
        self
    }

    /// Wires the engine and collaborators described by `config`.
    ///
    /// Loads the catalog and index (fatal on error). Returns the cache writer
    /// handle when a Redis image cache is configured.
    pub async fn from_config(config: &Config) -> anyhow::Result<(Self, Option<CacheWriterHandle>)> {
        let engine = EngineHandle::start(config.catalog_path.clone(), config.index_dir()).await?;
        let http_client = reqwest::Client::builder()
            .timeout(config.image_lookup_timeout())
            .build()?;

        let wikimedia: Arc<dyn ImageSource> = Arc::new(WikimediaImageSource::new(
            http_client.clone(),
            config.verify_images,
        ));

        let (cache, cache_handle) = match &config.redis_url {
            Some(url) => {
                let (cache, handle) = Cache::new(create_redis_client(url)?).await;
                tracing::info!("Image lookups cached in Redis");
                (Some(cache), Some(handle))
            }
            None => (None, None),
        };
        let images: Arc<dyn ImageSource> = Arc::new(image_lookup(wikimedia, cache));

        let collaborator_client = reqwest::Client::builder()
            .timeout(config.collaborator_timeout())
            .build()?;

        let extractor: Arc<dyn AttributeExtractor> = match &config.openai_api_key {
            Some(key) if !key.trim().is_empty() => Arc::new(OpenAiExtractor::new(
                collaborator_client.clone(),
                key.clone(),
                config.openai_api_url.clone(),
                config.openai_model.clone(),
            )),
            _ => {
                tracing::warn!("OPENAI_API_KEY not set, free-text queries fall back to keywords");
                Arc::new(DisabledExtractor)
            }
        };

        let describer: Arc<dyn ImageDescriber> = match &config.google_api_key {
            Some(key) if !key.trim().is_empty() => Arc::new(GeminiDescriber::new(
                collaborator_client,
                key.clone(),
                config.gemini_model.clone(),
            )),
            _ => {
                tracing::warn!("GOOGLE_API_KEY not set, food photos are described generically");
                Arc::new(DisabledDescriber)
            }
        };

        let state = Self::new(engine, images, extractor, ApiSettings::from_config(config))
            .with_describer(describer);
        Ok((state, cache_handle))
    }
}

/// Catalog hints, then the remote source (cached when Redis is configured),
/// then a placeholder. Only the remote source sits behind the cache, so an
/// outage never caches placeholders.
fn image_lookup(remote: Arc<dyn ImageSource>, cache: Option<Cache>) -> FallbackImageLookup {
    let remote: Arc<dyn ImageSource> = match cache {
        Some(cache) => Arc::new(CachedImageLookup::new(cache, remote)),
        None => remote,
    };
    FallbackImageLookup::new(vec![
        Arc::new(HintImageSource) as Arc<dyn ImageSource>,
        remote,
        Arc::new(PlaceholderImageSource),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::images::MockImageSource;

    fn remote() -> Arc<dyn ImageSource> {
        let mut source = MockImageSource::new();
        source.expect_name().return_const("remote");
        source.expect_find_images().returning(|_, _, _| Vec::new());
        Arc::new(source)
    }

    fn names(lookup: &FallbackImageLookup) -> Vec<&'static str> {
        lookup.sources().iter().map(|s| s.name()).collect()
    }

    #[tokio::test]
    async fn test_cache_wraps_only_the_remote_source() {
        let client = create_redis_client("redis://127.0.0.1:9").unwrap();
        let (cache, _handle) = Cache::new(client).await;

        let lookup = image_lookup(remote(), Some(cache));
        assert_eq!(names(&lookup), vec!["hints", "cached", "placeholder"]);
    }

    #[tokio::test]
    async fn test_remote_outage_falls_through_to_placeholder() {
        let lookup = image_lookup(remote(), None);
        assert_eq!(names(&lookup), vec!["hints", "remote", "placeholder"]);

        let found = lookup.find_images("Chili", &[], 3).await;
        assert_eq!(found.len(), 1);
        assert!(found[0].starts_with("https://placehold.co/"));
    }

    #[test]
    fn test_settings_from_config() {
        let config: Config = envy::from_iter(vec![
            ("MAX_TOP_N".to_string(), "7".to_string()),
            ("COLLABORATOR_TIMEOUT_SECS".to_string(), "2".to_string()),
        ])
        .unwrap();
        let settings = ApiSettings::from_config(&config);
        assert_eq!(settings.max_top_n, 7);
        assert_eq!(settings.collaborator_timeout, Duration::from_secs(2));
    }
}
