//! Image lookup for recommended recipes
//!
//! Every source implements [`ImageSource`]. Sources never fail: errors are
//! logged and resolve to an empty list, so enrichment can only ever degrade
//! a response, not break it. [`FallbackImageLookup`] chains sources in
//! priority order and [`CachedImageLookup`] puts Redis in front of a chain.

use std::collections::HashSet;
use std::sync::Arc;

mod cached;
mod local;
mod wikimedia;

pub use cached::CachedImageLookup;
pub use local::{HintImageSource, PlaceholderImageSource};
pub use wikimedia::WikimediaImageSource;

/// Capability to find image URLs for a recipe
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ImageSource: Send + Sync {
    /// Up to `count` image URLs for `name`. `hints` are URLs already stored
    /// with the recipe. Infallible by contract.
    async fn find_images(&self, name: &str, hints: &[String], count: usize) -> Vec<String>;

    /// Source name for logging
    fn name(&self) -> &'static str;
}

/// Tries sources in order, concatenating distinct URLs until `count`
pub struct FallbackImageLookup {
    sources: Vec<Arc<dyn ImageSource>>,
}

impl FallbackImageLookup {
    pub fn new(sources: Vec<Arc<dyn ImageSource>>) -> Self {
        Self { sources }
    }

    pub fn sources(&self) -> &[Arc<dyn ImageSource>] {
        &self.sources
    }
}

#[async_trait::async_trait]
impl ImageSource for FallbackImageLookup {
    async fn find_images(&self, name: &str, hints: &[String], count: usize) -> Vec<String> {
        let mut urls: Vec<String> = Vec::with_capacity(count);
        let mut seen = HashSet::new();

        for source in &self.sources {
            if urls.len() >= count {
                break;
            }
            let found = source.find_images(name, hints, count - urls.len()).await;
            tracing::debug!(
                source = source.name(),
                recipe = %name,
                found = found.len(),
                "Image source queried"
            );
            for url in found {
                if urls.len() < count && seen.insert(url.clone()) {
                    urls.push(url);
                }
            }
        }

        urls
    }

    fn name(&self) -> &'static str {
        "fallback"
    }
}
