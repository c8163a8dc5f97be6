use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use crate::{
    models::RecommendedRecipe,
    services::{engine::ScoredRecipe, images::ImageSource},
};

/// Limits applied to per-recipe image enrichment
#[derive(Debug, Clone, Copy)]
pub struct EnrichmentOptions {
    pub images_per_recipe: usize,
    pub timeout: Duration,
}

/// Attaches images to ranked recipes, keeping the ranking order.
///
/// One lookup task per recipe, each under its own timeout. A lookup that
/// fails, times out or panics leaves that recipe with no images. Dropping
/// the returned future aborts the lookups still in flight.
pub async fn assemble(
    ranked: Vec<ScoredRecipe>,
    images: Arc<dyn ImageSource>,
    options: EnrichmentOptions,
) -> Vec<RecommendedRecipe> {
    let mut found: Vec<Vec<String>> = vec![Vec::new(); ranked.len()];
    let mut tasks = JoinSet::new();

    for (position, scored) in ranked.iter().enumerate() {
        let source = images.clone();
        let name = scored.recipe.name.clone();
        let hints = scored.recipe.image_hints.clone();
        let count = options.images_per_recipe;
        let timeout = options.timeout;

        tasks.spawn(async move {
            let lookup = source.find_images(&name, &hints, count);
            match tokio::time::timeout(timeout, lookup).await {
                Ok(urls) => (position, urls),
                Err(_) => {
                    tracing::warn!(recipe = %name, "Image lookup timed out");
                    (position, Vec::new())
                }
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((position, mut urls)) => {
                urls.truncate(options.images_per_recipe);
                found[position] = urls;
            }
            Err(e) => tracing::error!(error = %e, "Image lookup task failed"),
        }
    }

    ranked
        .into_iter()
        .zip(found)
        .map(|(scored, images)| RecommendedRecipe {
            recipe: scored.recipe,
            score: scored.score,
            images,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{features::tests::recipe, images::MockImageSource};

    fn scored(id: i64, name: &str) -> ScoredRecipe {
        let mut recipe = recipe(id, "Soup", 100.0, 4.0, 1);
        recipe.name = name.to_string();
        ScoredRecipe { recipe, score: 0.5 }
    }

    const OPTIONS: EnrichmentOptions = EnrichmentOptions {
        images_per_recipe: 3,
        timeout: Duration::from_millis(200),
    };

    #[tokio::test]
    async fn test_assemble_keeps_order_and_caps_images() {
        let mut source = MockImageSource::new();
        source.expect_find_images().returning(|name, _, _| {
            (0..5).map(|i| format!("https://img.example/{}/{}.jpg", name, i)).collect()
        });

        let recipes = assemble(
            vec![scored(1, "first"), scored(2, "second")],
            Arc::new(source),
            OPTIONS,
        )
        .await;

        assert_eq!(recipes.len(), 2);
        assert_eq!(recipes[0].recipe.id, 1);
        assert_eq!(recipes[1].recipe.id, 2);
        assert_eq!(recipes[0].images.len(), 3);
        assert!(recipes[1].images[0].contains("/second/"));
    }

    #[tokio::test]
    async fn test_empty_lookup_degrades_to_no_images() {
        let mut source = MockImageSource::new();
        source.expect_find_images().returning(|_, _, _| Vec::new());

        let recipes = assemble(vec![scored(1, "soup")], Arc::new(source), OPTIONS).await;
        assert_eq!(recipes.len(), 1);
        assert!(recipes[0].images.is_empty());
        assert_eq!(recipes[0].score, 0.5);
    }

    struct SlowSource;

    #[async_trait::async_trait]
    impl ImageSource for SlowSource {
        async fn find_images(&self, name: &str, _hints: &[String], _count: usize) -> Vec<String> {
            if name == "slow" {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            vec![format!("https://img.example/{}.jpg", name)]
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_timeout_is_isolated_to_one_recipe() {
        let recipes = assemble(
            vec![scored(1, "slow"), scored(2, "fast")],
            Arc::new(SlowSource),
            OPTIONS,
        )
        .await;

        assert!(recipes[0].images.is_empty());
        assert_eq!(recipes[1].images, vec!["https://img.example/fast.jpg"]);
    }

    #[tokio::test]
    async fn test_empty_ranking_is_empty() {
        let recipes = assemble(vec![], Arc::new(SlowSource), OPTIONS).await;
        assert!(recipes.is_empty());
    }
}
