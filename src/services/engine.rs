use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{
    error::{AppError, AppResult},
    models::{Recipe, RecipeQuery},
    services::{
        catalog::Catalog,
        features::FeatureIndex,
        index_store::{load_or_build, IndexStore},
        query_vector::vectorize,
        ranker::{rank, RankOptions},
    },
};

/// A ranked recipe before image enrichment
#[derive(Debug, Clone)]
pub struct ScoredRecipe {
    pub recipe: Recipe,
    pub score: f64,
}

/// Summary of the published engine
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub recipes: usize,
    pub categories: usize,
    pub columns: usize,
    pub fingerprint: String,
    pub built_at: DateTime<Utc>,
}

/// Catalog plus its feature index. Never mutated after construction.
#[derive(Debug)]
pub struct Engine {
    catalog: Catalog,
    index: FeatureIndex,
    built_at: DateTime<Utc>,
}

impl Engine {
    pub fn new(catalog: Catalog, index: FeatureIndex, built_at: DateTime<Utc>) -> Self {
        Self {
            catalog,
            index,
            built_at,
        }
    }

    /// Builds an engine straight from a catalog, without any cache
    pub fn from_catalog(catalog: Catalog) -> Self {
        let index = FeatureIndex::build(&catalog);
        Self::new(catalog, index, Utc::now())
    }

    /// Loads the catalog at `catalog_path` and its index, reusing the cache
    /// under `cache_dir` when it matches. Blocking.
    pub fn load(catalog_path: &Path, cache_dir: Option<&Path>) -> AppResult<Self> {
        let catalog = Catalog::load_path(catalog_path)?;
        let store = cache_dir.map(IndexStore::new);
        let (index, built_at) = load_or_build(&catalog, store.as_ref());
        Ok(Self::new(catalog, index, built_at))
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn index(&self) -> &FeatureIndex {
        &self.index
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            recipes: self.catalog.len(),
            categories: self.index.categories.len(),
            columns: self.index.layout.width(),
            fingerprint: self.catalog.fingerprint().to_string(),
            built_at: self.built_at,
        }
    }

    /// Scores the catalog against `query` and returns up to `top_n` recipes.
    ///
    /// The query category doubles as an exact-match filter. It is resolved
    /// to the catalog's spelling first, so `"soup"` filters on `"Soup"`.
    pub fn recommend(&self, query: &RecipeQuery, top_n: usize) -> AppResult<Vec<ScoredRecipe>> {
        query.validate()?;

        let filter = query
            .category_filter()
            .map(|category| self.index.category_label(category).unwrap_or(category));

        let vector = vectorize(&self.index, query);
        let ranked = rank(
            &self.index,
            &self.catalog,
            &vector,
            RankOptions {
                calorie_target: query.calories,
                time_target: query.time,
                category_filter: filter,
                top_n,
            },
        );

        tracing::debug!(
            top_n,
            returned = ranked.len(),
            empty_query = vector.is_zero(),
            "Ranked catalog"
        );

        ranked
            .into_iter()
            .map(|r| {
                self.catalog
                    .get(r.row)
                    .cloned()
                    .map(|recipe| ScoredRecipe {
                        recipe,
                        score: r.score,
                    })
                    .ok_or_else(|| AppError::Internal(format!("ranked row {} out of range", r.row)))
            })
            .collect()
    }
}

/// Shared handle to the currently published [`Engine`].
///
/// Readers take an `Arc` snapshot and keep it for the whole request; a
/// reload builds a new engine off the runtime and swaps the pointer.
#[derive(Clone)]
pub struct EngineHandle {
    current: Arc<RwLock<Arc<Engine>>>,
    catalog_path: PathBuf,
    cache_dir: Option<PathBuf>,
}

impl EngineHandle {
    pub fn new(engine: Engine, catalog_path: PathBuf, cache_dir: Option<PathBuf>) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(engine))),
            catalog_path,
            cache_dir,
        }
    }

    /// Loads the initial engine on a blocking worker
    pub async fn start(catalog_path: PathBuf, cache_dir: Option<PathBuf>) -> AppResult<Self> {
        let engine = build_blocking(catalog_path.clone(), cache_dir.clone()).await?;
        Ok(Self::new(engine, catalog_path, cache_dir))
    }

    pub async fn snapshot(&self) -> Arc<Engine> {
        self.current.read().await.clone()
    }

    /// Rebuilds from the catalog on disk and publishes the result.
    /// On failure the previous engine stays published.
    pub async fn reload(&self) -> AppResult<EngineStats> {
        let engine = build_blocking(self.catalog_path.clone(), self.cache_dir.clone()).await?;
        let stats = engine.stats();

        *self.current.write().await = Arc::new(engine);

        tracing::info!(
            recipes = stats.recipes,
            fingerprint = %stats.fingerprint,
            "Published reloaded engine"
        );
        Ok(stats)
    }

    /// Runs `recommend` on the current snapshot without stalling the runtime
    pub async fn recommend(&self, query: RecipeQuery, top_n: usize) -> AppResult<Vec<ScoredRecipe>> {
        let engine = self.snapshot().await;
        tokio::task::spawn_blocking(move || engine.recommend(&query, top_n))
            .await
            .map_err(|e| AppError::Internal(format!("ranking task failed: {}", e)))?
    }
}

async fn build_blocking(catalog_path: PathBuf, cache_dir: Option<PathBuf>) -> AppResult<Engine> {
    tokio::task::spawn_blocking(move || Engine::load(&catalog_path, cache_dir.as_deref()))
        .await
        .map_err(|e| AppError::Internal(format!("index build task failed: {}", e)))?
}
