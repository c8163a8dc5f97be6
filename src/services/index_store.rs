use atomicwrites::{AllowOverwrite, AtomicFile};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::{
    error::{AppError, AppResult},
    services::{
        catalog::Catalog,
        features::{Block, BlockLayout, CsrMatrix, FeatureIndex, Scalers, Vectorizers},
    },
};

/// Bumped whenever the artifact layout changes
const FORMAT_VERSION: u32 = 1;

const MANIFEST_FILE: &str = "manifest.json";
const VECTORIZERS_FILE: &str = "vectorizers.bin";
const SCALERS_FILE: &str = "scalers.bin";
const CATEGORIES_FILE: &str = "categories.json";
const MATRIX_FILE: &str = "matrix.bin";

/// Describes the artifact set on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub fingerprint: String,
    pub rows: usize,
    pub cols: usize,
    pub built_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct MatrixArtifact {
    layout: BlockLayout,
    matrix: CsrMatrix,
    row_norms: Vec<f64>,
}

/// On-disk cache of a built [`FeatureIndex`], keyed by catalog fingerprint
#[derive(Debug, Clone)]
pub struct IndexStore {
    dir: PathBuf,
}

impl IndexStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Loads the cached index for `catalog`.
    ///
    /// Returns `None` when any artifact is missing or unreadable, or when the
    /// cache was built from a different catalog.
    pub fn load(&self, catalog: &Catalog) -> Option<(FeatureIndex, Manifest)> {
        match self.try_load(catalog) {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::warn!(
                    dir = %self.dir.display(),
                    error = %e,
                    "Discarding unreadable index cache"
                );
                None
            }
        }
    }

    fn try_load(&self, catalog: &Catalog) -> AppResult<Option<(FeatureIndex, Manifest)>> {
        let all_present = [
            MANIFEST_FILE,
            VECTORIZERS_FILE,
            SCALERS_FILE,
            CATEGORIES_FILE,
            MATRIX_FILE,
        ]
        .iter()
        .all(|file| self.dir.join(file).is_file());
        if !all_present {
            tracing::info!(dir = %self.dir.display(), "Index cache incomplete");
            return Ok(None);
        }

        let manifest: Manifest = self.read_json(MANIFEST_FILE)?;
        if manifest.format_version != FORMAT_VERSION
            || manifest.fingerprint != catalog.fingerprint()
            || manifest.rows != catalog.len()
        {
            tracing::info!(
                cached = %manifest.fingerprint,
                current = %catalog.fingerprint(),
                "Index cache is stale"
            );
            return Ok(None);
        }

        let vectorizers: Vectorizers = self.read_bin(VECTORIZERS_FILE)?;
        let scalers: Scalers = self.read_bin(SCALERS_FILE)?;
        let categories: Vec<String> = self.read_json(CATEGORIES_FILE)?;
        let artifact: MatrixArtifact = self.read_bin(MATRIX_FILE)?;

        let consistent = artifact.matrix.rows() == manifest.rows
            && artifact.matrix.cols() == manifest.cols
            && artifact.layout.width() == manifest.cols
            && artifact.row_norms.len() == manifest.rows
            && artifact.layout.range(Block::Category).len() == categories.len()
            && artifact.layout.range(Block::Ingredients).len() == vectorizers.ingredients.width()
            && artifact.layout.range(Block::Keywords).len() == vectorizers.keywords.width()
            && artifact.layout.range(Block::KeywordNames).len()
                == vectorizers.keyword_names.width();
        if !consistent {
            return Err(AppError::DataFormat(
                "index artifacts disagree with manifest".to_string(),
            ));
        }

        let index = FeatureIndex {
            vectorizers,
            scalers,
            categories,
            layout: artifact.layout,
            matrix: artifact.matrix,
            row_norms: artifact.row_norms,
        };
        Ok(Some((index, manifest)))
    }

    /// Writes the full artifact set; each file is replaced atomically
    pub fn save(&self, catalog: &Catalog, index: &FeatureIndex) -> AppResult<Manifest> {
        std::fs::create_dir_all(&self.dir)?;

        let manifest = Manifest {
            format_version: FORMAT_VERSION,
            fingerprint: catalog.fingerprint().to_string(),
            rows: index.rows(),
            cols: index.layout.width(),
            built_at: Utc::now(),
        };

        self.write_bin(VECTORIZERS_FILE, &index.vectorizers)?;
        self.write_bin(SCALERS_FILE, &index.scalers)?;
        self.write_json(CATEGORIES_FILE, &index.categories)?;
        self.write_bin(
            MATRIX_FILE,
            &MatrixArtifact {
                layout: index.layout.clone(),
                matrix: index.matrix.clone(),
                row_norms: index.row_norms.clone(),
            },
        )?;
        // manifest last: a crash mid-save leaves a cache that fails validation
        self.write_json(MANIFEST_FILE, &manifest)?;

        tracing::info!(dir = %self.dir.display(), rows = manifest.rows, "Index cache saved");
        Ok(manifest)
    }

    fn read_json<T: DeserializeOwned>(&self, file: &str) -> AppResult<T> {
        let bytes = std::fs::read(self.dir.join(file))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| AppError::DataFormat(format!("{}: {}", file, e)))
    }

    fn read_bin<T: DeserializeOwned>(&self, file: &str) -> AppResult<T> {
        let bytes = std::fs::read(self.dir.join(file))?;
        Ok(bincode::deserialize(&bytes)?)
    }

    fn write_json<T: Serialize>(&self, file: &str, value: &T) -> AppResult<()> {
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| AppError::Internal(format!("{}: {}", file, e)))?;
        self.write_atomic(file, &bytes)
    }

    fn write_bin<T: Serialize>(&self, file: &str, value: &T) -> AppResult<()> {
        let bytes = bincode::serialize(value)?;
        self.write_atomic(file, &bytes)
    }

    fn write_atomic(&self, file: &str, bytes: &[u8]) -> AppResult<()> {
        AtomicFile::new(self.dir.join(file), AllowOverwrite)
            .write(|f| f.write_all(bytes))
            .map_err(|e| AppError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))
    }
}

/// Loads the index from `store` when it is fresh, otherwise builds it and
/// refreshes the cache. Cache write failures are logged, not fatal.
pub fn load_or_build(
    catalog: &Catalog,
    store: Option<&IndexStore>,
) -> (FeatureIndex, DateTime<Utc>) {
    if let Some((index, manifest)) = store.and_then(|s| s.load(catalog)) {
        tracing::info!(
            rows = manifest.rows,
            built_at = %manifest.built_at,
            "Loaded feature index from cache"
        );
        return (index, manifest.built_at);
    }

    let index = FeatureIndex::build(catalog);
    let mut built_at = Utc::now();

    if let Some(store) = store {
        match store.save(catalog, &index) {
            Ok(manifest) => built_at = manifest.built_at,
            Err(e) => tracing::warn!(error = %e, "Failed to save index cache"),
        }
    }

    (index, built_at)
}
