use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::{
    models::{DietaryFlag, Recipe},
    services::{
        catalog::Catalog,
        text::{SparseRow, TfIdfParams, TfIdfVectorizer},
    },
};

const INGREDIENT_PARAMS: TfIdfParams = TfIdfParams {
    max_ngram: 2,
    max_features: 5000,
};

const KEYWORD_PARAMS: TfIdfParams = TfIdfParams {
    max_ngram: 1,
    max_features: 3000,
};

/// Column blocks of the combined matrix, in layout order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Block {
    Ingredients,
    Category,
    Dietary,
    Calories,
    Time,
    Keywords,
    KeywordNames,
    Rating,
}

impl Block {
    pub const ALL: [Block; 8] = [
        Block::Ingredients,
        Block::Category,
        Block::Dietary,
        Block::Calories,
        Block::Time,
        Block::Keywords,
        Block::KeywordNames,
        Block::Rating,
    ];

    /// Scale applied to every value in the block
    pub fn weight(self) -> f64 {
        match self {
            Block::Ingredients => 0.15,
            Block::Category => 0.25,
            Block::Dietary => 0.20,
            Block::Calories => 0.10,
            Block::Time => 0.10,
            Block::Keywords => 0.10,
            Block::KeywordNames => 0.10,
            Block::Rating => 0.05,
        }
    }

    fn position(self) -> usize {
        self as usize
    }
}

/// Column offsets of every block; fixed once the index is built
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockLayout {
    /// `offsets[i]..offsets[i + 1]` is the range of `Block::ALL[i]`
    offsets: Vec<usize>,
}

impl BlockLayout {
    pub fn from_widths(widths: [usize; 8]) -> Self {
        let mut offsets = Vec::with_capacity(widths.len() + 1);
        let mut total = 0;
        offsets.push(total);
        for width in widths {
            total += width;
            offsets.push(total);
        }
        Self { offsets }
    }

    pub fn range(&self, block: Block) -> Range<usize> {
        let i = block.position();
        self.offsets[i]..self.offsets[i + 1]
    }

    pub fn offset(&self, block: Block) -> usize {
        self.range(block).start
    }

    /// Total number of columns
    pub fn width(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0)
    }
}

/// Min-max scaler fit on exactly one column
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    pub min: f64,
    pub max: f64,
}

impl MinMaxScaler {
    pub fn fit(values: impl IntoIterator<Item = f64>) -> Self {
        let (min, max) = values
            .into_iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
        if min > max {
            // no values
            return Self { min: 0.0, max: 0.0 };
        }
        Self { min, max }
    }

    /// Maps `value` into `[0, 1]` relative to the fitted range.
    /// A constant column maps everything to 0; values outside the range
    /// are clamped.
    pub fn transform(&self, value: f64) -> f64 {
        let span = self.max - self.min;
        if span <= 0.0 {
            return 0.0;
        }
        ((value - self.min) / span).clamp(0.0, 1.0)
    }
}

/// The fitted text vectorizers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vectorizers {
    pub ingredients: TfIdfVectorizer,
    pub keywords: TfIdfVectorizer,
    pub keyword_names: TfIdfVectorizer,
}

/// The fitted numeric scalers, one per field
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scalers {
    pub calories: MinMaxScaler,
    pub time: MinMaxScaler,
    pub rating: MinMaxScaler,
}

/// Compressed-sparse-row matrix
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CsrMatrix {
    cols: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<f64>,
}

impl CsrMatrix {
    pub fn new(cols: usize) -> Self {
        Self {
            cols,
            indptr: vec![0],
            indices: Vec::new(),
            data: Vec::new(),
        }
    }

    /// Appends a row; entries must be sorted by column and in range
    pub fn push_row(&mut self, row: &[(usize, f64)]) {
        for &(column, value) in row {
            debug_assert!(column < self.cols);
            self.indices.push(column);
            self.data.push(value);
        }
        self.indptr.push(self.indices.len());
    }

    pub fn rows(&self) -> usize {
        self.indptr.len().saturating_sub(1)
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    /// Column indices and values of row `i`
    pub fn row(&self, i: usize) -> (&[usize], &[f64]) {
        let span = self.indptr[i]..self.indptr[i + 1];
        (&self.indices[span.clone()], &self.data[span])
    }

    /// Dot product of row `i` with a dense vector of width `cols`
    pub fn row_dot(&self, i: usize, dense: &[f64]) -> f64 {
        let (indices, data) = self.row(i);
        indices
            .iter()
            .zip(data)
            .map(|(&column, value)| value * dense[column])
            .sum()
    }

    pub fn row_norm(&self, i: usize) -> f64 {
        self.row(i).1.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    /// Row values densified, mainly for inspection in tests
    pub fn dense_row(&self, i: usize) -> Vec<f64> {
        let mut dense = vec![0.0; self.cols];
        let (indices, data) = self.row(i);
        for (&column, &value) in indices.iter().zip(data) {
            dense[column] = value;
        }
        dense
    }
}

/// Combined feature matrix plus every piece of fitted state needed to
/// project a query into the same column space. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureIndex {
    pub vectorizers: Vectorizers,
    pub scalers: Scalers,
    /// Category labels in column order (lexicographic)
    pub categories: Vec<String>,
    pub layout: BlockLayout,
    pub matrix: CsrMatrix,
    pub row_norms: Vec<f64>,
}

impl FeatureIndex {
    /// Fits all vectorizers and scalers over `catalog` and builds the
    /// weighted combined matrix, one row per recipe in catalog order
    pub fn build(catalog: &Catalog) -> Self {
        let recipes = catalog.recipes();

        let ingredient_docs = joined(recipes, |r| &r.ingredients);
        let keyword_docs = joined(recipes, |r| &r.keywords);
        let keyword_name_docs = joined(recipes, |r| &r.keyword_names);

        let vectorizers = Vectorizers {
            ingredients: TfIdfVectorizer::fit(&ingredient_docs, INGREDIENT_PARAMS),
            keywords: TfIdfVectorizer::fit(&keyword_docs, KEYWORD_PARAMS),
            keyword_names: TfIdfVectorizer::fit(&keyword_name_docs, KEYWORD_PARAMS),
        };

        let scalers = Scalers {
            calories: MinMaxScaler::fit(recipes.iter().map(|r| r.calories)),
            time: MinMaxScaler::fit(recipes.iter().map(|r| r.total_time_minutes as f64)),
            rating: MinMaxScaler::fit(recipes.iter().map(|r| r.rating)),
        };

        let mut categories: Vec<String> = recipes.iter().map(|r| r.category.clone()).collect();
        categories.sort();
        categories.dedup();

        let layout = BlockLayout::from_widths([
            vectorizers.ingredients.width(),
            categories.len(),
            DietaryFlag::ALL.len(),
            1,
            1,
            vectorizers.keywords.width(),
            vectorizers.keyword_names.width(),
            1,
        ]);

        let mut matrix = CsrMatrix::new(layout.width());
        let mut row_norms = Vec::with_capacity(recipes.len());

        for (i, recipe) in recipes.iter().enumerate() {
            let mut row = RowBuilder::new(&layout);

            row.text(Block::Ingredients, vectorizers.ingredients.transform(&ingredient_docs[i]));
            if let Ok(column) = categories.binary_search(&recipe.category) {
                row.set(Block::Category, column, 1.0);
            }
            for flag in recipe.dietary.enabled() {
                row.set(Block::Dietary, flag.index(), 1.0);
            }
            row.set(Block::Calories, 0, scalers.calories.transform(recipe.calories));
            row.set(
                Block::Time,
                0,
                scalers.time.transform(recipe.total_time_minutes as f64),
            );
            row.text(Block::Keywords, vectorizers.keywords.transform(&keyword_docs[i]));
            row.text(
                Block::KeywordNames,
                vectorizers.keyword_names.transform(&keyword_name_docs[i]),
            );
            row.set(Block::Rating, 0, scalers.rating.transform(recipe.rating));

            let entries = row.finish();
            matrix.push_row(&entries);
            row_norms.push(matrix.row_norm(i));
        }

        tracing::info!(
            rows = matrix.rows(),
            cols = matrix.cols(),
            nnz = matrix.nnz(),
            categories = categories.len(),
            "Feature matrix built"
        );

        Self {
            vectorizers,
            scalers,
            categories,
            layout,
            matrix,
            row_norms,
        }
    }

    /// Column of `label` inside the category block.
    /// Exact match first, then case-insensitive.
    pub fn category_column(&self, label: &str) -> Option<usize> {
        let label = label.trim();
        self.categories
            .binary_search_by(|c| c.as_str().cmp(label))
            .ok()
            .or_else(|| {
                self.categories
                    .iter()
                    .position(|c| c.eq_ignore_ascii_case(label))
            })
    }

    /// Canonical spelling of a known category label
    pub fn category_label(&self, label: &str) -> Option<&str> {
        self.category_column(label)
            .map(|column| self.categories[column].as_str())
    }

    pub fn rows(&self) -> usize {
        self.matrix.rows()
    }
}

/// Accumulates the weighted entries of one row, block by block
pub(crate) struct RowBuilder<'a> {
    layout: &'a BlockLayout,
    entries: SparseRow,
}

impl<'a> RowBuilder<'a> {
    pub(crate) fn new(layout: &'a BlockLayout) -> Self {
        Self {
            layout,
            entries: Vec::new(),
        }
    }

    /// Sets column `column` of `block`; zeros are not stored
    pub(crate) fn set(&mut self, block: Block, column: usize, value: f64) {
        let weighted = value * block.weight();
        if weighted != 0.0 {
            self.entries.push((self.layout.offset(block) + column, weighted));
        }
    }

    pub(crate) fn text(&mut self, block: Block, row: SparseRow) {
        for (column, value) in row {
            self.set(block, column, value);
        }
    }

    pub(crate) fn finish(mut self) -> SparseRow {
        self.entries.sort_by_key(|(column, _)| *column);
        self.entries
    }
}

fn joined(recipes: &[Recipe], field: impl Fn(&Recipe) -> &Vec<String>) -> Vec<String> {
    recipes.iter().map(|r| field(r).join(" ")).collect()
}
