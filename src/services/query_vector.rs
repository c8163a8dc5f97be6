use crate::{
    error::AppError,
    models::{DietaryFlag, RecipeQuery},
    services::features::{Block, FeatureIndex, RowBuilder},
};

/// A query projected into the combined matrix's column space
#[derive(Debug, Clone, PartialEq)]
pub struct QueryVector {
    values: Vec<f64>,
    norm: f64,
}

impl QueryVector {
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn norm(&self) -> f64 {
        self.norm
    }

    /// True when no field contributed anything
    pub fn is_zero(&self) -> bool {
        self.norm == 0.0
    }
}

/// Builds the query vector block by block.
///
/// Every absent field leaves its block at zero. Unknown categories and
/// dietary flags are logged and ignored.
pub fn vectorize(index: &FeatureIndex, query: &RecipeQuery) -> QueryVector {
    let vectorizers = &index.vectorizers;
    let mut row = RowBuilder::new(&index.layout);

    if let Some(ingredients) = non_empty(&query.ingredients) {
        row.text(
            Block::Ingredients,
            vectorizers.ingredients.transform(&ingredients.join(" ")),
        );
    }

    if let Some(category) = query.category_filter() {
        match index.category_column(category) {
            Some(column) => row.set(Block::Category, column, 1.0),
            None => ignore_unknown(AppError::UnknownField {
                field: "category",
                value: category.to_string(),
            }),
        }
    }

    if let Some(preference) = query
        .dietary_preference
        .as_deref()
        .filter(|p| !p.trim().is_empty())
    {
        match preference.parse::<DietaryFlag>() {
            Ok(flag) => row.set(Block::Dietary, flag.index(), 1.0),
            Err(e) => ignore_unknown(e),
        }
    }

    if let Some(calories) = query.calories {
        row.set(Block::Calories, 0, index.scalers.calories.transform(calories));
    }
    if let Some(time) = query.time {
        row.set(Block::Time, 0, index.scalers.time.transform(time));
    }

    if let Some(keywords) = non_empty(&query.keywords) {
        row.text(
            Block::Keywords,
            vectorizers.keywords.transform(&keywords.join(" ")),
        );
    }
    if let Some(names) = non_empty(&query.keyword_names) {
        row.text(
            Block::KeywordNames,
            vectorizers.keyword_names.transform(&names.join(" ")),
        );
    }

    let mut values = vec![0.0; index.layout.width()];
    for (column, value) in row.finish() {
        values[column] = value;
    }
    let norm = values.iter().map(|v| v * v).sum::<f64>().sqrt();

    QueryVector { values, norm }
}

fn non_empty(list: &Option<Vec<String>>) -> Option<&Vec<String>> {
    list.as_ref().filter(|items| items.iter().any(|i| !i.trim().is_empty()))
}

fn ignore_unknown(error: AppError) {
    tracing::debug!(error = %error, "Ignoring unknown query field");
}
