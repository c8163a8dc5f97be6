use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// A partial recipe query. Every field is optional; an absent field
/// contributes a zero block to the query vector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipeQuery {
    pub category: Option<String>,
    /// Single flag name from the dietary set
    pub dietary_preference: Option<String>,
    pub ingredients: Option<Vec<String>>,
    /// Target calories
    pub calories: Option<f64>,
    /// Target total time in minutes
    pub time: Option<f64>,
    pub keywords: Option<Vec<String>>,
    pub keyword_names: Option<Vec<String>>,
}

impl RecipeQuery {
    /// Category filter for ranking: the query category, if non-blank
    pub fn category_filter(&self) -> Option<&str> {
        self.category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    /// Rejects numeric targets that cannot be scored
    pub fn validate(&self) -> AppResult<()> {
        for (field, value) in [("calories", self.calories), ("time", self.time)] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(AppError::InvalidQuery(format!(
                        "{} must be a non-negative number, got {}",
                        field, v
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Structured attributes pulled out of free text by an extractor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedAttributes {
    pub category: Option<String>,
    pub calories: Option<f64>,
    pub time: Option<f64>,
    pub keywords: Vec<String>,
    pub keyword_names: Vec<String>,
}

impl ExtractedAttributes {
    /// Fallback used when extraction fails: the words of the text as keywords
    pub fn from_raw_text(text: &str) -> Self {
        Self {
            keywords: text
                .split_whitespace()
                .map(|word| word.to_lowercase())
                .collect(),
            ..Default::default()
        }
    }

    pub fn into_query(self) -> RecipeQuery {
        let non_empty = |list: Vec<String>| {
            let list: Vec<String> = list
                .into_iter()
                .filter(|item| !item.trim().is_empty())
                .collect();
            (!list.is_empty()).then_some(list)
        };

        RecipeQuery {
            category: self.category.filter(|c| !c.trim().is_empty()),
            dietary_preference: None,
            ingredients: None,
            calories: self.calories,
            time: self.time,
            keywords: non_empty(self.keywords),
            keyword_names: non_empty(self.keyword_names),
        }
    }
}
