use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

use crate::error::AppError;

/// Dietary flags carried by every recipe, in feature-column order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DietaryFlag {
    Vegetarian,
    Vegan,
    GlutenFree,
    DairyFree,
    LowCarb,
    Keto,
    Paleo,
}

impl DietaryFlag {
    /// All flags in the fixed dietary block order
    pub const ALL: [DietaryFlag; 7] = [
        DietaryFlag::Vegetarian,
        DietaryFlag::Vegan,
        DietaryFlag::GlutenFree,
        DietaryFlag::DairyFree,
        DietaryFlag::LowCarb,
        DietaryFlag::Keto,
        DietaryFlag::Paleo,
    ];

    /// Position of this flag inside the dietary block
    pub fn index(self) -> usize {
        self as usize
    }

    /// Catalog column holding this flag
    pub fn column(self) -> &'static str {
        match self {
            DietaryFlag::Vegetarian => "is_vegetarian",
            DietaryFlag::Vegan => "is_vegan",
            DietaryFlag::GlutenFree => "is_gluten free",
            DietaryFlag::DairyFree => "is_dairy free",
            DietaryFlag::LowCarb => "is_low carb",
            DietaryFlag::Keto => "is_keto",
            DietaryFlag::Paleo => "is_paleo",
        }
    }

    fn label(self) -> &'static str {
        // column name without the "is_" prefix
        &self.column()[3..]
    }
}

impl Display for DietaryFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for DietaryFlag {
    type Err = AppError;

    /// Accepts `is_gluten free`, `gluten_free`, `Gluten-Free` and `gluten free`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        let bare = lowered.strip_prefix("is_").unwrap_or(&lowered);
        let normalized = bare
            .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        DietaryFlag::ALL
            .into_iter()
            .find(|flag| flag.label() == normalized)
            .ok_or_else(|| AppError::UnknownField {
                field: "dietary preference",
                value: s.to_string(),
            })
    }
}

/// The seven dietary booleans of a recipe
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DietaryFlags([bool; 7]);

impl DietaryFlags {
    pub fn new(values: [bool; 7]) -> Self {
        Self(values)
    }

    pub fn has(&self, flag: DietaryFlag) -> bool {
        self.0[flag.index()]
    }

    pub fn set(&mut self, flag: DietaryFlag, value: bool) {
        self.0[flag.index()] = value;
    }

    /// Flags that are set, in block order
    pub fn enabled(&self) -> Vec<DietaryFlag> {
        DietaryFlag::ALL
            .into_iter()
            .filter(|flag| self.has(*flag))
            .collect()
    }
}

/// A catalog row after type normalization
///
/// Serialized with the catalog's column names so clients built against the
/// CSV export keep working.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Recipe {
    #[serde(rename = "RecipeId")]
    pub id: i64,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "RecipeCategory")]
    pub category: String,
    #[serde(rename = "RecipeIngredientParts")]
    pub ingredients: Vec<String>,
    #[serde(rename = "Keywords")]
    pub keywords: Vec<String>,
    #[serde(rename = "keywords_name")]
    pub keyword_names: Vec<String>,
    #[serde(rename = "Calories")]
    pub calories: f64,
    #[serde(rename = "TotalTime_minutes")]
    pub total_time_minutes: u32,
    #[serde(rename = "AggregatedRating")]
    pub rating: f64,
    #[serde(rename = "ReviewCount")]
    pub review_count: u32,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "RecipeIngredientQuantities")]
    pub ingredient_quantities: Vec<String>,
    #[serde(rename = "RecipeInstructions")]
    pub instructions: Vec<String>,
    #[serde(serialize_with = "serialize_dietary")]
    pub dietary: DietaryFlags,
    /// Image URLs already present in the catalog
    #[serde(skip)]
    pub image_hints: Vec<String>,
}

fn serialize_dietary<S: serde::Serializer>(
    flags: &DietaryFlags,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(flags.enabled())
}

/// A ranked recipe as returned to clients
#[derive(Debug, Clone, Serialize)]
pub struct RecommendedRecipe {
    #[serde(flatten)]
    pub recipe: Recipe,
    pub score: f64,
    pub images: Vec<String>,
}
