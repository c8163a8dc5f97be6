mod query;
mod recipe;

pub use query::{ExtractedAttributes, RecipeQuery};
pub use recipe::{DietaryFlag, DietaryFlags, Recipe, RecommendedRecipe};
