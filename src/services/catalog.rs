use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::{
    error::{AppError, AppResult},
    models::{DietaryFlag, DietaryFlags, Recipe},
};

const COL_ID: &str = "RecipeId";
const COL_NAME: &str = "Name";
const COL_CATEGORY: &str = "RecipeCategory";
const COL_INGREDIENTS: &str = "RecipeIngredientParts";
const COL_KEYWORDS: &str = "Keywords";
const COL_KEYWORD_NAMES: &str = "keywords_name";
const COL_CALORIES: &str = "Calories";
const COL_TIME: &str = "TotalTime_minutes";
const COL_RATING: &str = "AggregatedRating";
const COL_REVIEWS: &str = "ReviewCount";
const COL_DESCRIPTION: &str = "Description";
const COL_QUANTITIES: &str = "RecipeIngredientQuantities";
const COL_INSTRUCTIONS: &str = "RecipeInstructions";
const COL_IMAGES: &str = "Images";

const REQUIRED_COLUMNS: [&str; 10] = [
    COL_ID,
    COL_NAME,
    COL_CATEGORY,
    COL_INGREDIENTS,
    COL_KEYWORDS,
    COL_KEYWORD_NAMES,
    COL_CALORIES,
    COL_TIME,
    COL_RATING,
    COL_REVIEWS,
];

/// The normalized recipe table
#[derive(Debug, Clone)]
pub struct Catalog {
    recipes: Vec<Recipe>,
    /// SHA-256 of the source bytes; keys the derived index cache
    fingerprint: String,
    max_calories: f64,
    max_time: f64,
}

impl Catalog {
    /// Reads and normalizes the catalog at `path`
    pub fn load_path(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            AppError::DataFormat(format!("cannot read catalog {}: {}", path.display(), e))
        })?;
        let catalog = Self::parse(&bytes)?;

        tracing::info!(
            path = %path.display(),
            recipes = catalog.len(),
            fingerprint = %catalog.fingerprint,
            "Catalog loaded"
        );

        Ok(catalog)
    }

    /// Parses catalog CSV bytes
    pub fn parse(bytes: &[u8]) -> AppResult<Self> {
        let fingerprint = format!("{:x}", Sha256::digest(bytes));

        let mut reader = csv::ReaderBuilder::new().from_reader(bytes);
        let headers = reader.headers()?.clone();
        let columns: HashMap<&str, usize> =
            headers.iter().enumerate().map(|(i, h)| (h, i)).collect();

        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|c| !columns.contains_key(c))
            .collect();
        if !missing.is_empty() {
            return Err(AppError::DataFormat(format!(
                "catalog is missing required columns: {}",
                missing.join(", ")
            )));
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?);
        }

        let field = |row: &csv::StringRecord, column: &str| -> String {
            columns
                .get(column)
                .and_then(|&i| row.get(i))
                .unwrap_or_default()
                .to_string()
        };

        let calories = impute_median(rows.iter().map(|r| parse_number(&field(r, COL_CALORIES))));
        let times = impute_median(rows.iter().map(|r| parse_number(&field(r, COL_TIME))));
        let ratings = impute_median(rows.iter().map(|r| parse_number(&field(r, COL_RATING))));
        let reviews = impute_median(rows.iter().map(|r| parse_number(&field(r, COL_REVIEWS))));

        let mut seen_ids = HashSet::new();
        let mut recipes = Vec::with_capacity(rows.len());

        for (row_number, row) in rows.iter().enumerate() {
            let raw_id = field(row, COL_ID);
            let id = parse_id(&raw_id).ok_or_else(|| {
                AppError::DataFormat(format!(
                    "row {}: RecipeId {:?} is not an integer",
                    row_number + 1,
                    raw_id
                ))
            })?;
            if !seen_ids.insert(id) {
                return Err(AppError::DataFormat(format!(
                    "row {}: duplicate RecipeId {}",
                    row_number + 1,
                    id
                )));
            }

            let mut dietary = DietaryFlags::default();
            for flag in DietaryFlag::ALL {
                dietary.set(flag, parse_bool(&field(row, flag.column())));
            }

            recipes.push(Recipe {
                id,
                name: field(row, COL_NAME).trim().to_string(),
                category: field(row, COL_CATEGORY).trim().to_string(),
                ingredients: parse_list(&field(row, COL_INGREDIENTS)),
                keywords: parse_list(&field(row, COL_KEYWORDS)),
                keyword_names: parse_list(&field(row, COL_KEYWORD_NAMES)),
                calories: calories.values[row_number],
                total_time_minutes: times.values[row_number].round() as u32,
                rating: ratings.values[row_number],
                review_count: reviews.values[row_number].round() as u32,
                description: field(row, COL_DESCRIPTION).trim().to_string(),
                ingredient_quantities: parse_list(&field(row, COL_QUANTITIES)),
                instructions: parse_list(&field(row, COL_INSTRUCTIONS)),
                dietary,
                image_hints: parse_list(&field(row, COL_IMAGES)),
            });
        }

        let imputed = calories.imputed + times.imputed + ratings.imputed + reviews.imputed;
        if imputed > 0 {
            tracing::warn!(
                calories = calories.imputed,
                time = times.imputed,
                rating = ratings.imputed,
                reviews = reviews.imputed,
                "Imputed unparseable numeric values with column medians"
            );
        }

        Ok(Self::from_recipes(recipes, fingerprint))
    }

    /// Builds a catalog from already-normalized recipes
    pub fn from_recipes(recipes: Vec<Recipe>, fingerprint: String) -> Self {
        let max_calories = recipes.iter().map(|r| r.calories).fold(0.0, f64::max);
        let max_time = recipes
            .iter()
            .map(|r| r.total_time_minutes as f64)
            .fold(0.0, f64::max);

        Self {
            recipes,
            fingerprint,
            max_calories,
            max_time,
        }
    }

    pub fn recipes(&self) -> &[Recipe] {
        &self.recipes
    }

    pub fn get(&self, row: usize) -> Option<&Recipe> {
        self.recipes.get(row)
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn max_calories(&self) -> f64 {
        self.max_calories
    }

    pub fn max_time(&self) -> f64 {
        self.max_time
    }

    /// Case-insensitive substring search over recipe names, in catalog order
    pub fn search_by_name(&self, query: &str, limit: usize) -> Vec<&Recipe> {
        let needle = query.trim().to_lowercase();
        self.recipes
            .iter()
            .filter(|r| needle.is_empty() || r.name.to_lowercase().contains(&needle))
            .take(limit)
            .collect()
    }
}

struct ImputedColumn {
    values: Vec<f64>,
    imputed: usize,
}

/// Replaces missing values with the median of the parsed ones
fn impute_median(parsed: impl Iterator<Item = Option<f64>>) -> ImputedColumn {
    let parsed: Vec<Option<f64>> = parsed.collect();
    let mut present: Vec<f64> = parsed.iter().flatten().copied().collect();
    present.sort_by(|a, b| a.total_cmp(b));

    let median = match present.len() {
        0 => 0.0,
        n if n % 2 == 1 => present[n / 2],
        n => (present[n / 2 - 1] + present[n / 2]) / 2.0,
    };

    let imputed = parsed.iter().filter(|v| v.is_none()).count();
    ImputedColumn {
        values: parsed.into_iter().map(|v| v.unwrap_or(median)).collect(),
        imputed,
    }
}

/// Finite, non-negative number or `None`
fn parse_number(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

fn parse_id(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    raw.parse::<i64>().ok().or_else(|| {
        // pandas exports write integer ids as "38.0"
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && v.fract() == 0.0)
            .map(|v| v as i64)
    })
}

fn parse_bool(raw: &str) -> bool {
    let raw = raw.trim().to_lowercase();
    match raw.as_str() {
        "true" | "t" | "yes" | "y" => true,
        _ => raw.parse::<f64>().map(|v| v != 0.0 && !v.is_nan()).unwrap_or(false),
    }
}

/// Parses a stored list literal.
///
/// Understands Python (`['a', "b"]`), R (`c("a", "b")`, `character(0)`) and
/// JSON array spellings. Anything else becomes a one-element list, or an
/// empty list when blank.
pub fn parse_list(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "character(0)" || is_null_token(trimmed) {
        return Vec::new();
    }

    let inner = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .or_else(|| trimmed.strip_prefix("c(").and_then(|s| s.strip_suffix(')')));

    match inner.and_then(parse_items) {
        Some(items) => items,
        None => vec![trimmed.to_string()],
    }
}

fn is_null_token(token: &str) -> bool {
    matches!(token, "NA" | "None" | "null" | "nan" | "NaN")
}

/// Splits a comma-separated sequence of quoted or bare items
fn parse_items(inner: &str) -> Option<Vec<String>> {
    let mut items = Vec::new();
    let mut chars = inner.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        let Some(&first) = chars.peek() else {
            break;
        };

        if first == '\'' || first == '"' {
            chars.next();
            let mut item = String::new();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '\\' => item.push(chars.next()?),
                    c if c == first => {
                        closed = true;
                        break;
                    }
                    c => item.push(c),
                }
            }
            if !closed {
                return None;
            }
            items.push(item);
        } else {
            let mut bare = String::new();
            while let Some(&c) = chars.peek() {
                if c == ',' {
                    break;
                }
                bare.push(c);
                chars.next();
            }
            let bare = bare.trim();
            if bare.contains('\'') || bare.contains('"') {
                return None;
            }
            if !bare.is_empty() && !is_null_token(bare) {
                items.push(bare.to_string());
            }
        }

        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        match chars.next() {
            Some(',') | None => {}
            Some(_) => return None,
        }
    }

    Some(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "RecipeId,Name,RecipeCategory,RecipeIngredientParts,Keywords,keywords_name,Calories,TotalTime_minutes,AggregatedRating,ReviewCount,is_vegan";

    #[test]
    fn test_parse_list_python_literal() {
        assert_eq!(
            parse_list("['blueberries', \"granulated sugar\"]"),
            vec!["blueberries", "granulated sugar"]
        );
    }

    #[test]
    fn test_parse_list_r_literal() {
        assert_eq!(
            parse_list("c(\"Dessert\", \"Low Protein\", NA)"),
            vec!["Dessert", "Low Protein"]
        );
        assert!(parse_list("character(0)").is_empty());
    }

    #[test]
    fn test_parse_list_escaped_quote() {
        assert_eq!(parse_list(r#"['baker\'s chocolate']"#), vec!["baker's chocolate"]);
    }

    #[test]
    fn test_parse_list_scalar_becomes_single_element() {
        assert_eq!(parse_list("  chicken  "), vec!["chicken"]);
        assert_eq!(parse_list("['unterminated"), vec!["['unterminated"]);
        assert!(parse_list("").is_empty());
        assert!(parse_list("[]").is_empty());
    }

    #[test]
    fn test_numeric_columns_imputed_with_median() {
        let csv = format!(
            "{HEADER}\n\
             1,A,Soup,[],[],[],100,10,4.0,2,1\n\
             2,B,Soup,[],[],[],abc,20,,4,0\n\
             3,C,Soup,[],[],[],300,,5.0,x,\n\
             4,D,Soup,[],[],[],500,40,3.0,8,true\n"
        );
        let catalog = Catalog::parse(csv.as_bytes()).unwrap();
        let r = catalog.recipes();

        // median of 100, 300, 500
        assert_eq!(r[1].calories, 300.0);
        // median of 10, 20, 40
        assert_eq!(r[2].total_time_minutes, 20);
        // median of 4.0, 5.0, 3.0
        assert_eq!(r[1].rating, 4.0);
        // median of 2, 4, 8
        assert_eq!(r[2].review_count, 4);
        assert_eq!(catalog.max_calories(), 500.0);
        assert_eq!(catalog.max_time(), 40.0);
    }

    #[test]
    fn test_dietary_flags_default_false() {
        let csv = format!(
            "{HEADER}\n\
             1,A,Soup,[],[],[],100,10,4.0,2,1.0\n\
             2,B,Soup,[],[],[],100,10,4.0,2,\n"
        );
        let catalog = Catalog::parse(csv.as_bytes()).unwrap();
        assert!(catalog.recipes()[0].dietary.has(DietaryFlag::Vegan));
        assert!(!catalog.recipes()[1].dietary.has(DietaryFlag::Vegan));
        // column absent entirely
        assert!(!catalog.recipes()[0].dietary.has(DietaryFlag::Keto));
    }

    #[test]
    fn test_missing_required_column_is_data_format_error() {
        let csv = "RecipeId,Name\n1,A\n";
        let err = Catalog::parse(csv.as_bytes()).unwrap_err();
        match err {
            AppError::DataFormat(msg) => {
                assert!(msg.contains("RecipeCategory"));
                assert!(msg.contains("Calories"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let csv = format!(
            "{HEADER}\n\
             7,A,Soup,[],[],[],100,10,4.0,2,0\n\
             7.0,B,Soup,[],[],[],100,10,4.0,2,0\n"
        );
        assert!(matches!(
            Catalog::parse(csv.as_bytes()),
            Err(AppError::DataFormat(_))
        ));
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = format!("{HEADER}\n1,A,Soup,[],[],[],100,10,4.0,2,0\n");
        let b = format!("{HEADER}\n1,A,Soup,[],[],[],101,10,4.0,2,0\n");
        let ca = Catalog::parse(a.as_bytes()).unwrap();
        let ca2 = Catalog::parse(a.as_bytes()).unwrap();
        let cb = Catalog::parse(b.as_bytes()).unwrap();
        assert_eq!(ca.fingerprint(), ca2.fingerprint());
        assert_ne!(ca.fingerprint(), cb.fingerprint());
    }

    #[test]
    fn test_search_by_name() {
        let csv = format!(
            "{HEADER}\n\
             1,Chicken Soup,Soup,[],[],[],100,10,4.0,2,0\n\
             2,Tomato Salad,Salad,[],[],[],100,10,4.0,2,0\n\
             3,chicken curry,Curries,[],[],[],100,10,4.0,2,0\n"
        );
        let catalog = Catalog::parse(csv.as_bytes()).unwrap();
        let ids: Vec<i64> = catalog.search_by_name("CHICKEN", 10).iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(catalog.search_by_name("", 2).len(), 2);
    }
}
