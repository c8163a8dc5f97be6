use crate::services::{catalog::Catalog, features::FeatureIndex, query_vector::QueryVector};

/// Candidate pool examined per requested result
const SHORTLIST_FACTOR: usize = 3;

/// Everything besides the query vector that shapes a ranking
#[derive(Debug, Clone, Copy, Default)]
pub struct RankOptions<'a> {
    pub calorie_target: Option<f64>,
    pub time_target: Option<f64>,
    /// Exact category every result should have, when enough rows match
    pub category_filter: Option<&'a str>,
    pub top_n: usize,
}

/// A ranked catalog row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ranked {
    pub row: usize,
    pub score: f64,
}

/// Ranks the catalog against `query`.
///
/// Order is score descending, then rows matching the category filter, then
/// rating descending, then review count descending, then catalog row. Rows matching the category filter come
/// first; when fewer than `top_n` of the shortlist match, the remaining
/// shortlisted rows fill the gap in the same order.
pub fn rank(
    index: &FeatureIndex,
    catalog: &Catalog,
    query: &QueryVector,
    options: RankOptions<'_>,
) -> Vec<Ranked> {
    if options.top_n == 0 || catalog.is_empty() {
        return Vec::new();
    }

    let recipes = catalog.recipes();
    let matches_filter = |row: usize| {
        options
            .category_filter
            .map_or(true, |category| recipes[row].category == category)
    };

    let scores: Vec<f64> = (0..recipes.len())
        .map(|row| {
            if !matches_filter(row) {
                return 0.0;
            }
            let recipe = &recipes[row];
            let mut score = cosine(index, row, query);
            if let Some(target) = options.calorie_target {
                score *= proximity(recipe.calories, target, catalog.max_calories());
            }
            if let Some(target) = options.time_target {
                score *= proximity(recipe.total_time_minutes as f64, target, catalog.max_time());
            }
            score
        })
        .collect();

    let mut order: Vec<usize> = (0..recipes.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .total_cmp(&scores[a])
            // masked rows never outrank matching rows on an equal score
            .then_with(|| matches_filter(b).cmp(&matches_filter(a)))
            .then_with(|| recipes[b].rating.total_cmp(&recipes[a].rating))
            .then_with(|| recipes[b].review_count.cmp(&recipes[a].review_count))
    });

    let shortlist = &order[..order.len().min(options.top_n * SHORTLIST_FACTOR)];

    let mut selected: Vec<usize> = shortlist
        .iter()
        .copied()
        .filter(|&row| matches_filter(row))
        .take(options.top_n)
        .collect();

    if selected.len() < options.top_n {
        tracing::debug!(
            matching = selected.len(),
            wanted = options.top_n,
            "Filling results past the category filter"
        );
        let missing = options.top_n - selected.len();
        let fill: Vec<usize> = shortlist
            .iter()
            .copied()
            .filter(|row| !selected.contains(row))
            .take(missing)
            .collect();
        selected.extend(fill);
    }

    selected
        .into_iter()
        .map(|row| Ranked {
            row,
            score: scores[row],
        })
        .collect()
}

fn cosine(index: &FeatureIndex, row: usize, query: &QueryVector) -> f64 {
    let denominator = index.row_norms[row] * query.norm();
    if denominator == 0.0 {
        return 0.0;
    }
    index.matrix.row_dot(row, query.values()) / denominator
}

/// `1 - |value - target| / max` floored at 0, or 1 when the column max is 0
fn proximity(value: f64, target: f64, max: f64) -> f64 {
    if max <= 0.0 {
        return 1.0;
    }
    (1.0 - (value - target).abs() / max).max(0.0)
}
