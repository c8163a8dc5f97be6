use std::future::Future;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, Multipart, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    models::{DietaryFlag, ExtractedAttributes, Recipe, RecipeQuery, RecommendedRecipe},
    services::{
        extraction::resolve_category, recommendations, vision::FALLBACK_DESCRIPTION, EngineStats,
    },
};

use super::AppState;

const DEFAULT_SEARCH_LIMIT: usize = 20;
const IMAGE_FIELD: &str = "image";

// Request/Response types

/// Partial query as sent by clients. Numeric targets arrive as numbers or
/// numeric strings and are validated before anything is ranked.
#[derive(Debug, Default, Deserialize)]
pub struct RecommendRequest {
    pub category: Option<String>,
    pub dietary_preference: Option<String>,
    pub ingredients: Option<Vec<String>>,
    pub calories: Option<Value>,
    pub time: Option<Value>,
    pub keywords: Option<Vec<String>>,
    pub keywords_name: Option<Vec<String>>,
    pub top_n: Option<usize>,
}

impl RecommendRequest {
    fn into_query(self) -> AppResult<(RecipeQuery, Option<usize>)> {
        let query = RecipeQuery {
            category: self.category,
            dietary_preference: self.dietary_preference,
            ingredients: self.ingredients,
            calories: numeric_field("calories", self.calories)?,
            time: numeric_field("time", self.time)?,
            keywords: self.keywords,
            keyword_names: self.keywords_name,
        };
        Ok((query, self.top_n))
    }
}

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    pub text: Option<String>,
    pub top_n: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct RecommendResponse {
    pub recipes: Vec<RecommendedRecipe>,
}

#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    pub attributes: ExtractedAttributes,
    /// False when extraction failed and the text's words were used instead
    pub extracted: bool,
    pub recipes: Vec<RecommendedRecipe>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeImageResponse {
    /// What the photo was read as; the input to attribute extraction
    pub description: String,
    #[serde(flatten)]
    pub extraction: ExtractResponse,
}

#[derive(Debug, Serialize)]
pub struct FormDataResponse {
    pub categories: Vec<String>,
    pub dietary_preferences: Vec<String>,
}

/// `null`, absent and blank strings are absent; numbers and numeric
/// strings are accepted; everything else is a client error
fn numeric_field(field: &str, value: Option<Value>) -> AppResult<Option<f64>> {
    let invalid = |shown: &dyn std::fmt::Display| {
        AppError::InvalidQuery(format!("{} must be a number, got {}", field, shown))
    };

    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_f64().map(Some).ok_or_else(|| invalid(&n)),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| invalid(&format!("{:?}", s))),
        Some(other) => Err(invalid(&other)),
    }
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    body.map(|Json(value)| value)
        .map_err(|rejection| AppError::InvalidQuery(rejection.body_text()))
}

// Handlers

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let stats = state.engine.snapshot().await.stats();
    Json(json!({
        "status": "healthy",
        "recipes": stats.recipes,
        "built_at": stats.built_at,
    }))
}

/// Known categories and dietary flags, for building a query form
pub async fn form_data(State(state): State<AppState>) -> Json<FormDataResponse> {
    let engine = state.engine.snapshot().await;
    Json(FormDataResponse {
        categories: engine.index().categories.clone(),
        dietary_preferences: DietaryFlag::ALL.iter().map(ToString::to_string).collect(),
    })
}

/// Ranks the catalog against a partial query
pub async fn recommend(
    State(state): State<AppState>,
    body: Result<Json<RecommendRequest>, JsonRejection>,
) -> AppResult<Json<RecommendResponse>> {
    let (query, top_n) = json_body(body)?.into_query()?;
    let recipes = recommend_and_enrich(&state, query, top_n).await?;
    Ok(Json(RecommendResponse { recipes }))
}

/// Extracts attributes from free text, then recommends on them.
/// Extraction failures fall back to the text's words as keywords.
pub async fn extract_recipe_attributes(
    State(state): State<AppState>,
    body: Result<Json<ExtractRequest>, JsonRejection>,
) -> AppResult<Json<ExtractResponse>> {
    let request = json_body(body)?;
    let text = request
        .text
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::InvalidQuery("text is required".to_string()))?;

    let response = extract_and_recommend(&state, text, request.top_n).await?;
    Ok(Json(response))
}

/// Describes an uploaded food photo (multipart field `image`), then
/// extracts attributes from the description and recommends on them.
/// An optional `top_n` text field caps the result count.
pub async fn analyze_food_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<AnalyzeImageResponse>> {
    let mut image: Option<(Vec<u8>, String)> = None;
    let mut top_n: Option<usize> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidQuery(format!("multipart error: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(IMAGE_FIELD) => {
                if field.file_name().is_some_and(|name| name.trim().is_empty()) {
                    return Err(AppError::InvalidQuery("no image file selected".to_string()));
                }
                let mime_type = field.content_type().unwrap_or("image/jpeg").to_string();
                if !mime_type.starts_with("image/") {
                    return Err(AppError::InvalidQuery(format!(
                        "expected an image upload, got {}",
                        mime_type
                    )));
                }
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::InvalidQuery(format!("unreadable image: {}", e)))?;
                image = Some((bytes.to_vec(), mime_type));
            }
            Some("top_n") => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| AppError::InvalidQuery(format!("unreadable top_n: {}", e)))?;
                top_n = Some(raw.trim().parse().map_err(|_| {
                    AppError::InvalidQuery(format!("top_n must be a count, got {:?}", raw))
                })?);
            }
            _ => {}
        }
    }

    let (bytes, mime_type) = image
        .filter(|(bytes, _)| !bytes.is_empty())
        .ok_or_else(|| AppError::InvalidQuery("no image file provided".to_string()))?;

    let description = match within(
        state.settings.collaborator_timeout,
        "image description",
        state.describer.describe(&bytes, &mime_type),
    )
    .await
    {
        Ok(description) => description,
        Err(e) => {
            tracing::warn!(error = %e, "Image description failed, using generic description");
            FALLBACK_DESCRIPTION.to_string()
        }
    };

    let extraction = extract_and_recommend(&state, &description, top_n).await?;
    Ok(Json(AnalyzeImageResponse {
        description,
        extraction,
    }))
}

/// Case-insensitive name search
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Json<Vec<Recipe>> {
    let engine = state.engine.snapshot().await;
    let limit = params
        .limit
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .min(state.settings.max_top_n);
    let recipes = engine
        .catalog()
        .search_by_name(params.q.as_deref().unwrap_or_default(), limit)
        .into_iter()
        .cloned()
        .collect();
    Json(recipes)
}

/// Reloads the catalog and publishes a new engine
pub async fn reload(State(state): State<AppState>) -> AppResult<Json<EngineStats>> {
    let stats = state.engine.reload().await?;
    Ok(Json(stats))
}

/// Runs a collaborator call under `budget`; running out of time is a
/// collaborator failure like any other
async fn within<T>(
    budget: Duration,
    what: &str,
    call: impl Future<Output = AppResult<T>>,
) -> AppResult<T> {
    tokio::time::timeout(budget, call).await.map_err(|_| {
        AppError::ExternalCollaborator(format!("{} timed out after {:?}", what, budget))
    })?
}

/// Extraction with the keyword fallback, then recommendation
async fn extract_and_recommend(
    state: &AppState,
    text: &str,
    top_n: Option<usize>,
) -> AppResult<ExtractResponse> {
    let extraction = within(
        state.settings.collaborator_timeout,
        "attribute extraction",
        state.extractor.extract(text),
    )
    .await;

    let (attributes, extracted) = match extraction {
        Ok(attributes) => {
            let engine = state.engine.snapshot().await;
            (resolve_category(attributes, &engine.index().categories), true)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Attribute extraction failed, using raw keywords");
            (ExtractedAttributes::from_raw_text(text), false)
        }
    };

    let recipes = recommend_and_enrich(state, attributes.clone().into_query(), top_n).await?;
    Ok(ExtractResponse {
        attributes,
        extracted,
        recipes,
    })
}

async fn recommend_and_enrich(
    state: &AppState,
    query: RecipeQuery,
    top_n: Option<usize>,
) -> AppResult<Vec<RecommendedRecipe>> {
    let top_n = top_n
        .unwrap_or(state.settings.default_top_n)
        .min(state.settings.max_top_n);

    let ranked = state.engine.recommend(query, top_n).await?;
    let recipes =
        recommendations::assemble(ranked, state.images.clone(), state.settings.enrichment).await;

    tracing::info!(returned = recipes.len(), top_n, "Recommendations served");
    Ok(recipes)
}
