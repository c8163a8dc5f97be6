//! Food photo description
//!
//! API Flow:
//! 1. POST /v1beta/models/<model>:generateContent with the prompt and the
//!    photo as base64 inline data
//! 2. The first candidate's text is normalized into a short
//!    "<dish> with <ingredients>" description fed to attribute extraction

use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, AppResult};

const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Used when a photo yields no usable description
pub const FALLBACK_DESCRIPTION: &str = "food dish";

const PROMPT: &str = "Look at this food image and:
1. Identify the main dish/food item
2. List visible ingredients or components
3. Return ONLY a simple description in this format: [main dish] with [ingredients]
For example: \"pizza with cheese, tomatoes, basil\" or \"chocolate cake with frosting, berries\"";

/// Turns a food photo into a short text description
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ImageDescriber: Send + Sync {
    async fn describe(&self, image: &[u8], mime_type: &str) -> AppResult<String>;
}

/// Used when no vision key is configured
pub struct DisabledDescriber;

#[async_trait::async_trait]
impl ImageDescriber for DisabledDescriber {
    async fn describe(&self, _image: &[u8], _mime_type: &str) -> AppResult<String> {
        Err(AppError::ExternalCollaborator(
            "image description is not configured".to_string(),
        ))
    }
}

#[derive(Clone)]
pub struct GeminiDescriber {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    model: String,
}

impl GeminiDescriber {
    pub fn new(http_client: HttpClient, api_key: String, model: String) -> Self {
        Self::with_api_url(http_client, api_key, DEFAULT_API_URL.to_string(), model)
    }

    pub fn with_api_url(
        http_client: HttpClient,
        api_key: String,
        api_url: String,
        model: String,
    ) -> Self {
        Self {
            http_client,
            api_key,
            api_url,
            model,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[async_trait::async_trait]
impl ImageDescriber for GeminiDescriber {
    async fn describe(&self, image: &[u8], mime_type: &str) -> AppResult<String> {
        let url = format!(
            "{}/{}:generateContent",
            self.api_url.trim_end_matches('/'),
            self.model
        );
        let body = json!({
            "contents": [{
                "parts": [
                    {"text": PROMPT},
                    {"inline_data": {"mime_type": mime_type, "data": STANDARD.encode(image)}},
                ],
            }],
        });

        let response = self
            .http_client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ExternalCollaborator(format!("vision request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalCollaborator(format!(
                "vision API returned status {}: {}",
                status, body
            )));
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AppError::ExternalCollaborator(format!("vision response: {}", e)))?;

        let description = normalize_description(&first_text(generated));
        tracing::info!(description = %description, "Described food image");
        Ok(description)
    }
}

fn first_text(response: GenerateResponse) -> String {
    response
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .find_map(|p| p.text)
        .unwrap_or_default()
}

/// Lowercased, quotes stripped, [`FALLBACK_DESCRIPTION`] when blank
pub fn normalize_description(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| *c != '"' && *c != '\'')
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        FALLBACK_DESCRIPTION.to_string()
    } else {
        cleaned.to_string()
    }
}
