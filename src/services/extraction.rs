//! Free-text → recipe attribute extraction
//!
//! The extractor itself is a black box (an LLM behind a chat-completions
//! API). This module only shapes the request, tolerates the loosely typed
//! answer, and snaps the extracted category onto the catalog's vocabulary.

use reqwest::Client as HttpClient;
use serde::{Deserialize, Deserializer};
use serde_json::json;

use crate::{
    error::{AppError, AppResult},
    models::ExtractedAttributes,
};

const MAX_TOKENS: u32 = 150;
/// Minimum normalized edit similarity for a fuzzy category match
const CATEGORY_SIMILARITY_CUTOFF: f64 = 0.6;

const SYSTEM_PROMPT: &str = "You extract recipe attributes from user input and answer with a single JSON object only.";

const INSTRUCTIONS: &str = r#"From the given text, identify:
- "category": the dish or type of recipe (like "chicken soup"), or "" if none.
- "calories": target calories as a number, or "" if not mentioned.
- "time": cooking time in minutes as a number, or "" if not mentioned.
- "keywords": important words related to the recipe. For uncommon dishes add descriptive traits (cuisine, course, main ingredient).
- "keywords_name": individual words from the category or name, plus related categories for uncommon dishes.

Input: "biryani"
Output: {"category": "biryani", "calories": "", "time": "", "keywords": ["rice", "indian", "spicy", "main course", "one dish meal"], "keywords_name": ["rice", "indian", "spicy"]}

Input: "I wish to cook chicken soup which contains around 200 calories within 30 mins"
Output: {"category": "chicken soup", "calories": "200", "time": "30", "keywords": ["chicken", "soup", "200 calories", "30 mins"], "keywords_name": ["chicken", "soup"]}

Input: "need something gluten free"
Output: {"category": "gluten free", "calories": "", "time": "", "keywords": ["gluten free"], "keywords_name": ["gluten", "free"]}

Input: "give some recipes involving almonds or dry fruits"
Output: {"category": "", "calories": "", "time": "", "keywords": ["almonds", "dry fruits"], "keywords_name": ["almonds", "dry fruits"]}
"#;

/// Turns free text into structured recipe attributes
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait AttributeExtractor: Send + Sync {
    async fn extract(&self, text: &str) -> AppResult<ExtractedAttributes>;
}

/// Used when no API key is configured; always fails so callers take the
/// degraded path
pub struct DisabledExtractor;

#[async_trait::async_trait]
impl AttributeExtractor for DisabledExtractor {
    async fn extract(&self, _text: &str) -> AppResult<ExtractedAttributes> {
        Err(AppError::ExternalCollaborator(
            "attribute extraction is not configured".to_string(),
        ))
    }
}

#[derive(Clone)]
pub struct OpenAiExtractor {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    model: String,
}

impl OpenAiExtractor {
    pub fn new(http_client: HttpClient, api_key: String, api_url: String, model: String) -> Self {
        Self {
            http_client,
            api_key,
            api_url,
            model,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[async_trait::async_trait]
impl AttributeExtractor for OpenAiExtractor {
    async fn extract(&self, text: &str) -> AppResult<ExtractedAttributes> {
        let prompt = format!("{}\nNow process this input:\nInput: {:?}\nOutput:", INSTRUCTIONS, text);
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "max_tokens": MAX_TOKENS,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt},
            ],
        });

        let response = self
            .http_client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ExternalCollaborator(format!("extractor request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalCollaborator(format!(
                "extractor returned status {}: {}",
                status, body
            )));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::ExternalCollaborator(format!("extractor response: {}", e)))?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AppError::ExternalCollaborator("extractor returned no content".to_string()))?;

        let attributes = parse_attributes(&content)?;
        tracing::info!(
            category = ?attributes.category,
            calories = ?attributes.calories,
            time = ?attributes.time,
            keywords = attributes.keywords.len(),
            "Extracted recipe attributes"
        );
        Ok(attributes)
    }
}

#[derive(Debug, Deserialize)]
struct RawAttributes {
    #[serde(default)]
    category: Option<String>,
    #[serde(default, deserialize_with = "loose_number")]
    calories: Option<f64>,
    #[serde(default, deserialize_with = "loose_number")]
    time: Option<f64>,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    keywords_name: Vec<String>,
}

/// Accepts `200`, `"200"`, `"200 calories"`, `""` and `null`
fn loose_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => leading_number(&s),
        _ => None,
    })
}

fn leading_number(s: &str) -> Option<f64> {
    let trimmed = s.trim_start();
    let end = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    trimmed[..end].parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parses the model's answer, tolerating prose or code fences around the
/// JSON object
fn parse_attributes(content: &str) -> AppResult<ExtractedAttributes> {
    let json = match (content.find('{'), content.rfind('}')) {
        (Some(start), Some(end)) if start < end => &content[start..=end],
        _ => {
            return Err(AppError::ExternalCollaborator(format!(
                "extractor answer is not JSON: {}",
                content
            )))
        }
    };

    let raw: RawAttributes = serde_json::from_str(json)
        .map_err(|e| AppError::ExternalCollaborator(format!("extractor answer: {}", e)))?;

    Ok(ExtractedAttributes {
        category: raw.category.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
        calories: raw.calories,
        time: raw.time,
        keywords: raw.keywords,
        keyword_names: raw.keywords_name,
    })
}

/// Snaps the extracted category onto one of `known` labels.
///
/// When the category resolves to a different label, the keyword names are
/// replaced by that label's words. An unresolvable category is dropped and
/// the keywords are kept as the only signal.
pub fn resolve_category(mut attributes: ExtractedAttributes, known: &[String]) -> ExtractedAttributes {
    let Some(original) = attributes.category.take() else {
        return attributes;
    };

    match closest_category(&original, known) {
        Some(label) => {
            if !label.eq_ignore_ascii_case(&original) {
                attributes.keyword_names = label
                    .split_whitespace()
                    .map(|word| word.to_lowercase())
                    .collect();
            }
            attributes.category = Some(label.to_string());
        }
        None => {
            tracing::debug!(category = %original, "Extracted category matches no catalog category");
        }
    }
    attributes
}

/// Exact (case-insensitive) match, then the first label containing a word
/// of `category`, then the most similar label above the cutoff
fn closest_category<'a>(category: &str, known: &'a [String]) -> Option<&'a str> {
    let wanted = category.trim().to_lowercase();
    if wanted.is_empty() {
        return None;
    }

    if let Some(label) = known.iter().find(|label| label.to_lowercase() == wanted) {
        return Some(label.as_str());
    }

    for word in wanted.split_whitespace().filter(|w| w.len() >= 3) {
        if let Some(label) = known.iter().find(|label| label.to_lowercase().contains(word)) {
            return Some(label.as_str());
        }
    }

    known
        .iter()
        .map(|label| (label, similarity(&wanted, &label.to_lowercase())))
        .filter(|(_, score)| *score >= CATEGORY_SIMILARITY_CUTOFF)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(label, _)| label.as_str())
}

/// `1 - levenshtein(a, b) / max(len)`
fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    1.0 - previous[b.len()] as f64 / longest as f64
}
