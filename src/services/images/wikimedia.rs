//! Wikimedia Commons image search
//!
//! API Flow:
//! 1. Search: /w/api.php?action=query&list=search&srnamespace=6 → file titles
//! 2. Each title maps to a stable /wiki/Special:FilePath/<file> URL
//! 3. Optionally, a HEAD request checks the URL really serves an image

use reqwest::{header::CONTENT_TYPE, Client as HttpClient, Url};
use serde::Deserialize;

use crate::error::{AppError, AppResult};

use super::ImageSource;

const DEFAULT_API_URL: &str = "https://commons.wikimedia.org/w/api.php";
const FILE_PATH_URL: &str = "https://commons.wikimedia.org/wiki/Special:FilePath/";
const IMAGE_EXTENSIONS: [&str; 4] = [".jpg", ".jpeg", ".png", ".webp"];

#[derive(Debug, Deserialize)]
struct SearchResponse {
    query: Option<SearchQuery>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
}

#[derive(Clone)]
pub struct WikimediaImageSource {
    http_client: HttpClient,
    api_url: String,
    verify: bool,
}

impl WikimediaImageSource {
    pub fn new(http_client: HttpClient, verify: bool) -> Self {
        Self::with_api_url(http_client, DEFAULT_API_URL.to_string(), verify)
    }

    pub fn with_api_url(http_client: HttpClient, api_url: String, verify: bool) -> Self {
        Self {
            http_client,
            api_url,
            verify,
        }
    }

    async fn search(&self, name: &str, count: usize) -> AppResult<Vec<String>> {
        let search_term = format!("{} food", name.trim());
        // oversample, some hits are PDFs or fail verification
        let limit = (count * 3).to_string();

        let response = self
            .http_client
            .get(&self.api_url)
            .query(&[
                ("action", "query"),
                ("list", "search"),
                ("srnamespace", "6"),
                ("format", "json"),
                ("srsearch", search_term.as_str()),
                ("srlimit", limit.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalCollaborator(format!(
                "Wikimedia API returned status {}: {}",
                status, body
            )));
        }

        let body: SearchResponse = response.json().await?;
        Ok(file_urls(body))
    }

    /// HEAD-checks that `url` serves an image
    async fn is_image(&self, url: &str) -> bool {
        match self.http_client.head(url).send().await {
            Ok(response) => {
                response.status().is_success()
                    && response
                        .headers()
                        .get(CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .is_some_and(|v| v.starts_with("image/"))
            }
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Image verification failed");
                false
            }
        }
    }
}

/// Image file titles from a search response, as FilePath URLs
fn file_urls(response: SearchResponse) -> Vec<String> {
    response
        .query
        .map(|q| q.search)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|hit| {
            let file = hit.title.strip_prefix("File:")?.to_string();
            let lowered = file.to_lowercase();
            if !IMAGE_EXTENSIONS.iter().any(|ext| lowered.ends_with(ext)) {
                return None;
            }
            let mut url = Url::parse(FILE_PATH_URL).ok()?;
            url.path_segments_mut()
                .ok()?
                .pop()
                .push(&file.replace(' ', "_"));
            Some(url.to_string())
        })
        .collect()
}

#[async_trait::async_trait]
impl ImageSource for WikimediaImageSource {
    async fn find_images(&self, name: &str, _hints: &[String], count: usize) -> Vec<String> {
        if name.trim().is_empty() || count == 0 {
            return Vec::new();
        }

        let candidates = match self.search(name, count).await {
            Ok(urls) => urls,
            Err(e) => {
                tracing::warn!(recipe = %name, error = %e, "Wikimedia image search failed");
                return Vec::new();
            }
        };

        if !self.verify {
            return candidates.into_iter().take(count).collect();
        }

        let mut verified = Vec::with_capacity(count);
        for url in candidates {
            if verified.len() >= count {
                break;
            }
            if self.is_image(&url).await {
                verified.push(url);
            }
        }

        tracing::debug!(recipe = %name, found = verified.len(), "Wikimedia images verified");
        verified
    }

    fn name(&self) -> &'static str {
        "wikimedia"
    }
}
