use reqwest::Url;

use super::ImageSource;

const PLACEHOLDER_URL: &str = "https://placehold.co/600x400";

/// Serves the image URLs stored in the catalog row
pub struct HintImageSource;

#[async_trait::async_trait]
impl ImageSource for HintImageSource {
    async fn find_images(&self, _name: &str, hints: &[String], count: usize) -> Vec<String> {
        hints
            .iter()
            .map(|hint| hint.trim())
            .filter(|hint| hint.starts_with("https://") || hint.starts_with("http://"))
            .take(count)
            .map(str::to_string)
            .collect()
    }

    fn name(&self) -> &'static str {
        "hints"
    }
}

/// Deterministic placeholder images labelled with the recipe name.
/// Meant as the last source of a chain.
pub struct PlaceholderImageSource;

impl PlaceholderImageSource {
    fn url(name: &str) -> Option<String> {
        let mut url = Url::parse(PLACEHOLDER_URL).ok()?;
        url.query_pairs_mut().append_pair("text", name.trim());
        Some(url.to_string())
    }
}

#[async_trait::async_trait]
impl ImageSource for PlaceholderImageSource {
    async fn find_images(&self, name: &str, _hints: &[String], count: usize) -> Vec<String> {
        // a single URL; the fallback chain drops duplicates anyway
        Self::url(name)
            .filter(|_| count > 0)
            .into_iter()
            .collect()
    }

    fn name(&self) -> &'static str {
        "placeholder"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hints_keep_only_http_urls() {
        let hints = vec![
            "https://img.example/1.jpg".to_string(),
            "character(0)".to_string(),
            " http://img.example/2.png ".to_string(),
            "https://img.example/3.jpg".to_string(),
        ];
        let found = HintImageSource.find_images("Soup", &hints, 2).await;
        assert_eq!(
            found,
            vec!["https://img.example/1.jpg", "http://img.example/2.png"]
        );
    }

    #[tokio::test]
    async fn test_placeholder_encodes_name() {
        let found = PlaceholderImageSource
            .find_images("Mom's Chili & Rice", &[], 3)
            .await;
        assert_eq!(found.len(), 1);
        assert!(found[0].starts_with("https://placehold.co/600x400?text="));
        assert!(found[0].contains("Chili+%26+Rice"));
    }

    #[test]
    fn test_placeholder_respects_zero_count() {
        let found = tokio_test::block_on(PlaceholderImageSource.find_images("Soup", &[], 0));
        assert!(found.is_empty());
    }
}
