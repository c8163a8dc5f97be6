use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Recipe catalog CSV
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,

    /// Directory holding the derived index artifacts. Empty disables caching.
    #[serde(default = "default_index_cache_dir")]
    pub index_cache_dir: String,

    /// Redis connection URL for the image cache
    pub redis_url: Option<String>,

    /// OpenAI API key for attribute extraction
    pub openai_api_key: Option<String>,

    #[serde(default = "default_openai_api_url")]
    pub openai_api_url: String,

    #[serde(default = "default_openai_model")]
    pub openai_model: String,

    /// Google API key for food photo description
    pub google_api_key: Option<String>,

    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,

    /// Budget for one extractor or vision call before falling back
    #[serde(default = "default_collaborator_timeout_secs")]
    pub collaborator_timeout_secs: u64,

    /// Largest accepted food photo upload
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: usize,

    /// Per-recipe image lookup budget
    #[serde(default = "default_image_lookup_timeout_ms")]
    pub image_lookup_timeout_ms: u64,

    #[serde(default = "default_images_per_recipe")]
    pub images_per_recipe: usize,

    /// HEAD-check candidate image URLs before returning them
    #[serde(default = "default_verify_images")]
    pub verify_images: bool,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_top_n")]
    pub max_top_n: usize,

    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("data/recipes.csv")
}

fn default_index_cache_dir() -> String {
    "data/index".to_string()
}

fn default_openai_api_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_openai_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_gemini_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_collaborator_timeout_secs() -> u64 {
    10
}

fn default_max_image_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_image_lookup_timeout_ms() -> u64 {
    4000
}

fn default_images_per_recipe() -> usize {
    3
}

fn default_verify_images() -> bool {
    true
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_top_n() -> usize {
    50
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    /// Index cache directory, or `None` when caching is disabled
    pub fn index_dir(&self) -> Option<PathBuf> {
        let dir = self.index_cache_dir.trim();
        if dir.is_empty() {
            None
        } else {
            Some(PathBuf::from(dir))
        }
    }

    pub fn image_lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.image_lookup_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_secs(self.collaborator_timeout_secs)
    }
}
