use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    /// Malformed catalog or index artifact. Fatal at startup.
    #[error("Data format error: {0}")]
    DataFormat(String),

    /// Query names a category or dietary flag outside the fitted vocabulary.
    /// Callers log and ignore it; it is never returned to a client.
    #[error("Unknown {field}: {value}")]
    UnknownField { field: &'static str, value: String },

    /// Extractor or image lookup failure. Always recovered with a degraded default.
    #[error("External collaborator error: {0}")]
    ExternalCollaborator(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<csv::Error> for AppError {
    fn from(e: csv::Error) -> Self {
        AppError::DataFormat(e.to_string())
    }
}

impl From<bincode::Error> for AppError {
    fn from(e: bincode::Error) -> Self {
        AppError::DataFormat(format!("index artifact: {}", e))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::InvalidQuery(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::UnknownField { .. } => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::ExternalCollaborator(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::HttpClient(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            AppError::DataFormat(_)
            | AppError::Io(_)
            | AppError::Cache(_)
            | AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
