use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::middleware::{make_span_with_request_id, request_id_middleware};

use super::handlers;
use super::AppState;

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    let settings = state.settings.clone();

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", api_routes(settings.max_image_bytes))
        .with_state(state)
        .layer(TimeoutLayer::new(settings.request_timeout))
        .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
        .layer(cors_layer(&settings.cors_origin))
        // outermost, so spans and responses see the id
        .layer(from_fn(request_id_middleware))
}

/// API routes under /api/v1
fn api_routes(max_image_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/form-data", get(handlers::form_data))
        .route("/recommend", post(handlers::recommend))
        .route(
            "/extract-recipe-attributes",
            post(handlers::extract_recipe_attributes),
        )
        .route(
            "/analyze-food-image",
            post(handlers::analyze_food_image).layer(DefaultBodyLimit::max(max_image_bytes)),
        )
        .route("/search", get(handlers::search))
        .route("/admin/reload", post(handlers::reload))
}

/// `*` allows any origin; anything else is a single allowed origin
fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    match origin.trim() {
        "*" => layer.allow_origin(Any),
        origin => match HeaderValue::from_str(origin) {
            Ok(value) => layer.allow_origin(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Invalid CORS origin, allowing none");
                layer
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;

    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    use crate::{
        api::ApiSettings,
        services::{
            extraction::MockAttributeExtractor, features::tests::recipe, images::MockImageSource,
            Catalog, Engine, EngineHandle,
        },
    };

    fn router() -> Router {
        let engine = Engine::from_catalog(Catalog::from_recipes(
            vec![recipe(1, "Soup", 200.0, 4.5, 10)],
            "routes".into(),
        ));
        let state = AppState::new(
            EngineHandle::new(engine, PathBuf::from("unused.csv"), None),
            Arc::new(MockImageSource::new()),
            Arc::new(MockAttributeExtractor::new()),
            ApiSettings::default(),
        );
        create_router(state)
    }

    #[tokio::test]
    async fn test_cors_preflight_allows_configured_origin() {
        let response = router()
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/v1/recommend")
                    .header("origin", "http://localhost:3000")
                    .header("access-control-request-method", "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "http://localhost:3000"
        );
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let response = router()
            .oneshot(Request::builder().uri("/api/v2/recommend").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[test]
    fn test_cors_layer_accepts_wildcard_and_bad_origins() {
        let _ = cors_layer("*");
        let _ = cors_layer("not a header value\n");
    }
}
