use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::{
    multipart::{MultipartForm, Part},
    TestServer,
};
use serde_json::{json, Value};

use recipe_recommender::{
    api::{create_router, ApiSettings, AppState},
    error::{AppError, AppResult},
    models::ExtractedAttributes,
    services::{
        images::PlaceholderImageSource, AttributeExtractor, Catalog, Engine, EngineHandle,
        ImageDescriber,
    },
};

const CSV: &str = "RecipeId,Name,RecipeCategory,RecipeIngredientParts,Keywords,keywords_name,Calories,TotalTime_minutes,AggregatedRating,ReviewCount,is_vegan\n\
    1,Tomato Soup,Soup,\"['tomato', 'basil']\",\"['Easy']\",\"['tomato', 'soup']\",200,30,4.5,10,True\n\
    2,Lentil Soup,Soup,\"['lentils', 'onion']\",\"['Healthy']\",\"['lentil', 'soup']\",600,60,3.0,5,True\n\
    3,Greek Salad,Salad,\"['feta', 'tomato']\",\"['Easy']\",\"['greek', 'salad']\",210,15,5.0,50,False\n";

/// Returns a fixed set of attributes, or fails when none is given
struct StubExtractor(Option<ExtractedAttributes>);

#[async_trait::async_trait]
impl AttributeExtractor for StubExtractor {
    async fn extract(&self, _text: &str) -> AppResult<ExtractedAttributes> {
        self.0
            .clone()
            .ok_or_else(|| AppError::ExternalCollaborator("extractor offline".to_string()))
    }
}

/// Never answers within any sane budget
struct StallingExtractor;

#[async_trait::async_trait]
impl AttributeExtractor for StallingExtractor {
    async fn extract(&self, _text: &str) -> AppResult<ExtractedAttributes> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(ExtractedAttributes::default())
    }
}

/// Returns a fixed description, or fails when none is given
struct StubDescriber(Option<&'static str>);

#[async_trait::async_trait]
impl ImageDescriber for StubDescriber {
    async fn describe(&self, image: &[u8], mime_type: &str) -> AppResult<String> {
        assert!(!image.is_empty());
        assert!(mime_type.starts_with("image/"));
        self.0
            .map(str::to_string)
            .ok_or_else(|| AppError::ExternalCollaborator("vision offline".to_string()))
    }
}

fn test_engine() -> EngineHandle {
    let engine = Engine::from_catalog(Catalog::parse(CSV.as_bytes()).unwrap());
    EngineHandle::new(engine, PathBuf::from("unused.csv"), None)
}

fn state_with(engine: EngineHandle, extractor: Arc<dyn AttributeExtractor>) -> AppState {
    AppState::new(
        engine,
        Arc::new(PlaceholderImageSource),
        extractor,
        ApiSettings::default(),
    )
}

fn server_with(engine: EngineHandle, extractor: StubExtractor) -> TestServer {
    TestServer::new(create_router(state_with(engine, Arc::new(extractor)))).unwrap()
}

fn create_test_server(extractor: StubExtractor) -> TestServer {
    server_with(test_engine(), extractor)
}

fn image_form(bytes: &[u8]) -> MultipartForm {
    MultipartForm::new().add_part(
        "image",
        Part::bytes(bytes.to_vec())
            .file_name("dish.jpg")
            .mime_type("image/jpeg"),
    )
}

fn ids(body: &Value) -> Vec<i64> {
    body["recipes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["RecipeId"].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn test_health_check() {
    let server = create_test_server(StubExtractor(None));
    let response = server.get("/health").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["recipes"], 3);
}

#[tokio::test]
async fn test_form_data_lists_categories_and_flags() {
    let server = create_test_server(StubExtractor(None));
    let body: Value = server.get("/api/v1/form-data").await.json();

    assert_eq!(body["categories"], json!(["Salad", "Soup"]));
    let flags = body["dietary_preferences"].as_array().unwrap();
    assert_eq!(flags.len(), 7);
    assert!(flags.contains(&json!("vegan")));
}

#[tokio::test]
async fn test_recommend_filters_by_category_and_calories() {
    let server = create_test_server(StubExtractor(None));
    let response = server
        .post("/api/v1/recommend")
        .json(&json!({
            "category": "Soup",
            "calories": 210,
            "top_n": 2
        }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(ids(&body), vec![1, 2]);

    let first = &body["recipes"][0];
    assert_eq!(first["Name"], "Tomato Soup");
    assert!(first["score"].as_f64().unwrap() > 0.0);
    assert_eq!(first["images"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_recommend_accepts_numeric_strings() {
    let server = create_test_server(StubExtractor(None));
    let response = server
        .post("/api/v1/recommend")
        .json(&json!({"category": "soup", "calories": "210", "time": "30"}))
        .await;

    response.assert_status_ok();
    assert_eq!(ids(&response.json()), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_recommend_rejects_non_numeric_calories() {
    let server = create_test_server(StubExtractor(None));
    let response = server
        .post("/api/v1/recommend")
        .json(&json!({"calories": "abc"}))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("calories"));
}

#[tokio::test]
async fn test_recommend_rejects_malformed_body() {
    let server = create_test_server(StubExtractor(None));
    let response = server
        .post("/api/v1/recommend")
        .json(&json!({"ingredients": "tomato"}))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_extract_failure_still_recommends() {
    let server = create_test_server(StubExtractor(None));
    let response = server
        .post("/api/v1/extract-recipe-attributes")
        .json(&json!({"text": "Easy tomato soup"}))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["extracted"], false);
    assert_eq!(body["attributes"]["keywords"], json!(["easy", "tomato", "soup"]));
    assert_eq!(ids(&body).len(), 3);
}

#[tokio::test]
async fn test_stalled_extractor_falls_back_to_keywords() {
    let settings = ApiSettings {
        collaborator_timeout: Duration::from_millis(50),
        ..ApiSettings::default()
    };
    let state = AppState::new(
        test_engine(),
        Arc::new(PlaceholderImageSource),
        Arc::new(StallingExtractor),
        settings,
    );
    let server = TestServer::new(create_router(state)).unwrap();

    let response = server
        .post("/api/v1/extract-recipe-attributes")
        .json(&json!({"text": "greek salad"}))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["extracted"], false);
    assert_eq!(body["attributes"]["keywords"], json!(["greek", "salad"]));
    assert_eq!(ids(&body).len(), 3);
}

#[tokio::test]
async fn test_food_image_is_described_then_recommended() {
    let extractor = StubExtractor(Some(ExtractedAttributes {
        category: Some("soup".to_string()),
        keywords: vec!["tomato".to_string()],
        ..Default::default()
    }));
    let state = state_with(test_engine(), Arc::new(extractor))
        .with_describer(Arc::new(StubDescriber(Some("tomato soup with basil"))));
    let server = TestServer::new(create_router(state)).unwrap();

    let response = server
        .post("/api/v1/analyze-food-image")
        .multipart(image_form(b"\xff\xd8\xff fake jpeg").add_text("top_n", "2"))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["description"], "tomato soup with basil");
    assert_eq!(body["extracted"], true);
    assert_eq!(body["attributes"]["category"], "Soup");
    assert_eq!(ids(&body), vec![1, 2]);
}

#[tokio::test]
async fn test_food_image_without_vision_still_recommends() {
    let state = state_with(test_engine(), Arc::new(StubExtractor(None)))
        .with_describer(Arc::new(StubDescriber(None)));
    let server = TestServer::new(create_router(state)).unwrap();

    let response = server
        .post("/api/v1/analyze-food-image")
        .multipart(image_form(b"png-bytes"))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["description"], "food dish");
    assert_eq!(body["extracted"], false);
    assert_eq!(ids(&body).len(), 3);
}

#[tokio::test]
async fn test_food_image_requires_image_field() {
    let server = create_test_server(StubExtractor(None));
    let response = server
        .post("/api/v1/analyze-food-image")
        .multipart(MultipartForm::new().add_text("top_n", "2"))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_food_image_rejects_non_image_upload() {
    let server = create_test_server(StubExtractor(None));
    let form = MultipartForm::new().add_part(
        "image",
        Part::bytes(b"hello".to_vec())
            .file_name("notes.txt")
            .mime_type("text/plain"),
    );
    let response = server.post("/api/v1/analyze-food-image").multipart(form).await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_extract_resolves_category() {
    let server = create_test_server(StubExtractor(Some(ExtractedAttributes {
        category: Some("soups".to_string()),
        calories: Some(250.0),
        keywords: vec!["soup".to_string()],
        keyword_names: vec!["soup".to_string()],
        ..Default::default()
    })));
    let response = server
        .post("/api/v1/extract-recipe-attributes")
        .json(&json!({"text": "a light soup", "top_n": 2}))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["extracted"], true);
    assert_eq!(body["attributes"]["category"], "Soup");
    assert_eq!(ids(&body), vec![1, 2]);
}

#[tokio::test]
async fn test_extract_requires_text() {
    let server = create_test_server(StubExtractor(None));
    let response = server
        .post("/api/v1/extract-recipe-attributes")
        .json(&json!({"text": "   "}))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_search_by_name() {
    let server = create_test_server(StubExtractor(None));
    let response = server
        .get("/api/v1/search")
        .add_query_param("q", "soup")
        .await;

    response.assert_status_ok();
    let recipes: Vec<Value> = response.json();
    let names: Vec<&str> = recipes.iter().map(|r| r["Name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["Tomato Soup", "Lentil Soup"]);
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let server = create_test_server(StubExtractor(None));
    let id = "67e55044-10b1-426f-9247-bb680e5fe0c8";
    let response = server
        .get("/health")
        .add_header(
            HeaderName::from_static("x-request-id"),
            HeaderValue::from_static(id),
        )
        .await;

    assert_eq!(response.headers().get("x-request-id").unwrap(), id);
}

#[tokio::test]
async fn test_request_id_is_generated() {
    let server = create_test_server(StubExtractor(None));
    let response = server.get("/health").await;

    let value = response.headers().get("x-request-id").unwrap().to_str().unwrap();
    assert!(uuid::Uuid::parse_str(value).is_ok());
}

#[tokio::test]
async fn test_admin_reload_publishes_new_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("recipes.csv");
    std::fs::write(&path, CSV).unwrap();

    let engine = EngineHandle::start(path.clone(), None).await.unwrap();
    let server = server_with(engine, StubExtractor(None));

    let mut grown = CSV.to_string();
    grown.push_str("4,Caesar Salad,Salad,\"['romaine']\",\"['Easy']\",\"['caesar', 'salad']\",300,20,4.0,7,False\n");
    std::fs::write(&path, grown).unwrap();

    let response = server.post("/api/v1/admin/reload").await;
    response.assert_status_ok();
    let stats: Value = response.json();
    assert_eq!(stats["recipes"], 4);

    let health: Value = server.get("/health").await.json();
    assert_eq!(health["recipes"], 4);
}
