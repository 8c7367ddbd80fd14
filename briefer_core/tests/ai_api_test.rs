use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use briefer_core::{
    ai::testing::ScriptedProvider, create_ai_app, AppConfig, AppState, ModelRegistry,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn app_with(provider: Arc<ScriptedProvider>) -> Router {
    let mut config = AppConfig::default();
    config.auth.basic_auth_username = "briefer".to_string();
    config.auth.basic_auth_password = "secret".to_string();

    create_ai_app(AppState::with_models(config, ModelRegistry::with_provider(provider)))
}

fn post(uri: &str, auth: Option<(&str, &str)>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some((user, pass)) = auth {
        let encoded = STANDARD.encode(format!("{}:{}", user, pass));
        builder = builder.header(header::AUTHORIZATION, format!("Basic {}", encoded));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn sql_edit_body() -> Value {
    json!({
        "query": "",
        "instructions": "select only the name column",
        "dialect": "PostgreSQL",
        "tableInfo": "CREATE TABLE users (id int, name text)"
    })
}

#[tokio::test]
async fn test_ping_needs_no_auth() {
    let app = app_with(ScriptedProvider::new(vec![]));
    let response = app
        .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "pong");
}

#[tokio::test]
async fn test_wrong_credentials_rejected_regardless_of_body() {
    for body in [sql_edit_body(), json!({}), json!("not even an object")] {
        let provider = ScriptedProvider::new(vec![]);
        let app = app_with(provider.clone());
        let response = app
            .oneshot(post("/v1/sql/edit", Some(("briefer", "wrong")), body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Basic");
        assert!(provider.prompts().is_empty());
    }

    let app = app_with(ScriptedProvider::new(vec![]));
    let response = app
        .oneshot(post("/v1/stream/sql/edit", None, sql_edit_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_sql_edit_returns_sql_and_forbids_new_limit() {
    let provider = ScriptedProvider::new(vec!["```json\n{\"sql\": \"SELECT name FROM users\"}\n```"]);
    let app = app_with(provider.clone());

    let response = app
        .oneshot(post("/v1/sql/edit", Some(("briefer", "secret")), sql_edit_body()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body, json!({ "sql": "SELECT name FROM users" }));

    let prompts = provider.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("If no limit is specified, do not specify one."));
}

#[tokio::test]
async fn test_stream_sql_edit_emits_json_lines() {
    let provider = ScriptedProvider::streaming(vec![
        "```json\n{\"sql\": \"SELECT ",
        "name FROM users",
        "\"}\n```",
    ]);
    let app = app_with(provider);

    let response = app
        .oneshot(post("/v1/stream/sql/edit", Some(("briefer", "secret")), sql_edit_body()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    assert_eq!(
        body_string(response).await,
        "{\"sql\":\"SELECT\"}\n{\"sql\":\"SELECT name FROM users\"}\n"
    );
}

#[tokio::test]
async fn test_text_to_sql_and_vega() {
    let provider = ScriptedProvider::new(vec![
        "```json\n{\"question\": \"how many users?\", \"sql\": \"SELECT count(*) FROM users\", \"reasoning\": [\"count rows\"]}\n```",
        "```json\n{\"spec\": {\"mark\": \"bar\"}}\n```",
    ]);
    let app = app_with(provider);

    let response = app
        .clone()
        .oneshot(post(
            "/v1/sql",
            Some(("briefer", "secret")),
            json!({ "question": "how many users?", "dialect": "PostgreSQL" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["reasoning"], json!(["count rows"]));

    let response = app
        .oneshot(post(
            "/v1/vega",
            Some(("briefer", "secret")),
            json!({ "sql": "SELECT 1" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["spec"], json!({ "mark": "bar" }));
}

#[tokio::test]
async fn test_python_edit_and_vanna() {
    let provider = ScriptedProvider::new(vec![
        "```json\n{\"source\": \"df.head()\"}\n```",
        "```json\n{\"sql\": \"SELECT count(*) FROM orders\"}\n```",
    ]);
    let app = app_with(provider.clone());

    let response = app
        .clone()
        .oneshot(post(
            "/v1/python/edit",
            Some(("briefer", "secret")),
            json!({ "source": "df", "instructions": "show the first rows", "allowedLibraries": ["pandas"] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body, json!({ "source": "df.head()" }));

    let response = app
        .oneshot(post(
            "/v1/vanna",
            Some(("briefer", "secret")),
            json!({ "instructions": "how many orders?", "tableInfo": "CREATE TABLE orders (id int)" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body, json!({ "sql": "SELECT count(*) FROM orders" }));

    let prompts = provider.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("how many orders?"));
}

#[tokio::test]
async fn test_model_failure_is_bad_gateway() {
    // No scripted replies left: the provider call itself fails.
    let app = app_with(ScriptedProvider::new(vec![]));
    let response = app
        .oneshot(post(
            "/v1/python/edit",
            Some(("briefer", "secret")),
            json!({ "source": "", "instructions": "plot df" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}
