use crate::error::AppError;
use crate::AppState;
use axum::{
    extract::{Query, Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;

/// Compares two secrets without short-circuiting on the first differing byte.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// HTTP Basic authentication against the configured AI API credentials.
pub async fn basic_auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (username, password) = extract_basic_credentials(request.headers())?;

    let auth = &state.config.auth;
    if auth.basic_auth_username.is_empty() || auth.basic_auth_password.is_empty() {
        tracing::error!("Basic auth credentials are not configured, rejecting request");
        return Err(AppError::Unauthorized);
    }

    // Both comparisons always run.
    let username_ok = constant_time_eq(username.as_bytes(), auth.basic_auth_username.as_bytes());
    let password_ok = constant_time_eq(password.as_bytes(), auth.basic_auth_password.as_bytes());

    if !(username_ok & password_ok) {
        tracing::warn!("Rejected request with invalid basic auth credentials");
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(request).await)
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// The notebook host's token check: `Authorization: token <t>` or `?token=<t>`.
pub async fn token_auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let expected = state.config.bridge.token.as_bytes();
    if expected.is_empty() {
        tracing::error!("Notebook token is not configured, rejecting request");
        return Err(AppError::Forbidden);
    }

    let from_query = Query::<TokenQuery>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(q)| q.token);
    let provided = extract_token_from_header(request.headers()).or(from_query);

    match provided {
        Some(token) if constant_time_eq(token.as_bytes(), expected) => Ok(next.run(request).await),
        _ => {
            tracing::warn!(path = %request.uri().path(), "Rejected request with missing or invalid token");
            Err(AppError::Forbidden)
        }
    }
}

fn extract_basic_credentials(headers: &HeaderMap) -> Result<(String, String), AppError> {
    let auth_header = headers
        .get(AUTHORIZATION)
        .ok_or(AppError::Unauthorized)?
        .to_str()
        .map_err(|_| AppError::Unauthorized)?;

    let encoded = auth_header
        .strip_prefix("Basic ")
        .ok_or(AppError::Unauthorized)?
        .trim();

    let decoded = STANDARD.decode(encoded).map_err(|_| AppError::Unauthorized)?;
    let decoded = String::from_utf8(decoded).map_err(|_| AppError::Unauthorized)?;

    let (username, password) = decoded.split_once(':').ok_or(AppError::Unauthorized)?;
    Ok((username.to_string(), password.to_string()))
}

fn extract_token_from_header(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("token ")
        .or_else(|| value.strip_prefix("Bearer "))?
        .trim();

    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let mut config = AppConfig::default();
        config.auth.basic_auth_username = "briefer".to_string();
        config.auth.basic_auth_password = "s3cret".to_string();
        config.bridge.token = "notebook-token".to_string();
        AppState::for_tests(config)
    }

    async fn test_handler() -> &'static str {
        "success"
    }

    fn basic(user: &str, pass: &str) -> String {
        format!("Basic {}", STANDARD.encode(format!("{}:{}", user, pass)))
    }

    async fn call_basic(authorization: Option<String>) -> StatusCode {
        let state = test_state();
        let app = Router::new()
            .route("/protected", get(test_handler))
            .layer(middleware::from_fn_with_state(state.clone(), basic_auth_middleware))
            .with_state(state);

        let mut builder = Request::builder().method(Method::GET).uri("/protected");
        if let Some(value) = authorization {
            builder = builder.header("Authorization", value);
        }

        app.oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_basic_auth_success() {
        assert_eq!(call_basic(Some(basic("briefer", "s3cret"))).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_basic_auth_rejections() {
        assert_eq!(call_basic(None).await, StatusCode::UNAUTHORIZED);
        assert_eq!(call_basic(Some(basic("briefer", "wrong"))).await, StatusCode::UNAUTHORIZED);
        assert_eq!(call_basic(Some(basic("other", "s3cret"))).await, StatusCode::UNAUTHORIZED);
        assert_eq!(call_basic(Some("Basic !!!".to_string())).await, StatusCode::UNAUTHORIZED);
        assert_eq!(call_basic(Some("Bearer abc".to_string())).await, StatusCode::UNAUTHORIZED);
    }

    async fn call_token(uri: &str, authorization: Option<&str>) -> StatusCode {
        let state = test_state();
        let app = Router::new()
            .route("/ping", get(test_handler))
            .layer(middleware::from_fn_with_state(state.clone(), token_auth_middleware))
            .with_state(state);

        let mut builder = Request::builder().method(Method::GET).uri(uri);
        if let Some(value) = authorization {
            builder = builder.header("Authorization", value);
        }

        app.oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_token_auth() {
        assert_eq!(call_token("/ping", Some("token notebook-token")).await, StatusCode::OK);
        assert_eq!(call_token("/ping?token=notebook-token", None).await, StatusCode::OK);
        assert_eq!(call_token("/ping", None).await, StatusCode::FORBIDDEN);
        assert_eq!(call_token("/ping?token=nope", None).await, StatusCode::FORBIDDEN);
        assert_eq!(call_token("/ping", Some("token nope")).await, StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn test_extract_basic_credentials() {
        let mut headers = HeaderMap::new();
        assert!(extract_basic_credentials(&headers).is_err());

        headers.insert(AUTHORIZATION, basic("user", "pa:ss").parse().unwrap());
        let (user, pass) = extract_basic_credentials(&headers).unwrap();
        assert_eq!(user, "user");
        assert_eq!(pass, "pa:ss");
    }
}
