//! # Authentication
//!
//! Operator bearer authentication for the protected trigger endpoints.
//! Tokens are compared in constant time against the configured set.

use std::sync::Arc;

use axum::{
    extract::{FromRef, Request, State},
    http::{HeaderMap, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::config::AppConfig;
use crate::error::{ApiError, unauthorized, unauthorized_with_trace_id};
use crate::server::AppState;
use crate::telemetry::TraceContext;

/// Marker type for authenticated operator requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorAuth;

impl FromRef<AppState> for Arc<AppConfig> {
    fn from_ref(app_state: &AppState) -> Self {
        Arc::clone(&app_state.config)
    }
}

/// Middleware validating the operator bearer token
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let trace_id = request
        .extensions()
        .get::<TraceContext>()
        .map(|ctx| ctx.trace_id.clone());

    let token = extract_bearer_token(request.headers(), trace_id.clone())?;
    validate_token(&config, token, trace_id)?;

    let mut request = request;
    request.extensions_mut().insert(OperatorAuth);
    Ok(next.run(request).await)
}

fn extract_bearer_token(
    headers: &HeaderMap,
    trace_id: Option<String>,
) -> Result<&str, ApiError> {
    let reject = move |message: &str| match trace_id.clone() {
        Some(id) => unauthorized_with_trace_id(Some(message), id),
        None => unauthorized(Some(message)),
    };

    headers
        .get(AUTHORIZATION)
        .ok_or_else(|| reject("Missing Authorization header"))?
        .to_str()
        .map_err(|_| reject("Invalid Authorization header"))?
        .strip_prefix("Bearer ")
        .ok_or_else(|| reject("Authorization header must use Bearer scheme"))
}

fn validate_token(
    config: &AppConfig,
    token: &str,
    trace_id: Option<String>,
) -> Result<(), ApiError> {
    let is_valid = config
        .operator_tokens
        .iter()
        .any(|configured| ConstantTimeEq::ct_eq(token.as_bytes(), configured.as_bytes()).into());

    if is_valid {
        Ok(())
    } else {
        Err(match trace_id {
            Some(id) => unauthorized_with_trace_id(Some("Invalid bearer token"), id),
            None => unauthorized(Some("Invalid bearer token")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Router,
        body::Body,
        http::{HeaderValue, Request as HttpRequest, StatusCode},
        middleware,
        routing::get,
    };
    use tower::ServiceExt;

    fn config_with_token(token: &str) -> AppConfig {
        let mut config = AppConfig::default();
        config.operator_tokens = vec![token.to_string()];
        config
    }

    async fn run_middleware(config: Arc<AppConfig>, request: HttpRequest<Body>) -> Response {
        async fn handler() -> &'static str {
            "OK"
        }

        Router::new()
            .route("/probe", get(handler))
            .layer(middleware::from_fn_with_state(config, auth_middleware))
            .oneshot(request)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn missing_auth_header_returns_401() {
        let config = Arc::new(config_with_token("test-token-123"));
        let request = HttpRequest::builder()
            .uri("/probe")
            .body(Body::empty())
            .unwrap();

        let response = run_middleware(config, request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn valid_token_passes_through() {
        let config = Arc::new(config_with_token("test-token-123"));
        let request = HttpRequest::builder()
            .uri("/probe")
            .header(AUTHORIZATION, "Bearer test-token-123")
            .body(Body::empty())
            .unwrap();

        let response = run_middleware(config, request).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn wrong_token_returns_401() {
        let config = Arc::new(config_with_token("test-token-123"));
        let request = HttpRequest::builder()
            .uri("/probe")
            .header(AUTHORIZATION, "Bearer nope")
            .body(Body::empty())
            .unwrap();

        let response = run_middleware(config, request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn bearer_token_is_extracted() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer tok-123"));
        assert_eq!(extract_bearer_token(&headers, None).unwrap(), "tok-123");
    }

    #[test]
    fn missing_and_malformed_headers_are_rejected() {
        assert!(extract_bearer_token(&HeaderMap::new(), None).is_err());

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert!(extract_bearer_token(&headers, None).is_err());
    }

    #[test]
    fn only_configured_tokens_validate() {
        let config = config_with_token("correct-token");
        assert!(validate_token(&config, "correct-token", None).is_ok());
        assert!(validate_token(&config, "wrong-token", None).is_err());
        assert!(validate_token(&config, "", None).is_err());
    }
}
