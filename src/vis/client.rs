//! HTTP client for the federation XML gateway.
//!
//! Sends parameterized request envelopes, preferring bearer-token auth and
//! falling back to embedded credentials when the gateway rejects the token.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::classify::ErrorContext;
use crate::vis::auth::{AuthError, VisAuthenticator, build_request_element};

/// Markers that must appear in a payload for authentication probing to count
/// the response as real data.
const RECORD_MARKERS: &[&str] = &["<Tournament", "<BeachMatch"];

/// A parameterized gateway request.
#[derive(Debug, Clone)]
pub struct VisRequest {
    pub request_type: String,
    pub params: Vec<(String, String)>,
}

impl VisRequest {
    pub fn new(request_type: impl Into<String>) -> Self {
        Self {
            request_type: request_type.into(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    fn param_refs(&self) -> Vec<(&str, &str)> {
        self.params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }
}

/// Errors from the federation gateway boundary.
#[derive(Debug, Error)]
pub enum VisError {
    #[error("federation gateway returned status {status}: {}", body.as_deref().unwrap_or("no body"))]
    Http { status: u16, body: Option<String> },
    #[error("network error calling federation gateway: {message}")]
    Network { message: String, timed_out: bool },
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl VisError {
    /// Structured context for the classifier.
    pub fn context(&self, request_type: &str) -> ErrorContext {
        match self {
            VisError::Http { status, .. } => ErrorContext::Api {
                status: Some(*status),
                request_type: Some(request_type.to_string()),
            },
            VisError::Network { timed_out, .. } => ErrorContext::Network {
                endpoint: Some(request_type.to_string()),
                timeout_ms: timed_out.then_some(0),
            },
            VisError::Auth(_) => ErrorContext::Auth {
                scheme: Some("bearer".to_string()),
            },
        }
    }
}

/// Which authentication path a successful probe used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Bearer,
    EmbeddedCredentials,
}

/// Result of [`VisClient::test_authentication`].
#[derive(Debug, Clone)]
pub struct AuthProbe {
    pub mode: AuthMode,
    pub record_marker_found: bool,
}

/// Client for the federation XML gateway.
pub struct VisClient {
    http: reqwest::Client,
    base_url: String,
    authenticator: Arc<VisAuthenticator>,
}

impl VisClient {
    pub fn new(
        base_url: String,
        request_timeout: Duration,
        authenticator: Arc<VisAuthenticator>,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            http,
            base_url,
            authenticator,
        })
    }

    /// Fetch the raw payload for a request, trying bearer auth first and
    /// falling back to embedded credentials on 401/403.
    pub async fn fetch(&self, request: &VisRequest) -> Result<String, VisError> {
        match self.fetch_with_bearer(request).await {
            Ok(body) => Ok(body),
            Err(VisError::Http { status, .. }) if status == 401 || status == 403 => {
                tracing::warn!(
                    request_type = %request.request_type,
                    status,
                    "Bearer auth rejected by gateway, retrying with embedded credentials"
                );
                self.authenticator.clear_cache();
                self.fetch_with_embedded(request).await
            }
            // Bearer signing being unavailable is not fatal while the
            // embedded path still works.
            Err(VisError::Auth(AuthError::MissingSigningSecret)) => {
                self.fetch_with_embedded(request).await
            }
            Err(other) => Err(other),
        }
    }

    async fn fetch_with_bearer(&self, request: &VisRequest) -> Result<String, VisError> {
        let token = self.authenticator.token()?;
        let body = build_request_element(&request.request_type, &request.param_refs());

        let response = self
            .http
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {token}"))
            .header("Content-Type", "text/xml")
            .body(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        read_response(response).await
    }

    async fn fetch_with_embedded(&self, request: &VisRequest) -> Result<String, VisError> {
        let body = self
            .authenticator
            .build_embedded_credential_request(&request.request_type, &request.param_refs());

        let response = self
            .http
            .post(&self.base_url)
            .header("Content-Type", "text/xml")
            .body(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        read_response(response).await
    }

    /// Probe the gateway: bearer first, embedded fallback, succeeding only
    /// when the response carries expected record markers.
    pub async fn test_authentication(&self) -> Result<AuthProbe, VisError> {
        let probe_request = VisRequest::new("GetBeachTournamentList")
            .with_param("Fields", "No Name")
            .with_param("MaxRecords", "1");

        match self.fetch_with_bearer(&probe_request).await {
            Ok(body) if contains_record_marker(&body) => {
                return Ok(AuthProbe {
                    mode: AuthMode::Bearer,
                    record_marker_found: true,
                });
            }
            Ok(_) => {
                tracing::warn!("Bearer probe returned a payload without record markers");
            }
            Err(err) => {
                tracing::warn!(error = %err, "Bearer probe failed, trying embedded credentials");
            }
        }

        let body = self.fetch_with_embedded(&probe_request).await?;
        if contains_record_marker(&body) {
            Ok(AuthProbe {
                mode: AuthMode::EmbeddedCredentials,
                record_marker_found: true,
            })
        } else {
            Err(VisError::Http {
                status: 200,
                body: Some("response contained no recognizable records".to_string()),
            })
        }
    }
}

fn contains_record_marker(body: &str) -> bool {
    RECORD_MARKERS.iter().any(|marker| body.contains(marker))
}

fn map_reqwest_error(err: reqwest::Error) -> VisError {
    VisError::Network {
        message: err.to_string(),
        timed_out: err.is_timeout(),
    }
}

async fn read_response(response: reqwest::Response) -> Result<String, VisError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.ok().map(|b| {
            if b.len() > 200 {
                b.chars().take(200).collect()
            } else {
                b
            }
        });
        return Err(VisError::Http {
            status: status.as_u16(),
            body,
        });
    }

    response.text().await.map_err(map_reqwest_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{ErrorCategory, classify};

    #[test]
    fn request_params_render_in_order() {
        let request = VisRequest::new("GetBeachMatchList")
            .with_param("NoTournament", "502")
            .with_param("Fields", "No NoTournament");
        let refs = request.param_refs();
        assert_eq!(refs[0], ("NoTournament", "502"));
        assert_eq!(refs[1], ("Fields", "No NoTournament"));
    }

    #[test]
    fn record_markers_are_detected() {
        assert!(contains_record_marker("<Tournaments><Tournament No=\"1\"/>"));
        assert!(contains_record_marker("<BeachMatch No=\"7\"/>"));
        assert!(!contains_record_marker("<Error>denied</Error>"));
    }

    #[test]
    fn http_error_context_drives_classification() {
        let err = VisError::Http {
            status: 503,
            body: None,
        };
        let classification = classify(&err.to_string(), Some(&err.context("GetBeachTournamentList")));
        assert_eq!(classification.category, ErrorCategory::ApiResponse);
        assert!(classification.retryable);

        let err = VisError::Http {
            status: 404,
            body: None,
        };
        let classification = classify(&err.to_string(), Some(&err.context("GetBeachTournamentList")));
        assert!(!classification.retryable);
    }

    #[test]
    fn auth_error_context_is_final() {
        let err = VisError::Auth(AuthError::MissingSigningSecret);
        let classification = classify(&err.to_string(), Some(&err.context("GetBeachTournamentList")));
        assert_eq!(classification.category, ErrorCategory::Authentication);
        assert!(!classification.retryable);
    }
}
