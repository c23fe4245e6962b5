//! Federation gateway authentication.
//!
//! Signs short-lived HS256 bearer tokens for the gateway and builds the
//! embedded-credential request wrapper used as a fallback when bearer calls
//! are rejected.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::secrets::FederationCredentials;

/// Bearer token lifetime.
const TOKEN_LIFETIME_SECS: i64 = 3600;

/// Leeway subtracted from the expiry when deciding whether a cached token is
/// still usable, so a token is never handed out seconds before it dies.
const EXPIRY_LEEWAY_SECS: i64 = 60;

const TOKEN_AUDIENCE: &str = "vis-gateway";
const TOKEN_ISSUER: &str = "beachsync";

/// Errors raised while obtaining credentials for the gateway.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no signing secret configured for bearer token auth")]
    MissingSigningSecret,
    #[error("failed to sign bearer token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    aud: String,
    iss: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Authenticator holding a single-slot token cache.
///
/// The cache is mutex-guarded so one instance can be shared across the
/// concurrent sync tasks of a run.
pub struct VisAuthenticator {
    service_identity: String,
    credentials: FederationCredentials,
    cached: Mutex<Option<CachedToken>>,
}

impl VisAuthenticator {
    pub fn new(service_identity: String, credentials: FederationCredentials) -> Self {
        Self {
            service_identity,
            credentials,
            cached: Mutex::new(None),
        }
    }

    /// Return a bearer token, reusing the cached one while it is still
    /// comfortably inside its 1-hour lifetime.
    pub fn token(&self) -> Result<String, AuthError> {
        let now = Utc::now();

        let mut slot = self
            .cached
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(cached) = slot.as_ref()
            && cached.expires_at - Duration::seconds(EXPIRY_LEEWAY_SECS) > now
        {
            return Ok(cached.token.clone());
        }

        let secret = self
            .credentials
            .signing_secret
            .as_deref()
            .ok_or(AuthError::MissingSigningSecret)?;

        let expires_at = now + Duration::seconds(TOKEN_LIFETIME_SECS);
        let claims = Claims {
            sub: self.service_identity.clone(),
            aud: TOKEN_AUDIENCE.to_string(),
            iss: TOKEN_ISSUER.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )?;

        *slot = Some(CachedToken {
            token: token.clone(),
            expires_at,
        });

        tracing::debug!(
            subject = %self.service_identity,
            expires_at = %expires_at,
            "Signed new federation bearer token"
        );

        Ok(token)
    }

    /// Drop the cached token so the next call signs a fresh one.
    pub fn clear_cache(&self) {
        let mut slot = self
            .cached
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = None;
    }

    /// Build a request payload carrying credentials directly, used when
    /// bearer-token calls are rejected by the gateway.
    pub fn build_embedded_credential_request(
        &self,
        request_type: &str,
        params: &[(&str, &str)],
    ) -> String {
        format!(
            "<Requests Username=\"{}\" Password=\"{}\">{}</Requests>",
            escape_xml_attr(&self.credentials.username),
            escape_xml_attr(&self.credentials.password),
            build_request_element(request_type, params)
        )
    }
}

/// Build the inner `<Request Type=... .../>` element.
pub fn build_request_element(request_type: &str, params: &[(&str, &str)]) -> String {
    let mut element = format!("<Request Type=\"{}\"", escape_xml_attr(request_type));
    for (key, value) in params {
        element.push_str(&format!(" {}=\"{}\"", key, escape_xml_attr(value)));
    }
    element.push_str("/>");
    element
}

fn escape_xml_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
