//! Credential boundary.
//!
//! The hosting runtime's vault is an external collaborator; this module only
//! defines the lookup port and an environment-backed default used for local
//! profiles and tests.

use async_trait::async_trait;
use thiserror::Error;

/// Credentials for the federation gateway.
#[derive(Debug, Clone)]
pub struct FederationCredentials {
    pub username: String,
    pub password: String,
    /// Secret used to sign bearer tokens; absent when only embedded
    /// credential auth is available.
    pub signing_secret: Option<String>,
}

/// Errors raised by a secret store lookup.
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret {name} not found")]
    NotFound { name: String },
    #[error("secret store unavailable: {message}")]
    Unavailable { message: String },
}

/// Named-secret lookup port.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Resolve federation credentials under the given name.
    async fn federation_credentials(&self, name: &str)
    -> Result<FederationCredentials, SecretError>;
}

/// Secret store reading `{NAME}_USERNAME`, `{NAME}_PASSWORD` and
/// `{NAME}_SIGNING_SECRET` from the process environment.
pub struct EnvSecretStore;

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn federation_credentials(
        &self,
        name: &str,
    ) -> Result<FederationCredentials, SecretError> {
        let prefix = name.to_uppercase().replace('-', "_");
        let username =
            std::env::var(format!("{prefix}_USERNAME")).map_err(|_| SecretError::NotFound {
                name: format!("{prefix}_USERNAME"),
            })?;
        let password =
            std::env::var(format!("{prefix}_PASSWORD")).map_err(|_| SecretError::NotFound {
                name: format!("{prefix}_PASSWORD"),
            })?;
        let signing_secret = std::env::var(format!("{prefix}_SIGNING_SECRET")).ok();

        Ok(FederationCredentials {
            username,
            password,
            signing_secret,
        })
    }
}

/// Fixed-credential store for tests.
pub struct StaticSecretStore {
    pub credentials: FederationCredentials,
}

#[async_trait]
impl SecretStore for StaticSecretStore {
    async fn federation_credentials(
        &self,
        _name: &str,
    ) -> Result<FederationCredentials, SecretError> {
        Ok(self.credentials.clone())
    }
}
