//! SeaORM pool bootstrap and liveness probing.
//!
//! The service refuses to start without a reachable database, but tolerates
//! a briefly unavailable one: connection attempts back off exponentially
//! before the startup fails for good.

use std::time::Duration;

use anyhow::{Context, Result};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use tokio::time::sleep;

use crate::config::AppConfig;

const CONNECT_ATTEMPTS: u32 = 5;
const INITIAL_CONNECT_DELAY: Duration = Duration::from_millis(100);
const IDLE_TIMEOUT: Duration = Duration::from_secs(600);
const MAX_CONNECTION_LIFETIME: Duration = Duration::from_secs(1800);

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("database connection failed: {source}")]
    ConnectionFailed {
        #[from]
        source: sea_orm::DbErr,
    },
    #[error("invalid database configuration: {message}")]
    InvalidConfiguration { message: String },
}

fn connect_options(cfg: &AppConfig) -> ConnectOptions {
    let mut options = ConnectOptions::new(&cfg.database_url);
    options
        .max_connections(cfg.db_max_connections)
        .acquire_timeout(Duration::from_millis(cfg.db_acquire_timeout_ms))
        .idle_timeout(IDLE_TIMEOUT)
        .max_lifetime(MAX_CONNECTION_LIFETIME)
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);
    options
}

/// Open the connection pool, retrying transient startup failures with
/// exponential backoff.
pub async fn init_pool(cfg: &AppConfig) -> Result<DatabaseConnection> {
    if cfg.database_url.is_empty() {
        return Err(DatabaseError::InvalidConfiguration {
            message: "BEACHSYNC_DATABASE_URL must be set".to_string(),
        }
        .into());
    }

    let options = connect_options(cfg);
    let mut delay = INITIAL_CONNECT_DELAY;

    for attempt in 1..=CONNECT_ATTEMPTS {
        match Database::connect(options.clone()).await {
            Ok(pool) => {
                tracing::info!(attempt, "database pool ready");
                return Ok(pool);
            }
            Err(err) if attempt < CONNECT_ATTEMPTS => {
                tracing::warn!(
                    attempt,
                    error = %err,
                    retry_in_ms = delay.as_millis() as u64,
                    "database connection attempt failed"
                );
                sleep(delay).await;
                delay *= 2;
            }
            Err(err) => {
                tracing::error!(
                    attempts = CONNECT_ATTEMPTS,
                    error = %err,
                    "giving up on database connection"
                );
                return Err(DatabaseError::ConnectionFailed { source: err }.into());
            }
        }
    }

    unreachable!("connect loop returns a pool or the final error")
}

/// Cheap liveness probe used by the health endpoint.
pub async fn health_check(db: &DatabaseConnection) -> Result<()> {
    let probe = Statement::from_string(db.get_database_backend(), "SELECT 1".to_string());
    db.query_one(probe)
        .await
        .context("database liveness probe failed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_database_url_is_rejected() {
        let mut config = AppConfig::default();
        config.database_url = String::new();

        let result = init_pool(&config).await;
        assert!(matches!(
            result.unwrap_err().downcast::<DatabaseError>(),
            Ok(DatabaseError::InvalidConfiguration { .. })
        ));
    }

    #[tokio::test]
    async fn health_check_passes_on_sqlite() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        health_check(&db).await.unwrap();
    }
}
