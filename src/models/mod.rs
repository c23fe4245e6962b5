//! SeaORM entity models for the beachsync storage contract.

pub mod alert_rule;
pub mod beach_match;
pub mod error_log;
pub mod sync_execution;
pub mod sync_status;
pub mod tournament;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Basic service information returned by the root endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// Service name
    #[schema(example = "beachsync")]
    pub name: String,
    /// Service version
    #[schema(example = "0.1.0")]
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
