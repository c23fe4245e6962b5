//! Error log entity model
//!
//! Persistent record of classified failures, written by the resilience layer
//! once retries are exhausted.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// One classified failure
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "error_log")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Classified category (NETWORK, AUTHENTICATION, ...)
    pub category: String,

    /// Classified severity (LOW, MEDIUM, HIGH, CRITICAL)
    pub severity: String,

    /// Whether the classifier judged the failure retryable
    pub retryable: bool,

    /// Sanitized failure message
    pub message: String,

    /// Structured classification context, when one was supplied
    pub context: Option<Json>,

    pub occurred_at: DateTimeWithTimeZone,

    /// Set when an operator marks the entry handled
    pub resolved_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
