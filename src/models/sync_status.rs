//! Sync status entity model
//!
//! One row per entity type, tracking schedule and running counters across
//! sync executions.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// Per-entity-type sync bookkeeping
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "sync_status")]
pub struct Model {
    /// Entity type this row tracks ("tournaments" or "matches_schedule")
    #[sea_orm(primary_key, auto_increment = false)]
    pub entity_type: String,

    /// Completion time of the most recent run, if any
    pub last_sync: Option<DateTimeWithTimeZone>,

    /// Next scheduled run time
    pub next_sync: Option<DateTimeWithTimeZone>,

    /// Scheduling interval in minutes
    pub sync_frequency_minutes: i32,

    /// Count of successful runs since creation
    pub success_count: i32,

    /// Count of failed runs since creation
    pub error_count: i32,

    /// Exponentially smoothed run duration in milliseconds
    pub average_duration_ms: Option<i64>,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
