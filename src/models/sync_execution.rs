//! Sync execution entity model
//!
//! Append-only ledger of individual sync runs, consumed by the alert engine
//! for success-rate and duration metrics.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// One recorded sync run
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "sync_executions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Entity type the run covered
    pub entity_type: String,

    pub started_at: DateTimeWithTimeZone,

    pub finished_at: Option<DateTimeWithTimeZone>,

    /// Whether the run met the success policy
    pub success: bool,

    /// Records upserted during the run
    pub records_processed: i32,

    /// Wall-clock duration in milliseconds
    pub duration_ms: Option<i64>,

    /// Coarse working-set estimate in kilobytes
    pub memory_estimate_kb: Option<i64>,

    /// Failure summary when the run did not succeed
    pub error_summary: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
