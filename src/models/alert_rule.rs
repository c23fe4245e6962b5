//! Alert rule entity model

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// Operator-defined alert rule evaluated against the execution ledger
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "alert_rules")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Human-readable rule name, surfaced in alert messages
    pub name: String,

    /// Entity type the rule watches, or "all" for every type
    pub entity_scope: String,

    /// Metric being evaluated (success_rate, consecutive_failures,
    /// duration_exceeded, memory_usage)
    pub metric: String,

    /// Trigger threshold, interpreted per metric
    pub threshold: f64,

    /// Lookback window, e.g. "1h" or "24h"
    pub evaluation_window: String,

    /// Minimum gap between repeated notifications, e.g. "30m"
    pub escalation_delay: String,

    /// Notification channels as a JSON array of strings
    pub channels: Json,

    /// Inactive rules are skipped during evaluation
    pub active: bool,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
