//! # Sync Execution Repository
//!
//! Repository operations for the sync_executions ledger. The alert engine
//! reads this table to compute success-rate and duration metrics.

use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use uuid::Uuid;

use crate::models::sync_execution::{ActiveModel, Column, Entity, Model};

/// Summary of one finished run for the ledger
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub entity_type: String,
    pub started_at: DateTime<FixedOffset>,
    pub success: bool,
    pub records_processed: i32,
    pub duration_ms: i64,
    pub memory_estimate_kb: Option<i64>,
    pub error_summary: Option<String>,
}

/// Repository for the sync execution ledger
pub struct SyncExecutionRepository {
    db: DatabaseConnection,
}

impl SyncExecutionRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn record(&self, record: ExecutionRecord) -> Result<Model, DbErr> {
        let active = ActiveModel {
            id: Set(Uuid::new_v4()),
            entity_type: Set(record.entity_type),
            started_at: Set(record.started_at),
            finished_at: Set(Some(Utc::now().fixed_offset())),
            success: Set(record.success),
            records_processed: Set(record.records_processed),
            duration_ms: Set(Some(record.duration_ms)),
            memory_estimate_kb: Set(record.memory_estimate_kb),
            error_summary: Set(record.error_summary),
        };
        active.insert(&self.db).await
    }

    /// Runs started at or after the cutoff, optionally narrowed to one
    /// entity type, newest first.
    pub async fn recent(
        &self,
        entity_type: Option<&str>,
        since: DateTime<FixedOffset>,
    ) -> Result<Vec<Model>, DbErr> {
        let mut query = Entity::find()
            .filter(Column::StartedAt.gte(since))
            .order_by_desc(Column::StartedAt);

        if let Some(entity) = entity_type {
            query = query.filter(Column::EntityType.eq(entity));
        }

        query.all(&self.db).await
    }

    /// Length of the current failure streak: number of most recent runs that
    /// failed, stopping at the first success.
    pub async fn consecutive_failures(&self, entity_type: Option<&str>) -> Result<u32, DbErr> {
        let mut query = Entity::find().order_by_desc(Column::StartedAt).limit(100);

        if let Some(entity) = entity_type {
            query = query.filter(Column::EntityType.eq(entity));
        }

        let runs = query.all(&self.db).await?;
        let mut streak = 0u32;
        for run in runs {
            if run.success {
                break;
            }
            streak += 1;
        }
        Ok(streak)
    }
}
