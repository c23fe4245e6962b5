//! # Error Log Repository
//!
//! Repository operations for the error_log table, written by the resilience
//! layer once retries are exhausted.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use uuid::Uuid;

use crate::classify::{Classification, ErrorContext};
use crate::models::error_log::{ActiveModel, Column, Entity, Model};

/// Repository for error log database operations
pub struct ErrorLogRepository {
    db: DatabaseConnection,
}

impl ErrorLogRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Persist a classified failure
    pub async fn record(
        &self,
        classification: &Classification,
        message: &str,
        context: Option<&ErrorContext>,
    ) -> Result<Model, DbErr> {
        let context_json = context
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| DbErr::Custom(format!("error context not serializable: {e}")))?;

        let active = ActiveModel {
            id: Set(Uuid::new_v4()),
            category: Set(classification.category.as_str().to_string()),
            severity: Set(classification.severity.as_str().to_string()),
            retryable: Set(classification.retryable),
            message: Set(message.to_string()),
            context: Set(context_json),
            occurred_at: Set(Utc::now().fixed_offset()),
            resolved_at: Set(None),
        };
        active.insert(&self.db).await
    }

    /// Unresolved entries, newest first
    pub async fn list_unresolved(&self, limit: u64) -> Result<Vec<Model>, DbErr> {
        Entity::find()
            .filter(Column::ResolvedAt.is_null())
            .order_by_desc(Column::OccurredAt)
            .limit(limit)
            .all(&self.db)
            .await
    }

    /// Mark an entry handled; returns false when the id is unknown
    pub async fn resolve(&self, id: Uuid) -> Result<bool, DbErr> {
        let Some(entry) = Entity::find_by_id(id).one(&self.db).await? else {
            return Ok(false);
        };

        let mut active: ActiveModel = entry.into();
        active.resolved_at = Set(Some(Utc::now().fixed_offset()));
        active.update(&self.db).await?;
        Ok(true)
    }
}
