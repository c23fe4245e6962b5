//! # Sync Status Repository
//!
//! Repository operations for the sync_status table. Each entity type gets a
//! single row tracking its schedule and running counters.

use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, EntityTrait, Set};

use crate::models::sync_status::{ActiveModel, Entity, Model};

/// Weight given to the newest run when smoothing average duration
const DURATION_SMOOTHING: f64 = 0.3;

/// Repository for sync status database operations
pub struct SyncStatusRepository {
    db: DatabaseConnection,
}

impl SyncStatusRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Fetch the row for the entity type, creating it with the given
    /// scheduling frequency when it does not exist yet.
    pub async fn get_or_create(
        &self,
        entity_type: &str,
        default_frequency_minutes: i32,
    ) -> Result<Model, DbErr> {
        if let Some(existing) = Entity::find_by_id(entity_type).one(&self.db).await? {
            return Ok(existing);
        }

        let now = Utc::now().fixed_offset();
        let active = ActiveModel {
            entity_type: Set(entity_type.to_string()),
            last_sync: Set(None),
            next_sync: Set(Some(now + Duration::minutes(default_frequency_minutes as i64))),
            sync_frequency_minutes: Set(default_frequency_minutes),
            success_count: Set(0),
            error_count: Set(0),
            average_duration_ms: Set(None),
            updated_at: Set(now),
        };
        active.insert(&self.db).await
    }

    /// Fold a finished run into the row: bump the matching counter, advance
    /// the schedule, and smooth the average duration.
    pub async fn record_run(
        &self,
        entity_type: &str,
        default_frequency_minutes: i32,
        success: bool,
        duration_ms: i64,
    ) -> Result<Model, DbErr> {
        let current = self
            .get_or_create(entity_type, default_frequency_minutes)
            .await?;

        let now = Utc::now().fixed_offset();
        let frequency = current.sync_frequency_minutes;
        let smoothed = match current.average_duration_ms {
            Some(previous) => {
                let blended = previous as f64 * (1.0 - DURATION_SMOOTHING)
                    + duration_ms as f64 * DURATION_SMOOTHING;
                blended.round() as i64
            }
            None => duration_ms,
        };
        let success_count = current.success_count + if success { 1 } else { 0 };
        let error_count = current.error_count + if success { 0 } else { 1 };

        let mut active: ActiveModel = current.into();
        active.last_sync = Set(Some(now));
        active.next_sync = Set(Some(now + Duration::minutes(frequency as i64)));
        active.average_duration_ms = Set(Some(smoothed));
        active.success_count = Set(success_count);
        active.error_count = Set(error_count);
        active.updated_at = Set(now);

        active.update(&self.db).await
    }

    pub async fn find(&self, entity_type: &str) -> Result<Option<Model>, DbErr> {
        Entity::find_by_id(entity_type).one(&self.db).await
    }

    pub async fn list_all(&self) -> Result<Vec<Model>, DbErr> {
        Entity::find().all(&self.db).await
    }
}
