//! # Tournament Repository
//!
//! Repository operations for the tournaments table, keyed on the external
//! tournament number.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, Set,
};

use super::UpsertOutcome;
use crate::models::tournament::{ActiveModel, Column, Entity, Model};

/// Normalized tournament fields ready for persistence
#[derive(Debug, Clone)]
pub struct TournamentRecord {
    pub no: i32,
    pub code: Option<String>,
    pub name: String,
    pub status: String,
    pub start_date: String,
    pub end_date: String,
}

/// Repository for tournament database operations
pub struct TournamentRepository {
    db: DatabaseConnection,
}

impl TournamentRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn find_by_no(&self, no: i32) -> Result<Option<Model>, DbErr> {
        Entity::find_by_id(no).one(&self.db).await
    }

    /// Insert the record or update the existing row with the same external
    /// number, reporting which of the two happened.
    pub async fn upsert(&self, record: TournamentRecord) -> Result<UpsertOutcome, DbErr> {
        let now = Utc::now().fixed_offset();

        match Entity::find_by_id(record.no).one(&self.db).await? {
            Some(existing) => {
                let mut active: ActiveModel = existing.into();
                active.code = Set(record.code);
                active.name = Set(record.name);
                active.status = Set(record.status);
                active.start_date = Set(record.start_date);
                active.end_date = Set(record.end_date);
                active.updated_at = Set(now);
                active.update(&self.db).await?;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                let active = ActiveModel {
                    no: Set(record.no),
                    code: Set(record.code),
                    name: Set(record.name),
                    status: Set(record.status),
                    start_date: Set(record.start_date),
                    end_date: Set(record.end_date),
                    created_at: Set(now),
                    updated_at: Set(now),
                };
                active.insert(&self.db).await?;
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    /// List tournaments carrying any of the given statuses
    pub async fn list_by_status(&self, statuses: &[&str]) -> Result<Vec<Model>, DbErr> {
        Entity::find()
            .filter(Column::Status.is_in(statuses.iter().map(|s| s.to_string())))
            .all(&self.db)
            .await
    }

    pub async fn count(&self) -> Result<u64, DbErr> {
        Entity::find().count(&self.db).await
    }
}
