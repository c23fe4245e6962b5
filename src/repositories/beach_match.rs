//! # Beach Match Repository
//!
//! Repository operations for the beach_matches table.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, Set,
};

use super::UpsertOutcome;
use crate::models::beach_match::{ActiveModel, Column, Entity, Model};

/// Normalized match fields ready for persistence
#[derive(Debug, Clone)]
pub struct BeachMatchRecord {
    pub no: i32,
    pub no_tournament: i32,
    pub team_a_name: Option<String>,
    pub team_b_name: Option<String>,
    pub status: String,
    pub local_date: String,
    pub local_time: Option<String>,
    pub match_points_a: Option<i32>,
    pub match_points_b: Option<i32>,
    pub round: Option<String>,
    pub court: Option<String>,
}

/// Repository for beach match database operations
pub struct BeachMatchRepository {
    db: DatabaseConnection,
}

impl BeachMatchRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn find_by_no(&self, no: i32) -> Result<Option<Model>, DbErr> {
        Entity::find_by_id(no).one(&self.db).await
    }

    /// Insert the record or update the existing row with the same external
    /// number, reporting which of the two happened.
    pub async fn upsert(&self, record: BeachMatchRecord) -> Result<UpsertOutcome, DbErr> {
        let now = Utc::now().fixed_offset();

        match Entity::find_by_id(record.no).one(&self.db).await? {
            Some(existing) => {
                let mut active: ActiveModel = existing.into();
                active.no_tournament = Set(record.no_tournament);
                active.team_a_name = Set(record.team_a_name);
                active.team_b_name = Set(record.team_b_name);
                active.status = Set(record.status);
                active.local_date = Set(record.local_date);
                active.local_time = Set(record.local_time);
                active.match_points_a = Set(record.match_points_a);
                active.match_points_b = Set(record.match_points_b);
                active.round = Set(record.round);
                active.court = Set(record.court);
                active.updated_at = Set(now);
                active.update(&self.db).await?;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                let active = ActiveModel {
                    no: Set(record.no),
                    no_tournament: Set(record.no_tournament),
                    team_a_name: Set(record.team_a_name),
                    team_b_name: Set(record.team_b_name),
                    status: Set(record.status),
                    local_date: Set(record.local_date),
                    local_time: Set(record.local_time),
                    match_points_a: Set(record.match_points_a),
                    match_points_b: Set(record.match_points_b),
                    round: Set(record.round),
                    court: Set(record.court),
                    created_at: Set(now),
                    updated_at: Set(now),
                };
                active.insert(&self.db).await?;
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    pub async fn list_by_tournament(&self, no_tournament: i32) -> Result<Vec<Model>, DbErr> {
        Entity::find()
            .filter(Column::NoTournament.eq(no_tournament))
            .all(&self.db)
            .await
    }

    pub async fn count(&self) -> Result<u64, DbErr> {
        Entity::find().count(&self.db).await
    }
}
