//! Beach match entity model
//!
//! Normalized form of a federation match record, keyed on the external match
//! number.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// Beach match entity, one row per external match number
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "beach_matches")]
pub struct Model {
    /// External match number assigned by the federation (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub no: i32,

    /// External number of the tournament this match belongs to
    pub no_tournament: i32,

    /// Sanitized name of team A
    pub team_a_name: Option<String>,

    /// Sanitized name of team B
    pub team_b_name: Option<String>,

    /// Canonical record status (Running, Finished, Upcoming, ...)
    pub status: String,

    /// Match date in canonical YYYY-MM-DD form
    pub local_date: String,

    /// Scheduled local start time, as delivered by the gateway
    pub local_time: Option<String>,

    /// Sets won by team A
    pub match_points_a: Option<i32>,

    /// Sets won by team B
    pub match_points_b: Option<i32>,

    /// Bracket round label
    pub round: Option<String>,

    /// Court identifier
    pub court: Option<String>,

    /// Timestamp when this row was first written
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp of the last sync pass that touched this row
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::tournament::Entity",
        from = "Column::NoTournament",
        to = "super::tournament::Column::No"
    )]
    Tournament,
}

impl Related<super::tournament::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tournament.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
