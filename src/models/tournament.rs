//! Tournament entity model
//!
//! Normalized form of a federation tournament record, keyed on the external
//! tournament number.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// Tournament entity, one row per external tournament number
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "tournaments")]
pub struct Model {
    /// External tournament number assigned by the federation (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub no: i32,

    /// Federation tournament code (e.g. "RIO2025")
    pub code: Option<String>,

    /// Sanitized tournament name
    pub name: String,

    /// Canonical record status (Running, Finished, Upcoming, ...)
    pub status: String,

    /// Start date in canonical YYYY-MM-DD form
    pub start_date: String,

    /// End date in canonical YYYY-MM-DD form
    pub end_date: String,

    /// Timestamp when this row was first written
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp of the last sync pass that touched this row
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::beach_match::Entity")]
    BeachMatch,
}

impl Related<super::beach_match::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BeachMatch.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
