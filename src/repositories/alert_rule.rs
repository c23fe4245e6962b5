//! # Alert Rule Repository

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::models::alert_rule::{ActiveModel, Column, Entity, Model};

/// Fields for creating an alert rule
#[derive(Debug, Clone)]
pub struct NewAlertRule {
    pub name: String,
    pub entity_scope: String,
    pub metric: String,
    pub threshold: f64,
    pub evaluation_window: String,
    pub escalation_delay: String,
    pub channels: Vec<String>,
}

/// Repository for alert rule database operations
pub struct AlertRuleRepository {
    db: DatabaseConnection,
}

impl AlertRuleRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(&self, rule: NewAlertRule) -> Result<Model, DbErr> {
        let now = Utc::now().fixed_offset();
        let active = ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(rule.name),
            entity_scope: Set(rule.entity_scope),
            metric: Set(rule.metric),
            threshold: Set(rule.threshold),
            evaluation_window: Set(rule.evaluation_window),
            escalation_delay: Set(rule.escalation_delay),
            channels: Set(JsonValue::from(rule.channels)),
            active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };
        active.insert(&self.db).await
    }

    pub async fn list_active(&self) -> Result<Vec<Model>, DbErr> {
        Entity::find()
            .filter(Column::Active.eq(true))
            .order_by_asc(Column::CreatedAt)
            .all(&self.db)
            .await
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Model>, DbErr> {
        Entity::find_by_id(id).one(&self.db).await
    }

    /// Toggle a rule; returns false when the id is unknown
    pub async fn set_active(&self, id: Uuid, active: bool) -> Result<bool, DbErr> {
        let Some(rule) = Entity::find_by_id(id).one(&self.db).await? else {
            return Ok(false);
        };

        let mut model: ActiveModel = rule.into();
        model.active = Set(active);
        model.updated_at = Set(Utc::now().fixed_offset());
        model.update(&self.db).await?;
        Ok(true)
    }
}
