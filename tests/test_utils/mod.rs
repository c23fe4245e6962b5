//! Test utilities for database-backed integration tests.
//!
//! Sets up in-memory SQLite databases with the service schema created
//! directly from the entity definitions, plus fixture helpers.

use anyhow::Result;
use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, Database, DatabaseConnection, Schema, Set,
};
use uuid::Uuid;

use beachsync::models::{alert_rule, beach_match, error_log, sync_execution, sync_status, tournament};

/// Sets up an in-memory SQLite database with every service table created.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    db.execute(backend.build(&schema.create_table_from_entity(tournament::Entity)))
        .await?;
    db.execute(backend.build(&schema.create_table_from_entity(beach_match::Entity)))
        .await?;
    db.execute(backend.build(&schema.create_table_from_entity(sync_status::Entity)))
        .await?;
    db.execute(backend.build(&schema.create_table_from_entity(sync_execution::Entity)))
        .await?;
    db.execute(backend.build(&schema.create_table_from_entity(error_log::Entity)))
        .await?;
    db.execute(backend.build(&schema.create_table_from_entity(alert_rule::Entity)))
        .await?;

    Ok(db)
}

/// Insert a tournament row with the given external number.
#[allow(dead_code)]
pub async fn insert_tournament(
    db: &DatabaseConnection,
    no: i32,
    name: &str,
    status: &str,
    start_date: &str,
) -> Result<tournament::Model> {
    let now = Utc::now().fixed_offset();
    let model = tournament::ActiveModel {
        no: Set(no),
        code: Set(None),
        name: Set(name.to_string()),
        status: Set(status.to_string()),
        start_date: Set(start_date.to_string()),
        end_date: Set(start_date.to_string()),
        created_at: Set(now),
        updated_at: Set(now),
    };
    Ok(model.insert(db).await?)
}

/// Insert a sync execution that started `minutes_ago` minutes in the past.
#[allow(dead_code)]
pub async fn insert_execution(
    db: &DatabaseConnection,
    entity_type: &str,
    success: bool,
    duration_ms: i64,
    memory_estimate_kb: Option<i64>,
    minutes_ago: i64,
) -> Result<sync_execution::Model> {
    let started = (Utc::now() - Duration::minutes(minutes_ago)).fixed_offset();
    let model = sync_execution::ActiveModel {
        id: Set(Uuid::new_v4()),
        entity_type: Set(entity_type.to_string()),
        started_at: Set(started),
        finished_at: Set(Some(started)),
        success: Set(success),
        records_processed: Set(10),
        duration_ms: Set(Some(duration_ms)),
        memory_estimate_kb: Set(memory_estimate_kb),
        error_summary: Set((!success).then(|| "fetch failed".to_string())),
    };
    Ok(model.insert(db).await?)
}

/// Insert a sync status row whose next scheduled run is `minutes_from_now`
/// minutes away (negative values put the window in the past).
#[allow(dead_code)]
pub async fn insert_sync_status(
    db: &DatabaseConnection,
    entity_type: &str,
    minutes_from_now: i64,
) -> Result<sync_status::Model> {
    let now = Utc::now().fixed_offset();
    let model = sync_status::ActiveModel {
        entity_type: Set(entity_type.to_string()),
        last_sync: Set(Some(now)),
        next_sync: Set(Some(now + Duration::minutes(minutes_from_now))),
        sync_frequency_minutes: Set(60),
        success_count: Set(1),
        error_count: Set(0),
        average_duration_ms: Set(Some(1_000)),
        updated_at: Set(now),
    };
    Ok(model.insert(db).await?)
}

/// Insert an active alert rule.
#[allow(dead_code)]
pub async fn insert_alert_rule(
    db: &DatabaseConnection,
    name: &str,
    entity_scope: &str,
    metric: &str,
    threshold: f64,
    evaluation_window: &str,
    escalation_delay: &str,
) -> Result<alert_rule::Model> {
    let now = Utc::now().fixed_offset();
    let model = alert_rule::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        entity_scope: Set(entity_scope.to_string()),
        metric: Set(metric.to_string()),
        threshold: Set(threshold),
        evaluation_window: Set(evaluation_window.to_string()),
        escalation_delay: Set(escalation_delay.to_string()),
        channels: Set(serde_json::json!(["dashboard"])),
        active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    };
    Ok(model.insert(db).await?)
}
