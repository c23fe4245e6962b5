//! Integration tests for alert rule evaluation against the sync execution
//! ledger, with a recording sink standing in for real delivery channels.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use beachsync::alerts::{AlertEngine, AlertNotification, NotificationSink, NotifyError};
use beachsync::config::AlertConfig;
use beachsync::repositories::{AlertRuleRepository, SyncExecutionRepository};
use sea_orm::DatabaseConnection;

#[path = "test_utils/mod.rs"]
mod test_utils;

#[derive(Clone, Default)]
struct RecordingSink {
    calls: Arc<Mutex<Vec<(String, AlertNotification)>>>,
}

impl RecordingSink {
    fn dispatched(&self) -> Vec<(String, AlertNotification)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn dispatch(
        &self,
        channel: &str,
        notification: &AlertNotification,
    ) -> Result<(), NotifyError> {
        self.calls
            .lock()
            .unwrap()
            .push((channel.to_string(), notification.clone()));
        Ok(())
    }
}

fn alert_config() -> AlertConfig {
    AlertConfig {
        enabled: true,
        webhook_secret: None,
        webhook_timeout_seconds: 10,
    }
}

fn engine(db: &DatabaseConnection, sink: RecordingSink) -> AlertEngine<RecordingSink> {
    AlertEngine::new(
        AlertRuleRepository::new(db.clone()),
        SyncExecutionRepository::new(db.clone()),
        sink,
        alert_config(),
    )
}

#[tokio::test]
async fn low_success_rate_triggers_and_dedupes_escalation() {
    let db = test_utils::setup_test_db().await.unwrap();
    // 2 of 5 recent runs succeeded.
    for success in [true, false, false, true, false] {
        test_utils::insert_execution(&db, "tournaments", success, 1_000, Some(64), 5)
            .await
            .unwrap();
    }
    test_utils::insert_alert_rule(
        &db,
        "tournament success rate",
        "tournaments",
        "success_rate",
        0.8,
        "1h",
        "30m",
    )
    .await
    .unwrap();

    let sink = RecordingSink::default();
    let engine = engine(&db, sink.clone());

    let evaluations = engine.evaluate_all().await.unwrap();
    assert_eq!(evaluations.len(), 1);
    let first = &evaluations[0];
    assert!(first.triggered);
    assert!(first.escalation_required);
    assert!((first.current_value - 0.4).abs() < 1e-9);
    assert!(first.message.as_deref().unwrap().contains("success rate"));
    assert!(first.recovery_suggestion.is_some());

    let dispatched = sink.dispatched();
    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].0, "dashboard");
    assert_eq!(dispatched[0].1.metric, "success_rate");

    // Still triggered, but inside the 30m escalation window: no new dispatch.
    let again = engine.evaluate_all().await.unwrap();
    assert!(again[0].triggered);
    assert!(!again[0].escalation_required);
    assert_eq!(sink.dispatched().len(), 1);
}

#[tokio::test]
async fn empty_ledger_counts_as_healthy() {
    let db = test_utils::setup_test_db().await.unwrap();
    let rule = test_utils::insert_alert_rule(
        &db,
        "quiet service",
        "all",
        "success_rate",
        0.9,
        "24h",
        "1h",
    )
    .await
    .unwrap();

    let sink = RecordingSink::default();
    let engine = engine(&db, sink.clone());

    let evaluation = engine.evaluate_rule(&rule, Utc::now()).await.unwrap();
    assert!(!evaluation.triggered);
    assert_eq!(evaluation.current_value, 1.0);
    assert!(evaluation.message.is_none());
    assert!(sink.dispatched().is_empty());
}

#[tokio::test]
async fn consecutive_failure_streak_is_counted_from_newest() {
    let db = test_utils::setup_test_db().await.unwrap();
    // Oldest run succeeded; the three newest all failed.
    test_utils::insert_execution(&db, "matches_schedule", true, 900, Some(32), 40)
        .await
        .unwrap();
    for minutes_ago in [30, 20, 10] {
        test_utils::insert_execution(&db, "matches_schedule", false, 900, Some(32), minutes_ago)
            .await
            .unwrap();
    }
    let rule = test_utils::insert_alert_rule(
        &db,
        "match sync failing",
        "matches_schedule",
        "consecutive_failures",
        3.0,
        "1h",
        "15m",
    )
    .await
    .unwrap();

    let engine = engine(&db, RecordingSink::default());
    let evaluation = engine.evaluate_rule(&rule, Utc::now()).await.unwrap();
    assert!(evaluation.triggered);
    assert_eq!(evaluation.current_value, 3.0);
    assert!(
        evaluation
            .message
            .as_deref()
            .unwrap()
            .contains("consecutive")
    );
}

#[tokio::test]
async fn latest_duration_at_threshold_triggers() {
    let db = test_utils::setup_test_db().await.unwrap();
    // Older fast run, newest slow run.
    test_utils::insert_execution(&db, "tournaments", true, 2_000, Some(64), 30)
        .await
        .unwrap();
    test_utils::insert_execution(&db, "tournaments", true, 45_000, Some(64), 1)
        .await
        .unwrap();
    let rule = test_utils::insert_alert_rule(
        &db,
        "slow tournament sync",
        "tournaments",
        "duration_exceeded",
        45_000.0,
        "2h",
        "30m",
    )
    .await
    .unwrap();

    let engine = engine(&db, RecordingSink::default());
    let evaluation = engine.evaluate_rule(&rule, Utc::now()).await.unwrap();
    assert!(evaluation.triggered);
    assert_eq!(evaluation.current_value, 45_000.0);
}

#[tokio::test]
async fn memory_rule_without_estimates_stays_healthy() {
    let db = test_utils::setup_test_db().await.unwrap();
    test_utils::insert_execution(&db, "tournaments", true, 1_000, None, 5)
        .await
        .unwrap();
    let rule = test_utils::insert_alert_rule(
        &db,
        "memory pressure",
        "tournaments",
        "memory_usage",
        10_000.0,
        "1h",
        "30m",
    )
    .await
    .unwrap();

    let engine = engine(&db, RecordingSink::default());
    let evaluation = engine.evaluate_rule(&rule, Utc::now()).await.unwrap();
    assert!(!evaluation.triggered);
    assert_eq!(evaluation.current_value, 0.0);
}

#[tokio::test]
async fn misconfigured_rules_do_not_block_the_rest() {
    let db = test_utils::setup_test_db().await.unwrap();
    test_utils::insert_execution(&db, "tournaments", false, 1_000, Some(64), 5)
        .await
        .unwrap();
    test_utils::insert_alert_rule(
        &db,
        "bogus metric",
        "all",
        "disk_usage",
        1.0,
        "1h",
        "30m",
    )
    .await
    .unwrap();
    test_utils::insert_alert_rule(
        &db,
        "bogus window",
        "all",
        "success_rate",
        0.5,
        "ten minutes",
        "30m",
    )
    .await
    .unwrap();
    test_utils::insert_alert_rule(
        &db,
        "valid rule",
        "all",
        "success_rate",
        0.5,
        "1h",
        "30m",
    )
    .await
    .unwrap();

    let sink = RecordingSink::default();
    let engine = engine(&db, sink.clone());

    let evaluations = engine.evaluate_all().await.unwrap();
    assert_eq!(evaluations.len(), 1);
    assert_eq!(evaluations[0].rule_name, "valid rule");
    assert!(evaluations[0].triggered);
    assert_eq!(sink.dispatched().len(), 1);
}

#[tokio::test]
async fn disabled_alerting_evaluates_without_dispatching() {
    let db = test_utils::setup_test_db().await.unwrap();
    test_utils::insert_execution(&db, "tournaments", false, 1_000, Some(64), 5)
        .await
        .unwrap();
    test_utils::insert_alert_rule(
        &db,
        "muted rule",
        "all",
        "success_rate",
        0.5,
        "1h",
        "30m",
    )
    .await
    .unwrap();

    let sink = RecordingSink::default();
    let engine = AlertEngine::new(
        AlertRuleRepository::new(db.clone()),
        SyncExecutionRepository::new(db.clone()),
        sink.clone(),
        AlertConfig {
            enabled: false,
            webhook_secret: None,
            webhook_timeout_seconds: 10,
        },
    );

    let evaluations = engine.evaluate_all().await.unwrap();
    assert!(evaluations[0].triggered);
    assert!(evaluations[0].escalation_required);
    assert!(sink.dispatched().is_empty());

    // Muted alerts never start the suppression window: the escalation
    // stays due until delivery is actually attempted.
    let evaluations = engine.evaluate_all().await.unwrap();
    assert!(evaluations[0].escalation_required);
    assert!(sink.dispatched().is_empty());
}
