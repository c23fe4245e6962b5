//! Rule evaluation over the sync execution ledger.
//!
//! Each rule names a metric, a threshold, a lookback window, and an
//! escalation delay. Evaluation is read-only against storage; the only
//! mutable state is the per-process map of last notification times used for
//! escalation dedupe.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use sea_orm::DbErr;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::alerts::notifier::{AlertNotification, NotificationSink};
use crate::config::AlertConfig;
use crate::models::alert_rule::Model as AlertRule;
use crate::repositories::{AlertRuleRepository, SyncExecutionRepository};

#[derive(Debug, Error)]
pub enum AlertError {
    #[error(transparent)]
    Db(#[from] DbErr),
    #[error("rule '{rule}' has an invalid duration '{value}'; expected forms like 30s, 15m, 2h, 1d")]
    InvalidDuration { rule: String, value: String },
    #[error("rule '{rule}' names unknown metric '{metric}'")]
    UnknownMetric { rule: String, metric: String },
}

/// Outcome of evaluating one rule
#[derive(Debug, Clone, Serialize)]
pub struct AlertEvaluation {
    pub rule_id: Uuid,
    pub rule_name: String,
    pub metric: String,
    pub entity_scope: String,
    pub current_value: f64,
    pub threshold: f64,
    pub triggered: bool,
    /// True when a triggered rule is outside its escalation-delay window
    /// and a notification went (or would go) out
    pub escalation_required: bool,
    pub message: Option<String>,
    pub recovery_suggestion: Option<String>,
}

/// Parse `"30s"` / `"15m"` / `"2h"` / `"1d"` into a duration
fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.len() < 2 {
        return None;
    }
    let (amount, unit) = value.split_at(value.len() - 1);
    let amount: i64 = amount.parse().ok()?;
    if amount <= 0 {
        return None;
    }
    match unit {
        "s" => Some(Duration::seconds(amount)),
        "m" => Some(Duration::minutes(amount)),
        "h" => Some(Duration::hours(amount)),
        "d" => Some(Duration::days(amount)),
        _ => None,
    }
}

/// Rule evaluation plus escalation-gated notification dispatch
pub struct AlertEngine<S: NotificationSink> {
    rules: AlertRuleRepository,
    executions: SyncExecutionRepository,
    sink: S,
    config: AlertConfig,
    last_notified: Mutex<HashMap<Uuid, DateTime<Utc>>>,
}

impl<S: NotificationSink> AlertEngine<S> {
    pub fn new(
        rules: AlertRuleRepository,
        executions: SyncExecutionRepository,
        sink: S,
        config: AlertConfig,
    ) -> Self {
        Self {
            rules,
            executions,
            sink,
            config,
            last_notified: Mutex::new(HashMap::new()),
        }
    }

    /// Evaluate one rule against the ledger at the given instant
    pub async fn evaluate_rule(
        &self,
        rule: &AlertRule,
        now: DateTime<Utc>,
    ) -> Result<AlertEvaluation, AlertError> {
        let window = parse_duration(&rule.evaluation_window).ok_or_else(|| {
            AlertError::InvalidDuration {
                rule: rule.name.clone(),
                value: rule.evaluation_window.clone(),
            }
        })?;
        let escalation_delay = parse_duration(&rule.escalation_delay).ok_or_else(|| {
            AlertError::InvalidDuration {
                rule: rule.name.clone(),
                value: rule.escalation_delay.clone(),
            }
        })?;

        let scope = if rule.entity_scope == "all" {
            None
        } else {
            Some(rule.entity_scope.as_str())
        };
        let since = (now - window).fixed_offset();

        let (current_value, triggered, message, suggestion) = match rule.metric.as_str() {
            "success_rate" => {
                let runs = self.executions.recent(scope, since).await?;
                // An empty ledger is healthy, not silently failing.
                let rate = if runs.is_empty() {
                    1.0
                } else {
                    runs.iter().filter(|r| r.success).count() as f64 / runs.len() as f64
                };
                let triggered = rate < rule.threshold;
                (
                    rate,
                    triggered,
                    format!(
                        "sync success rate {:.1}% over the last {} is below the {:.1}% threshold",
                        rate * 100.0,
                        rule.evaluation_window,
                        rule.threshold * 100.0
                    ),
                    "check the error log for the dominant failure category and verify \
                     federation credentials"
                        .to_string(),
                )
            }
            "consecutive_failures" => {
                let streak = self.executions.consecutive_failures(scope).await? as f64;
                let triggered = streak >= rule.threshold;
                (
                    streak,
                    triggered,
                    format!(
                        "{streak:.0} consecutive sync runs have failed (threshold {:.0})",
                        rule.threshold
                    ),
                    "inspect the latest sync execution's error summary; the gateway may be \
                     rejecting requests"
                        .to_string(),
                )
            }
            "duration_exceeded" => {
                let runs = self.executions.recent(scope, since).await?;
                // Newest first; missing data defaults healthy.
                let latest_ms = runs
                    .first()
                    .and_then(|r| r.duration_ms)
                    .map(|ms| ms as f64)
                    .unwrap_or(0.0);
                let triggered = latest_ms >= rule.threshold && latest_ms > 0.0;
                (
                    latest_ms,
                    triggered,
                    format!(
                        "latest sync run took {latest_ms:.0} ms, at or above the {:.0} ms threshold",
                        rule.threshold
                    ),
                    "reduce the sync batch size or narrow the tournament scope".to_string(),
                )
            }
            "memory_usage" => {
                let runs = self.executions.recent(scope, since).await?;
                let latest_kb = runs
                    .iter()
                    .find_map(|r| r.memory_estimate_kb)
                    .map(|kb| kb as f64)
                    .unwrap_or(0.0);
                let triggered = latest_kb >= rule.threshold && latest_kb > 0.0;
                (
                    latest_kb,
                    triggered,
                    format!(
                        "estimated working set {latest_kb:.0} KB is at or above the {:.0} KB threshold",
                        rule.threshold
                    ),
                    "lower sync concurrency or batch size to shrink the working set".to_string(),
                )
            }
            other => {
                return Err(AlertError::UnknownMetric {
                    rule: rule.name.clone(),
                    metric: other.to_string(),
                });
            }
        };

        let escalation_required = triggered && self.escalation_due(rule.id, escalation_delay, now);

        Ok(AlertEvaluation {
            rule_id: rule.id,
            rule_name: rule.name.clone(),
            metric: rule.metric.clone(),
            entity_scope: rule.entity_scope.clone(),
            current_value,
            threshold: rule.threshold,
            triggered,
            escalation_required,
            message: triggered.then_some(message),
            recovery_suggestion: triggered.then_some(suggestion),
        })
    }

    /// Evaluate every active rule; triggered rules outside their escalation
    /// window are dispatched to their channels.
    pub async fn evaluate_all(&self) -> Result<Vec<AlertEvaluation>, AlertError> {
        let now = Utc::now();
        let rules = self.rules.list_active().await?;
        let mut evaluations = Vec::with_capacity(rules.len());

        for rule in &rules {
            let evaluation = match self.evaluate_rule(rule, now).await {
                Ok(evaluation) => evaluation,
                Err(err @ (AlertError::InvalidDuration { .. } | AlertError::UnknownMetric { .. })) => {
                    // A misconfigured rule must not block the others.
                    warn!(rule = %rule.name, error = %err, "skipping unevaluable alert rule");
                    continue;
                }
                Err(err) => return Err(err),
            };

            if evaluation.triggered {
                counter!("alerts_triggered_total", "metric" => rule.metric.clone()).increment(1);
            }
            if evaluation.triggered && evaluation.escalation_required {
                if self.notify(rule, &evaluation, now).await {
                    self.mark_notified(rule.id, now);
                }
            } else if evaluation.triggered {
                debug!(rule = %rule.name, "alert still inside escalation window");
            }

            evaluations.push(evaluation);
        }

        Ok(evaluations)
    }

    /// Read-only check; the suppression slot is only consumed once a
    /// dispatch is actually attempted ([`Self::mark_notified`]).
    fn escalation_due(&self, rule_id: Uuid, delay: Duration, now: DateTime<Utc>) -> bool {
        let last = self
            .last_notified
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match last.get(&rule_id) {
            Some(previous) if now.signed_duration_since(*previous) < delay => false,
            _ => true,
        }
    }

    fn mark_notified(&self, rule_id: Uuid, now: DateTime<Utc>) {
        self.last_notified
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(rule_id, now);
    }

    /// Dispatch to the rule's channels. Returns whether delivery was
    /// attempted, so suppression never starts for alerts that were muted.
    async fn notify(&self, rule: &AlertRule, evaluation: &AlertEvaluation, now: DateTime<Utc>) -> bool {
        if !self.config.enabled {
            debug!(rule = %rule.name, "alert dispatch disabled by configuration");
            return false;
        }

        let notification = AlertNotification {
            rule_id: rule.id,
            rule_name: rule.name.clone(),
            entity_scope: rule.entity_scope.clone(),
            metric: rule.metric.clone(),
            current_value: evaluation.current_value,
            threshold: rule.threshold,
            message: evaluation.message.clone().unwrap_or_default(),
            recovery_suggestion: evaluation.recovery_suggestion.clone().unwrap_or_default(),
            triggered_at: now,
        };

        let channels: Vec<String> = serde_json::from_value(rule.channels.clone())
            .unwrap_or_else(|_| vec!["dashboard".to_string()]);

        for channel in channels {
            if let Err(err) = self.sink.dispatch(&channel, &notification).await {
                warn!(rule = %rule.name, channel, error = %err, "alert dispatch failed");
            } else {
                info!(rule = %rule.name, channel, "alert dispatched");
            }
        }

        true
    }
}
