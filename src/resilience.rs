//! # Resilience Layer
//!
//! Retry orchestration around gateway and storage operations. Failures are
//! classified first; retryable ones back off exponentially with jitter,
//! terminal ones land in an in-memory dead-letter queue and are persisted to
//! the error log. Replaying the queue is deterministic: an entry resolves
//! only when its replay operation actually succeeds.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use rand::{Rng, thread_rng};
use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::classify::{Classification, ErrorCategory, ErrorContext, Severity, classify};
use crate::config::RetryPolicyConfig;
use crate::repositories::ErrorLogRepository;

/// A failed operation attempt, carrying what the classifier needs
#[derive(Debug, Clone)]
pub struct FailureDetail {
    pub message: String,
    pub context: Option<ErrorContext>,
}

impl FailureDetail {
    pub fn new(message: impl Into<String>, context: Option<ErrorContext>) -> Self {
        Self {
            message: message.into(),
            context,
        }
    }

    /// Failure with no structured context; classification falls back to
    /// message keywords.
    pub fn bare(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
        }
    }
}

impl fmt::Display for FailureDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Terminal failure returned once retries are exhausted or skipped
#[derive(Debug, Clone)]
pub struct ResilienceError {
    pub message: String,
    pub classification: Classification,
    pub attempts: u32,
}

impl fmt::Display for ResilienceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} after {} attempt(s))",
            self.message,
            self.classification.category.as_str(),
            self.attempts
        )
    }
}

impl std::error::Error for ResilienceError {}

/// Dead-letter entry lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeadLetterStatus {
    Failed,
    Resolved,
}

/// One terminally failed operation awaiting replay
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetterEntry {
    pub id: Uuid,
    /// Operation label plus entity key, e.g. "fetch_matches:502"
    pub operation_key: String,
    pub message: String,
    pub category: ErrorCategory,
    pub attempts: u32,
    pub status: DeadLetterStatus,
    pub enqueued_at: DateTime<Utc>,
}

/// Result of one dead-letter replay pass
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DeadLetterReport {
    pub processed: usize,
    pub resolved: usize,
    pub still_failed: usize,
}

/// Success/failure partition from [`ResilienceLayer::execute_for_each`]
#[derive(Debug)]
pub struct BatchOutcome<T> {
    pub successes: Vec<T>,
    pub failures: Vec<(String, ResilienceError)>,
}

impl<T> BatchOutcome<T> {
    pub fn total(&self) -> usize {
        self.successes.len() + self.failures.len()
    }
}

/// Aggregate counters exposed for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct ResilienceStatistics {
    pub total_errors: u64,
    pub errors_by_category: BTreeMap<String, u64>,
    pub dead_letter_queue_size: usize,
    pub retryable_errors: u64,
    pub critical_errors: u64,
}

#[derive(Debug, Default)]
struct ResilienceState {
    dead_letters: Vec<DeadLetterEntry>,
    total_errors: u64,
    errors_by_category: BTreeMap<String, u64>,
    retryable_errors: u64,
    critical_errors: u64,
}

/// Retry and dead-letter orchestrator
pub struct ResilienceLayer {
    policy: RetryPolicyConfig,
    state: Mutex<ResilienceState>,
    error_log: Option<ErrorLogRepository>,
}

impl ResilienceLayer {
    pub fn new(policy: RetryPolicyConfig) -> Self {
        Self {
            policy,
            state: Mutex::new(ResilienceState::default()),
            error_log: None,
        }
    }

    /// Attach the error-log repository so terminal failures are persisted
    pub fn with_error_log(mut self, repository: ErrorLogRepository) -> Self {
        self.error_log = Some(repository);
        self
    }

    /// Run the operation, retrying classified-retryable failures with
    /// exponential backoff. The closure receives the 1-based attempt number.
    ///
    /// Terminal failures are counted, dead-lettered, persisted to the error
    /// log when a repository is attached, and returned to the caller.
    pub async fn execute<T, F, Fut>(&self, key: &str, mut op: F) -> Result<T, ResilienceError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, FailureDetail>>,
    {
        let max_attempts = self.policy.max_retries + 1;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(key, attempt, "operation recovered after retry");
                        counter!("resilience_recoveries_total").increment(1);
                    }
                    return Ok(value);
                }
                Err(failure) => {
                    let classification = classify(&failure.message, failure.context.as_ref());

                    if classification.retryable && attempt < max_attempts {
                        let delay = self.backoff_delay(attempt);
                        warn!(
                            key,
                            attempt,
                            category = classification.category.as_str(),
                            delay_ms = delay.as_millis() as u64,
                            error = %failure.message,
                            "retryable failure, backing off"
                        );
                        counter!("resilience_retries_total").increment(1);
                        sleep(delay).await;
                        continue;
                    }

                    self.record_terminal_failure(key, &failure, &classification, attempt)
                        .await;

                    return Err(ResilienceError {
                        message: failure.message,
                        classification,
                        attempts: attempt,
                    });
                }
            }
        }
    }

    /// Run the operation once per item, retrying each independently. One
    /// terminal failure never aborts the remaining items.
    pub async fn execute_for_each<I, T, F, Fut>(
        &self,
        items: Vec<I>,
        label: &str,
        op: F,
    ) -> BatchOutcome<T>
    where
        I: Clone + fmt::Display,
        F: Fn(I) -> Fut,
        Fut: Future<Output = Result<T, FailureDetail>>,
    {
        let mut successes = Vec::new();
        let mut failures = Vec::new();

        for item in items {
            let key = format!("{label}:{item}");
            match self.execute(&key, |_| op(item.clone())).await {
                Ok(value) => successes.push(value),
                Err(err) => failures.push((item.to_string(), err)),
            }
        }

        BatchOutcome {
            successes,
            failures,
        }
    }

    /// Snapshot of the dead-letter queue
    pub fn dead_letter_entries(&self) -> Vec<DeadLetterEntry> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .dead_letters
            .clone()
    }

    /// Replay every FAILED entry through the supplied operation. An entry
    /// flips to RESOLVED only when its replay succeeds; otherwise its
    /// attempt count grows and it stays in the queue.
    pub async fn process_dead_letter_queue<F, Fut>(&self, replay: F) -> DeadLetterReport
    where
        F: Fn(DeadLetterEntry) -> Fut,
        Fut: Future<Output = Result<(), FailureDetail>>,
    {
        let pending: Vec<DeadLetterEntry> = self
            .dead_letter_entries()
            .into_iter()
            .filter(|entry| entry.status == DeadLetterStatus::Failed)
            .collect();

        let mut report = DeadLetterReport::default();

        for entry in pending {
            report.processed += 1;
            let id = entry.id;
            match replay(entry).await {
                Ok(()) => {
                    report.resolved += 1;
                    self.mark_dead_letter(id, DeadLetterStatus::Resolved);
                }
                Err(failure) => {
                    report.still_failed += 1;
                    debug!(dead_letter_id = %id, error = %failure.message, "replay failed");
                    self.bump_dead_letter_attempts(id);
                }
            }
        }

        if report.processed > 0 {
            counter!("resilience_dead_letters_replayed_total")
                .increment(report.processed as u64);
        }
        report
    }

    pub fn statistics(&self) -> ResilienceStatistics {
        let state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        ResilienceStatistics {
            total_errors: state.total_errors,
            errors_by_category: state.errors_by_category.clone(),
            dead_letter_queue_size: state
                .dead_letters
                .iter()
                .filter(|e| e.status == DeadLetterStatus::Failed)
                .count(),
            retryable_errors: state.retryable_errors,
            critical_errors: state.critical_errors,
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.policy.base_delay_ms as f64;
        let max = self.policy.max_delay_ms as f64;
        let raw = (base * self.policy.backoff_multiplier.powi(attempt as i32 - 1)).min(max);

        let jitter = if self.policy.jitter_factor > 0.0 {
            thread_rng().gen_range(0.0..(self.policy.jitter_factor * raw))
        } else {
            0.0
        };

        Duration::from_millis((raw + jitter) as u64)
    }

    async fn record_terminal_failure(
        &self,
        key: &str,
        failure: &FailureDetail,
        classification: &Classification,
        attempts: u32,
    ) {
        error!(
            key,
            attempts,
            category = classification.category.as_str(),
            severity = classification.severity.as_str(),
            error = %failure.message,
            "operation failed terminally"
        );
        counter!(
            "resilience_errors_total",
            "category" => classification.category.as_str()
        )
        .increment(1);

        {
            let mut state = self
                .state
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            state.total_errors += 1;
            *state
                .errors_by_category
                .entry(classification.category.as_str().to_string())
                .or_default() += 1;
            if classification.retryable {
                state.retryable_errors += 1;
            }
            if classification.severity == Severity::Critical {
                state.critical_errors += 1;
            }
            state.dead_letters.push(DeadLetterEntry {
                id: Uuid::new_v4(),
                operation_key: key.to_string(),
                message: failure.message.clone(),
                category: classification.category,
                attempts,
                status: DeadLetterStatus::Failed,
                enqueued_at: Utc::now(),
            });
        }

        if let Some(repo) = &self.error_log {
            if let Err(db_err) = repo
                .record(classification, &failure.message, failure.context.as_ref())
                .await
            {
                warn!(error = %db_err, "failed to persist error log entry");
            }
        }
    }

    fn mark_dead_letter(&self, id: Uuid, status: DeadLetterStatus) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(entry) = state.dead_letters.iter_mut().find(|e| e.id == id) {
            entry.status = status;
        }
    }

    fn bump_dead_letter_attempts(&self, id: Uuid) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(entry) = state.dead_letters.iter_mut().find(|e| e.id == id) {
            entry.attempts += 1;
        }
    }
}
