//! Run orchestration for one entity type.
//!
//! A run discovers its fetch units, orders them by federation tier, and
//! processes them in bounded concurrent tasks. Each unit fetches through the
//! resilience layer (so transient gateway failures retry with backoff),
//! parses tolerantly, normalizes, and upserts in chunks. The whole run races
//! a configurable timeout, and success is a policy decision: the failed-unit
//! fraction must stay under the configured ceiling.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use metrics::{counter, histogram};
use sea_orm::DbErr;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::cache::CacheStrategy;
use crate::config::SyncConfig;
use crate::governor::PerformanceGovernor;
use crate::repositories::{
    SyncExecutionRepository, SyncStatusRepository, UpsertOutcome,
    sync_execution::ExecutionRecord,
};
use crate::resilience::{FailureDetail, ResilienceLayer};
use crate::sync::entities::{SyncEntity, SyncUnit};
use crate::vis::client::VisClient;
use crate::vis::parser::PayloadParser;

/// Shared rate-limit key; both entity types call the same gateway
const GATEWAY_RATE_KEY: &str = "vis_gateway";

/// How long a task waits between rate-window probes
const RATE_WAIT_INTERVAL: Duration = Duration::from_millis(500);

/// Error messages carried on a summary are capped at this many entries
const ERROR_SAMPLE_LIMIT: usize = 20;

/// Failure before any unit could be processed
#[derive(Debug, Error)]
pub enum SyncRunError {
    #[error("candidate discovery failed: {0}")]
    Discovery(#[from] DbErr),
}

/// Aggregated outcome of one run
#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub success: bool,
    pub entity_type: String,
    pub units_total: usize,
    pub units_failed: usize,
    pub processed: usize,
    pub inserts: usize,
    pub updates: usize,
    pub errors: usize,
    pub duration_ms: u64,
    pub recommended_ttl_seconds: u64,
    pub error_messages: Vec<String>,
}

#[derive(Debug, Default)]
struct UnitOutcome {
    processed: usize,
    inserts: usize,
    updates: usize,
    errors: usize,
    payload_bytes: usize,
    recommended_ttl_seconds: Option<u64>,
    /// External keys persisted by this unit
    keys: Vec<i32>,
    error_messages: Vec<String>,
    fetch_failed: bool,
}

/// Generic sync engine; one instance per entity type
pub struct SyncEngine<E: SyncEntity> {
    entity: Arc<E>,
    client: Arc<VisClient>,
    parser: Arc<dyn PayloadParser>,
    resilience: Arc<ResilienceLayer>,
    governor: Arc<PerformanceGovernor>,
    cache: Arc<CacheStrategy>,
    executions: Arc<SyncExecutionRepository>,
    statuses: Arc<SyncStatusRepository>,
    config: SyncConfig,
}

impl<E: SyncEntity> Clone for SyncEngine<E> {
    fn clone(&self) -> Self {
        Self {
            entity: Arc::clone(&self.entity),
            client: Arc::clone(&self.client),
            parser: Arc::clone(&self.parser),
            resilience: Arc::clone(&self.resilience),
            governor: Arc::clone(&self.governor),
            cache: Arc::clone(&self.cache),
            executions: Arc::clone(&self.executions),
            statuses: Arc::clone(&self.statuses),
            config: self.config.clone(),
        }
    }
}

impl<E: SyncEntity> SyncEngine<E> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        entity: Arc<E>,
        client: Arc<VisClient>,
        parser: Arc<dyn PayloadParser>,
        resilience: Arc<ResilienceLayer>,
        governor: Arc<PerformanceGovernor>,
        cache: Arc<CacheStrategy>,
        executions: Arc<SyncExecutionRepository>,
        statuses: Arc<SyncStatusRepository>,
        config: SyncConfig,
    ) -> Self {
        Self {
            entity,
            client,
            parser,
            resilience,
            governor,
            cache,
            executions,
            statuses,
            config,
        }
    }

    /// Run one full sync pass for this entity type.
    ///
    /// `Err` means the run could not start at all (discovery failure); every
    /// other outcome, including a run-level timeout, comes back as a summary
    /// with `success` decided by the failure-ceiling policy.
    pub async fn run(&self) -> Result<SyncSummary, SyncRunError> {
        let entity_type = self.entity.entity_type();
        let started_at = Utc::now().fixed_offset();
        let clock = Instant::now();

        let units = match self.entity.discover_units().await {
            Ok(units) => units,
            Err(err) => {
                warn!(entity_type, error = %err, "candidate discovery failed");
                self.record_run_outcome(
                    entity_type,
                    started_at,
                    clock.elapsed(),
                    false,
                    0,
                    None,
                    Some(format!("discovery failed: {err}")),
                )
                .await;
                return Err(SyncRunError::Discovery(err));
            }
        };

        info!(entity_type, units = units.len(), "sync run starting");

        let run = timeout(
            Duration::from_secs(self.config.run_timeout_seconds),
            self.process_units(units),
        )
        .await;

        let duration = clock.elapsed();
        let mut summary = match run {
            Ok(summary) => summary,
            Err(_) => {
                warn!(
                    entity_type,
                    timeout_seconds = self.config.run_timeout_seconds,
                    "sync run timed out"
                );
                counter!("sync_run_timeouts_total", "entity" => entity_type).increment(1);
                SyncSummary {
                    success: false,
                    entity_type: entity_type.to_string(),
                    units_total: 0,
                    units_failed: 0,
                    processed: 0,
                    inserts: 0,
                    updates: 0,
                    errors: 1,
                    duration_ms: 0,
                    recommended_ttl_seconds: 0,
                    error_messages: vec![format!(
                        "run exceeded {} s timeout",
                        self.config.run_timeout_seconds
                    )],
                }
            }
        };
        summary.duration_ms = duration.as_millis() as u64;

        self.governor.record_operation(summary.success, duration);
        histogram!("sync_run_seconds", "entity" => entity_type).record(duration.as_secs_f64());

        let memory_estimate_kb = Some((summary.processed as i64) / 4);
        self.record_run_outcome(
            entity_type,
            started_at,
            duration,
            summary.success,
            summary.processed,
            memory_estimate_kb,
            summary.error_messages.first().cloned(),
        )
        .await;

        info!(
            entity_type,
            success = summary.success,
            processed = summary.processed,
            inserts = summary.inserts,
            updates = summary.updates,
            errors = summary.errors,
            duration_ms = summary.duration_ms,
            "sync run finished"
        );
        Ok(summary)
    }

    async fn process_units(&self, units: Vec<SyncUnit>) -> SyncSummary {
        let entity_type = self.entity.entity_type();
        let prioritized = self
            .governor
            .prioritize_tournaments(units, |unit| unit.label.as_str());
        let units_total = prioritized.len();

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks: JoinSet<(String, UnitOutcome)> = JoinSet::new();

        for unit in prioritized {
            let engine = self.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                // Closed only when the JoinSet is dropped mid-run.
                let Ok(_permit) = semaphore.acquire().await else {
                    return (unit.label.clone(), UnitOutcome::default());
                };
                let label = unit.label.clone();
                let outcome = engine.process_unit(unit).await;
                (label, outcome)
            });
        }

        let mut summary = SyncSummary {
            success: true,
            entity_type: entity_type.to_string(),
            units_total,
            units_failed: 0,
            processed: 0,
            inserts: 0,
            updates: 0,
            errors: 0,
            duration_ms: 0,
            recommended_ttl_seconds: self.cache.ttl_table().default_seconds,
            error_messages: Vec::new(),
        };
        let mut total_payload_bytes = 0usize;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((label, outcome)) => {
                    summary.processed += outcome.processed;
                    summary.inserts += outcome.inserts;
                    summary.updates += outcome.updates;
                    summary.errors += outcome.errors;
                    total_payload_bytes += outcome.payload_bytes;
                    if let Some(ttl) = outcome.recommended_ttl_seconds {
                        summary.recommended_ttl_seconds =
                            summary.recommended_ttl_seconds.min(ttl);
                    }
                    if outcome.fetch_failed {
                        summary.units_failed += 1;
                    }
                    for message in outcome.error_messages {
                        if summary.error_messages.len() < ERROR_SAMPLE_LIMIT {
                            summary.error_messages.push(format!("{label}: {message}"));
                        }
                    }
                }
                Err(join_err) => {
                    summary.units_failed += 1;
                    summary.errors += 1;
                    if summary.error_messages.len() < ERROR_SAMPLE_LIMIT {
                        summary
                            .error_messages
                            .push(format!("unit task panicked: {join_err}"));
                    }
                }
            }
        }

        debug!(
            entity_type,
            payload_kb = total_payload_bytes / 1024,
            "run payload volume"
        );

        if units_total > 0 {
            let failed_fraction = summary.units_failed as f64 / units_total as f64;
            summary.success = failed_fraction < self.config.failure_ceiling;
        }
        summary
    }

    async fn process_unit(&self, unit: SyncUnit) -> UnitOutcome {
        let entity_type = self.entity.entity_type();
        let mut outcome = UnitOutcome::default();

        // Stored statuses before this fetch, for cache invalidation diffing.
        let previous_subjects = match self.entity.current_subjects(&unit).await {
            Ok(subjects) => subjects,
            Err(err) => {
                warn!(entity_type, unit = %unit.label, error = %err, "pre-fetch snapshot failed");
                Vec::new()
            }
        };

        while !self.governor.can_process(GATEWAY_RATE_KEY) {
            debug!(entity_type, unit = %unit.label, "rate window exhausted, waiting");
            sleep(RATE_WAIT_INTERVAL).await;
        }
        self.governor.record_call(GATEWAY_RATE_KEY);

        let request = self.entity.request_for(&unit);
        let element = self.entity.element_name();
        let operation_key = format!("fetch_{}:{}", entity_type, unit.key);

        let fetched = self
            .resilience
            .execute(&operation_key, |_attempt| {
                let client = Arc::clone(&self.client);
                let parser = Arc::clone(&self.parser);
                let governor = Arc::clone(&self.governor);
                let request = request.clone();
                async move {
                    let attempt_clock = Instant::now();
                    let fetched = client.fetch(&request).await;
                    // Failed round-trips count toward gateway latency too;
                    // a slow-then-erroring gateway is the bottleneck case.
                    governor.record_response_time(attempt_clock.elapsed());
                    let body = fetched.map_err(|err| {
                        let context = err.context(&request.request_type);
                        FailureDetail::new(err.to_string(), Some(context))
                    })?;

                    let records = parser
                        .extract_records(&body, element)
                        .map_err(|err| FailureDetail::bare(err.to_string()))?;
                    Ok((body.len(), records))
                }
            })
            .await;

        let (payload_bytes, raw_records) = match fetched {
            Ok(result) => result,
            Err(err) => {
                outcome.fetch_failed = true;
                outcome.errors += 1;
                outcome.error_messages.push(err.to_string());
                return outcome;
            }
        };
        outcome.payload_bytes = payload_bytes;

        let mut records = Vec::with_capacity(raw_records.len());
        for raw in &raw_records {
            match self.entity.normalize(raw) {
                Ok(record) => records.push(record),
                Err(reason) => {
                    warn!(entity_type, unit = %unit.label, reason, "skipping invalid record");
                    counter!("sync_records_skipped_total", "entity" => entity_type).increment(1);
                }
            }
        }

        outcome.recommended_ttl_seconds =
            Some(self.apply_cache_policy(&unit, &previous_subjects, &records));

        let batch_size = self.governor.optimal_batch_size(self.config.batch_size);
        self.process_batch(&mut outcome, records, batch_size).await;
        debug!(
            entity_type,
            unit = %unit.label,
            persisted_keys = ?outcome.keys,
            "unit persisted"
        );
        outcome
    }

    /// Chunked upserts. A storage failure inside a chunk voids the whole
    /// chunk's counts and moves on to the next one.
    async fn process_batch(
        &self,
        outcome: &mut UnitOutcome,
        records: Vec<E::Record>,
        batch_size: usize,
    ) {
        let entity_type = self.entity.entity_type();

        for chunk in records.chunks(batch_size.max(1)) {
            let mut chunk_inserts = 0usize;
            let mut chunk_updates = 0usize;
            let mut chunk_keys = Vec::with_capacity(chunk.len());
            let mut chunk_failure: Option<String> = None;

            for record in chunk {
                let key = self.entity.record_key(record);
                match self.entity.upsert(record.clone()).await {
                    Ok(UpsertOutcome::Inserted) => {
                        chunk_inserts += 1;
                        chunk_keys.push(key);
                    }
                    Ok(UpsertOutcome::Updated) => {
                        chunk_updates += 1;
                        chunk_keys.push(key);
                    }
                    Err(err) => {
                        chunk_failure = Some(format!("upsert of record {key} failed: {err}"));
                        break;
                    }
                }
            }

            match chunk_failure {
                None => {
                    outcome.processed += chunk.len();
                    outcome.inserts += chunk_inserts;
                    outcome.updates += chunk_updates;
                    outcome.keys.extend(chunk_keys);
                }
                Some(message) => {
                    warn!(entity_type, error = %message, "chunk failed");
                    counter!("sync_chunks_failed_total", "entity" => entity_type).increment(1);
                    outcome.errors += chunk.len();
                    outcome.error_messages.push(message);
                }
            }
        }
    }

    fn apply_cache_policy(
        &self,
        unit: &SyncUnit,
        previous: &[crate::cache::CacheSubject],
        records: &[E::Record],
    ) -> u64 {
        let entity_type = self.entity.entity_type();
        let subjects: Vec<_> = records
            .iter()
            .map(|record| self.entity.cache_subject(record))
            .collect();

        let invalidations = self
            .cache
            .invalidation_triggers(previous, &subjects)
            .into_iter()
            .filter(|trigger| self.cache.should_invalidate(trigger))
            .count();
        if invalidations > 0 {
            info!(entity_type, unit = %unit.label, invalidations, "cache invalidation triggered");
            counter!("cache_invalidations_total", "entity" => entity_type)
                .increment(invalidations as u64);
        }

        let stats = self.cache.statistics(&subjects);
        debug!(
            entity_type,
            unit = %unit.label,
            recommended_ttl_seconds = stats.recommended_ttl_seconds,
            efficiency = ?stats.efficiency,
            "cache policy evaluated"
        );
        stats.recommended_ttl_seconds
    }

    #[allow(clippy::too_many_arguments)]
    async fn record_run_outcome(
        &self,
        entity_type: &str,
        started_at: chrono::DateTime<chrono::FixedOffset>,
        duration: Duration,
        success: bool,
        processed: usize,
        memory_estimate_kb: Option<i64>,
        error_summary: Option<String>,
    ) {
        let duration_ms = duration.as_millis() as i64;

        if let Err(err) = self
            .executions
            .record(ExecutionRecord {
                entity_type: entity_type.to_string(),
                started_at,
                success,
                records_processed: processed as i32,
                duration_ms,
                memory_estimate_kb,
                error_summary,
            })
            .await
        {
            warn!(entity_type, error = %err, "failed to record sync execution");
        }

        if let Err(err) = self
            .statuses
            .record_run(
                entity_type,
                self.config.default_frequency_minutes as i32,
                success,
                duration_ms,
            )
            .await
        {
            warn!(entity_type, error = %err, "failed to update sync status");
        }
    }
}
