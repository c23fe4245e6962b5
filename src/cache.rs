//! # Cache Strategy Engine
//!
//! Pure TTL policy for synced records. Downstream caches ask this module how
//! long a record or batch stays fresh, which lifecycle transitions force an
//! invalidation, and how cacheable a snapshot currently is. The TTL table is
//! merge-updatable at runtime and every duration must stay positive.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::normalize::RecordStatus;

/// Errors raised by TTL table updates
#[derive(Debug, Error)]
pub enum CachePolicyError {
    #[error("TTL for {field} must be greater than zero")]
    NonPositiveTtl { field: &'static str },
}

/// TTL table, one duration per freshness band
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlTable {
    /// Records currently running
    pub live_seconds: u64,
    /// Records scheduled for the current day
    pub today_seconds: u64,
    /// Records scheduled in the future
    pub future_seconds: u64,
    /// Records finished within the last hour
    pub recently_finished_seconds: u64,
    /// Everything else
    pub archive_seconds: u64,
    /// Used when a batch is empty
    pub default_seconds: u64,
}

impl Default for TtlTable {
    fn default() -> Self {
        Self {
            live_seconds: 30,
            today_seconds: 300,
            future_seconds: 900,
            recently_finished_seconds: 3600,
            archive_seconds: 86_400,
            default_seconds: 900,
        }
    }
}

/// Partial TTL table for runtime merges; unset fields keep their value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TtlUpdate {
    pub live_seconds: Option<u64>,
    pub today_seconds: Option<u64>,
    pub future_seconds: Option<u64>,
    pub recently_finished_seconds: Option<u64>,
    pub archive_seconds: Option<u64>,
    pub default_seconds: Option<u64>,
}

impl TtlTable {
    /// Apply the update in place, rejecting any non-positive duration
    pub fn merge(&mut self, update: TtlUpdate) -> Result<(), CachePolicyError> {
        fn apply(
            slot: &mut u64,
            value: Option<u64>,
            field: &'static str,
        ) -> Result<(), CachePolicyError> {
            if let Some(v) = value {
                if v == 0 {
                    return Err(CachePolicyError::NonPositiveTtl { field });
                }
                *slot = v;
            }
            Ok(())
        }

        apply(&mut self.live_seconds, update.live_seconds, "live_seconds")?;
        apply(&mut self.today_seconds, update.today_seconds, "today_seconds")?;
        apply(
            &mut self.future_seconds,
            update.future_seconds,
            "future_seconds",
        )?;
        apply(
            &mut self.recently_finished_seconds,
            update.recently_finished_seconds,
            "recently_finished_seconds",
        )?;
        apply(
            &mut self.archive_seconds,
            update.archive_seconds,
            "archive_seconds",
        )?;
        apply(
            &mut self.default_seconds,
            update.default_seconds,
            "default_seconds",
        )?;
        Ok(())
    }
}

/// The slice of a synced record the policy looks at
#[derive(Debug, Clone)]
pub struct CacheSubject {
    /// External record number
    pub key: i32,
    pub status: RecordStatus,
    /// Canonical local date of the record
    pub local_date: NaiveDate,
    /// Last observed change, used to spot recently finished records
    pub last_change: Option<DateTime<Utc>>,
}

/// A status transition observed between two snapshots of the same key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidationTrigger {
    pub key: i32,
    pub from: RecordStatus,
    pub to: RecordStatus,
}

/// How cacheable a snapshot is overall
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheEfficiency {
    Low,
    Medium,
    High,
}

/// Snapshot summary returned by [`CacheStrategy::statistics`]
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatistics {
    pub total_records: usize,
    pub status_counts: BTreeMap<String, usize>,
    pub recommended_ttl_seconds: u64,
    pub efficiency: CacheEfficiency,
}

/// TTL policy engine over a [`TtlTable`]
#[derive(Debug, Clone, Default)]
pub struct CacheStrategy {
    ttl: TtlTable,
}

impl CacheStrategy {
    pub fn new(ttl: TtlTable) -> Self {
        Self { ttl }
    }

    pub fn ttl_table(&self) -> &TtlTable {
        &self.ttl
    }

    pub fn merge_ttl(&mut self, update: TtlUpdate) -> Result<(), CachePolicyError> {
        self.ttl.merge(update)
    }

    /// TTL for one record, evaluated against the current wall clock
    pub fn record_ttl(&self, subject: &CacheSubject) -> Duration {
        self.record_ttl_at(subject, Utc::now())
    }

    /// TTL for one record at a fixed instant.
    ///
    /// Precedence: running, then scheduled today, then future, then
    /// finished within the last hour, then archive.
    pub fn record_ttl_at(&self, subject: &CacheSubject, now: DateTime<Utc>) -> Duration {
        let today = now.date_naive();
        let seconds = if subject.status == RecordStatus::Running {
            self.ttl.live_seconds
        } else if subject.local_date == today {
            self.ttl.today_seconds
        } else if subject.local_date > today {
            self.ttl.future_seconds
        } else if subject.status == RecordStatus::Finished
            && subject
                .last_change
                .is_some_and(|changed| now.signed_duration_since(changed).num_seconds() < 3600)
        {
            self.ttl.recently_finished_seconds
        } else {
            self.ttl.archive_seconds
        };
        Duration::from_secs(seconds)
    }

    /// TTL for a whole batch, evaluated against the current wall clock
    pub fn batch_ttl(&self, subjects: &[CacheSubject]) -> Duration {
        self.batch_ttl_at(subjects, Utc::now())
    }

    /// A batch refreshes as fast as its most volatile record; an empty
    /// batch gets the default TTL.
    pub fn batch_ttl_at(&self, subjects: &[CacheSubject], now: DateTime<Utc>) -> Duration {
        subjects
            .iter()
            .map(|subject| self.record_ttl_at(subject, now))
            .min()
            .unwrap_or(Duration::from_secs(self.ttl.default_seconds))
    }

    /// Status transitions between two snapshots, for keys present in both
    pub fn invalidation_triggers(
        &self,
        old: &[CacheSubject],
        new: &[CacheSubject],
    ) -> Vec<InvalidationTrigger> {
        let previous: BTreeMap<i32, RecordStatus> =
            old.iter().map(|s| (s.key, s.status)).collect();

        new.iter()
            .filter_map(|subject| {
                let from = *previous.get(&subject.key)?;
                if from == subject.status {
                    return None;
                }
                Some(InvalidationTrigger {
                    key: subject.key,
                    from,
                    to: subject.status,
                })
            })
            .collect()
    }

    /// Only meaningful lifecycle transitions force a cache purge
    pub fn should_invalidate(&self, trigger: &InvalidationTrigger) -> bool {
        use RecordStatus::*;
        matches!(
            (trigger.from, trigger.to),
            (Upcoming, Running)
                | (Running, Finished)
                | (Running, Suspended)
                | (Suspended, Running)
                | (Running, Cancelled)
                | (Upcoming, Cancelled)
                | (Upcoming, Postponed)
                | (Postponed, Running)
        )
    }

    /// Snapshot summary, evaluated against the current wall clock
    pub fn statistics(&self, subjects: &[CacheSubject]) -> CacheStatistics {
        self.statistics_at(subjects, Utc::now())
    }

    pub fn statistics_at(&self, subjects: &[CacheSubject], now: DateTime<Utc>) -> CacheStatistics {
        let mut status_counts: BTreeMap<String, usize> = BTreeMap::new();
        for subject in subjects {
            *status_counts
                .entry(subject.status.as_str().to_string())
                .or_default() += 1;
        }

        let today = now.date_naive();
        let live = subjects
            .iter()
            .filter(|s| s.status == RecordStatus::Running)
            .count();
        let scheduled_today = subjects
            .iter()
            .filter(|s| s.status != RecordStatus::Running && s.local_date == today)
            .count();

        let efficiency = if live > 0 {
            CacheEfficiency::Low
        } else if !subjects.is_empty() && scheduled_today * 2 > subjects.len() {
            CacheEfficiency::Medium
        } else {
            CacheEfficiency::High
        };

        CacheStatistics {
            total_records: subjects.len(),
            status_counts,
            recommended_ttl_seconds: self.batch_ttl_at(subjects, now).as_secs(),
            efficiency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 15, 12, 0, 0).unwrap()
    }

    fn subject(key: i32, status: RecordStatus, date: NaiveDate) -> CacheSubject {
        CacheSubject {
            key,
            status,
            local_date: date,
            last_change: None,
        }
    }

    #[test]
    fn live_record_gets_shortest_ttl() {
        let strategy = CacheStrategy::default();
        let s = subject(1, RecordStatus::Running, now().date_naive());
        assert_eq!(strategy.record_ttl_at(&s, now()), Duration::from_secs(30));
    }

    #[test]
    fn today_beats_future_and_archive() {
        let strategy = CacheStrategy::default();
        let today = subject(1, RecordStatus::Upcoming, now().date_naive());
        let future = subject(
            2,
            RecordStatus::Upcoming,
            now().date_naive() + ChronoDuration::days(3),
        );
        assert_eq!(
            strategy.record_ttl_at(&today, now()),
            Duration::from_secs(300)
        );
        assert_eq!(
            strategy.record_ttl_at(&future, now()),
            Duration::from_secs(900)
        );
    }

    #[test]
    fn recently_finished_gets_hour_ttl() {
        let strategy = CacheStrategy::default();
        let mut s = subject(
            1,
            RecordStatus::Finished,
            now().date_naive() - ChronoDuration::days(2),
        );
        s.last_change = Some(now() - ChronoDuration::minutes(20));
        assert_eq!(strategy.record_ttl_at(&s, now()), Duration::from_secs(3600));

        s.last_change = Some(now() - ChronoDuration::hours(5));
        assert_eq!(
            strategy.record_ttl_at(&s, now()),
            Duration::from_secs(86_400)
        );
    }

    #[test]
    fn batch_ttl_takes_most_volatile_record() {
        let strategy = CacheStrategy::default();
        let subjects = vec![
            subject(
                1,
                RecordStatus::Upcoming,
                now().date_naive() + ChronoDuration::days(5),
            ),
            subject(2, RecordStatus::Running, now().date_naive()),
        ];
        assert_eq!(
            strategy.batch_ttl_at(&subjects, now()),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn empty_batch_uses_default_ttl() {
        let strategy = CacheStrategy::default();
        assert_eq!(strategy.batch_ttl_at(&[], now()), Duration::from_secs(900));
    }

    #[test]
    fn triggers_only_cover_keys_in_both_snapshots() {
        let strategy = CacheStrategy::default();
        let date = now().date_naive();
        let old = vec![
            subject(1, RecordStatus::Upcoming, date),
            subject(2, RecordStatus::Running, date),
        ];
        let new = vec![
            subject(1, RecordStatus::Running, date),
            subject(3, RecordStatus::Finished, date),
        ];

        let triggers = strategy.invalidation_triggers(&old, &new);
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].key, 1);
        assert_eq!(triggers[0].from, RecordStatus::Upcoming);
        assert_eq!(triggers[0].to, RecordStatus::Running);
    }

    #[test]
    fn only_lifecycle_transitions_invalidate() {
        let strategy = CacheStrategy::default();
        let promoted = InvalidationTrigger {
            key: 1,
            from: RecordStatus::Upcoming,
            to: RecordStatus::Running,
        };
        let cosmetic = InvalidationTrigger {
            key: 1,
            from: RecordStatus::Finished,
            to: RecordStatus::Unknown,
        };
        assert!(strategy.should_invalidate(&promoted));
        assert!(!strategy.should_invalidate(&cosmetic));
    }

    #[test]
    fn statistics_reports_low_efficiency_with_live_records() {
        let strategy = CacheStrategy::default();
        let date = now().date_naive();
        let subjects = vec![
            subject(1, RecordStatus::Running, date),
            subject(2, RecordStatus::Upcoming, date),
        ];
        let stats = strategy.statistics_at(&subjects, now());
        assert_eq!(stats.efficiency, CacheEfficiency::Low);
        assert_eq!(stats.recommended_ttl_seconds, 30);
        assert_eq!(stats.status_counts.get("Running"), Some(&1));
    }

    #[test]
    fn statistics_reports_medium_when_mostly_scheduled_today() {
        let strategy = CacheStrategy::default();
        let date = now().date_naive();
        let subjects = vec![
            subject(1, RecordStatus::Upcoming, date),
            subject(2, RecordStatus::Upcoming, date),
            subject(
                3,
                RecordStatus::Upcoming,
                date + ChronoDuration::days(1),
            ),
        ];
        let stats = strategy.statistics_at(&subjects, now());
        assert_eq!(stats.efficiency, CacheEfficiency::Medium);
    }

    #[test]
    fn merge_rejects_zero_ttl() {
        let mut table = TtlTable::default();
        let err = table.merge(TtlUpdate {
            live_seconds: Some(0),
            ..Default::default()
        });
        assert!(err.is_err());

        table
            .merge(TtlUpdate {
                live_seconds: Some(10),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(table.live_seconds, 10);
    }
}
