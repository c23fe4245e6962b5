//! Entity-specific halves of the sync engine.
//!
//! The engine is generic over [`SyncEntity`]; this module implements it for
//! tournaments (one unit covering the whole federation list) and matches
//! (one unit per stored tournament, ordered live, then scheduled today, then
//! future).

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sea_orm::DbErr;

use crate::cache::CacheSubject;
use crate::normalize::{RecordStatus, normalize_date, normalize_status, sanitize_text};
use crate::repositories::{
    BeachMatchRepository, SyncStatusRepository, TournamentRepository, UpsertOutcome,
    beach_match::BeachMatchRecord, tournament::TournamentRecord,
};
use crate::vis::client::VisRequest;
use crate::vis::parser::RawRecord;

/// One schedulable fetch unit within a run
#[derive(Debug, Clone)]
pub struct SyncUnit {
    /// External key the fetch is scoped to; 0 for a full-list fetch
    pub key: i32,
    /// Display label, also fed to tournament-tier prioritization
    pub label: String,
}

/// Entity-specific behavior the generic engine is parameterized over
#[async_trait]
pub trait SyncEntity: Send + Sync + 'static {
    /// Normalized record ready for persistence
    type Record: Send + Sync + Clone + 'static;

    /// Ledger key, also the sync_status row id
    fn entity_type(&self) -> &'static str;

    /// Repeated XML element the payload parser extracts
    fn element_name(&self) -> &'static str;

    /// Gateway request covering one unit
    fn request_for(&self, unit: &SyncUnit) -> VisRequest;

    /// Map a raw parsed record to its normalized form.
    ///
    /// Records without a numeric external number are rejected with a reason;
    /// the engine skips and logs them without failing the unit.
    fn normalize(&self, raw: &RawRecord) -> Result<Self::Record, String>;

    fn record_key(&self, record: &Self::Record) -> i32;

    /// Cache-policy view of a normalized record
    fn cache_subject(&self, record: &Self::Record) -> CacheSubject;

    /// Units due for this run, already in discovery order
    async fn discover_units(&self) -> Result<Vec<SyncUnit>, DbErr>;

    /// Current stored cache subjects for one unit, used to diff statuses
    async fn current_subjects(&self, unit: &SyncUnit) -> Result<Vec<CacheSubject>, DbErr>;

    async fn upsert(&self, record: Self::Record) -> Result<UpsertOutcome, DbErr>;
}

fn parse_external_no(raw: &RawRecord, field: &str) -> Result<i32, String> {
    let value = raw
        .get(field)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| format!("record is missing required field {field}"))?;
    value
        .parse::<i32>()
        .map_err(|_| format!("field {field} is not numeric: '{value}'"))
}

fn parsed_date(canonical: &str) -> NaiveDate {
    NaiveDate::parse_from_str(canonical, "%Y-%m-%d")
        .unwrap_or_else(|_| Utc::now().date_naive())
}

/// Tournament list synchronization
pub struct TournamentSync {
    tournaments: TournamentRepository,
}

impl TournamentSync {
    pub fn new(tournaments: TournamentRepository) -> Self {
        Self { tournaments }
    }
}

#[async_trait]
impl SyncEntity for TournamentSync {
    type Record = TournamentRecord;

    fn entity_type(&self) -> &'static str {
        "tournaments"
    }

    fn element_name(&self) -> &'static str {
        "Tournament"
    }

    fn request_for(&self, _unit: &SyncUnit) -> VisRequest {
        VisRequest::new("GetBeachTournamentList")
            .with_param("Fields", "No Code Name Status StartDateLocal EndDateLocal")
    }

    fn normalize(&self, raw: &RawRecord) -> Result<Self::Record, String> {
        let no = parse_external_no(raw, "No")?;
        let code = raw
            .get("Code")
            .map(sanitize_text)
            .filter(|c| !c.is_empty());
        let name = sanitize_text(raw.get("Name").unwrap_or(""));
        let status = normalize_status(raw.get("Status").unwrap_or("")).as_str().to_string();
        let start_date = normalize_date(raw.get("StartDateLocal").unwrap_or(""));
        let end_date = normalize_date(raw.get("EndDateLocal").unwrap_or(""));

        Ok(TournamentRecord {
            no,
            code,
            name,
            status,
            start_date,
            end_date,
        })
    }

    fn record_key(&self, record: &Self::Record) -> i32 {
        record.no
    }

    fn cache_subject(&self, record: &Self::Record) -> CacheSubject {
        CacheSubject {
            key: record.no,
            status: RecordStatus::from_canonical(&record.status),
            local_date: parsed_date(&record.start_date),
            last_change: None,
        }
    }

    async fn discover_units(&self) -> Result<Vec<SyncUnit>, DbErr> {
        // The federation exposes a single list endpoint; one unit covers it.
        Ok(vec![SyncUnit {
            key: 0,
            label: "tournament list".to_string(),
        }])
    }

    async fn current_subjects(&self, _unit: &SyncUnit) -> Result<Vec<CacheSubject>, DbErr> {
        let stored = self
            .tournaments
            .list_by_status(&["Running", "Upcoming", "Suspended", "Postponed"])
            .await?;
        Ok(stored
            .into_iter()
            .map(|t| CacheSubject {
                key: t.no,
                status: RecordStatus::from_canonical(&t.status),
                local_date: parsed_date(&t.start_date),
                last_change: Some(t.updated_at.to_utc()),
            })
            .collect())
    }

    async fn upsert(&self, record: Self::Record) -> Result<UpsertOutcome, DbErr> {
        self.tournaments.upsert(record).await
    }
}

/// Match schedule synchronization, one unit per stored tournament
pub struct MatchSync {
    matches: BeachMatchRepository,
    tournaments: TournamentRepository,
    statuses: SyncStatusRepository,
}

impl MatchSync {
    pub fn new(
        matches: BeachMatchRepository,
        tournaments: TournamentRepository,
        statuses: SyncStatusRepository,
    ) -> Self {
        Self {
            matches,
            tournaments,
            statuses,
        }
    }

    /// Whether the scheduled window for this entity type has arrived. Live
    /// tournaments bypass the window; a missing ledger row means the entity
    /// has never run and is due immediately.
    async fn sync_window_arrived(&self) -> Result<bool, DbErr> {
        let arrived = self
            .statuses
            .find(self.entity_type())
            .await?
            .and_then(|status| status.next_sync)
            .map(|next| next.to_utc() <= Utc::now())
            .unwrap_or(true);
        Ok(arrived)
    }
}

#[async_trait]
impl SyncEntity for MatchSync {
    type Record = BeachMatchRecord;

    fn entity_type(&self) -> &'static str {
        "matches_schedule"
    }

    fn element_name(&self) -> &'static str {
        "BeachMatch"
    }

    fn request_for(&self, unit: &SyncUnit) -> VisRequest {
        VisRequest::new("GetBeachMatchList")
            .with_param(
                "Fields",
                "No NoTournament TeamAName TeamBName Status LocalDate LocalTime \
                 MatchPointsA MatchPointsB Round Court",
            )
            .with_param("NoTournament", unit.key.to_string())
    }

    fn normalize(&self, raw: &RawRecord) -> Result<Self::Record, String> {
        let no = parse_external_no(raw, "No")?;
        let no_tournament = parse_external_no(raw, "NoTournament")?;

        let optional_text = |field: &str| {
            raw.get(field)
                .map(sanitize_text)
                .filter(|v| !v.is_empty())
        };
        let optional_int = |field: &str| {
            raw.get(field)
                .and_then(|v| v.trim().parse::<i32>().ok())
        };

        Ok(BeachMatchRecord {
            no,
            no_tournament,
            team_a_name: optional_text("TeamAName"),
            team_b_name: optional_text("TeamBName"),
            status: normalize_status(raw.get("Status").unwrap_or("")).as_str().to_string(),
            local_date: normalize_date(raw.get("LocalDate").unwrap_or("")),
            local_time: optional_text("LocalTime"),
            match_points_a: optional_int("MatchPointsA"),
            match_points_b: optional_int("MatchPointsB"),
            round: optional_text("Round"),
            court: optional_text("Court"),
        })
    }

    fn record_key(&self, record: &Self::Record) -> i32 {
        record.no
    }

    fn cache_subject(&self, record: &Self::Record) -> CacheSubject {
        CacheSubject {
            key: record.no,
            status: RecordStatus::from_canonical(&record.status),
            local_date: parsed_date(&record.local_date),
            last_change: None,
        }
    }

    /// Tournaments still worth fetching, ordered live, then starting today,
    /// then future starts ascending. Non-live tournaments are held back
    /// until the scheduled sync window has arrived.
    async fn discover_units(&self) -> Result<Vec<SyncUnit>, DbErr> {
        let candidates = self
            .tournaments
            .list_by_status(&["Running", "Upcoming", "Suspended"])
            .await?;
        let window_arrived = self.sync_window_arrived().await?;

        let today = Utc::now().date_naive();
        let mut ranked: Vec<(u8, NaiveDate, SyncUnit)> = candidates
            .into_iter()
            .map(|t| {
                let start = parsed_date(&t.start_date);
                let status = RecordStatus::from_canonical(&t.status);
                let rank = if status == RecordStatus::Running || status == RecordStatus::Suspended
                {
                    0
                } else if start <= today {
                    1
                } else {
                    2
                };
                (
                    rank,
                    start,
                    SyncUnit {
                        key: t.no,
                        label: t.name,
                    },
                )
            })
            .collect();

        ranked.retain(|(rank, _, _)| *rank == 0 || window_arrived);
        ranked.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        Ok(ranked.into_iter().map(|(_, _, unit)| unit).collect())
    }

    async fn current_subjects(&self, unit: &SyncUnit) -> Result<Vec<CacheSubject>, DbErr> {
        let stored = self.matches.list_by_tournament(unit.key).await?;
        Ok(stored
            .into_iter()
            .map(|m| CacheSubject {
                key: m.no,
                status: RecordStatus::from_canonical(&m.status),
                local_date: parsed_date(&m.local_date),
                last_change: Some(m.updated_at.to_utc()),
            })
            .collect())
    }

    async fn upsert(&self, record: Self::Record) -> Result<UpsertOutcome, DbErr> {
        self.matches.upsert(record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, &str)]) -> RawRecord {
        let mut record = RawRecord::default();
        for (k, v) in pairs {
            record.insert(*k, *v);
        }
        record
    }

    #[test]
    fn tournament_record_normalizes_fields() {
        let sync = tournament_sync_for_tests();
        let record = sync
            .normalize(&raw(&[
                ("No", "502"),
                ("Code", " MHAM2026 "),
                ("Name", "  Elite16   Hamburg\u{0007} "),
                ("Status", "live"),
                ("StartDateLocal", "15-06-2026"),
                ("EndDateLocal", "2026-06-20"),
            ]))
            .unwrap();

        assert_eq!(record.no, 502);
        assert_eq!(record.code.as_deref(), Some("MHAM2026"));
        assert_eq!(record.name, "Elite16 Hamburg");
        assert_eq!(record.status, "Running");
        assert_eq!(record.start_date, "2026-06-15");
        assert_eq!(record.end_date, "2026-06-20");
    }

    #[test]
    fn missing_or_non_numeric_no_is_rejected() {
        let sync = tournament_sync_for_tests();
        assert!(sync.normalize(&raw(&[("Name", "Nameless Open")])).is_err());
        assert!(
            sync.normalize(&raw(&[("No", "abc"), ("Name", "Broken Open")]))
                .is_err()
        );
    }

    #[test]
    fn match_record_parses_optional_scores() {
        let sync = match_sync_for_tests();
        let record = sync
            .normalize(&raw(&[
                ("No", "9001"),
                ("NoTournament", "502"),
                ("TeamAName", "A/B"),
                ("Status", "finished"),
                ("LocalDate", "2026-06-16"),
                ("MatchPointsA", "2"),
                ("MatchPointsB", "1"),
                ("MatchPointsX", "garbage"),
            ]))
            .unwrap();

        assert_eq!(record.no, 9001);
        assert_eq!(record.no_tournament, 502);
        assert_eq!(record.match_points_a, Some(2));
        assert_eq!(record.match_points_b, Some(1));
        assert_eq!(record.status, "Finished");
        assert_eq!(record.local_time, None);
    }

    #[test]
    fn match_request_scopes_to_tournament() {
        let sync = match_sync_for_tests();
        let unit = SyncUnit {
            key: 502,
            label: "Elite16 Hamburg".to_string(),
        };
        let request = sync.request_for(&unit);
        assert_eq!(request.request_type, "GetBeachMatchList");
        assert!(
            request
                .params
                .iter()
                .any(|(k, v)| k == "NoTournament" && v == "502")
        );
    }

    fn tournament_sync_for_tests() -> TournamentSync {
        // Normalization never touches the database; a disconnected handle
        // is enough for these tests.
        TournamentSync::new(TournamentRepository::new(
            sea_orm::DatabaseConnection::default(),
        ))
    }

    fn match_sync_for_tests() -> MatchSync {
        MatchSync::new(
            BeachMatchRepository::new(sea_orm::DatabaseConnection::default()),
            TournamentRepository::new(sea_orm::DatabaseConnection::default()),
            SyncStatusRepository::new(sea_orm::DatabaseConnection::default()),
        )
    }
}
