//! # Repository Layer
//!
//! Repository implementations that encapsulate SeaORM operations for the
//! sync engine's tables, keeping query logic out of the engine itself.

pub mod alert_rule;
pub mod beach_match;
pub mod error_log;
pub mod sync_execution;
pub mod sync_status;
pub mod tournament;

pub use alert_rule::AlertRuleRepository;
pub use beach_match::BeachMatchRepository;
pub use error_log::ErrorLogRepository;
pub use sync_execution::SyncExecutionRepository;
pub use sync_status::SyncStatusRepository;
pub use tournament::TournamentRepository;

/// Outcome of an upsert, used to split counters in sync summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}
