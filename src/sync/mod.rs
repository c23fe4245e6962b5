//! # Entity Synchronizer
//!
//! Generic sync engine instantiated per entity type. [`entities`] defines the
//! `SyncEntity` seam plus the tournament and match implementations;
//! [`engine`] owns run orchestration: discovery, prioritized bounded-
//! concurrency fetching, tolerant parsing, normalization, chunked upserts,
//! and run-level bookkeeping.

pub mod engine;
pub mod entities;

pub use engine::{SyncEngine, SyncRunError, SyncSummary};
pub use entities::{MatchSync, SyncEntity, SyncUnit, TournamentSync};
