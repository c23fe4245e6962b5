//! # Beachsync Library
//!
//! This library provides the core functionality for the beachsync service:
//! pulling tournament and match data from the federation XML gateway,
//! normalizing and persisting it, and keeping the sync pipeline honest with
//! error classification, retries, cache strategy, rate limiting, and alerts.

pub mod alerts;
pub mod auth;
pub mod cache;
pub mod classify;
pub mod config;
pub mod db;
pub mod error;
pub mod governor;
pub mod handlers;
pub mod models;
pub mod normalize;
pub mod repositories;
pub mod resilience;
pub mod secrets;
pub mod server;
pub mod sync;
pub mod telemetry;
pub mod vis;
