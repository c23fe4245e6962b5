//! # Performance Governor
//!
//! Instance-scoped throughput control for sync runs. Tournament fetch order
//! follows a federation-tier keyword table, gateway calls pass through a
//! sliding-window rate limiter, and observed latencies feed bottleneck
//! detection plus adaptive batch sizing. All mutable state sits behind one
//! mutex on the instance, never in globals.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use serde::Serialize;
use tracing::debug;

use crate::config::RateLimitConfig;

/// Federation tiers mapped to fetch priority; higher runs first
const TIER_TABLE: &[(&[&str], u8)] = &[
    (&["world tour finals", "world championship", "olympic"], 100),
    (&["elite16", "elite 16", "major"], 85),
    (&["challenge", "world tour"], 75),
];

/// Priority for tournaments matching no tier keyword
const DEFAULT_PRIORITY: u8 = 65;

/// Latency above which the gateway is considered a bottleneck
const SLOW_API_THRESHOLD: Duration = Duration::from_secs(5);

/// Success rate below which operations are considered degraded
const LOW_SUCCESS_THRESHOLD: f64 = 0.9;

/// Fraction of a rate window that counts as near-exhaustion
const WINDOW_PRESSURE_THRESHOLD: f64 = 0.9;

/// Response-time samples retained for averaging
const RESPONSE_HISTORY_LIMIT: usize = 200;

/// Aggregate counters exposed by [`PerformanceGovernor::metrics`]
#[derive(Debug, Clone, Serialize)]
pub struct GovernorMetrics {
    pub total_operations: u64,
    pub average_operation_time_ms: f64,
    pub success_rate: f64,
    pub average_api_response_time_ms: f64,
}

/// One detected bottleneck with a suggested remedy
#[derive(Debug, Clone, Serialize)]
pub struct Bottleneck {
    pub issue: String,
    pub recommendation: String,
}

#[derive(Debug, Default)]
struct GovernorState {
    /// Per-key timestamps of recent gateway calls, pruned on read
    call_windows: HashMap<String, Vec<Instant>>,
    response_times: Vec<Duration>,
    total_operations: u64,
    successful_operations: u64,
    total_operation_time: Duration,
}

/// Rate limiting and adaptive throughput control
pub struct PerformanceGovernor {
    config: RateLimitConfig,
    state: Mutex<GovernorState>,
}

impl PerformanceGovernor {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Mutex::new(GovernorState::default()),
        }
    }

    /// Order tournament names by federation tier, highest first. The sort is
    /// stable so same-tier tournaments keep their incoming order.
    pub fn prioritize_tournaments<T, F>(&self, mut tournaments: Vec<T>, name_of: F) -> Vec<T>
    where
        F: Fn(&T) -> &str,
    {
        tournaments.sort_by_key(|t| std::cmp::Reverse(Self::tournament_priority(name_of(t))));
        tournaments
    }

    /// Priority for one tournament name
    pub fn tournament_priority(name: &str) -> u8 {
        let lower = name.to_lowercase();
        for (keywords, priority) in TIER_TABLE {
            if keywords.iter().any(|kw| lower.contains(kw)) {
                return *priority;
            }
        }
        DEFAULT_PRIORITY
    }

    /// Whether another gateway call for this key fits in the current window
    pub fn can_process(&self, key: &str) -> bool {
        let mut state = self.lock();
        let window = Duration::from_secs(self.config.window_seconds);
        let now = Instant::now();

        let calls = state.call_windows.entry(key.to_string()).or_default();
        calls.retain(|at| now.duration_since(*at) < window);
        calls.len() < self.config.max_calls
    }

    /// Record one gateway call against the key's window
    pub fn record_call(&self, key: &str) {
        let mut state = self.lock();
        state
            .call_windows
            .entry(key.to_string())
            .or_default()
            .push(Instant::now());
        counter!("governor_api_calls_total").increment(1);
    }

    /// Record one observed gateway round-trip time
    pub fn record_response_time(&self, elapsed: Duration) {
        histogram!("governor_api_response_seconds").record(elapsed.as_secs_f64());
        let mut state = self.lock();
        state.response_times.push(elapsed);
        if state.response_times.len() > RESPONSE_HISTORY_LIMIT {
            let excess = state.response_times.len() - RESPONSE_HISTORY_LIMIT;
            state.response_times.drain(..excess);
        }
    }

    /// Record the outcome and duration of one sync operation
    pub fn record_operation(&self, success: bool, duration: Duration) {
        let mut state = self.lock();
        state.total_operations += 1;
        if success {
            state.successful_operations += 1;
        }
        state.total_operation_time += duration;
    }

    pub fn metrics(&self) -> GovernorMetrics {
        let state = self.lock();

        let average_operation_time_ms = if state.total_operations > 0 {
            state.total_operation_time.as_millis() as f64 / state.total_operations as f64
        } else {
            0.0
        };
        let success_rate = if state.total_operations > 0 {
            state.successful_operations as f64 / state.total_operations as f64
        } else {
            1.0
        };
        let average_api_response_time_ms = if state.response_times.is_empty() {
            0.0
        } else {
            state
                .response_times
                .iter()
                .map(|d| d.as_millis() as f64)
                .sum::<f64>()
                / state.response_times.len() as f64
        };

        GovernorMetrics {
            total_operations: state.total_operations,
            average_operation_time_ms,
            success_rate,
            average_api_response_time_ms,
        }
    }

    /// Inspect current metrics and rate windows for known failure shapes
    pub fn detect_bottlenecks(&self) -> Vec<Bottleneck> {
        let metrics = self.metrics();
        let mut issues = Vec::new();

        if metrics.average_api_response_time_ms > SLOW_API_THRESHOLD.as_millis() as f64 {
            issues.push(Bottleneck {
                issue: format!(
                    "average gateway response time {:.0} ms exceeds {} ms",
                    metrics.average_api_response_time_ms,
                    SLOW_API_THRESHOLD.as_millis()
                ),
                recommendation:
                    "reduce batch size or request frequency until latency recovers".to_string(),
            });
        }

        if metrics.total_operations > 0 && metrics.success_rate < LOW_SUCCESS_THRESHOLD {
            issues.push(Bottleneck {
                issue: format!(
                    "operation success rate {:.2} is below {:.2}",
                    metrics.success_rate, LOW_SUCCESS_THRESHOLD
                ),
                recommendation: "inspect the error log for the dominant failure category"
                    .to_string(),
            });
        }

        let pressured = self.pressured_windows();
        for (key, used) in pressured {
            issues.push(Bottleneck {
                issue: format!(
                    "rate window for '{}' is at {}/{} calls",
                    key, used, self.config.max_calls
                ),
                recommendation: "stagger sync schedules or raise the rate window".to_string(),
            });
        }

        issues
    }

    /// Shrink the batch size under poor conditions, grow it under good ones.
    ///
    /// Compound poor conditions (slow gateway and low success rate) floor
    /// the batch at 1-2 records so a struggling upstream is never hammered.
    pub fn optimal_batch_size(&self, baseline: usize) -> usize {
        let metrics = self.metrics();
        let slow = metrics.average_api_response_time_ms > SLOW_API_THRESHOLD.as_millis() as f64;
        let failing =
            metrics.total_operations > 0 && metrics.success_rate < LOW_SUCCESS_THRESHOLD;

        let size = match (slow, failing) {
            (true, true) => (baseline / 10).max(1).min(2),
            (true, false) | (false, true) => (baseline / 2).max(1),
            (false, false) => {
                let fast = metrics.average_api_response_time_ms > 0.0
                    && metrics.average_api_response_time_ms < 1000.0;
                if fast && metrics.success_rate >= 0.99 {
                    baseline + baseline / 2
                } else {
                    baseline
                }
            }
        };

        debug!(baseline, size, "adaptive batch size computed");
        size
    }

    /// Prune expired call timestamps and bound response-time history
    pub fn cleanup(&self) {
        let mut state = self.lock();
        let window = Duration::from_secs(self.config.window_seconds);
        let now = Instant::now();

        for calls in state.call_windows.values_mut() {
            calls.retain(|at| now.duration_since(*at) < window);
        }
        state.call_windows.retain(|_, calls| !calls.is_empty());

        if state.response_times.len() > RESPONSE_HISTORY_LIMIT {
            let excess = state.response_times.len() - RESPONSE_HISTORY_LIMIT;
            state.response_times.drain(..excess);
        }
    }

    fn pressured_windows(&self) -> BTreeMap<String, usize> {
        let mut state = self.lock();
        let window = Duration::from_secs(self.config.window_seconds);
        let now = Instant::now();
        let threshold =
            (self.config.max_calls as f64 * WINDOW_PRESSURE_THRESHOLD).ceil() as usize;

        let mut pressured = BTreeMap::new();
        for (key, calls) in state.call_windows.iter_mut() {
            calls.retain(|at| now.duration_since(*at) < window);
            if calls.len() >= threshold {
                pressured.insert(key.clone(), calls.len());
            }
        }
        pressured
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GovernorState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
