//! # API Handlers
//!
//! HTTP endpoint handlers: service info, health, the operator-protected
//! sync triggers, and alert evaluation.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::db;
use crate::error::ApiError;
use crate::models::ServiceInfo;
use crate::server::AppState;
use crate::sync::SyncSummary;

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Health response body
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Overall service status
    #[schema(example = "ok")]
    pub status: &'static str,
    /// Database reachability
    #[schema(example = "reachable")]
    pub database: &'static str,
}

/// Liveness and database reachability probe
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service healthy", body = HealthResponse),
        (status = 503, description = "Database unreachable")
    ),
    tag = "health"
)]
pub async fn health(State(state): State<AppState>) -> Response {
    match db::health_check(&state.db).await {
        Ok(()) => Json(HealthResponse {
            status: "ok",
            database: "reachable",
        })
        .into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded",
                    database: "unreachable",
                }),
            )
                .into_response()
        }
    }
}

/// Body returned by the sync trigger endpoints
#[derive(Debug, Serialize, ToSchema)]
pub struct SyncTriggerResponse {
    /// Whether the run met the failure-ceiling policy
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tournaments_processed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matches_processed: Option<usize>,
    pub inserts_count: usize,
    pub updates_count: usize,
    pub errors_count: usize,
    pub duration_ms: u64,
    /// Sampled failure messages from the run
    pub errors: Vec<String>,
}

fn trigger_response(summary: SyncSummary, is_tournaments: bool) -> Response {
    let clean = summary.errors == 0 && summary.units_failed == 0;
    let status = if clean {
        StatusCode::OK
    } else {
        StatusCode::MULTI_STATUS
    };

    let body = SyncTriggerResponse {
        success: summary.success,
        tournaments_processed: is_tournaments.then_some(summary.processed),
        matches_processed: (!is_tournaments).then_some(summary.processed),
        inserts_count: summary.inserts,
        updates_count: summary.updates,
        errors_count: summary.errors,
        duration_ms: summary.duration_ms,
        errors: summary.error_messages,
    };
    (status, Json(body)).into_response()
}

/// Trigger a tournament sync run
#[utoipa::path(
    post,
    path = "/sync/tournaments",
    responses(
        (status = 200, description = "Run completed without errors", body = SyncTriggerResponse),
        (status = 207, description = "Run completed with partial failures", body = SyncTriggerResponse),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 500, description = "Run could not start")
    ),
    security(("bearer_auth" = [])),
    tag = "sync"
)]
pub async fn sync_tournaments(State(state): State<AppState>) -> Result<Response, ApiError> {
    let summary = state
        .tournament_engine
        .run()
        .await
        .map_err(anyhow::Error::from)?;
    Ok(trigger_response(summary, true))
}

/// Trigger a match schedule sync run
#[utoipa::path(
    post,
    path = "/sync/matches",
    responses(
        (status = 200, description = "Run completed without errors", body = SyncTriggerResponse),
        (status = 207, description = "Run completed with partial failures", body = SyncTriggerResponse),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 500, description = "Run could not start")
    ),
    security(("bearer_auth" = [])),
    tag = "sync"
)]
pub async fn sync_matches(State(state): State<AppState>) -> Result<Response, ApiError> {
    let summary = state
        .match_engine
        .run()
        .await
        .map_err(anyhow::Error::from)?;
    Ok(trigger_response(summary, false))
}

/// Body returned by the alert evaluation endpoint
#[derive(Debug, Serialize, ToSchema)]
pub struct AlertEvaluationResponse {
    pub evaluated: usize,
    pub triggered: usize,
    #[schema(value_type = Vec<Object>)]
    pub evaluations: Vec<crate::alerts::AlertEvaluation>,
}

/// Evaluate every active alert rule and dispatch triggered alerts
#[utoipa::path(
    post,
    path = "/alerts/evaluate",
    responses(
        (status = 200, description = "Evaluation results", body = AlertEvaluationResponse),
        (status = 401, description = "Missing or invalid bearer token")
    ),
    security(("bearer_auth" = [])),
    tag = "alerts"
)]
pub async fn evaluate_alerts(
    State(state): State<AppState>,
) -> Result<Json<AlertEvaluationResponse>, ApiError> {
    let evaluations = state
        .alert_engine
        .evaluate_all()
        .await
        .map_err(anyhow::Error::from)?;

    let triggered = evaluations.iter().filter(|e| e.triggered).count();
    Ok(Json(AlertEvaluationResponse {
        evaluated: evaluations.len(),
        triggered,
        evaluations,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(errors: usize, units_failed: usize, success: bool) -> SyncSummary {
        SyncSummary {
            success,
            entity_type: "tournaments".to_string(),
            units_total: 3,
            units_failed,
            processed: 10,
            inserts: 4,
            updates: 6,
            errors,
            duration_ms: 1200,
            recommended_ttl_seconds: 900,
            error_messages: Vec::new(),
        }
    }

    #[test]
    fn clean_run_maps_to_200() {
        let response = trigger_response(summary(0, 0, true), true);
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn partial_failure_maps_to_207() {
        let response = trigger_response(summary(2, 1, true), false);
        assert_eq!(response.status(), StatusCode::MULTI_STATUS);
    }

    #[test]
    fn processed_count_follows_the_entity() {
        let body = SyncTriggerResponse {
            success: true,
            tournaments_processed: Some(10),
            matches_processed: None,
            inserts_count: 4,
            updates_count: 6,
            errors_count: 0,
            duration_ms: 1200,
            errors: Vec::new(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["tournaments_processed"], 10);
        assert!(json.get("matches_processed").is_none());
    }
}
