//! # Server Configuration
//!
//! Component wiring and Axum router setup for the sync service.

use std::sync::Arc;

use axum::{
    Router,
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::alerts::{AlertEngine, Dispatcher, LogMailer};
use crate::auth::auth_middleware;
use crate::cache::{CacheStrategy, TtlTable};
use crate::config::{AppConfig, CacheConfig};
use crate::governor::PerformanceGovernor;
use crate::handlers;
use crate::repositories::{
    AlertRuleRepository, BeachMatchRepository, ErrorLogRepository, SyncExecutionRepository,
    SyncStatusRepository, TournamentRepository,
};
use crate::resilience::ResilienceLayer;
use crate::secrets::{EnvSecretStore, SecretStore};
use crate::sync::{MatchSync, SyncEngine, TournamentSync};
use crate::telemetry::{TraceContext, with_trace_context};
use crate::vis::auth::VisAuthenticator;
use crate::vis::client::VisClient;
use crate::vis::parser::RegexXmlParser;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub tournament_engine: Arc<SyncEngine<TournamentSync>>,
    pub match_engine: Arc<SyncEngine<MatchSync>>,
    pub alert_engine: Arc<AlertEngine<Dispatcher>>,
}

impl AppState {
    /// Wire every component from configuration and a live database pool
    pub async fn build(
        config: AppConfig,
        db: DatabaseConnection,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let config = Arc::new(config);

        let secrets = EnvSecretStore;
        let credentials = secrets.federation_credentials("vis").await?;
        let authenticator = Arc::new(VisAuthenticator::new(
            config.vis.service_identity.clone(),
            credentials,
        ));
        let client = Arc::new(VisClient::new(
            config.vis.base_url.clone(),
            std::time::Duration::from_secs(config.vis.request_timeout_seconds),
            authenticator,
        )?);

        let parser = Arc::new(RegexXmlParser::new());
        let resilience = Arc::new(
            ResilienceLayer::new(config.retry.clone())
                .with_error_log(ErrorLogRepository::new(db.clone())),
        );
        let governor = Arc::new(PerformanceGovernor::new(config.rate_limit.clone()));
        let cache = Arc::new(cache_strategy(&config.cache));
        let executions = Arc::new(SyncExecutionRepository::new(db.clone()));
        let statuses = Arc::new(SyncStatusRepository::new(db.clone()));

        let tournament_engine = Arc::new(SyncEngine::new(
            Arc::new(TournamentSync::new(TournamentRepository::new(db.clone()))),
            Arc::clone(&client),
            parser.clone(),
            Arc::clone(&resilience),
            Arc::clone(&governor),
            Arc::clone(&cache),
            Arc::clone(&executions),
            Arc::clone(&statuses),
            config.sync.clone(),
        ));
        let match_engine = Arc::new(SyncEngine::new(
            Arc::new(MatchSync::new(
                BeachMatchRepository::new(db.clone()),
                TournamentRepository::new(db.clone()),
                SyncStatusRepository::new(db.clone()),
            )),
            client,
            parser,
            resilience,
            governor,
            cache,
            Arc::clone(&executions),
            statuses,
            config.sync.clone(),
        ));

        let alert_engine = Arc::new(AlertEngine::new(
            AlertRuleRepository::new(db.clone()),
            SyncExecutionRepository::new(db.clone()),
            Dispatcher::new(&config.alerts, Arc::new(LogMailer)),
            config.alerts.clone(),
        ));

        Ok(Self {
            config,
            db,
            tournament_engine,
            match_engine,
            alert_engine,
        })
    }
}

/// Cache policy seeded from configuration; per-status TTLs keep their
/// built-in values, the fallback TTL is the configured one.
fn cache_strategy(config: &CacheConfig) -> CacheStrategy {
    CacheStrategy::new(TtlTable {
        default_seconds: config.default_ttl_seconds,
        ..TtlTable::default()
    })
}

/// Assign each request a trace ID and scope it through task-local storage
async fn trace_context_middleware(mut request: Request, next: Next) -> Response {
    let context = TraceContext::generate();
    request.extensions_mut().insert(context.clone());
    with_trace_context(context, next.run(request)).await
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/sync/tournaments", post(handlers::sync_tournaments))
        .route("/sync/matches", post(handlers::sync_matches))
        .route("/alerts/evaluate", post(handlers::evaluate_alerts))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .merge(protected)
        .layer(middleware::from_fn(trace_context_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Starts the server with the given configuration
pub async fn run_server(
    config: AppConfig,
    db: DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;
    let profile = config.profile.clone();

    let state = AppState::build(config, db).await?;
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, profile, "server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::health,
        crate::handlers::sync_tournaments,
        crate::handlers::sync_matches,
        crate::handlers::evaluate_alerts,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::handlers::HealthResponse,
            crate::handlers::SyncTriggerResponse,
            crate::handlers::AlertEvaluationResponse,
        )
    ),
    info(
        title = "Beachsync API",
        description = "Resilient sync service for federation tournament and match data",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn configured_default_ttl_reaches_the_cache_strategy() {
        let strategy = cache_strategy(&CacheConfig {
            default_ttl_seconds: 120,
        });
        assert_eq!(strategy.ttl_table().default_seconds, 120);
        // Per-status TTLs keep their built-in values.
        assert_eq!(strategy.ttl_table().live_seconds, 30);
        // An empty batch falls back to the configured default.
        assert_eq!(strategy.batch_ttl(&[]), Duration::from_secs(120));
    }
}
