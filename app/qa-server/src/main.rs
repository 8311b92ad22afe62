mod error;
mod stages;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::State;
use axum::http::{header, Method, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use decision_qa::pipeline::StageHealth;
use decision_qa::sqlx::postgres::PgPoolOptions;
use decision_qa::{
    spawn_session_sweeper, AskRequest, AskResponse, LLMManager, Orchestrator, PgDecisionStore, PgSessionStore,
    QaConfig, QaError, SessionStore, Stages,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::error::ApiError;

/// Stages that may be down without taking the service out of rotation.
const OPTIONAL_STAGES: &[&str] = &["evaluator", "ranker"];

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

async fn ask(State(state): State<AppState>, Json(request): Json<AskRequest>) -> Result<Json<AskResponse>, ApiError> {
    if request.text.trim().is_empty() {
        return Err(ApiError(QaError::Validation("text must not be empty".to_string())));
    }
    Ok(Json(state.orchestrator.ask(request).await))
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let stages: Vec<StageHealth> = state.orchestrator.health().await;
    let required_down = stages
        .iter()
        .any(|s| !s.healthy && !OPTIONAL_STAGES.contains(&s.stage.as_str()));
    let all_up = stages.iter().all(|s| s.healthy);

    let (status, label) = if required_down {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    } else if all_up {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::OK, "degraded")
    };
    (status, Json(serde_json::json!({ "status": label, "stages": stages })))
}

fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    let stage_routes = stages::router(&state.orchestrator);

    Router::new()
        .route("/ask", post(ask))
        .route("/health", get(health))
        .with_state(state)
        .merge(stage_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("RUST_LOG")
        .or_else(|_| EnvFilter::try_from_env("LOG_LEVEL"))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = QaConfig::from_env().context("failed to load config")?;
    tracing::info!(service = "qa-server", "starting");

    let pool = PgPoolOptions::new()
        .max_connections(config.store.max_connections)
        .acquire_timeout(Duration::from_millis(config.pipeline.stage_timeout_ms))
        .connect(&config.store.database_url)
        .await
        .context("failed to create database pool")?;

    let sessions = PgSessionStore::new(pool.clone(), Duration::from_secs(config.session.ttl_secs));
    sessions.ensure_schema().await.context("failed to create session table")?;
    let sessions: Arc<dyn SessionStore> = Arc::new(sessions);
    let store = Arc::new(PgDecisionStore::new(pool, config.store.statement_timeout_ms));

    let llm = LLMManager::new(config.llm.clone())?;
    let stage_timeout = Duration::from_millis(config.pipeline.stage_timeout_ms);
    let stages = Stages::local(&config, &llm).with_remote(&config.server.remote_stages, stage_timeout)?;
    if !config.server.remote_stages.is_empty() {
        tracing::info!(remote = ?config.server.remote_stages.keys().collect::<Vec<_>>(), "Using remote stages");
    }

    let orchestrator = Arc::new(Orchestrator::with_stages(&config, stages, sessions.clone(), store));
    spawn_session_sweeper(
        sessions,
        orchestrator.sweepables(),
        Duration::from_secs(config.session.sweep_interval_secs),
    );

    let app = build_router(AppState { orchestrator });
    let addr: SocketAddr = config.bind_addr().parse().context("invalid bind address")?;

    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await.context("failed to bind")?;
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
