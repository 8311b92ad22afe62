//! One POST endpoint and one health check per pipeline stage, mirroring the
//! paths `HttpStage` calls: `/stages/{name}` and `/stages/{name}/health`.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use decision_qa::pipeline::{RouteRequest, Stage, StageHealth};
use decision_qa::{Orchestrator, RouteDecision};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ApiError;

pub fn router(orchestrator: &Orchestrator) -> Router {
    let stages = orchestrator.stages();
    let context_router: Arc<dyn Stage<RouteRequest, RouteDecision>> = orchestrator.router().clone();

    Router::new()
        .merge(stage_routes(stages.normalizer.clone()))
        .merge(stage_routes(stages.classifier.clone()))
        .merge(stage_routes(context_router))
        .merge(stage_routes(stages.clarifier.clone()))
        .merge(stage_routes(stages.compiler.clone()))
        .merge(stage_routes(stages.evaluator.clone()))
        .merge(stage_routes(stages.ranker.clone()))
        .merge(stage_routes(stages.formatter.clone()))
}

fn stage_routes<Req, Resp>(stage: Arc<dyn Stage<Req, Resp>>) -> Router
where
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
{
    let name = stage.name();
    let call = stage.clone();
    let checker = stage;

    Router::new()
        .route(
            &format!("/stages/{}", name),
            post(move |Json(request): Json<Req>| {
                let stage = call.clone();
                async move {
                    let response = stage.call(request).await.map_err(ApiError::from)?;
                    Ok::<_, ApiError>(Json(response))
                }
            }),
        )
        .route(
            &format!("/stages/{}/health", name),
            get(move || {
                let stage = checker.clone();
                async move {
                    match stage.health().await {
                        Ok(()) => (
                            StatusCode::OK,
                            Json(StageHealth {
                                stage: stage.name().to_string(),
                                healthy: true,
                                detail: None,
                            }),
                        ),
                        Err(e) => {
                            tracing::warn!(stage = stage.name(), error = %e, "Stage health check failed");
                            (
                                StatusCode::SERVICE_UNAVAILABLE,
                                Json(StageHealth {
                                    stage: stage.name().to_string(),
                                    healthy: false,
                                    detail: Some(e.kind().to_string()),
                                }),
                            )
                        }
                    }
                }
            }),
        )
}
