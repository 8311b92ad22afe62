//! The `Stage` seam: one request/response call plus a liveness check.
//!
//! Every component implements it in-process. [`HttpStage`] implements it
//! against a remote deployment of the same component, speaking the JSON
//! contracts in [`super::contracts`].

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::time::Duration;

use super::contracts::{
    ClarifyRequest, ClassifyRequest, CompileRequest, EvaluateRequest, FormatRequest, NormalizeRequest, RankRequest,
    RouteRequest,
};
use crate::clarify::ClarificationGenerator;
use crate::compiler::QueryCompiler;
use crate::context::{ContextRouter, RouteDecision};
use crate::error::{QaError, QaResult};
use crate::evaluate::{Evaluation, Evaluator, Ranker, RankingOutcome};
use crate::format::{FormattedResponse, ResponseFormatter, ResultContext};
use crate::intent::{Classification, IntentClassifier, PriorContext};
use crate::normalize::{NormalizedText, Normalizer};
use crate::types::{ClarificationRequest, CompiledQuery, Lang};

#[async_trait]
pub trait Stage<Req, Resp>: Send + Sync
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    fn name(&self) -> &'static str;

    async fn call(&self, request: Req) -> QaResult<Resp>;

    async fn health(&self) -> QaResult<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-process stages
// ---------------------------------------------------------------------------

#[async_trait]
impl Stage<NormalizeRequest, NormalizedText> for Normalizer {
    fn name(&self) -> &'static str {
        "normalizer"
    }

    async fn call(&self, request: NormalizeRequest) -> QaResult<NormalizedText> {
        Ok(self.normalize(&request.text))
    }
}

#[async_trait]
impl Stage<ClassifyRequest, Classification> for IntentClassifier {
    fn name(&self) -> &'static str {
        "classifier"
    }

    async fn call(&self, request: ClassifyRequest) -> QaResult<Classification> {
        let prior = PriorContext {
            result_count: request.prior_result_count,
        };
        Ok(self.classify(&request.text, Some(prior)).await)
    }
}

#[async_trait]
impl Stage<RouteRequest, RouteDecision> for ContextRouter {
    fn name(&self) -> &'static str {
        "router"
    }

    async fn call(&self, request: RouteRequest) -> QaResult<RouteDecision> {
        self.route(
            &request.session_id,
            &request.text,
            request.intent,
            request.confidence,
            &request.entities,
        )
        .await
    }

    async fn health(&self) -> QaResult<()> {
        self.store().get("health-check").await.map(|_| ())
    }
}

#[async_trait]
impl Stage<ClarifyRequest, ClarificationRequest> for ClarificationGenerator {
    fn name(&self) -> &'static str {
        "clarifier"
    }

    async fn call(&self, request: ClarifyRequest) -> QaResult<ClarificationRequest> {
        Ok(self
            .generate(
                &request.original_text,
                request.intent,
                &request.entities,
                request.confidence,
                request.clarification_type,
            )
            .await)
    }
}

#[async_trait]
impl Stage<CompileRequest, CompiledQuery> for QueryCompiler {
    fn name(&self) -> &'static str {
        "compiler"
    }

    async fn call(&self, request: CompileRequest) -> QaResult<CompiledQuery> {
        self.compile(&request.text, request.intent, &request.entities).await
    }
}

#[async_trait]
impl Stage<EvaluateRequest, Evaluation> for Evaluator {
    fn name(&self) -> &'static str {
        "evaluator"
    }

    async fn call(&self, request: EvaluateRequest) -> QaResult<Evaluation> {
        let record = request
            .results
            .first()
            .ok_or_else(|| QaError::Validation("no record to evaluate".to_string()))?;
        self.evaluate(&request.original_text, record).await
    }

    async fn health(&self) -> QaResult<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(QaError::unavailable("evaluator", "language model disabled"))
        }
    }
}

#[async_trait]
impl Stage<RankRequest, RankingOutcome> for Ranker {
    fn name(&self) -> &'static str {
        "ranker"
    }

    async fn call(&self, request: RankRequest) -> QaResult<RankingOutcome> {
        Ok(self
            .rank(&request.original_text, &request.entities, request.results, request.strategy)
            .await)
    }
}

#[async_trait]
impl Stage<FormatRequest, FormattedResponse> for ResponseFormatter {
    fn name(&self) -> &'static str {
        "formatter"
    }

    async fn call(&self, request: FormatRequest) -> QaResult<FormattedResponse> {
        let lang = Lang::detect(&request.original_text);

        if let Some(clarification) = &request.clarification {
            return Ok(self.format_clarification(
                lang,
                clarification,
                request.intent,
                &request.entities,
                request.confidence,
            ));
        }

        let (Some(query), Some(results)) = (&request.query, &request.results) else {
            return Err(QaError::Validation(
                "format request carries neither results nor a clarification".to_string(),
            ));
        };
        let ctx = ResultContext {
            lang,
            intent: request.intent,
            entities: &request.entities,
            confidence: request.confidence,
            query,
            result: results,
            ranking_explanation: request.ranking_explanation.as_deref(),
            evaluation: request.evaluation.as_ref(),
            style: request.presentation_style,
        };
        Ok(self.format_result(&ctx))
    }
}

// ---------------------------------------------------------------------------
// Remote stages
// ---------------------------------------------------------------------------

/// A stage served by another process at `{base_url}/stages/{name}`.
pub struct HttpStage<Req, Resp> {
    name: &'static str,
    client: Client,
    endpoint: String,
    health_endpoint: String,
    timeout: Duration,
    _contract: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp> HttpStage<Req, Resp> {
    pub fn new(name: &'static str, base_url: &str, timeout: Duration) -> QaResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| QaError::Config(format!("HTTP client for stage '{}': {}", name, e)))?;

        let base = base_url.trim_end_matches('/');
        tracing::info!(stage = name, base_url = %base, "Using remote stage");

        Ok(Self {
            name,
            client,
            endpoint: format!("{}/stages/{}", base, name),
            health_endpoint: format!("{}/stages/{}/health", base, name),
            timeout,
            _contract: PhantomData,
        })
    }

    fn map_transport(&self, e: reqwest::Error) -> QaError {
        if e.is_timeout() {
            QaError::timeout(self.name, self.timeout.as_millis() as u64)
        } else {
            QaError::unavailable(self.name, e.to_string())
        }
    }

    fn map_status(&self, status: StatusCode, body: &str) -> QaError {
        let preview: String = body.chars().take(200).collect();
        match status {
            StatusCode::GATEWAY_TIMEOUT => QaError::timeout(self.name, self.timeout.as_millis() as u64),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                QaError::Validation(format!("{} rejected request: {}", self.name, preview))
            }
            _ => QaError::unavailable(self.name, format!("HTTP {}: {}", status, preview)),
        }
    }
}

#[async_trait]
impl<Req, Resp> Stage<Req, Resp> for HttpStage<Req, Resp>
where
    Req: Serialize + Send + Sync + 'static,
    Resp: DeserializeOwned + Send + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    async fn call(&self, request: Req) -> QaResult<Resp> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_transport(e))?;
        if !status.is_success() {
            return Err(self.map_status(status, &body));
        }

        serde_json::from_str::<Resp>(&body).map_err(|e| {
            QaError::unavailable(self.name, format!("malformed response: {}", e))
        })
    }

    async fn health(&self) -> QaResult<()> {
        let response = self
            .client
            .get(&self.health_endpoint)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(QaError::unavailable(self.name, format!("health check returned {}", response.status())))
        }
    }
}
