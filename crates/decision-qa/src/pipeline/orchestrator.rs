//! Orchestrator
//!
//! Drives one turn through the stages under a per-stage and an end-to-end
//! timeout. Turns on the same session run one at a time, in arrival order.
//!
//! Failure handling is an explicit state machine:
//!
//! ```text
//! Primary ──(required stage failed / turn timed out)──► LegacyFallback
//! Primary ──(terminal store or config error)──────────► Failed
//! LegacyFallback ──(legacy search failed)─────────────► Failed
//! ```
//!
//! Evaluation and ranking are optional: their failures are logged and the
//! turn continues without them. A clarification turn never executes a query,
//! not even on the legacy path.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use uuid::Uuid;

use super::contracts::{
    AskRequest, AskResponse, ClarifyRequest, ClassifyRequest, CompileRequest, EvaluateRequest, FormatRequest,
    NormalizeRequest, RankRequest, RouteRequest, StageHealth,
};
use super::legacy::LegacySearch;
use super::stage::{HttpStage, Stage};
use super::{PipelineState, Transition};
use crate::clarify::{self, ClarificationGenerator};
use crate::compiler::QueryCompiler;
use crate::config::{PipelineConfig, QaConfig};
use crate::context::{ContextRouter, ResponseCache, RouteDecision};
use crate::error::{QaError, QaResult};
use crate::evaluate::{Evaluation, Evaluator, Ranker, RankingOutcome};
use crate::executor::{DecisionStore, QueryExecutor};
use crate::format::{FormattedResponse, ResponseFormatter, ResultContext, StageTiming};
use crate::intent::{Classification, IntentClassifier};
use crate::llm::LLMManager;
use crate::normalize::{NormalizedText, Normalizer};
use crate::session::{SessionGate, SessionStore, Sweepable};
use crate::types::{
    ClarificationRequest, ClarificationType, CompiledQuery, ExtractedEntities, Intent, Lang, ResultRef, ResultShape,
    Route, Turn,
};

/// The replaceable stages. The context router is not among them: it owns
/// session state and always runs in-process.
pub struct Stages {
    pub normalizer: Arc<dyn Stage<NormalizeRequest, NormalizedText>>,
    pub classifier: Arc<dyn Stage<ClassifyRequest, Classification>>,
    pub clarifier: Arc<dyn Stage<ClarifyRequest, ClarificationRequest>>,
    pub compiler: Arc<dyn Stage<CompileRequest, CompiledQuery>>,
    pub evaluator: Arc<dyn Stage<EvaluateRequest, Evaluation>>,
    pub ranker: Arc<dyn Stage<RankRequest, RankingOutcome>>,
    pub formatter: Arc<dyn Stage<FormatRequest, FormattedResponse>>,
}

impl Stages {
    /// Every stage in-process, sharing one model client.
    pub fn local(config: &QaConfig, llm: &LLMManager) -> Self {
        let stage_timeout = Duration::from_millis(config.pipeline.stage_timeout_ms);
        let mut classifier = IntentClassifier::new(config.pipeline.confidence_threshold);
        if config.pipeline.use_model_classifier {
            classifier = classifier.with_model(llm.clone());
        }

        Self {
            normalizer: Arc::new(Normalizer::new()),
            classifier: Arc::new(classifier),
            clarifier: Arc::new(ClarificationGenerator::new().with_model(llm.clone())),
            compiler: Arc::new(QueryCompiler::new(config.query.clone()).with_model(llm.clone())),
            evaluator: Arc::new(Evaluator::new(llm.clone(), stage_timeout)),
            ranker: Arc::new(Ranker::new(config.ranking.clone(), llm.clone())),
            formatter: Arc::new(ResponseFormatter::new()),
        }
    }

    /// Replace the named stages with HTTP clients.
    pub fn with_remote(mut self, remote: &HashMap<String, String>, timeout: Duration) -> QaResult<Self> {
        for (name, base_url) in remote {
            match name.as_str() {
                "normalizer" => self.normalizer = Arc::new(HttpStage::new("normalizer", base_url, timeout)?),
                "classifier" => self.classifier = Arc::new(HttpStage::new("classifier", base_url, timeout)?),
                "clarifier" => self.clarifier = Arc::new(HttpStage::new("clarifier", base_url, timeout)?),
                "compiler" => self.compiler = Arc::new(HttpStage::new("compiler", base_url, timeout)?),
                "evaluator" => self.evaluator = Arc::new(HttpStage::new("evaluator", base_url, timeout)?),
                "ranker" => self.ranker = Arc::new(HttpStage::new("ranker", base_url, timeout)?),
                "formatter" => self.formatter = Arc::new(HttpStage::new("formatter", base_url, timeout)?),
                "router" => {
                    return Err(QaError::Config(
                        "the router holds session state and cannot be remote".to_string(),
                    ))
                }
                other => return Err(QaError::Config(format!("unknown stage '{}'", other))),
            }
        }
        Ok(self)
    }
}

/// Per-turn bookkeeping: state, transitions and stage timings.
#[derive(Default)]
struct TurnTrace {
    state: PipelineState,
    transitions: Vec<Transition>,
    timings: Vec<StageTiming>,
}

impl TurnTrace {
    fn transition(&mut self, to: PipelineState, reason: String) {
        tracing::warn!(from = ?self.state, to = ?to, reason = %reason, "Pipeline transition");
        self.transitions.push(Transition {
            from: self.state,
            to,
            reason,
        });
        self.state = to;
    }

    fn record(&mut self, stage: &str, started: Instant, outcome: &str) {
        self.timings.push(StageTiming {
            stage: stage.to_string(),
            duration_ms: started.elapsed().as_millis() as u64,
            outcome: outcome.to_string(),
        });
    }
}

/// Transition reason without any error detail.
fn reason(error: &QaError) -> String {
    match error {
        QaError::UpstreamTimeout { stage, .. } | QaError::UpstreamUnavailable { stage, .. } => {
            format!("{} ({})", error.kind(), stage)
        }
        other => other.kind().to_string(),
    }
}

pub struct Orchestrator {
    config: PipelineConfig,
    stages: Stages,
    router: Arc<ContextRouter>,
    executor: QueryExecutor,
    legacy: LegacySearch,
    formatter: ResponseFormatter,
    gate: Arc<SessionGate>,
    stage_timeout: Duration,
    turn_timeout: Duration,
}

impl Orchestrator {
    /// All stages in-process over the given stores.
    pub fn new(
        config: &QaConfig,
        llm: LLMManager,
        sessions: Arc<dyn SessionStore>,
        store: Arc<dyn DecisionStore>,
    ) -> Self {
        Self::with_stages(config, Stages::local(config, &llm), sessions, store)
    }

    /// Given stages (some possibly remote) over in-process routing and execution.
    pub fn with_stages(
        config: &QaConfig,
        stages: Stages,
        sessions: Arc<dyn SessionStore>,
        store: Arc<dyn DecisionStore>,
    ) -> Self {
        let cache = Arc::new(ResponseCache::new(
            config.session.cache_capacity,
            Duration::from_secs(config.session.cache_ttl_secs),
        ));
        let router = Arc::new(
            ContextRouter::new(sessions, cache, config.pipeline.confidence_threshold)
                .with_sticky_slots(config.session.sticky_slots.clone())
                .with_max_turns(config.session.max_turns),
        );
        let executor = QueryExecutor::new(store, Duration::from_millis(config.pipeline.stage_timeout_ms));
        Self::from_parts(config, stages, router, executor)
    }

    pub fn from_parts(config: &QaConfig, stages: Stages, router: Arc<ContextRouter>, executor: QueryExecutor) -> Self {
        Self {
            config: config.pipeline.clone(),
            stages,
            router,
            executor,
            legacy: LegacySearch::new(&config.query.table, config.query.legacy_limit),
            formatter: ResponseFormatter::new(),
            gate: Arc::new(SessionGate::new()),
            stage_timeout: Duration::from_millis(config.pipeline.stage_timeout_ms),
            turn_timeout: Duration::from_millis(config.pipeline.turn_timeout_ms),
        }
    }

    pub fn stages(&self) -> &Stages {
        &self.stages
    }

    pub fn router(&self) -> &Arc<ContextRouter> {
        &self.router
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    /// In-memory structures the session sweeper should prune.
    pub fn sweepables(&self) -> Vec<Arc<dyn Sweepable>> {
        let gate: Arc<dyn Sweepable> = self.gate.clone();
        let cache: Arc<dyn Sweepable> = self.router.cache().clone();
        vec![gate, cache]
    }

    /// Answer one question. Never fails: errors become a localized error
    /// response with the failure recorded in `transitions`.
    pub async fn ask(&self, request: AskRequest) -> AskResponse {
        let started = Instant::now();
        let session_id = request
            .session_id
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let lang = Lang::detect(&request.text);
        let turn_id = Uuid::new_v4();

        let _turn_guard = self.gate.acquire(&session_id).await;
        let mut trace = TurnTrace::default();

        let primary = tokio::time::timeout(
            self.turn_timeout,
            self.primary(&session_id, turn_id, &request, &mut trace),
        )
        .await;

        let mut response = match primary {
            Ok(Ok(response)) => response,
            outcome => {
                let error = match outcome {
                    Ok(Err(e)) => e,
                    _ => QaError::timeout("pipeline", self.turn_timeout.as_millis() as u64),
                };
                tracing::warn!(session_id = %session_id, error = %error, "Primary pipeline failed");
                self.recover(&session_id, turn_id, &request, lang, error, &mut trace).await
            }
        };

        response.metadata.stage_timings = trace.timings;
        response.metadata.total_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            session_id = %session_id,
            state = ?trace.state,
            kind = ?response.kind,
            total_ms = response.metadata.total_ms,
            "Turn complete"
        );

        AskResponse {
            session_id,
            turn_id,
            state: trace.state,
            transitions: trace.transitions,
            response,
        }
    }

    /// Leave the primary path: legacy search unless the error is terminal.
    async fn recover(
        &self,
        session_id: &str,
        turn_id: Uuid,
        request: &AskRequest,
        lang: Lang,
        error: QaError,
        trace: &mut TurnTrace,
    ) -> FormattedResponse {
        if error.is_terminal() {
            trace.transition(PipelineState::Failed, reason(&error));
            return self.formatter.format_error(lang, &error);
        }

        trace.transition(PipelineState::LegacyFallback, reason(&error));
        let legacy = tokio::time::timeout(
            self.stage_timeout,
            self.legacy(session_id, turn_id, request, lang, trace),
        )
        .await
        .unwrap_or_else(|_| Err(QaError::timeout("legacy", self.stage_timeout.as_millis() as u64)));

        match legacy {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "Legacy search failed");
                trace.transition(PipelineState::Failed, reason(&e));
                self.formatter.format_error(lang, &e)
            }
        }
    }

    /// Probe every stage and the store, concurrently.
    pub async fn health(&self) -> Vec<StageHealth> {
        let router: &dyn Stage<RouteRequest, RouteDecision> = self.router.as_ref();
        let (normalizer, classifier, routing, clarifier, compiler, executor, evaluator, ranker, formatter) = futures::join!(
            self.stages.normalizer.health(),
            self.stages.classifier.health(),
            router.health(),
            self.stages.clarifier.health(),
            self.stages.compiler.health(),
            self.executor.health(),
            self.stages.evaluator.health(),
            self.stages.ranker.health(),
            self.stages.formatter.health(),
        );
        vec![
            health_report(self.stages.normalizer.name(), normalizer),
            health_report(self.stages.classifier.name(), classifier),
            health_report(router.name(), routing),
            health_report(self.stages.clarifier.name(), clarifier),
            health_report(self.stages.compiler.name(), compiler),
            health_report("executor", executor),
            health_report(self.stages.evaluator.name(), evaluator),
            health_report(self.stages.ranker.name(), ranker),
            health_report(self.stages.formatter.name(), formatter),
        ]
    }

    // -----------------------------------------------------------------------
    // Primary path
    // -----------------------------------------------------------------------

    async fn primary(
        &self,
        session_id: &str,
        turn_id: Uuid,
        request: &AskRequest,
        trace: &mut TurnTrace,
    ) -> QaResult<FormattedResponse> {
        let lang = Lang::detect(&request.text);

        let normalized = self
            .call_stage(
                &*self.stages.normalizer,
                NormalizeRequest {
                    text: request.text.clone(),
                    session_id: session_id.to_string(),
                },
                trace,
            )
            .await?;
        let text = normalized.clean_text;

        let prior = self.router.prior_context(session_id).await?;
        let classification = self
            .call_stage(
                &*self.stages.classifier,
                ClassifyRequest {
                    text: text.clone(),
                    session_id: session_id.to_string(),
                    prior_result_count: prior.result_count,
                },
                trace,
            )
            .await?;
        let (intent, confidence) = (classification.intent, classification.confidence);

        let router: &dyn Stage<RouteRequest, RouteDecision> = self.router.as_ref();
        let decision = self
            .call_stage(
                router,
                RouteRequest {
                    session_id: session_id.to_string(),
                    text: text.clone(),
                    intent,
                    entities: classification.entities.clone(),
                    confidence,
                },
                trace,
            )
            .await?;

        let mut turn = Turn {
            id: turn_id,
            raw_text: request.text.clone(),
            normalized_text: text.clone(),
            intent,
            confidence,
            entities: classification.entities,
            resolved_entities: decision.resolved_entities.clone(),
            route: decision.route,
            compiled_query: None,
            result_summary: String::new(),
            created_at: Utc::now(),
        };

        if decision.route == Route::Clarify {
            let kind = decision.clarification_type.unwrap_or(ClarificationType::VagueIntent);
            let response = self.clarify(session_id, request, lang, &turn, kind, trace).await;
            turn.result_summary = format!("clarification: {:?}", kind);
            self.router.commit_turn(session_id, turn, None).await?;
            return Ok(response);
        }

        if let Some(cached) = self.router.cached_response(session_id, &text, &decision) {
            tracing::info!(session_id = %session_id, "Serving cached response");
            let mut response = cached.response;
            response.metadata.cached = true;
            turn.result_summary = format!("cached {:?}", response.kind);
            self.router.commit_turn(session_id, turn, cached.results).await?;
            return Ok(response);
        }

        let query_text = decision.enriched_query.clone().unwrap_or_else(|| text.clone());
        let compiled = self
            .call_stage(
                &*self.stages.compiler,
                CompileRequest {
                    session_id: session_id.to_string(),
                    text: query_text,
                    intent,
                    entities: decision.resolved_entities.clone(),
                },
                trace,
            )
            .await?;

        let started = Instant::now();
        let executed = self.executor.execute(&compiled).await;
        trace.record("executor", started, if executed.is_ok() { "ok" } else { "failed" });
        let mut result = executed?;

        let evaluation = if self.config.enable_evaluation && intent == Intent::Analysis && !result.rows.is_empty() {
            self.optional_stage(
                &*self.stages.evaluator,
                EvaluateRequest {
                    session_id: session_id.to_string(),
                    original_text: request.text.clone(),
                    intent,
                    entities: decision.resolved_entities.clone(),
                    query: Some(compiled.clone()),
                    results: result.rows.iter().take(1).cloned().collect(),
                },
                trace,
            )
            .await
        } else {
            None
        };

        let mut ranking_explanation = None;
        if self.config.enable_ranking && compiled.rankable && result.rows.len() >= self.config.min_rows_for_ranking {
            let ranked = self
                .optional_stage(
                    &*self.stages.ranker,
                    RankRequest {
                        session_id: session_id.to_string(),
                        original_text: request.text.clone(),
                        intent,
                        entities: decision.resolved_entities.clone(),
                        results: result.rows.clone(),
                        strategy: request.ranking_strategy,
                    },
                    trace,
                )
                .await;
            if let Some(outcome) = ranked {
                ranking_explanation = Some(outcome.explanation.clone());
                result.rows = outcome.into_rows();
                result.row_count = result.rows.len();
            }
        }

        let response = self
            .call_stage(
                &*self.stages.formatter,
                FormatRequest {
                    session_id: session_id.to_string(),
                    original_text: request.text.clone(),
                    intent,
                    entities: decision.resolved_entities.clone(),
                    confidence,
                    query: Some(compiled.clone()),
                    results: Some(result.clone()),
                    ranking_explanation,
                    evaluation,
                    clarification: None,
                    presentation_style: request.presentation_style,
                },
                trace,
            )
            .await?;

        let results: Option<Vec<ResultRef>> = match compiled.shape {
            ResultShape::SingleRow | ResultShape::MultipleRows => {
                Some(result.rows.iter().map(ResultRef::from_row).collect())
            }
            ResultShape::ScalarCount | ResultShape::AggregateTable => None,
        };

        self.router
            .cache_response(session_id, &text, &decision, &response, results.as_deref());
        turn.result_summary = format!("{:?}: {} rows", response.kind, result.row_count);
        turn.compiled_query = Some(compiled);
        self.router.commit_turn(session_id, turn, results).await?;
        Ok(response)
    }

    /// Clarification is terminal and must not fall back to a search, so a
    /// failing clarifier or formatter is replaced by the local deterministic
    /// versions.
    async fn clarify(
        &self,
        session_id: &str,
        request: &AskRequest,
        lang: Lang,
        turn: &Turn,
        kind: ClarificationType,
        trace: &mut TurnTrace,
    ) -> FormattedResponse {
        let clarification = match self
            .call_stage(
                &*self.stages.clarifier,
                ClarifyRequest {
                    session_id: session_id.to_string(),
                    original_text: request.text.clone(),
                    intent: turn.intent,
                    entities: turn.resolved_entities.clone(),
                    confidence: turn.confidence,
                    clarification_type: kind,
                },
                trace,
            )
            .await
        {
            Ok(clarification) => clarification,
            Err(_) => clarify::build(lang, turn.intent, &turn.resolved_entities, turn.confidence, kind),
        };

        let formatted = self
            .call_stage(
                &*self.stages.formatter,
                FormatRequest {
                    session_id: session_id.to_string(),
                    original_text: request.text.clone(),
                    intent: turn.intent,
                    entities: turn.resolved_entities.clone(),
                    confidence: turn.confidence,
                    query: None,
                    results: None,
                    ranking_explanation: None,
                    evaluation: None,
                    clarification: Some(clarification.clone()),
                    presentation_style: request.presentation_style,
                },
                trace,
            )
            .await;

        formatted.unwrap_or_else(|_| {
            self.formatter.format_clarification(
                lang,
                &clarification,
                turn.intent,
                &turn.resolved_entities,
                turn.confidence,
            )
        })
    }

    // -----------------------------------------------------------------------
    // Legacy path
    // -----------------------------------------------------------------------

    async fn legacy(
        &self,
        session_id: &str,
        turn_id: Uuid,
        request: &AskRequest,
        lang: Lang,
        trace: &mut TurnTrace,
    ) -> QaResult<FormattedResponse> {
        let query = self.legacy.compile(&request.text);

        let started = Instant::now();
        let executed = self.executor.execute(&query).await;
        trace.record("legacy", started, if executed.is_ok() { "ok" } else { "failed" });
        let result = executed?;

        let entities = ExtractedEntities::default();
        let ctx = ResultContext {
            lang,
            intent: Intent::DataQuery,
            entities: &entities,
            confidence: query.confidence,
            query: &query,
            result: &result,
            ranking_explanation: None,
            evaluation: None,
            style: request.presentation_style,
        };
        let response = self.formatter.format_result(&ctx);

        let turn = Turn {
            id: turn_id,
            raw_text: request.text.clone(),
            normalized_text: request.text.clone(),
            intent: Intent::DataQuery,
            confidence: query.confidence,
            entities: ExtractedEntities::default(),
            resolved_entities: ExtractedEntities::default(),
            route: Route::Proceed,
            compiled_query: Some(query),
            result_summary: format!("legacy: {} rows", result.row_count),
            created_at: Utc::now(),
        };
        let results = result.rows.iter().map(ResultRef::from_row).collect();
        if let Err(e) = self.router.commit_turn(session_id, turn, Some(results)).await {
            tracing::warn!(session_id = %session_id, error = %e, "Could not record legacy turn");
        }
        Ok(response)
    }

    // -----------------------------------------------------------------------
    // Stage calls
    // -----------------------------------------------------------------------

    async fn call_stage<Req, Resp>(
        &self,
        stage: &dyn Stage<Req, Resp>,
        request: Req,
        trace: &mut TurnTrace,
    ) -> QaResult<Resp>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
    {
        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.stage_timeout, stage.call(request)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(QaError::timeout(stage.name(), self.stage_timeout.as_millis() as u64)),
        };
        match &outcome {
            Ok(_) => trace.record(stage.name(), started, "ok"),
            Err(e) => {
                tracing::warn!(stage = stage.name(), error = %e, "Stage failed");
                trace.record(stage.name(), started, "failed");
            }
        }
        outcome
    }

    async fn optional_stage<Req, Resp>(
        &self,
        stage: &dyn Stage<Req, Resp>,
        request: Req,
        trace: &mut TurnTrace,
    ) -> Option<Resp>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
    {
        match self.call_stage(stage, request, trace).await {
            Ok(response) => Some(response),
            Err(e) => {
                tracing::info!(stage = stage.name(), kind = e.kind(), "Skipping optional stage");
                None
            }
        }
    }
}

fn health_report(stage: &str, outcome: QaResult<()>) -> StageHealth {
    match outcome {
        Ok(()) => StageHealth {
            stage: stage.to_string(),
            healthy: true,
            detail: None,
        },
        Err(e) => {
            tracing::warn!(stage = stage, error = %e, "Health check failed");
            StageHealth {
                stage: stage.to_string(),
                healthy: false,
                detail: Some(e.kind().to_string()),
            }
        }
    }
}
