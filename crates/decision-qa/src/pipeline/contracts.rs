//! Request/response payloads for every stage boundary.
//!
//! The same structs travel in-process and over HTTP, so they are all
//! serde-friendly and own their data.

use serde::{Deserialize, Serialize};

use crate::evaluate::{Evaluation, RankingStrategy};
use crate::format::{FormattedResponse, PresentationStyle};
use crate::types::{
    ClarificationRequest, ClarificationType, CompiledQuery, ExecutionResult, ExtractedEntities, Intent, Row,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeRequest {
    pub text: String,
    #[serde(default)]
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyRequest {
    pub text: String,
    #[serde(default)]
    pub session_id: String,
    /// Records shown in the session's previous answer.
    #[serde(default)]
    pub prior_result_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRequest {
    pub session_id: String,
    pub text: String,
    pub intent: Intent,
    #[serde(default)]
    pub entities: ExtractedEntities,
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClarifyRequest {
    #[serde(default)]
    pub session_id: String,
    pub original_text: String,
    pub intent: Intent,
    #[serde(default)]
    pub entities: ExtractedEntities,
    #[serde(default)]
    pub confidence: f32,
    pub clarification_type: ClarificationType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileRequest {
    #[serde(default)]
    pub session_id: String,
    pub text: String,
    pub intent: Intent,
    #[serde(default)]
    pub entities: ExtractedEntities,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateRequest {
    #[serde(default)]
    pub session_id: String,
    pub original_text: String,
    pub intent: Intent,
    #[serde(default)]
    pub entities: ExtractedEntities,
    #[serde(default)]
    pub query: Option<CompiledQuery>,
    /// The first row is the record evaluated.
    pub results: Vec<Row>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankRequest {
    #[serde(default)]
    pub session_id: String,
    pub original_text: String,
    pub intent: Intent,
    #[serde(default)]
    pub entities: ExtractedEntities,
    pub results: Vec<Row>,
    #[serde(default)]
    pub strategy: RankingStrategy,
}

/// Either an executed query with its results or a clarification to render.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatRequest {
    #[serde(default)]
    pub session_id: String,
    pub original_text: String,
    pub intent: Intent,
    #[serde(default)]
    pub entities: ExtractedEntities,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub query: Option<CompiledQuery>,
    #[serde(default)]
    pub results: Option<ExecutionResult>,
    #[serde(default)]
    pub ranking_explanation: Option<String>,
    #[serde(default)]
    pub evaluation: Option<Evaluation>,
    #[serde(default)]
    pub clarification: Option<ClarificationRequest>,
    #[serde(default)]
    pub presentation_style: PresentationStyle,
}

/// One question to the orchestrated pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    pub text: String,
    /// A new session is started when absent.
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub presentation_style: PresentationStyle,
    #[serde(default)]
    pub ranking_strategy: RankingStrategy,
}

impl AskRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            session_id: None,
            presentation_style: PresentationStyle::default(),
            ranking_strategy: RankingStrategy::default(),
        }
    }

    pub fn in_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskResponse {
    pub session_id: String,
    pub turn_id: uuid::Uuid,
    pub state: super::PipelineState,
    pub transitions: Vec<super::Transition>,
    pub response: FormattedResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageHealth {
    pub stage: String,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
