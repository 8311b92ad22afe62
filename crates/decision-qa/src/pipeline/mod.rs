//! Stage composition: contracts, the `Stage` seam, the legacy keyword path
//! and the orchestrator that drives a turn end to end.

pub mod contracts;
pub mod legacy;
pub mod orchestrator;
pub mod stage;

pub use contracts::{
    AskRequest, AskResponse, ClarifyRequest, ClassifyRequest, CompileRequest, EvaluateRequest, FormatRequest,
    NormalizeRequest, RankRequest, RouteRequest, StageHealth,
};
pub use legacy::LegacySearch;
pub use orchestrator::{Orchestrator, Stages};
pub use stage::{HttpStage, Stage};

use serde::{Deserialize, Serialize};

/// Where a turn is in its fallback ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    #[default]
    Primary,
    LegacyFallback,
    Failed,
}

/// A recorded move between pipeline states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: PipelineState,
    pub to: PipelineState,
    /// Error kind and, where known, the stage that produced it.
    pub reason: String,
}
