pub mod clarify;
pub mod compiler;
pub mod config;
pub mod context;
pub mod error;
pub mod evaluate;
pub mod executor;
pub mod extract;
pub mod format;
pub mod intent;
pub mod llm;
pub mod normalize;
pub mod pipeline;
pub mod session;
pub mod types;

// Re-export primary types for convenience
pub use config::QaConfig;
pub use error::{QaError, QaResult};
pub use pipeline::{AskRequest, AskResponse, Orchestrator, PipelineState, Stages, Transition};
pub use types::{
    ClarificationRequest, ClarificationType, CompiledQuery, ExecutionResult, ExtractedEntities, Intent, Lang,
    Provenance, ResultShape, Route, Row, SqlParam, TopicFilter, Turn,
};

// Stage components
pub use clarify::ClarificationGenerator;
pub use compiler::QueryCompiler;
pub use context::{CachedAnswer, ContextRouter, ResponseCache, RouteDecision};
pub use evaluate::{Evaluator, Ranker, RankingStrategy};
pub use executor::{DecisionStore, PgDecisionStore, QueryExecutor};
pub use format::{FormattedResponse, PresentationStyle, ResponseFormatter, ResponseKind};
pub use intent::IntentClassifier;
pub use normalize::Normalizer;
pub use session::{spawn_session_sweeper, InMemorySessionStore, PgSessionStore, SessionStore};

// Re-export LLM types
pub use llm::{ApiProvider, GenerationConfig, LLMConfig, LLMManager, LLMMode, LLMProvider, ProviderInfo};

// The server builds its pool from the same sqlx version.
pub use sqlx;

// Re-export common types
pub use anyhow::{Error, Result};
pub use uuid::Uuid;
