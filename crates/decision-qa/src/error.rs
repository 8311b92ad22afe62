//! Error taxonomy shared by every pipeline stage.
//!
//! Only `Execution` and the terminal `Failed` outcome of the orchestrator ever
//! reach an end user, and then only as a localized generic sentence. The
//! detail strings carried here are for operational logs.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QaError {
    /// Malformed template arguments, placeholder/parameter mismatch, or an
    /// unsafe statement. Never sent to the store.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("stage '{stage}' timed out after {timeout_ms}ms")]
    UpstreamTimeout { stage: String, timeout_ms: u64 },

    #[error("stage '{stage}' unavailable: {reason}")]
    UpstreamUnavailable { stage: String, reason: String },

    /// Confidence below the gate. Routed to clarification, not a hard error.
    #[error("ambiguous input: {0}")]
    AmbiguousInput(String),

    /// The store rejected the compiled statement.
    #[error("execution error: {0}")]
    Execution(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("session error: {0}")]
    Session(String),
}

impl QaError {
    pub fn timeout(stage: &str, timeout_ms: u64) -> Self {
        Self::UpstreamTimeout {
            stage: stage.to_string(),
            timeout_ms,
        }
    }

    pub fn unavailable(stage: &str, reason: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            stage: stage.to_string(),
            reason: reason.into(),
        }
    }

    /// Short machine-readable tag, used in transition reasons and metadata.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::UpstreamTimeout { .. } => "upstream_timeout",
            Self::UpstreamUnavailable { .. } => "upstream_unavailable",
            Self::AmbiguousInput(_) => "ambiguous_input",
            Self::Execution(_) => "execution",
            Self::Store(_) => "store",
            Self::Model(_) => "model",
            Self::Config(_) => "config",
            Self::Session(_) => "session",
        }
    }

    /// Terminal errors are the ones no fallback path can recover from.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Config(_))
    }
}

pub type QaResult<T> = Result<T, QaError>;
