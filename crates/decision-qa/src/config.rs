use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{QaError, QaResult};
use crate::llm::{ApiProvider, LLMConfig, LLMMode};
use crate::types::Slot;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaConfig {
    pub pipeline: PipelineConfig,
    pub session: SessionConfig,
    pub query: QueryConfig,
    pub ranking: RankingConfig,
    pub store: StoreConfig,
    pub llm: LLMConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Below this the classifier's label is replaced by UNCLEAR.
    pub confidence_threshold: f32,
    pub stage_timeout_ms: u64,
    pub turn_timeout_ms: u64,
    /// Ask the language model for the intent label before the rules.
    pub use_model_classifier: bool,
    pub enable_evaluation: bool,
    pub enable_ranking: bool,
    /// Minimum rows before the ranker is consulted.
    pub min_rows_for_ranking: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
    /// Slots a PROCEED turn inherits from the previous turn. Empty by default:
    /// no filter carries over unless listed here.
    pub sticky_slots: Vec<Slot>,
    pub max_turns: usize,
    pub cache_capacity: usize,
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    pub table: String,
    pub default_limit: u32,
    pub max_limit: u32,
    pub legacy_limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    pub lexical_weight: f32,
    pub semantic_weight: f32,
    pub entity_weight: f32,
    pub recency_weight: f32,
    /// Years after which the recency component has halved.
    pub recency_half_life_years: f32,
    pub max_semantic_candidates: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub statement_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Stage name → base URL. Stages listed here are called over HTTP instead
    /// of in-process.
    #[serde(default)]
    pub remote_stages: HashMap<String, String>,
}

impl QaConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.pipeline.confidence_threshold) {
            return Err("pipeline.confidence_threshold must be in [0.0, 1.0]".into());
        }
        if self.pipeline.stage_timeout_ms == 0 {
            return Err("pipeline.stage_timeout_ms must be > 0".into());
        }
        if self.pipeline.turn_timeout_ms < self.pipeline.stage_timeout_ms {
            return Err("pipeline.turn_timeout_ms must be >= stage_timeout_ms".into());
        }
        if self.session.ttl_secs == 0 {
            return Err("session.ttl_secs must be > 0".into());
        }
        if self.session.cache_capacity == 0 {
            return Err("session.cache_capacity must be > 0".into());
        }
        if self.query.default_limit == 0 || self.query.default_limit > self.query.max_limit {
            return Err("query.default_limit must be in 1..=max_limit".into());
        }
        if self.query.table.is_empty()
            || !self
                .query
                .table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err("query.table must be a plain identifier".into());
        }
        let weights = [
            self.ranking.lexical_weight,
            self.ranking.semantic_weight,
            self.ranking.entity_weight,
            self.ranking.recency_weight,
        ];
        if weights.iter().any(|w| *w < 0.0) || weights.iter().sum::<f32>() <= 0.0 {
            return Err("ranking weights must be non-negative with a positive sum".into());
        }
        if self.ranking.recency_half_life_years <= 0.0 {
            return Err("ranking.recency_half_life_years must be > 0".into());
        }
        Ok(())
    }

    /// Load config from a JSON file, falling back to defaults for missing fields.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults (or `QA_CONFIG` file) overlaid with environment variables.
    /// Loads `.env` first if present.
    pub fn from_env() -> QaResult<Self> {
        // Best-effort .env load; ignore if missing
        let _ = dotenvy::dotenv();

        let mut config = match std::env::var("QA_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path)).map_err(QaError::Config)?,
            Err(_) => Self::default(),
        };

        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.store.database_url = url;
        }
        config.server.host = get_var_or("HOST", &config.server.host);
        config.server.port = parse_var("PORT", config.server.port)?;
        config.pipeline.confidence_threshold =
            parse_var("QA_CONFIDENCE_THRESHOLD", config.pipeline.confidence_threshold)?;
        config.pipeline.stage_timeout_ms =
            parse_var("QA_STAGE_TIMEOUT_MS", config.pipeline.stage_timeout_ms)?;
        config.pipeline.turn_timeout_ms =
            parse_var("QA_TURN_TIMEOUT_MS", config.pipeline.turn_timeout_ms)?;
        config.session.ttl_secs = parse_var("QA_SESSION_TTL_SECS", config.session.ttl_secs)?;

        if let Ok(api_key) = std::env::var("LLM_API_KEY") {
            let model = get_var_or("LLM_MODEL", "gpt-4o-mini");
            let provider = match std::env::var("LLM_ENDPOINT") {
                Ok(endpoint) => ApiProvider::Custom { endpoint },
                Err(_) => ApiProvider::OpenAI,
            };
            config.llm.mode = LLMMode::External {
                provider,
                api_key,
                model,
            };
        }

        config.validate().map_err(QaError::Config)?;
        Ok(config)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn get_var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn parse_var<T: std::str::FromStr>(key: &str, current: T) -> QaResult<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| QaError::Config(format!("invalid {key}: {e}"))),
        Err(_) => Ok(current),
    }
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig {
                confidence_threshold: 0.5,
                stage_timeout_ms: 20_000,
                turn_timeout_ms: 60_000,
                use_model_classifier: false,
                enable_evaluation: true,
                enable_ranking: true,
                min_rows_for_ranking: 3,
            },
            session: SessionConfig {
                ttl_secs: 30 * 60,
                sweep_interval_secs: 60,
                sticky_slots: Vec::new(),
                max_turns: 50,
                cache_capacity: 1000,
                cache_ttl_secs: 10 * 60,
            },
            query: QueryConfig {
                table: "israeli_government_decisions".to_string(),
                default_limit: 10,
                max_limit: 50,
                legacy_limit: 10,
            },
            ranking: RankingConfig {
                lexical_weight: 0.3,
                semantic_weight: 0.4,
                entity_weight: 0.2,
                recency_weight: 0.1,
                recency_half_life_years: 4.0,
                max_semantic_candidates: 15,
            },
            store: StoreConfig {
                database_url: "postgres://localhost/decisions".to_string(),
                max_connections: 10,
                statement_timeout_ms: 15_000,
            },
            llm: LLMConfig::default(),
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                remote_stages: HashMap::new(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_default_config_is_valid() {
        assert!(QaConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_threshold_out_of_range() {
        let mut config = QaConfig::default();
        config.pipeline.confidence_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unsafe_table_name() {
        let mut config = QaConfig::default();
        config.query.table = "decisions; drop table x".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_turn_timeout_below_stage_timeout() {
        let mut config = QaConfig::default();
        config.pipeline.turn_timeout_ms = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_round_trip_with_sticky_slots() {
        let mut config = QaConfig::default();
        config.session.sticky_slots = vec![Slot::GovernmentNumber];
        let json = serde_json::to_string(&config).unwrap();
        let parsed: QaConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.session.sticky_slots, vec![Slot::GovernmentNumber]);
    }

    #[test]
    fn test_from_env_overrides_port() {
        let _guard = ENV_LOCK.lock().expect("env lock poisoned");
        std::env::set_var("PORT", "9191");
        let config = QaConfig::from_env().expect("should parse config");
        assert_eq!(config.server.port, 9191);
        std::env::remove_var("PORT");
    }

    #[test]
    fn test_from_env_rejects_bad_port() {
        let _guard = ENV_LOCK.lock().expect("env lock poisoned");
        std::env::set_var("PORT", "not-a-port");
        assert!(QaConfig::from_env().is_err());
        std::env::remove_var("PORT");
    }
}
