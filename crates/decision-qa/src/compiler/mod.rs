//! Template Matcher / Query Compiler
//!
//! Template registry first; model-assisted synthesis when nothing matches.
//! Both paths take entities from the shared extractor and both pass through
//! the same [`SqlValidator`].

pub mod safety;
pub mod schema;
pub mod templates;

pub use safety::SqlValidator;
pub use templates::{FilterBuilder, TemplateArgs, TemplateKind, TemplateRegistry};

use serde::Deserialize;

use crate::config::QueryConfig;
use crate::error::{QaError, QaResult};
use crate::llm::{json, LLMManager};
use crate::types::{CompiledQuery, ExtractedEntities, Intent, Provenance, ResultShape, SqlParam};

const SYNTHESIS_OUTPUT_TOKENS: usize = 600;

#[derive(Deserialize)]
struct SynthesizedQuery {
    sql: String,
    #[serde(default)]
    params: Vec<serde_json::Value>,
    #[serde(default)]
    result_shape: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
}

pub struct QueryCompiler {
    registry: TemplateRegistry,
    validator: SqlValidator,
    llm: LLMManager,
    config: QueryConfig,
}

impl QueryCompiler {
    pub fn new(config: QueryConfig) -> Self {
        Self {
            registry: TemplateRegistry::new(),
            validator: SqlValidator::new(&config.table),
            llm: LLMManager::disabled(),
            config,
        }
    }

    pub fn with_model(mut self, llm: LLMManager) -> Self {
        self.llm = llm;
        self
    }

    pub fn with_registry(mut self, registry: TemplateRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn validator(&self) -> &SqlValidator {
        &self.validator
    }

    pub async fn compile(
        &self,
        text: &str,
        intent: Intent,
        entities: &ExtractedEntities,
    ) -> QaResult<CompiledQuery> {
        if let Some((kind, args)) = self.registry.select(text, entities, intent) {
            let query = kind.build(&args, &self.config.table, self.config.default_limit, self.config.max_limit);
            self.validator.validate(&query, entities)?;
            tracing::info!(
                template = kind.name(),
                priority = kind.priority(),
                params = query.params.len(),
                shape = ?query.shape,
                "Compiled from template"
            );
            return Ok(query);
        }

        if !self.llm.is_enabled() {
            return Err(QaError::unavailable(
                "compiler",
                "no template matched and model synthesis is disabled",
            ));
        }

        tracing::info!(intent = %intent.as_str(), "No template matched, synthesising query");
        let query = self.synthesize(text, intent, entities).await?;
        self.validator.validate(&query, entities)?;
        Ok(query)
    }

    async fn synthesize(
        &self,
        text: &str,
        intent: Intent,
        entities: &ExtractedEntities,
    ) -> QaResult<CompiledQuery> {
        let entities_json = serde_json::to_string(entities).unwrap_or_else(|_| "{}".to_string());
        let prompt = format!(
            "You write one PostgreSQL query answering a question about Israeli government decisions.\n\n\
             {schema}\n\n\
             Rules:\n\
             - A single read-only SELECT (or WITH ... SELECT). No semicolons, no comments.\n\
             - Every value goes into a positional parameter $1, $2, ... listed in params, in order. \
             No literal strings except '%'.\n\
             - Only query {table}.\n\
             - Do not add any filter the question does not state. In particular never filter on \
             government_number unless the question names a government.\n\
             - Return at most {max_limit} rows.\n\n\
             Already extracted from the question (use these values, do not re-infer them): {entities}\n\
             Intent: {intent}\n\
             Question: \"{text}\"\n\n\
             Respond with ONLY a JSON object:\n\
             {{\"sql\": \"...\", \"params\": [...], \"result_shape\": \"single_row|multiple_rows|scalar_count|aggregate_table\", \"confidence\": 0.0-1.0}}",
            schema = schema::schema_description(&self.config.table),
            table = self.config.table,
            max_limit = self.config.max_limit,
            entities = entities_json,
            intent = intent.as_str(),
            text = text,
        );

        let raw = self
            .llm
            .generate_custom(&prompt, SYNTHESIS_OUTPUT_TOKENS)
            .await
            .map_err(|e| QaError::Model(e.to_string()))?;

        parse_synthesized(&raw, self.config.max_limit)
    }
}

/// Turn model output into a query. The validator still has the final say.
fn parse_synthesized(raw: &str, max_limit: u32) -> QaResult<CompiledQuery> {
    let synthesized: SynthesizedQuery = json::parse_object(raw).ok_or_else(|| {
        QaError::Model(format!(
            "unparseable synthesis output: {}",
            raw.chars().take(200).collect::<String>()
        ))
    })?;

    let params = synthesized
        .params
        .iter()
        .map(|v| {
            SqlParam::from_json(v)
                .ok_or_else(|| QaError::Validation(format!("unsupported parameter value {}", v)))
        })
        .collect::<QaResult<Vec<_>>>()?;

    let shape = synthesized
        .result_shape
        .as_deref()
        .and_then(ResultShape::parse)
        .unwrap_or(ResultShape::MultipleRows);

    // Models habitually end statements with one semicolon.
    let mut sql = synthesized.sql.trim().trim_end_matches(';').trim_end().to_string();
    if shape == ResultShape::MultipleRows && !sql.to_lowercase().contains(" limit ") {
        sql = format!("{} LIMIT {}", sql, max_limit);
    }

    Ok(CompiledQuery {
        sql,
        params,
        shape,
        provenance: Provenance::ModelSynthesized,
        confidence: synthesized.confidence.unwrap_or(0.6).clamp(0.0, 1.0),
        rankable: shape == ResultShape::MultipleRows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QaConfig;
    use crate::extract::EntityExtractor;
    use crate::llm::testing::{manager, ScriptedProvider};
    use crate::types::TopicFilter;

    fn compiler() -> QueryCompiler {
        QueryCompiler::new(QaConfig::default().query)
    }

    #[tokio::test]
    async fn test_template_path_for_statistical_question() {
        let text = "how many decisions on education did government 37 make";
        let entities = EntityExtractor::new().extract(text);
        let query = compiler().compile(text, Intent::Statistical, &entities).await.unwrap();
        assert_eq!(query.shape, ResultShape::ScalarCount);
        assert_eq!(
            query.provenance,
            Provenance::Template("count_by_topic_and_government".into())
        );
    }

    #[tokio::test]
    async fn test_no_template_without_model_is_unavailable() {
        let entities = ExtractedEntities::default();
        let err = compiler()
            .compile("average decisions per month", Intent::Statistical, &entities)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "upstream_unavailable");
    }

    #[tokio::test]
    async fn test_model_synthesis_is_validated() {
        let provider = ScriptedProvider::ok(
            "```json\n{\"sql\": \"SELECT EXTRACT(MONTH FROM decision_date)::int AS month, COUNT(*) AS decision_count FROM israeli_government_decisions WHERE tags_policy_area ILIKE $1 GROUP BY month;\", \"params\": [\"%חינוך%\"], \"result_shape\": \"aggregate_table\", \"confidence\": 0.7}\n```",
        );
        let compiler = compiler().with_model(manager(provider.clone()));
        let entities = ExtractedEntities {
            topic: Some(TopicFilter::Canonical("חינוך".into())),
            ..Default::default()
        };
        let query = compiler
            .compile("average education decisions per month", Intent::Statistical, &entities)
            .await
            .unwrap();
        assert_eq!(query.provenance, Provenance::ModelSynthesized);
        assert_eq!(query.shape, ResultShape::AggregateTable);
        assert!(!query.sql.ends_with(';'));
        assert_eq!(query.params, vec![SqlParam::Text("%חינוך%".into())]);

        let prompt = provider.prompts.lock()[0].clone();
        assert!(prompt.contains("never filter on government_number"));
        assert!(prompt.contains("\"topic\""));
    }

    #[tokio::test]
    async fn test_model_injected_government_filter_is_rejected() {
        let provider = ScriptedProvider::ok(
            r#"{"sql": "SELECT * FROM israeli_government_decisions WHERE government_number = $1 AND summary ILIKE $2", "params": [37, "%water%"], "result_shape": "multiple_rows"}"#,
        );
        let compiler = compiler().with_model(manager(provider));
        let err = compiler
            .compile("which decisions mention water", Intent::DataQuery, &ExtractedEntities::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[tokio::test]
    async fn test_model_write_statement_is_rejected() {
        let provider = ScriptedProvider::ok(
            r#"{"sql": "DELETE FROM israeli_government_decisions", "params": [], "result_shape": "scalar_count"}"#,
        );
        let compiler = compiler().with_model(manager(provider));
        let err = compiler
            .compile("average decisions per month", Intent::Statistical, &ExtractedEntities::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn test_parse_synthesized_adds_limit_to_lists() {
        let query = parse_synthesized(
            r#"{"sql": "SELECT decision_title FROM israeli_government_decisions WHERE summary ILIKE $1", "params": ["%מים%"]}"#,
            50,
        )
        .unwrap();
        assert!(query.sql.ends_with("LIMIT 50"));
        assert!(query.rankable);
        assert!(parse_synthesized("not json", 50).is_err());
    }
}
