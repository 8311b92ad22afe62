//! Model-assisted relevance scoring of one decision against the question.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{date_field, text_field};
use crate::error::{QaError, QaResult};
use crate::llm::{json, LLMManager};
use crate::types::{Lang, Row};

const EVALUATION_OUTPUT_TOKENS: usize = 400;
const CONTENT_CHARS: usize = 2500;

/// Criterion key and weight. Weights sum to 1.
pub const CRITERIA: [(&str, f32); 5] = [
    ("query_relevance", 0.30),
    ("content_coverage", 0.25),
    ("implementation_clarity", 0.20),
    ("resource_specificity", 0.15),
    ("timeline_clarity", 0.10),
];

/// At least this many criteria must come back for a score to count.
const MIN_CRITERIA: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelevanceLevel {
    HighlyRelevant,
    Relevant,
    PartiallyRelevant,
    MarginallyRelevant,
    NotRelevant,
}

impl RelevanceLevel {
    pub fn from_score(score: f32) -> Self {
        if score >= 0.8 {
            RelevanceLevel::HighlyRelevant
        } else if score >= 0.6 {
            RelevanceLevel::Relevant
        } else if score >= 0.4 {
            RelevanceLevel::PartiallyRelevant
        } else if score >= 0.2 {
            RelevanceLevel::MarginallyRelevant
        } else {
            RelevanceLevel::NotRelevant
        }
    }

    pub fn label(&self, lang: Lang) -> &'static str {
        match (self, lang) {
            (RelevanceLevel::HighlyRelevant, Lang::Hebrew) => "רלוונטית מאוד",
            (RelevanceLevel::Relevant, Lang::Hebrew) => "רלוונטית",
            (RelevanceLevel::PartiallyRelevant, Lang::Hebrew) => "רלוונטית חלקית",
            (RelevanceLevel::MarginallyRelevant, Lang::Hebrew) => "רלוונטית במידה מועטה",
            (RelevanceLevel::NotRelevant, Lang::Hebrew) => "לא רלוונטית",
            (RelevanceLevel::HighlyRelevant, Lang::English) => "highly relevant",
            (RelevanceLevel::Relevant, Lang::English) => "relevant",
            (RelevanceLevel::PartiallyRelevant, Lang::English) => "partially relevant",
            (RelevanceLevel::MarginallyRelevant, Lang::English) => "marginally relevant",
            (RelevanceLevel::NotRelevant, Lang::English) => "not relevant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub name: String,
    pub weight: f32,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub overall_score: f32,
    pub relevance_level: RelevanceLevel,
    pub criteria: Vec<CriterionScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

pub struct Evaluator {
    llm: LLMManager,
    timeout: Duration,
}

impl Evaluator {
    pub fn new(llm: LLMManager, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    pub fn is_available(&self) -> bool {
        self.llm.is_enabled()
    }

    pub async fn evaluate(&self, question: &str, record: &Row) -> QaResult<Evaluation> {
        if !self.llm.is_enabled() {
            return Err(QaError::unavailable("evaluator", "language model disabled"));
        }

        let content: String = text_field(record, "decision_content")
            .chars()
            .take(CONTENT_CHARS)
            .collect();
        let criteria_keys: Vec<&str> = CRITERIA.iter().map(|(k, _)| *k).collect();
        let prompt = format!(
            "You evaluate how well an Israeli government decision answers a user's question.\n\n\
             Question: \"{question}\"\n\n\
             Decision {number} (government {government}, {date}): {title}\n\
             Summary: {summary}\n\
             Content: {content}\n\n\
             Score each criterion from 0.0 to 1.0:\n\
             - query_relevance: does the decision address the question?\n\
             - content_coverage: how much of what was asked does it cover?\n\
             - implementation_clarity: are the actions and responsible bodies clear?\n\
             - resource_specificity: are budgets and resources specified?\n\
             - timeline_clarity: are deadlines and schedules stated?\n\n\
             Respond with ONLY a JSON object with the keys {keys} and a short \"explanation\".",
            question = question,
            number = text_field(record, "decision_number"),
            government = record
                .get("government_number")
                .map(|v| v.to_string())
                .unwrap_or_default(),
            date = date_field(record, "decision_date")
                .map(|d| d.to_string())
                .unwrap_or_default(),
            title = text_field(record, "decision_title"),
            summary = text_field(record, "summary"),
            content = content,
            keys = criteria_keys.join(", "),
        );

        let raw = match tokio::time::timeout(
            self.timeout,
            self.llm.generate_custom(&prompt, EVALUATION_OUTPUT_TOKENS),
        )
        .await
        {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => return Err(QaError::Model(e.to_string())),
            Err(_) => {
                return Err(QaError::timeout("evaluator", self.timeout.as_millis() as u64));
            }
        };

        let evaluation = parse_evaluation(&raw).ok_or_else(|| {
            QaError::Model(format!(
                "unparseable evaluation: {}",
                raw.chars().take(200).collect::<String>()
            ))
        })?;

        tracing::info!(
            overall = evaluation.overall_score,
            level = ?evaluation.relevance_level,
            "Evaluated record"
        );
        Ok(evaluation)
    }
}

/// Field-by-field so that a truncated object still yields the criteria that
/// made it through. Weights are renormalised over the criteria present.
pub(crate) fn parse_evaluation(raw: &str) -> Option<Evaluation> {
    let slice = json::object_slice(raw);
    let criteria: Vec<CriterionScore> = CRITERIA
        .iter()
        .filter_map(|(name, weight)| {
            json::extract_json_number(slice, name).map(|score| CriterionScore {
                name: name.to_string(),
                weight: *weight,
                score: (score as f32).clamp(0.0, 1.0),
            })
        })
        .collect();

    if criteria.len() < MIN_CRITERIA {
        return None;
    }

    let total_weight: f32 = criteria.iter().map(|c| c.weight).sum();
    let overall_score = criteria.iter().map(|c| c.weight * c.score).sum::<f32>() / total_weight;

    Some(Evaluation {
        overall_score,
        relevance_level: RelevanceLevel::from_score(overall_score),
        criteria,
        explanation: json::extract_json_string(slice, "explanation"),
    })
}
