//! Response Formatter
//!
//! Turns execution, ranking and evaluation output into the final answer: a
//! narrative string plus a structured body the UI can render, and metadata
//! describing how the answer was produced.
//!
//! Shapes:
//! - scalar count → one sentence, never a record view
//! - single record → detail view
//! - rows → numbered list
//! - aggregate → table
//! - zero rows → explicit "no results" message

mod messages;

use serde::{Deserialize, Serialize};

use crate::error::QaError;
use crate::evaluate::Evaluation;
use crate::extract::describe_range;
use crate::types::{
    ClarificationRequest, CompiledQuery, ExecutionResult, ExtractedEntities, Intent, Lang, Provenance, ResultShape,
    Row,
};
use messages::{messages, Messages};

const LIST_SUMMARY_CHARS: usize = 240;
const DETAIL_CONTENT_CHARS: usize = 4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    Count,
    Detail,
    List,
    Aggregate,
    Clarification,
    NoResults,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentationStyle {
    /// Titles only in lists.
    Concise,
    #[default]
    Standard,
    /// Lists include summaries; detail views include the full text.
    Detailed,
}

/// One record as shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordView {
    pub decision_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub government_number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_date: Option<String>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl RecordView {
    fn from_row(row: &Row, untitled: &str) -> Self {
        Self {
            decision_number: scalar_text(row, "decision_number").unwrap_or_default(),
            government_number: row.get("government_number").and_then(|v| v.as_i64()),
            decision_date: scalar_text(row, "decision_date").map(|d| d.chars().take(10).collect()),
            title: scalar_text(row, "decision_title").unwrap_or_else(|| untitled.to_string()),
            summary: scalar_text(row, "summary").filter(|s| !s.trim().is_empty()),
            url: scalar_text(row, "decision_url").filter(|s| !s.trim().is_empty()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseBody {
    Text,
    Count {
        value: i64,
    },
    Records {
        items: Vec<RecordView>,
    },
    Table {
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    Clarification {
        request: ClarificationRequest,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: String,
    pub duration_ms: u64,
    /// "ok", "skipped" or "failed".
    pub outcome: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    pub entities: ExtractedEntities,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provenance: Option<String>,
    pub row_count: usize,
    #[serde(default)]
    pub stage_timings: Vec<StageTiming>,
    #[serde(default)]
    pub total_ms: u64,
    #[serde(default)]
    pub cached: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormattedResponse {
    pub kind: ResponseKind,
    pub lang: Lang,
    pub text: String,
    pub body: ResponseBody,
    pub metadata: ResponseMetadata,
}

impl FormattedResponse {
    /// A bare text response with empty metadata.
    pub fn plain(text: impl Into<String>, lang: Lang) -> Self {
        Self {
            kind: ResponseKind::List,
            lang,
            text: text.into(),
            body: ResponseBody::Text,
            metadata: ResponseMetadata::default(),
        }
    }

    pub fn is_clarification(&self) -> bool {
        self.kind == ResponseKind::Clarification
    }
}

/// Everything the formatter needs about an executed turn.
pub struct ResultContext<'a> {
    pub lang: Lang,
    pub intent: Intent,
    pub entities: &'a ExtractedEntities,
    pub confidence: f32,
    pub query: &'a CompiledQuery,
    pub result: &'a ExecutionResult,
    pub ranking_explanation: Option<&'a str>,
    pub evaluation: Option<&'a Evaluation>,
    pub style: PresentationStyle,
}

#[derive(Debug, Clone, Default)]
pub struct ResponseFormatter;

impl ResponseFormatter {
    pub fn new() -> Self {
        Self
    }

    pub fn format_result(&self, ctx: &ResultContext<'_>) -> FormattedResponse {
        let msg = messages(ctx.lang);
        let metadata = ResponseMetadata {
            intent: Some(ctx.intent),
            entities: ctx.entities.clone(),
            confidence: ctx.confidence,
            provenance: Some(ctx.query.provenance.to_string()),
            row_count: ctx.result.row_count,
            ..Default::default()
        };

        // A count answer comes from the scalar even when it is zero; every
        // other shape with no rows is a "no results" answer.
        if ctx.query.shape == ResultShape::ScalarCount {
            let value = ctx.result.scalar.unwrap_or(0);
            let text = messages::count_sentence(ctx.lang, value, &criteria(ctx.lang, ctx.entities));
            return FormattedResponse {
                kind: ResponseKind::Count,
                lang: ctx.lang,
                text,
                body: ResponseBody::Count { value },
                metadata,
            };
        }

        if ctx.result.rows.is_empty() {
            return FormattedResponse {
                kind: ResponseKind::NoResults,
                lang: ctx.lang,
                text: format!("{} {}", msg.no_results, msg.no_results_hint),
                body: ResponseBody::Text,
                metadata,
            };
        }

        let (kind, text, body) = match ctx.query.shape {
            ResultShape::AggregateTable => self.aggregate(ctx, msg),
            ResultShape::SingleRow => self.detail(ctx, msg, &ctx.result.rows[0]),
            ResultShape::MultipleRows
                if ctx.result.rows.len() == 1
                    && (ctx.entities.decision_number.is_some()
                        || ctx.entities.wants_full_detail
                        || ctx.intent == Intent::Analysis) =>
            {
                self.detail(ctx, msg, &ctx.result.rows[0])
            }
            _ => self.list(ctx, msg),
        };

        let text = if ctx.query.provenance == Provenance::Legacy {
            format!("{}\n\n{}", text, msg.legacy_note)
        } else {
            text
        };

        tracing::debug!(kind = ?kind, rows = ctx.result.row_count, "Formatted response");
        FormattedResponse {
            kind,
            lang: ctx.lang,
            text,
            body,
            metadata,
        }
    }

    fn detail(&self, ctx: &ResultContext<'_>, msg: &Messages, row: &Row) -> (ResponseKind, String, ResponseBody) {
        let view = RecordView::from_row(row, msg.untitled);
        let mut lines = vec![format!("{} {}: {}", msg.decision, view.decision_number, view.title)];

        if let Some(government) = view.government_number {
            lines.push(format!("{}: {}", msg.government, government));
        }
        if let Some(date) = &view.decision_date {
            lines.push(format!("{}: {}", msg.date, date));
        }
        if let Some(pm) = scalar_text(row, "prime_minister") {
            lines.push(format!("{}: {}", msg.prime_minister, pm));
        }
        if let Some(operativity) = scalar_text(row, "operativity") {
            lines.push(format!("{}: {}", msg.operativity, operativity));
        }
        if let Some(summary) = &view.summary {
            lines.push(format!("\n{}: {}", msg.summary, summary));
        }

        let show_content = ctx.entities.wants_full_detail
            || ctx.intent == Intent::Analysis
            || ctx.style == PresentationStyle::Detailed;
        if show_content {
            if let Some(content) = scalar_text(row, "decision_content").filter(|c| !c.trim().is_empty()) {
                lines.push(format!("\n{}:\n{}", msg.content, truncate(&content, DETAIL_CONTENT_CHARS)));
            }
        }

        if let Some(evaluation) = ctx.evaluation {
            let mut line = format!(
                "\n{}: {} ({:.0}%)",
                msg.relevance,
                evaluation.relevance_level.label(ctx.lang),
                evaluation.overall_score * 100.0
            );
            if let Some(explanation) = &evaluation.explanation {
                line.push_str(&format!(". {}", explanation));
            }
            lines.push(line);
        }
        if let Some(url) = &view.url {
            lines.push(format!("{}: {}", msg.link, url));
        }

        (
            ResponseKind::Detail,
            lines.join("\n"),
            ResponseBody::Records { items: vec![view] },
        )
    }

    fn list(&self, ctx: &ResultContext<'_>, msg: &Messages) -> (ResponseKind, String, ResponseBody) {
        let rows = &ctx.result.rows;
        let views: Vec<RecordView> = rows.iter().map(|row| RecordView::from_row(row, msg.untitled)).collect();

        let mut text = messages::list_header(ctx.lang, views.len(), &criteria(ctx.lang, ctx.entities));
        for (i, view) in views.iter().enumerate() {
            let mut meta = Vec::new();
            if let Some(government) = view.government_number {
                meta.push(format!("{} {}", msg.government, government));
            }
            if let Some(date) = &view.decision_date {
                meta.push(date.clone());
            }
            text.push_str(&format!("\n{}. {} {}", i + 1, msg.decision, view.decision_number));
            if !meta.is_empty() {
                text.push_str(&format!(" ({})", meta.join(", ")));
            }
            text.push_str(&format!(": {}", view.title));

            if ctx.style == PresentationStyle::Detailed {
                if let Some(summary) = &view.summary {
                    text.push_str(&format!("\n   {}", truncate(summary, LIST_SUMMARY_CHARS)));
                }
            }
        }
        if let Some(explanation) = ctx.ranking_explanation {
            text.push_str(&format!("\n\n{}", explanation));
        }

        let items = match ctx.style {
            PresentationStyle::Concise => views
                .into_iter()
                .map(|v| RecordView { summary: None, ..v })
                .collect(),
            _ => views,
        };
        (ResponseKind::List, text, ResponseBody::Records { items })
    }

    fn aggregate(&self, ctx: &ResultContext<'_>, msg: &Messages) -> (ResponseKind, String, ResponseBody) {
        let headers = table_headers(&ctx.result.rows[0]);
        let rows: Vec<Vec<String>> = ctx
            .result
            .rows
            .iter()
            .map(|row| headers.iter().map(|h| cell(row, h)).collect())
            .collect();

        let mut text = format!("{}{}:", msg.count_label, criteria(ctx.lang, ctx.entities));
        for row in &rows {
            let (label, value) = row.split_at(row.len().saturating_sub(1));
            text.push_str(&format!("\n{}: {}", label.join(" / "), value.join("")));
        }
        (ResponseKind::Aggregate, text, ResponseBody::Table { headers, rows })
    }

    pub fn format_clarification(
        &self,
        lang: Lang,
        request: &ClarificationRequest,
        intent: Intent,
        entities: &ExtractedEntities,
        confidence: f32,
    ) -> FormattedResponse {
        let msg = messages(lang);
        let mut text = format!("{}\n{}", request.rationale, msg.clarification_intro);
        for (i, question) in request.questions.iter().enumerate() {
            text.push_str(&format!("\n{}. {}", i + 1, question.question));
            if !question.suggested_answers.is_empty() {
                text.push_str(&format!("\n   {}: {}", msg.options, question.suggested_answers.join(" | ")));
            }
        }
        if !request.suggestions.is_empty() {
            text.push_str(&format!("\n\n{}:", msg.you_may_also_ask));
            for suggestion in &request.suggestions {
                text.push_str(&format!("\n- {}", suggestion));
            }
        }

        FormattedResponse {
            kind: ResponseKind::Clarification,
            lang,
            text,
            body: ResponseBody::Clarification {
                request: request.clone(),
            },
            metadata: ResponseMetadata {
                intent: Some(intent),
                entities: entities.clone(),
                confidence,
                ..Default::default()
            },
        }
    }

    /// User-facing error. Only the error category picks the wording; the
    /// error's own text never reaches the user.
    pub fn format_error(&self, lang: Lang, error: &QaError) -> FormattedResponse {
        let msg = messages(lang);
        let text = match error {
            QaError::UpstreamTimeout { .. } => msg.timeout_error,
            QaError::UpstreamUnavailable { .. } | QaError::Store(_) => msg.unavailable_error,
            _ => msg.generic_error,
        };
        FormattedResponse {
            kind: ResponseKind::Error,
            lang,
            text: text.to_string(),
            body: ResponseBody::Text,
            metadata: ResponseMetadata::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Human description of the stated filters, with a leading space.
fn criteria(lang: Lang, entities: &ExtractedEntities) -> String {
    let mut out = String::new();
    if let Some(operative) = entities.operative_only {
        out.push_str(messages::operative_phrase(lang, operative));
    }
    if let Some(topic) = &entities.topic {
        out.push_str(&messages::topic_phrase(lang, topic.value()));
    }
    if let Some(government) = entities.government_number {
        out.push_str(&messages::government_phrase(lang, government));
    }
    if let Some(period) = describe_range(entities.date_from, entities.date_to) {
        out.push_str(&messages::period_phrase(lang, &period));
    }
    if let Some(pm) = &entities.prime_minister {
        out.push_str(&messages::prime_minister_phrase(lang, pm));
    }
    out
}

fn scalar_text(row: &Row, key: &str) -> Option<String> {
    match row.get(key)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn cell(row: &Row, key: &str) -> String {
    scalar_text(row, key).unwrap_or_default()
}

/// Label columns first, count columns last.
fn table_headers(row: &Row) -> Vec<String> {
    let (counts, labels): (Vec<&String>, Vec<&String>) =
        row.keys().partition(|k| k.as_str() == "decision_count" || k.as_str() == "count");
    labels.into_iter().chain(counts).cloned().collect()
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClarificationQuestion, ClarificationType, TopicFilter};
    use serde_json::json;

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn query(shape: ResultShape) -> CompiledQuery {
        CompiledQuery {
            sql: "SELECT 1".into(),
            params: vec![],
            shape,
            provenance: Provenance::Template("t".into()),
            confidence: 0.95,
            rankable: false,
        }
    }

    fn result(rows: Vec<Row>, scalar: Option<i64>) -> ExecutionResult {
        ExecutionResult {
            row_count: rows.len(),
            rows,
            scalar,
            duration_ms: 3,
            success: true,
        }
    }

    fn format(
        lang: Lang,
        entities: &ExtractedEntities,
        shape: ResultShape,
        result: &ExecutionResult,
    ) -> FormattedResponse {
        let query = query(shape);
        let ctx = ResultContext {
            lang,
            intent: Intent::DataQuery,
            entities,
            confidence: 0.9,
            query: &query,
            result,
            ranking_explanation: None,
            evaluation: None,
            style: PresentationStyle::Standard,
        };
        ResponseFormatter::new().format_result(&ctx)
    }

    fn decision(number: &str, title: &str) -> Row {
        row(json!({
            "decision_number": number,
            "government_number": 37,
            "decision_date": "2023-03-01",
            "decision_title": title,
            "summary": "תקציר",
        }))
    }

    #[test]
    fn test_count_is_a_sentence_not_a_record() {
        let entities = ExtractedEntities {
            topic: Some(TopicFilter::Canonical("חינוך".into())),
            government_number: Some(37),
            ..Default::default()
        };
        let exec = result(vec![row(json!({"decision_count": 1}))], Some(1));
        let response = format(Lang::Hebrew, &entities, ResultShape::ScalarCount, &exec);
        assert_eq!(response.kind, ResponseKind::Count);
        assert_eq!(response.body, ResponseBody::Count { value: 1 });
        assert_eq!(response.text, "נמצאה החלטה אחת בנושא חינוך של ממשלה 37.");

        let exec = result(vec![row(json!({"decision_count": 42}))], Some(42));
        let response = format(Lang::English, &entities, ResultShape::ScalarCount, &exec);
        assert_eq!(response.text, "There are 42 decisions on חינוך by government 37.");
    }

    #[test]
    fn test_zero_rows_is_no_results_not_error() {
        let exec = result(vec![], None);
        let response = format(Lang::English, &ExtractedEntities::default(), ResultShape::MultipleRows, &exec);
        assert_eq!(response.kind, ResponseKind::NoResults);
        assert!(response.text.starts_with("No decisions matched"));

        let error = ResponseFormatter::new().format_error(Lang::English, &QaError::Execution("x".into()));
        assert_ne!(error.text, response.text);
    }

    #[test]
    fn test_list_is_numbered() {
        let exec = result(vec![decision("1", "first"), decision("2", "second")], None);
        let response = format(Lang::English, &ExtractedEntities::default(), ResultShape::MultipleRows, &exec);
        assert_eq!(response.kind, ResponseKind::List);
        assert!(response.text.starts_with("Found 2 decisions:"));
        assert!(response.text.contains("1. Decision 1 (Government 37, 2023-03-01): first"));
        assert!(response.text.contains("2. Decision 2"));
    }

    #[test]
    fn test_single_identified_record_is_detail() {
        let entities = ExtractedEntities {
            decision_number: Some(12),
            ..Default::default()
        };
        let exec = result(vec![decision("12", "x")], None);
        let response = format(Lang::Hebrew, &entities, ResultShape::MultipleRows, &exec);
        assert_eq!(response.kind, ResponseKind::Detail);
        assert!(response.text.starts_with("החלטה 12: x"));
        assert!(response.text.contains("ממשלה: 37"));
    }

    #[test]
    fn test_aggregate_table_puts_count_last() {
        let exec = result(
            vec![
                row(json!({"year": 2020, "decision_count": 5})),
                row(json!({"year": 2021, "decision_count": 7})),
            ],
            None,
        );
        let response = format(Lang::English, &ExtractedEntities::default(), ResultShape::AggregateTable, &exec);
        assert_eq!(response.kind, ResponseKind::Aggregate);
        match &response.body {
            ResponseBody::Table { headers, rows } => {
                assert_eq!(headers, &vec!["year".to_string(), "decision_count".to_string()]);
                assert_eq!(rows[1], vec!["2021".to_string(), "7".to_string()]);
            }
            other => panic!("unexpected body {:?}", other),
        }
        assert!(response.text.contains("2020: 5"));
    }

    #[test]
    fn test_error_never_leaks_detail() {
        let formatter = ResponseFormatter::new();
        let response = formatter.format_error(
            Lang::Hebrew,
            &QaError::Execution("relation \"israeli_government_decisions\" does not exist".into()),
        );
        assert_eq!(response.kind, ResponseKind::Error);
        assert!(!response.text.contains("israeli_government_decisions"));
        let timeout = formatter.format_error(Lang::English, &QaError::timeout("executor", 100));
        assert!(timeout.text.contains("too long"));
    }

    #[test]
    fn test_clarification_lists_questions() {
        let request = ClarificationRequest {
            clarification_type: ClarificationType::MissingEntity,
            questions: vec![ClarificationQuestion {
                question: "Which decision?".into(),
                suggested_answers: vec!["A".into(), "B".into(), "C".into()],
            }],
            suggestions: vec!["decision 100".into()],
            rationale: "Missing the decision number.".into(),
        };
        let response = ResponseFormatter::new().format_clarification(
            Lang::English,
            &request,
            Intent::Analysis,
            &ExtractedEntities::default(),
            0.7,
        );
        assert!(response.is_clarification());
        assert!(response.text.contains("1. Which decision?"));
        assert!(response.text.contains("Options: A | B | C"));
        assert!(response.text.contains("- decision 100"));
    }
}
