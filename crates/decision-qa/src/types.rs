use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A result row as returned by the store: column name → JSON value.
pub type Row = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Language
// ---------------------------------------------------------------------------

/// Language of a turn. User-visible text is always rendered in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Lang {
    #[default]
    Hebrew,
    English,
}

impl Lang {
    /// Hebrew whenever the text carries a Hebrew letter, English otherwise.
    pub fn detect(text: &str) -> Self {
        if text.chars().any(|c| ('\u{05D0}'..='\u{05EA}').contains(&c)) {
            Lang::Hebrew
        } else if text.chars().any(|c| c.is_ascii_alphabetic()) {
            Lang::English
        } else {
            Lang::Hebrew
        }
    }
}

// ---------------------------------------------------------------------------
// Intent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    /// Lookup / list of records.
    DataQuery,
    /// Count or aggregate.
    Statistical,
    /// Deep scoring of one identified record.
    Analysis,
    /// Refers to something returned in a previous turn.
    ResultRef,
    Unclear,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::DataQuery => "DATA_QUERY",
            Intent::Statistical => "STATISTICAL",
            Intent::Analysis => "ANALYSIS",
            Intent::ResultRef => "RESULT_REF",
            Intent::Unclear => "UNCLEAR",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "DATA_QUERY" | "DATA" | "QUERY" | "SEARCH" => Some(Intent::DataQuery),
            "STATISTICAL" | "STATISTICS" | "COUNT" | "AGGREGATE" => Some(Intent::Statistical),
            "ANALYSIS" | "EVAL" | "EVALUATION" => Some(Intent::Analysis),
            "RESULT_REF" | "REFERENCE" | "REF" => Some(Intent::ResultRef),
            "UNCLEAR" | "UNKNOWN" => Some(Intent::Unclear),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// A policy-area filter is either a canonical tag or a free-text fallback,
/// never both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TopicFilter {
    Canonical(String),
    FreeText(String),
}

impl TopicFilter {
    pub fn value(&self) -> &str {
        match self {
            TopicFilter::Canonical(v) | TopicFilter::FreeText(v) => v,
        }
    }
}

/// A pointer back into the previous turn's result list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Reference {
    /// 1-based position: "the second one" → `Ordinal(2)`.
    Ordinal(usize),
    /// "the last one".
    Latest,
    /// "that decision", "it".
    Demonstrative,
}

/// Entity slots that can be inherited, compared or invalidated individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    DecisionNumber,
    GovernmentNumber,
    DateRange,
    Topic,
    Limit,
    OperativeOnly,
    PrimeMinister,
}

impl Slot {
    /// Slots whose change between turns invalidates cached responses.
    pub const CRITICAL: [Slot; 3] = [Slot::DecisionNumber, Slot::GovernmentNumber, Slot::Topic];
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_number: Option<u32>,
    /// Administrative body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub government_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_from: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_to: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<TopicFilter>,
    /// Requested result count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operative_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prime_minister: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<Reference>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub wants_full_detail: bool,
    /// Numbers that could not be bound to any slot.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ambiguous_numbers: Vec<u32>,
}

impl ExtractedEntities {
    /// True when at least one database filter slot is set.
    pub fn has_filters(&self) -> bool {
        self.decision_number.is_some()
            || self.government_number.is_some()
            || self.date_from.is_some()
            || self.date_to.is_some()
            || self.topic.is_some()
            || self.operative_only.is_some()
            || self.prime_minister.is_some()
    }

    pub fn has_date_range(&self) -> bool {
        self.date_from.is_some() || self.date_to.is_some()
    }

    pub fn is_set(&self, slot: Slot) -> bool {
        match slot {
            Slot::DecisionNumber => self.decision_number.is_some(),
            Slot::GovernmentNumber => self.government_number.is_some(),
            Slot::DateRange => self.has_date_range(),
            Slot::Topic => self.topic.is_some(),
            Slot::Limit => self.limit.is_some(),
            Slot::OperativeOnly => self.operative_only.is_some(),
            Slot::PrimeMinister => self.prime_minister.is_some(),
        }
    }

    /// Copy one slot from `other` into `self`.
    pub fn inherit(&mut self, slot: Slot, other: &ExtractedEntities) {
        match slot {
            Slot::DecisionNumber => self.decision_number = other.decision_number,
            Slot::GovernmentNumber => self.government_number = other.government_number,
            Slot::DateRange => {
                self.date_from = other.date_from;
                self.date_to = other.date_to;
            }
            Slot::Topic => self.topic = other.topic.clone(),
            Slot::Limit => self.limit = other.limit,
            Slot::OperativeOnly => self.operative_only = other.operative_only,
            Slot::PrimeMinister => self.prime_minister = other.prime_minister.clone(),
        }
    }

    /// Whether the turn leans on prior context: a reference word, an ordinal,
    /// or a request for the full text of something already shown.
    pub fn is_context_dependent(&self) -> bool {
        self.reference.is_some() || self.wants_full_detail
    }

    /// Stable string over the critical slots, used as a cache guard.
    pub fn critical_fingerprint(&self) -> String {
        format!(
            "d={}|g={}|t={}",
            self.decision_number.map(|n| n.to_string()).unwrap_or_default(),
            self.government_number.map(|n| n.to_string()).unwrap_or_default(),
            self.topic.as_ref().map(|t| t.value()).unwrap_or_default(),
        )
    }

    /// Critical slots whose values differ between `self` and `prior`, counting
    /// only slots that `self` actually states.
    pub fn changed_critical_slots(&self, prior: &ExtractedEntities) -> Vec<Slot> {
        let mut changed = Vec::new();
        if self.decision_number.is_some() && self.decision_number != prior.decision_number {
            changed.push(Slot::DecisionNumber);
        }
        if self.government_number.is_some() && self.government_number != prior.government_number {
            changed.push(Slot::GovernmentNumber);
        }
        if self.topic.is_some() && self.topic != prior.topic {
            changed.push(Slot::Topic);
        }
        changed
    }
}

// ---------------------------------------------------------------------------
// Queries and results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultShape {
    SingleRow,
    MultipleRows,
    ScalarCount,
    AggregateTable,
}

impl ResultShape {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "single_row" | "single" => Some(ResultShape::SingleRow),
            "multiple_rows" | "rows" | "list" => Some(ResultShape::MultipleRows),
            "scalar_count" | "count" | "scalar" => Some(ResultShape::ScalarCount),
            "aggregate_table" | "aggregate" | "table" => Some(ResultShape::AggregateTable),
            _ => None,
        }
    }
}

/// Positional statement parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SqlParam {
    Int(i64),
    Text(String),
    Date(NaiveDate),
    Bool(bool),
}

impl SqlParam {
    /// Interpret a loosely-typed JSON value (as produced by a model).
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(SqlParam::Bool(*b)),
            serde_json::Value::Number(n) => n.as_i64().map(SqlParam::Int),
            serde_json::Value::String(s) => Some(
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .map(SqlParam::Date)
                    .unwrap_or_else(|_| SqlParam::Text(s.clone())),
            ),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Provenance {
    Template(String),
    ModelSynthesized,
    Legacy,
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provenance::Template(name) => write!(f, "template:{}", name),
            Provenance::ModelSynthesized => write!(f, "model-synthesized"),
            Provenance::Legacy => write!(f, "legacy"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<SqlParam>,
    pub shape: ResultShape,
    pub provenance: Provenance,
    pub confidence: f32,
    /// Whether rows may be reordered by relevance after execution.
    #[serde(default)]
    pub rankable: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub rows: Vec<Row>,
    /// Set for `ScalarCount` queries.
    pub scalar: Option<i64>,
    pub row_count: usize,
    pub duration_ms: u64,
    pub success: bool,
}

/// Identifiers of one record shown to the user, kept for reference resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRef {
    pub decision_number: Option<String>,
    pub government_number: Option<i64>,
    pub title: Option<String>,
}

impl ResultRef {
    pub fn from_row(row: &Row) -> Self {
        let decision_number = row.get("decision_number").and_then(|v| match v {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
        Self {
            decision_number,
            government_number: row.get("government_number").and_then(|v| v.as_i64()),
            title: row
                .get("decision_title")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        }
    }

    /// Leading digits of the decision number ("1234א" → 1234).
    pub fn numeric_decision(&self) -> Option<u32> {
        let raw = self.decision_number.as_deref()?;
        let digits: String = raw.chars().take_while(|c| c.is_ascii_digit()).collect();
        digits.parse().ok()
    }
}

// ---------------------------------------------------------------------------
// Routing and clarification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Proceed,
    Clarify,
    ResolveReferences,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClarificationType {
    MissingEntity,
    AmbiguousTimeRange,
    VagueIntent,
    LowConfidence,
    MultipleInterpretations,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationQuestion {
    pub question: String,
    pub suggested_answers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationRequest {
    pub clarification_type: ClarificationType,
    pub questions: Vec<ClarificationQuestion>,
    /// Rephrasings of the whole query the user may pick instead.
    pub suggestions: Vec<String>,
    pub rationale: String,
}

// ---------------------------------------------------------------------------
// Turns
// ---------------------------------------------------------------------------

/// One finalized turn. Immutable once appended to its session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: Uuid,
    pub raw_text: String,
    pub normalized_text: String,
    pub intent: Intent,
    pub confidence: f32,
    pub entities: ExtractedEntities,
    pub resolved_entities: ExtractedEntities,
    pub route: Route,
    pub compiled_query: Option<CompiledQuery>,
    pub result_summary: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lang_detection() {
        assert_eq!(Lang::detect("כמה החלטות"), Lang::Hebrew);
        assert_eq!(Lang::detect("how many decisions"), Lang::English);
        assert_eq!(Lang::detect("   "), Lang::Hebrew);
    }

    #[test]
    fn test_intent_parse_accepts_variants() {
        assert_eq!(Intent::parse("data_query"), Some(Intent::DataQuery));
        assert_eq!(Intent::parse("RESULT-REF"), Some(Intent::ResultRef));
        assert_eq!(Intent::parse("banana"), None);
    }

    #[test]
    fn test_changed_critical_slots_ignores_unstated() {
        let prior = ExtractedEntities {
            decision_number: Some(12),
            government_number: Some(5),
            ..Default::default()
        };
        let current = ExtractedEntities {
            decision_number: Some(12),
            ..Default::default()
        };
        assert!(current.changed_critical_slots(&prior).is_empty());

        let current = ExtractedEntities {
            decision_number: Some(13),
            ..Default::default()
        };
        assert_eq!(current.changed_critical_slots(&prior), vec![Slot::DecisionNumber]);
    }

    #[test]
    fn test_sql_param_from_json() {
        assert_eq!(SqlParam::from_json(&serde_json::json!(5)), Some(SqlParam::Int(5)));
        assert_eq!(
            SqlParam::from_json(&serde_json::json!("2023-01-01")),
            Some(SqlParam::Date(NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()))
        );
        assert_eq!(
            SqlParam::from_json(&serde_json::json!("חינוך")),
            Some(SqlParam::Text("חינוך".to_string()))
        );
        assert_eq!(SqlParam::from_json(&serde_json::json!(null)), None);
    }

    #[test]
    fn test_result_ref_numeric_decision() {
        let mut row = Row::new();
        row.insert("decision_number".into(), serde_json::json!("1234א"));
        row.insert("government_number".into(), serde_json::json!(37));
        let r = ResultRef::from_row(&row);
        assert_eq!(r.numeric_decision(), Some(1234));
        assert_eq!(r.government_number, Some(37));
    }

    #[test]
    fn test_topic_filter_serde_is_tagged() {
        let json = serde_json::to_value(TopicFilter::Canonical("חינוך".into())).unwrap();
        assert_eq!(json["kind"], "canonical");
        assert_eq!(json["value"], "חינוך");
    }
}
