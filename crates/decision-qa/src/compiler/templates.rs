//! Parameterised query templates.
//!
//! Each [`TemplateKind`] is a pure matcher over (text, entities, intent) plus
//! a builder. The registry sorts kinds once by priority (then name) and the
//! first match in that order wins.

use serde::{Deserialize, Serialize};

use super::schema::{DECLARATIVE, DETAIL_COLUMNS, LIST_COLUMNS, OPERATIVE};
use crate::types::{
    CompiledQuery, ExtractedEntities, Intent, Provenance, ResultShape, SqlParam, TopicFilter,
};

const PER_YEAR: &[&str] = &[
    "per year", "by year", "each year", "every year", "yearly", "לפי שנה", "לפי שנים", "בכל שנה",
    "לכל שנה", "בכל שנים",
];
const PER_TOPIC: &[&str] = &[
    "per topic", "by topic", "per area", "by area", "each topic", "לפי נושא", "לפי נושאים",
    "לפי תחום", "לפי תחומים", "בכל נושא",
];
/// Aggregations no template expresses; these go to model synthesis.
const UNSUPPORTED_AGGREGATES: &[&str] = &[
    "average", "avg", "median", "per month", "by month", "monthly", "percent", "ממוצע", "חציון",
    "לפי חודש", "בכל חודש", "אחוז",
];
const RECENCY: &[&str] = &[
    "latest", "recent", "newest", "last", "אחרונות", "האחרונות", "אחרונה", "האחרונה",
    "חדשות", "החדשות", "אחרונים",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    DecisionByNumberAndGovernment,
    DecisionByNumber,
    CountPerYear,
    CountPerTopic,
    CountByTopicAndGovernment,
    Count,
    LatestDecisions,
    FilteredDecisions,
}

/// Slots a matched template will turn into query arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateArgs {
    pub filters: ExtractedEntities,
    pub limit: Option<u32>,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 8] = [
        TemplateKind::DecisionByNumberAndGovernment,
        TemplateKind::DecisionByNumber,
        TemplateKind::CountPerYear,
        TemplateKind::CountPerTopic,
        TemplateKind::CountByTopicAndGovernment,
        TemplateKind::Count,
        TemplateKind::LatestDecisions,
        TemplateKind::FilteredDecisions,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TemplateKind::DecisionByNumberAndGovernment => "decision_by_number_and_government",
            TemplateKind::DecisionByNumber => "decision_by_number",
            TemplateKind::CountPerYear => "count_per_year",
            TemplateKind::CountPerTopic => "count_per_topic",
            TemplateKind::CountByTopicAndGovernment => "count_by_topic_and_government",
            TemplateKind::Count => "count",
            TemplateKind::LatestDecisions => "latest_decisions",
            TemplateKind::FilteredDecisions => "filtered_decisions",
        }
    }

    /// Higher wins.
    pub fn priority(&self) -> u32 {
        match self {
            TemplateKind::DecisionByNumberAndGovernment => 100,
            TemplateKind::DecisionByNumber => 90,
            TemplateKind::CountPerYear => 85,
            TemplateKind::CountPerTopic => 82,
            TemplateKind::CountByTopicAndGovernment => 80,
            TemplateKind::Count => 60,
            TemplateKind::LatestDecisions => 50,
            TemplateKind::FilteredDecisions => 40,
        }
    }

    pub fn shape(&self) -> ResultShape {
        match self {
            TemplateKind::DecisionByNumberAndGovernment => ResultShape::SingleRow,
            TemplateKind::DecisionByNumber
            | TemplateKind::LatestDecisions
            | TemplateKind::FilteredDecisions => ResultShape::MultipleRows,
            TemplateKind::CountPerYear | TemplateKind::CountPerTopic => ResultShape::AggregateTable,
            TemplateKind::CountByTopicAndGovernment | TemplateKind::Count => ResultShape::ScalarCount,
        }
    }

    /// Pure matcher and argument extractor.
    pub fn matches(&self, text: &str, entities: &ExtractedEntities, intent: Intent) -> Option<TemplateArgs> {
        let statistical = intent == Intent::Statistical;
        let lookup = matches!(intent, Intent::DataQuery | Intent::ResultRef | Intent::Analysis);
        if !statistical && !lookup {
            return None;
        }

        match self {
            TemplateKind::DecisionByNumberAndGovernment => {
                let (decision, government) = (entities.decision_number?, entities.government_number?);
                (!statistical).then(|| TemplateArgs {
                    filters: ExtractedEntities {
                        decision_number: Some(decision),
                        government_number: Some(government),
                        ..Default::default()
                    },
                    limit: None,
                })
            }
            TemplateKind::DecisionByNumber => {
                let decision = entities.decision_number?;
                (!statistical).then(|| TemplateArgs {
                    filters: ExtractedEntities {
                        decision_number: Some(decision),
                        ..Default::default()
                    },
                    limit: None,
                })
            }
            TemplateKind::CountPerYear => (statistical && contains_any(text, PER_YEAR)).then(|| TemplateArgs {
                filters: list_filters(entities),
                limit: None,
            }),
            TemplateKind::CountPerTopic => {
                (statistical && contains_any(text, PER_TOPIC)).then(|| TemplateArgs {
                    filters: ExtractedEntities {
                        topic: None,
                        ..list_filters(entities)
                    },
                    limit: entities.limit,
                })
            }
            TemplateKind::CountByTopicAndGovernment => {
                let eligible = statistical
                    && entities.topic.is_some()
                    && entities.government_number.is_some()
                    && !contains_any(text, UNSUPPORTED_AGGREGATES);
                eligible.then(|| TemplateArgs {
                    filters: list_filters(entities),
                    limit: None,
                })
            }
            TemplateKind::Count => (statistical && !contains_any(text, UNSUPPORTED_AGGREGATES)).then(|| {
                TemplateArgs {
                    filters: list_filters(entities),
                    limit: None,
                }
            }),
            TemplateKind::LatestDecisions => {
                let eligible = lookup
                    && !entities.has_filters()
                    && (entities.limit.is_some() || contains_word(text, RECENCY));
                eligible.then(|| TemplateArgs {
                    filters: ExtractedEntities::default(),
                    limit: entities.limit,
                })
            }
            TemplateKind::FilteredDecisions => (lookup && entities.has_filters()).then(|| TemplateArgs {
                filters: list_filters(entities),
                limit: entities.limit,
            }),
        }
    }

    pub fn build(&self, args: &TemplateArgs, table: &str, default_limit: u32, max_limit: u32) -> CompiledQuery {
        let mut filters = FilterBuilder::new();
        filters.apply(&args.filters);
        let limit = args.limit.unwrap_or(default_limit).clamp(1, max_limit);

        let sql = match self {
            TemplateKind::DecisionByNumberAndGovernment => format!(
                "SELECT {} FROM {}{} ORDER BY decision_date DESC LIMIT 1",
                DETAIL_COLUMNS,
                table,
                filters.where_clause()
            ),
            TemplateKind::DecisionByNumber => {
                let limit = filters.push(SqlParam::Int(i64::from(max_limit)));
                format!(
                    "SELECT {} FROM {}{} ORDER BY government_number DESC, decision_date DESC LIMIT {}",
                    DETAIL_COLUMNS,
                    table,
                    filters.where_clause(),
                    limit
                )
            }
            TemplateKind::CountPerYear => format!(
                "SELECT EXTRACT(YEAR FROM decision_date)::int AS year, COUNT(*) AS decision_count \
                 FROM {}{} GROUP BY year ORDER BY year",
                table,
                filters.where_clause()
            ),
            TemplateKind::CountPerTopic => {
                let limit = filters.push(SqlParam::Int(i64::from(limit)));
                format!(
                    "SELECT tags_policy_area AS topic, COUNT(*) AS decision_count FROM {}{} \
                     GROUP BY tags_policy_area ORDER BY decision_count DESC LIMIT {}",
                    table,
                    filters.where_clause(),
                    limit
                )
            }
            TemplateKind::CountByTopicAndGovernment | TemplateKind::Count => format!(
                "SELECT COUNT(*) AS decision_count FROM {}{}",
                table,
                filters.where_clause()
            ),
            TemplateKind::LatestDecisions | TemplateKind::FilteredDecisions => {
                let limit = filters.push(SqlParam::Int(i64::from(limit)));
                format!(
                    "SELECT {} FROM {}{} ORDER BY decision_date DESC LIMIT {}",
                    LIST_COLUMNS,
                    table,
                    filters.where_clause(),
                    limit
                )
            }
        };

        CompiledQuery {
            sql,
            params: filters.into_params(),
            shape: self.shape(),
            provenance: Provenance::Template(self.name().to_string()),
            confidence: 0.95,
            rankable: matches!(self, TemplateKind::FilteredDecisions) && args.filters.topic.is_some(),
        }
    }
}

fn contains_any(text: &str, patterns: &[&str]) -> bool {
    let lower = text.to_lowercase();
    patterns.iter().any(|p| lower.contains(p))
}

fn contains_word(text: &str, words: &[&str]) -> bool {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .any(|token| words.contains(&token))
}

/// Filter slots used by list and count templates.
fn list_filters(entities: &ExtractedEntities) -> ExtractedEntities {
    ExtractedEntities {
        decision_number: None,
        government_number: entities.government_number,
        date_from: entities.date_from,
        date_to: entities.date_to,
        topic: entities.topic.clone(),
        limit: None,
        operative_only: entities.operative_only,
        prime_minister: entities.prime_minister.clone(),
        reference: None,
        wants_full_detail: false,
        ambiguous_numbers: Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

pub struct TemplateRegistry {
    kinds: Vec<TemplateKind>,
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::with_kinds(TemplateKind::ALL.to_vec())
    }

    /// Registration order never matters: kinds are sorted by priority, then
    /// name.
    pub fn with_kinds(mut kinds: Vec<TemplateKind>) -> Self {
        kinds.sort_by(|a, b| {
            b.priority()
                .cmp(&a.priority())
                .then_with(|| a.name().cmp(b.name()))
        });
        kinds.dedup();
        Self { kinds }
    }

    pub fn kinds(&self) -> &[TemplateKind] {
        &self.kinds
    }

    /// First match in priority order.
    pub fn select(
        &self,
        text: &str,
        entities: &ExtractedEntities,
        intent: Intent,
    ) -> Option<(TemplateKind, TemplateArgs)> {
        self.kinds
            .iter()
            .find_map(|kind| kind.matches(text, entities, intent).map(|args| (*kind, args)))
    }
}

// ---------------------------------------------------------------------------
// WHERE builder
// ---------------------------------------------------------------------------

/// Accumulates `$n` placeholders and their parameters in lockstep.
#[derive(Default)]
pub struct FilterBuilder {
    clauses: Vec<String>,
    params: Vec<SqlParam>,
}

impl FilterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parameter and return its placeholder.
    pub fn push(&mut self, param: SqlParam) -> String {
        self.params.push(param);
        format!("${}", self.params.len())
    }

    pub fn apply(&mut self, entities: &ExtractedEntities) {
        if let Some(decision) = entities.decision_number {
            let p = self.push(SqlParam::Text(decision.to_string()));
            self.clauses.push(format!("decision_number = {}", p));
        }
        if let Some(government) = entities.government_number {
            let p = self.push(SqlParam::Int(i64::from(government)));
            self.clauses.push(format!("government_number = {}", p));
        }
        if let Some(from) = entities.date_from {
            let p = self.push(SqlParam::Date(from));
            self.clauses.push(format!("decision_date >= {}", p));
        }
        if let Some(to) = entities.date_to {
            let p = self.push(SqlParam::Date(to));
            self.clauses.push(format!("decision_date <= {}", p));
        }
        match &entities.topic {
            Some(TopicFilter::Canonical(tag)) => {
                let p = self.push(SqlParam::Text(format!("%{}%", tag)));
                self.clauses.push(format!("tags_policy_area ILIKE {}", p));
            }
            Some(TopicFilter::FreeText(text)) => {
                let p = self.push(SqlParam::Text(format!("%{}%", text)));
                self.clauses.push(format!(
                    "(decision_title ILIKE {p} OR summary ILIKE {p} OR decision_content ILIKE {p})"
                ));
            }
            None => {}
        }
        if let Some(operative) = entities.operative_only {
            let value = if operative { OPERATIVE } else { DECLARATIVE };
            let p = self.push(SqlParam::Text(value.to_string()));
            self.clauses.push(format!("operativity = {}", p));
        }
        if let Some(pm) = &entities.prime_minister {
            let p = self.push(SqlParam::Text(format!("%{}%", pm)));
            self.clauses.push(format!("prime_minister ILIKE {}", p));
        }
    }

    pub fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn into_params(self) -> Vec<SqlParam> {
        self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::safety::placeholder_indices;
    use chrono::NaiveDate;

    const TABLE: &str = "israeli_government_decisions";

    fn compile(text: &str, entities: &ExtractedEntities, intent: Intent) -> Option<(TemplateKind, CompiledQuery)> {
        let (kind, args) = TemplateRegistry::new().select(text, entities, intent)?;
        Some((kind, kind.build(&args, TABLE, 10, 50)))
    }

    fn rich_entities() -> ExtractedEntities {
        ExtractedEntities {
            government_number: Some(37),
            date_from: NaiveDate::from_ymd_opt(2020, 1, 1),
            date_to: NaiveDate::from_ymd_opt(2023, 12, 31),
            topic: Some(TopicFilter::FreeText("ים המלח".into())),
            operative_only: Some(true),
            prime_minister: Some("בנימין נתניהו".into()),
            limit: Some(5),
            ..Default::default()
        }
    }

    #[test]
    fn test_registry_is_sorted_by_priority_then_name() {
        let reversed: Vec<TemplateKind> = TemplateKind::ALL.iter().rev().copied().collect();
        let a = TemplateRegistry::with_kinds(TemplateKind::ALL.to_vec());
        let b = TemplateRegistry::with_kinds(reversed);
        assert_eq!(a.kinds(), b.kinds());
        assert_eq!(a.kinds()[0], TemplateKind::DecisionByNumberAndGovernment);
        for pair in a.kinds().windows(2) {
            assert!(pair[0].priority() >= pair[1].priority());
        }
    }

    #[test]
    fn test_higher_priority_wins_when_both_match() {
        let entities = ExtractedEntities {
            topic: Some(TopicFilter::Canonical("חינוך".into())),
            government_number: Some(37),
            ..Default::default()
        };
        let text = "how many decisions on education did government 37 make";
        assert!(TemplateKind::Count.matches(text, &entities, Intent::Statistical).is_some());
        for _ in 0..3 {
            let (kind, _) = TemplateRegistry::new().select(text, &entities, Intent::Statistical).unwrap();
            assert_eq!(kind, TemplateKind::CountByTopicAndGovernment);
        }
    }

    #[test]
    fn test_placeholders_match_params_for_every_template() {
        let entities = ExtractedEntities {
            decision_number: Some(12),
            ..rich_entities()
        };
        let texts = ["decisions per year", "count by topic", "how many", "latest decisions", "show"];
        for kind in TemplateKind::ALL {
            for text in texts {
                for intent in [Intent::DataQuery, Intent::Statistical] {
                    if let Some(args) = kind.matches(text, &entities, intent) {
                        let query = kind.build(&args, TABLE, 10, 50);
                        let indices = placeholder_indices(&query.sql);
                        let expected: std::collections::BTreeSet<usize> = (1..=query.params.len()).collect();
                        assert_eq!(indices, expected, "{}: {}", kind.name(), query.sql);
                    }
                }
            }
        }
    }

    #[test]
    fn test_count_by_topic_and_government_shape() {
        let entities = ExtractedEntities {
            topic: Some(TopicFilter::Canonical("חינוך".into())),
            government_number: Some(37),
            ..Default::default()
        };
        let (_, query) = compile("כמה החלטות בנושא חינוך קיבלה ממשלה 37", &entities, Intent::Statistical).unwrap();
        assert_eq!(query.shape, ResultShape::ScalarCount);
        assert!(query.sql.starts_with("SELECT COUNT(*) AS decision_count"));
        assert_eq!(
            query.params,
            vec![SqlParam::Int(37), SqlParam::Text("%חינוך%".into())]
        );
    }

    #[test]
    fn test_decision_by_number_has_no_government_filter() {
        let entities = ExtractedEntities {
            decision_number: Some(12),
            ..Default::default()
        };
        let (kind, query) = compile("decision number 12", &entities, Intent::DataQuery).unwrap();
        assert_eq!(kind, TemplateKind::DecisionByNumber);
        assert!(!query.sql.contains("government_number ="));
        assert_eq!(query.params[0], SqlParam::Text("12".into()));
        assert_eq!(query.shape, ResultShape::MultipleRows);
    }

    #[test]
    fn test_free_text_reuses_one_placeholder() {
        let entities = ExtractedEntities {
            topic: Some(TopicFilter::FreeText("ים המלח".into())),
            ..Default::default()
        };
        let (kind, query) = compile("decisions about ים המלח", &entities, Intent::DataQuery).unwrap();
        assert_eq!(kind, TemplateKind::FilteredDecisions);
        assert_eq!(query.sql.matches("$1").count(), 3);
        assert_eq!(query.params.len(), 2);
        assert!(query.rankable);
    }

    #[test]
    fn test_limit_is_clamped_and_parameterised() {
        let entities = ExtractedEntities {
            limit: Some(500),
            ..Default::default()
        };
        let (kind, query) = compile("show 500 decisions", &entities, Intent::DataQuery).unwrap();
        assert_eq!(kind, TemplateKind::LatestDecisions);
        assert_eq!(query.params, vec![SqlParam::Int(50)]);
        assert!(query.sql.ends_with("LIMIT $1"));
    }

    #[test]
    fn test_per_year_beats_plain_count() {
        let entities = ExtractedEntities {
            topic: Some(TopicFilter::Canonical("חינוך".into())),
            ..Default::default()
        };
        let (kind, query) = compile("education decisions per year", &entities, Intent::Statistical).unwrap();
        assert_eq!(kind, TemplateKind::CountPerYear);
        assert_eq!(query.shape, ResultShape::AggregateTable);
    }

    #[test]
    fn test_unsupported_shapes_fall_through() {
        let entities = ExtractedEntities::default();
        assert!(compile("average decisions per month", &entities, Intent::Statistical).is_none());
        assert!(compile("which decisions mention water", &entities, Intent::DataQuery).is_none());
        assert!(compile("anything", &entities, Intent::Unclear).is_none());
    }
}
