//! Hybrid re-ranking of result rows.
//!
//! Score = lexical overlap + listwise model judgment + entity match +
//! recency, each in [0, 1] and weighted from config. When the model judgment
//! is missing its weight is spread over the other components. Ties keep the
//! store's order.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use super::{date_field, searchable_text, text_field};
use crate::config::RankingConfig;
use crate::extract::{prefix_variants, words};
use crate::llm::{json, LLMManager};
use crate::types::{ExtractedEntities, Lang, Row, TopicFilter};

const SNIPPET_CHARS: usize = 300;
const RANKING_OUTPUT_TOKENS: usize = 256;

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "of", "on", "in", "about", "for", "to", "and", "or", "show", "me", "list",
    "find", "decisions", "decision", "government", "what", "which", "are", "is", "all", "with",
    "של", "על", "את", "עם", "או", "גם", "מה", "אילו", "הצג", "תן", "לי", "החלטות", "החלטה",
    "ממשלה", "ממשלת", "בנושא", "בתחום", "כל",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RankingStrategy {
    #[default]
    Hybrid,
    Lexical,
    Recency,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreComponents {
    pub lexical: f32,
    /// `None` when the model judgment was unavailable for this row.
    pub semantic: Option<f32>,
    pub entity: f32,
    pub recency: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedRow {
    pub row: Row,
    pub score: f32,
    pub components: ScoreComponents,
    /// Position before ranking.
    pub original_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingOutcome {
    pub rows: Vec<RankedRow>,
    pub strategy: RankingStrategy,
    pub semantic_used: bool,
    pub explanation: String,
}

impl RankingOutcome {
    pub fn into_rows(self) -> Vec<Row> {
        self.rows.into_iter().map(|r| r.row).collect()
    }
}

pub struct Ranker {
    llm: LLMManager,
    config: RankingConfig,
    semantic_timeout: Duration,
}

impl Ranker {
    pub fn new(config: RankingConfig, llm: LLMManager) -> Self {
        Self {
            llm,
            config,
            semantic_timeout: Duration::from_secs(20),
        }
    }

    pub fn with_semantic_timeout(mut self, timeout: Duration) -> Self {
        self.semantic_timeout = timeout;
        self
    }

    pub async fn rank(
        &self,
        question: &str,
        entities: &ExtractedEntities,
        rows: Vec<Row>,
        strategy: RankingStrategy,
    ) -> RankingOutcome {
        let lang = Lang::detect(question);
        let today = Utc::now().date_naive();
        let terms = query_terms(question);

        let semantic = if strategy == RankingStrategy::Hybrid && rows.len() > 1 {
            self.semantic_scores(question, &rows).await
        } else {
            None
        };
        let semantic_used = semantic.is_some();

        let mut ranked: Vec<RankedRow> = rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                let components = ScoreComponents {
                    lexical: lexical_score(&terms, &row),
                    semantic: semantic.as_ref().map(|s| s.get(i).copied().unwrap_or(0.0)),
                    entity: entity_score(entities, &row),
                    recency: recency_score(&row, today, self.config.recency_half_life_years),
                };
                RankedRow {
                    score: self.combine(&components, strategy),
                    components,
                    row,
                    original_index: i,
                }
            })
            .collect();

        // sort_by is stable: equal scores keep store order.
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        let explanation = self.explain(lang, strategy, ranked.len(), semantic_used);
        tracing::info!(
            strategy = ?strategy,
            rows = ranked.len(),
            semantic = semantic_used,
            "Ranked results"
        );

        RankingOutcome {
            rows: ranked,
            strategy,
            semantic_used,
            explanation,
        }
    }

    fn combine(&self, c: &ScoreComponents, strategy: RankingStrategy) -> f32 {
        match strategy {
            RankingStrategy::Lexical => c.lexical,
            RankingStrategy::Recency => c.recency,
            RankingStrategy::Hybrid => {
                let [lexical, entity, recency, semantic] = self.shares(c.semantic.is_some());
                lexical * c.lexical + entity * c.entity + recency * c.recency + semantic * c.semantic.unwrap_or(0.0)
            }
        }
    }

    /// Hybrid weights scaled to sum to one over the components in play, in
    /// the order lexical, entity, recency, semantic.
    fn shares(&self, semantic_used: bool) -> [f32; 4] {
        let cfg = &self.config;
        let semantic = if semantic_used { cfg.semantic_weight } else { 0.0 };
        let total = cfg.lexical_weight + cfg.entity_weight + cfg.recency_weight + semantic;
        if total <= 0.0 {
            return [0.0; 4];
        }
        [
            cfg.lexical_weight / total,
            cfg.entity_weight / total,
            cfg.recency_weight / total,
            semantic / total,
        ]
    }

    /// Listwise model judgment: position in the returned order becomes a
    /// score in (0, 1]; unranked candidates get 0.
    async fn semantic_scores(&self, question: &str, rows: &[Row]) -> Option<Vec<f32>> {
        if !self.llm.is_enabled() {
            return None;
        }
        let candidate_count = rows.len().min(self.config.max_semantic_candidates);
        if candidate_count < 2 {
            return None;
        }

        let snippets: String = rows
            .iter()
            .take(candidate_count)
            .enumerate()
            .map(|(i, row)| {
                let text = format!("{}: {}", text_field(row, "decision_title"), text_field(row, "summary"));
                let truncated: String = text.chars().take(SNIPPET_CHARS).collect();
                format!("[{}] {}", i + 1, truncated)
            })
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "You judge which government decisions best answer a question.\n\n\
             Question: \"{}\"\n\n\
             Decisions:\n{}\n\n\
             Return ONLY a JSON array of decision numbers in brackets, most relevant first. \
             Include ALL {} numbers. Example: [3, 1, 2]",
            question, snippets, candidate_count
        );

        let raw = match tokio::time::timeout(
            self.semantic_timeout,
            self.llm.generate_custom(&prompt, RANKING_OUTPUT_TOKENS),
        )
        .await
        {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                tracing::warn!("Semantic ranking call failed: {}, ranking without it", e);
                return None;
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.semantic_timeout.as_millis() as u64,
                    "Semantic ranking timed out, ranking without it"
                );
                return None;
            }
        };

        let Some(order) = parse_ranking(&raw, candidate_count) else {
            tracing::warn!(
                output = %raw.chars().take(200).collect::<String>(),
                "Could not parse semantic ranking, ranking without it"
            );
            return None;
        };

        let mut scores = vec![0.0; rows.len()];
        for (position, &idx) in order.iter().enumerate() {
            scores[idx] = 1.0 - position as f32 / candidate_count as f32;
        }
        Some(scores)
    }

    fn explain(&self, lang: Lang, strategy: RankingStrategy, count: usize, semantic_used: bool) -> String {
        let pct = |w: f32| (w * 100.0).round() as u32;
        let [lexical, entity, recency, semantic] = self.shares(semantic_used);
        match (strategy, lang) {
            (RankingStrategy::Lexical, Lang::Hebrew) => format!("{} התוצאות מוינו לפי התאמת מילות החיפוש.", count),
            (RankingStrategy::Lexical, Lang::English) => format!("Ranked {} results by keyword match.", count),
            (RankingStrategy::Recency, Lang::Hebrew) => format!("{} התוצאות מוינו מהחדשה לישנה.", count),
            (RankingStrategy::Recency, Lang::English) => format!("Ranked {} results from newest to oldest.", count),
            (RankingStrategy::Hybrid, Lang::Hebrew) => {
                let mut text = format!(
                    "{} התוצאות מוינו לפי שילוב של התאמת מילים ({}%), התאמה לפרטי השאלה ({}%) ועדכניות ({}%)",
                    count,
                    pct(lexical),
                    pct(entity),
                    pct(recency)
                );
                if semantic_used {
                    text.push_str(&format!(" וכן הערכת רלוונטיות ({}%)", pct(semantic)));
                }
                text.push('.');
                text
            }
            (RankingStrategy::Hybrid, Lang::English) => {
                let mut text = format!(
                    "Ranked {} results by keyword match ({}%), match with the question's details ({}%) and recency ({}%)",
                    count,
                    pct(lexical),
                    pct(entity),
                    pct(recency)
                );
                if semantic_used {
                    text.push_str(&format!(", plus a relevance judgment ({}%)", pct(semantic)));
                }
                text.push('.');
                text
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

fn query_terms(question: &str) -> Vec<String> {
    let lower = question.to_lowercase();
    let mut seen = HashSet::new();
    words(&lower)
        .into_iter()
        .filter(|w| w.chars().count() >= 2 && !w.chars().all(|c| c.is_ascii_digit()))
        .filter(|w| !STOPWORDS.contains(w))
        .filter(|w| seen.insert(w.to_string()))
        .map(str::to_string)
        .collect()
}

/// Share of query terms found in title, summary or tags. Hebrew prefixes are
/// peeled before matching.
fn lexical_score(terms: &[String], row: &Row) -> f32 {
    if terms.is_empty() {
        return 0.0;
    }
    let haystack = searchable_text(row);
    let hits = terms
        .iter()
        .filter(|term| prefix_variants(term).iter().any(|v| haystack.contains(v)))
        .count();
    hits as f32 / terms.len() as f32
}

/// Share of stated filter slots the row satisfies.
fn entity_score(entities: &ExtractedEntities, row: &Row) -> f32 {
    let mut checks = 0u32;
    let mut hits = 0u32;

    if let Some(topic) = &entities.topic {
        checks += 1;
        let matched = match topic {
            TopicFilter::Canonical(tag) => text_field(row, "tags_policy_area").contains(tag.as_str()),
            TopicFilter::FreeText(text) => searchable_text(row).contains(&text.to_lowercase()),
        };
        hits += u32::from(matched);
    }
    if let Some(government) = entities.government_number {
        checks += 1;
        let matched = row.get("government_number").and_then(|v| v.as_i64()) == Some(i64::from(government));
        hits += u32::from(matched);
    }
    if let Some(pm) = &entities.prime_minister {
        checks += 1;
        hits += u32::from(text_field(row, "prime_minister").contains(pm.as_str()));
    }
    if entities.has_date_range() {
        checks += 1;
        let matched = date_field(row, "decision_date").is_some_and(|d| {
            entities.date_from.map_or(true, |from| d >= from) && entities.date_to.map_or(true, |to| d <= to)
        });
        hits += u32::from(matched);
    }

    if checks == 0 {
        0.0
    } else {
        hits as f32 / checks as f32
    }
}

/// Exponential decay with the configured half-life.
fn recency_score(row: &Row, today: NaiveDate, half_life_years: f32) -> f32 {
    let Some(date) = date_field(row, "decision_date") else {
        return 0.0;
    };
    let age_years = (today - date).num_days().max(0) as f32 / 365.25;
    0.5_f32.powf(age_years / half_life_years.max(f32::EPSILON))
}

// ---------------------------------------------------------------------------
// Listwise output parsing
// ---------------------------------------------------------------------------

/// Zero-indexed order from model output: whole-output JSON, then the first
/// `[...]`, then any integers (accepted when at least half are present).
/// Duplicates are dropped.
fn parse_ranking(output: &str, expected_count: usize) -> Option<Vec<usize>> {
    let trimmed = json::strip_fences(output);

    if let Ok(indices) = serde_json::from_str::<Vec<usize>>(trimmed) {
        if validate_ranking(&indices, expected_count) {
            return Some(dedup_zero_indexed(indices));
        }
    }

    if let Some(start) = trimmed.find('[') {
        if let Some(end) = trimmed[start..].find(']') {
            let slice = &trimmed[start..=start + end];
            if let Ok(indices) = serde_json::from_str::<Vec<usize>>(slice) {
                if validate_ranking(&indices, expected_count) {
                    return Some(dedup_zero_indexed(indices));
                }
            }
        }
    }

    let numbers: Vec<usize> = trimmed
        .split(|c: char| !c.is_ascii_digit())
        .filter_map(|s| s.parse::<usize>().ok())
        .filter(|&n| n >= 1 && n <= expected_count)
        .collect();
    let deduped = dedup_zero_indexed(numbers);
    if !deduped.is_empty() && deduped.len() >= expected_count.div_ceil(2) {
        return Some(deduped);
    }
    None
}

fn validate_ranking(indices: &[usize], expected_count: usize) -> bool {
    !indices.is_empty() && indices.iter().all(|&i| i >= 1 && i <= expected_count)
}

fn dedup_zero_indexed(indices: Vec<usize>) -> Vec<usize> {
    let mut seen = HashSet::new();
    indices
        .into_iter()
        .filter(|i| seen.insert(*i))
        .map(|i| i.saturating_sub(1))
        .collect()
}
