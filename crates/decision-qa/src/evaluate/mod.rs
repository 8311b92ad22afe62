//! Evaluator and Ranker, the two optional post-execution stages.
//!
//! Both are best-effort: the orchestrator skips them on any error and the
//! turn still completes.

pub mod evaluator;
pub mod ranker;

pub use evaluator::{CriterionScore, Evaluation, Evaluator, RelevanceLevel, CRITERIA};
pub use ranker::{RankedRow, Ranker, RankingOutcome, RankingStrategy, ScoreComponents};

use chrono::NaiveDate;

use crate::types::Row;

/// String value of a row column, empty when missing or not a string.
pub(crate) fn text_field<'a>(row: &'a Row, key: &str) -> &'a str {
    row.get(key).and_then(|v| v.as_str()).unwrap_or_default()
}

pub(crate) fn date_field(row: &Row, key: &str) -> Option<NaiveDate> {
    let raw = text_field(row, key);
    // row_to_json renders dates as "YYYY-MM-DD"; tolerate timestamps too.
    NaiveDate::parse_from_str(raw.get(..10).unwrap_or(raw), "%Y-%m-%d").ok()
}

/// Title, summary and tags lowercased into one searchable string.
pub(crate) fn searchable_text(row: &Row) -> String {
    format!(
        "{} {} {}",
        text_field(row, "decision_title"),
        text_field(row, "summary"),
        text_field(row, "tags_policy_area")
    )
    .to_lowercase()
}
