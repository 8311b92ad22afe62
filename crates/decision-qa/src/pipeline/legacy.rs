//! Single-shot keyword search used when the primary pipeline cannot finish.
//!
//! No classification, no templates, no model: the question's content words
//! are matched against title and summary, newest decisions first.

use crate::compiler::schema::LIST_COLUMNS;
use crate::extract::{prefix_variants, words};
use crate::types::{CompiledQuery, Provenance, ResultShape, SqlParam};

const MAX_KEYWORDS: usize = 5;

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "of", "on", "in", "about", "for", "to", "and", "or", "show", "me", "list",
    "find", "give", "decisions", "decision", "government", "what", "which", "are", "is", "all",
    "with", "how", "many", "please", "של", "על", "את", "עם", "או", "גם", "מה", "אילו", "הצג",
    "תן", "לי", "החלטות", "החלטה", "ההחלטות", "ממשלה", "ממשלת", "בנושא", "בתחום", "כל", "כמה",
];

pub struct LegacySearch {
    table: String,
    limit: u32,
}

impl LegacySearch {
    pub fn new(table: &str, limit: u32) -> Self {
        Self {
            table: table.to_string(),
            limit: limit.max(1),
        }
    }

    /// Content words, one Hebrew prefix letter peeled, deduplicated.
    pub fn keywords(text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        let mut keywords: Vec<String> = Vec::new();
        for word in words(&lower) {
            if word.chars().count() < 2 || STOPWORDS.contains(&word) || word.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            // One prefix letter off, keeping stems of three letters or more.
            let stem = prefix_variants(word)
                .get(1)
                .copied()
                .filter(|s| s.chars().count() >= 3)
                .unwrap_or(word)
                .to_string();
            if !keywords.contains(&stem) {
                keywords.push(stem);
            }
            if keywords.len() == MAX_KEYWORDS {
                break;
            }
        }
        keywords
    }

    pub fn compile(&self, text: &str) -> CompiledQuery {
        let keywords = Self::keywords(text);
        let mut params: Vec<SqlParam> = keywords
            .iter()
            .map(|k| SqlParam::Text(format!("%{}%", k)))
            .collect();

        let where_clause = if keywords.is_empty() {
            String::new()
        } else {
            let conditions: Vec<String> = (1..=keywords.len())
                .map(|i| format!("decision_title ILIKE ${i} OR summary ILIKE ${i}", i = i))
                .collect();
            format!(" WHERE {}", conditions.join(" OR "))
        };

        params.push(SqlParam::Int(i64::from(self.limit)));
        let sql = format!(
            "SELECT {} FROM {}{} ORDER BY decision_date DESC LIMIT ${}",
            LIST_COLUMNS,
            self.table,
            where_clause,
            params.len()
        );

        CompiledQuery {
            sql,
            params,
            shape: ResultShape::MultipleRows,
            provenance: Provenance::Legacy,
            confidence: 0.3,
            rankable: false,
        }
    }
}
