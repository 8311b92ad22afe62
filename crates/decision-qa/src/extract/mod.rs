//! Shared entity extraction.
//!
//! Both the template matcher and the model-synthesis path receive entities
//! produced here, so a phrase normalises identically whichever way the query
//! ends up being compiled. Extraction runs over the lowercased text in a fixed
//! order; every pass claims the byte spans it consumed so later passes cannot
//! bind the same digits twice:
//!
//! 1. full calendar dates
//! 2. result limits ("5 decisions", "last 10")
//! 3. decision and government identifiers
//! 4. references to a previous result list
//! 5. years and year ranges
//! 6. whatever numbers remain are reported as ambiguous

pub mod categories;
pub mod dates;
pub mod filters;
pub mod numbers;
pub mod references;

use std::ops::Range;

use crate::types::ExtractedEntities;

pub use categories::{canonicalize_topic, Category, CATEGORIES};
pub use dates::describe_range;

/// Byte spans already bound to a slot.
#[derive(Debug, Default)]
pub(crate) struct Claims {
    spans: Vec<Range<usize>>,
}

impl Claims {
    pub fn is_free(&self, span: &Range<usize>) -> bool {
        self.spans
            .iter()
            .all(|s| s.end <= span.start || span.end <= s.start)
    }

    pub fn claim(&mut self, span: Range<usize>) {
        self.spans.push(span);
    }
}

#[derive(Debug, Clone, Default)]
pub struct EntityExtractor;

impl EntityExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, text: &str) -> ExtractedEntities {
        let lowered = text.to_lowercase();
        let mut claims = Claims::default();
        let mut entities = ExtractedEntities::default();

        dates::extract_full_dates(&lowered, &mut claims, &mut entities);
        dates::extract_month_years(&lowered, &mut claims, &mut entities);
        numbers::extract_limit(&lowered, &mut claims, &mut entities);
        numbers::extract_identifiers(&lowered, &mut claims, &mut entities);
        references::extract(&lowered, &mut claims, &mut entities);
        dates::extract_years(&lowered, &mut claims, &mut entities);
        numbers::collect_ambiguous(&lowered, &claims, &mut entities);

        entities.topic = categories::extract_topic(&lowered);
        entities.operative_only = filters::detect_operativity(&lowered);
        entities.prime_minister = filters::detect_prime_minister(&lowered);

        tracing::debug!(entities = ?entities, "Extracted entities");
        entities
    }
}

// ---------------------------------------------------------------------------
// Token helpers
// ---------------------------------------------------------------------------

const HEBREW_PREFIXES: &[char] = &['ה', 'ב', 'ל', 'מ', 'ו', 'ש', 'כ'];

/// Split into words, keeping Hebrew acronym quotes (צה"ל) inside a word.
pub(crate) fn words(text: &str) -> Vec<&str> {
    text.split(|c: char| !(c.is_alphanumeric() || matches!(c, '"' | '\'' | '״' | '׳')))
        .map(|w| w.trim_matches(|c: char| matches!(c, '"' | '\'' | '״' | '׳')))
        .filter(|w| !w.is_empty())
        .collect()
}

/// The word plus the stems left after removing up to two attached Hebrew
/// prefix letters ("ובחינוך" → "בחינוך", "חינוך").
pub(crate) fn prefix_variants(word: &str) -> Vec<&str> {
    let mut variants = vec![word];
    let mut rest = word;
    for _ in 0..2 {
        let mut chars = rest.chars();
        match chars.next() {
            Some(c) if HEBREW_PREFIXES.contains(&c) && chars.as_str().chars().count() >= 2 => {
                rest = chars.as_str();
                variants.push(rest);
            }
            _ => break,
        }
    }
    variants
}
