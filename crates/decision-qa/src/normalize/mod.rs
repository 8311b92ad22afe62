//! Normalizer - text cleanup before classification.
//!
//! Stateless and infallible: degenerate input comes back unchanged with no
//! corrections, and later stages decide what to do with it.

mod tables;

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::extract::prefix_variants;
use tables::{COUNT_NOUNS, FILLERS, HEBREW_TEENS_SUFFIX, NUMERALS, SINGULAR_ONE, TYPOS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionKind {
    Cleanup,
    Spelling,
    Numeral,
    RelativeDate,
    Filler,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correction {
    pub original: String,
    pub corrected: String,
    pub kind: CorrectionKind,
}

impl Correction {
    fn new(original: impl Into<String>, corrected: impl Into<String>, kind: CorrectionKind) -> Self {
        Self {
            original: original.into(),
            corrected: corrected.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedText {
    pub clean_text: String,
    pub corrections: Vec<Correction>,
}

impl NormalizedText {
    fn unchanged(text: &str) -> Self {
        Self {
            clean_text: text.to_string(),
            corrections: Vec::new(),
        }
    }
}

static LAST_N_YEARS_EN: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\b(?:in\s+)?(?:the\s+)?(?:last|past|previous)\s+(\d{1,2})\s+years\b")
        .expect("last-n-years regex is valid")
});
static LAST_N_YEARS_HE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?:\bב-?)?(\d{1,2})\s+השנים\s+האחרונות")
        .expect("hebrew last-n-years regex is valid")
});
static LAST_YEAR_EN: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\b(?:last|previous)\s+year\b").expect("last-year regex is valid")
});
static LAST_YEAR_HE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\bב?שנה\s+שעברה\b|\bהשנה\s+שעברה\b|\bאשתקד\b")
        .expect("hebrew last-year regex is valid")
});
static THIS_YEAR_EN: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\b(?:this|current|the\s+current)\s+year\b").expect("this-year regex is valid")
});
static THIS_YEAR_HE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\bב?שנה\s+הנוכחית\b|\bהשנה\b").expect("hebrew this-year regex is valid")
});

/// Bidirectional and zero-width marks that leak in from copy/paste.
fn is_invisible_mark(c: char) -> bool {
    matches!(c, '\u{200B}'..='\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2066}'..='\u{2069}' | '\u{FEFF}')
}

fn is_stray_punctuation(c: char) -> bool {
    matches!(c, '?' | '!' | ',' | ';' | ':' | '(' | ')' | '[' | ']' | '{' | '}' | '…' | '*' | '~' | '`')
}

pub struct Normalizer {
    today: Option<NaiveDate>,
}

impl Normalizer {
    /// Relative dates resolve against the wall clock.
    pub fn new() -> Self {
        Self { today: None }
    }

    /// Relative dates resolve against a fixed day.
    pub fn with_today(today: NaiveDate) -> Self {
        Self { today: Some(today) }
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Utc::now().date_naive())
    }

    pub fn normalize(&self, text: &str) -> NormalizedText {
        if text.trim().is_empty() || !text.chars().any(|c| c.is_alphanumeric()) {
            return NormalizedText::unchanged(text);
        }

        let mut corrections = Vec::new();
        let cleaned = self.cleanup(text, &mut corrections);

        let tokens: Vec<String> = cleaned.split_whitespace().map(str::to_string).collect();
        let tokens = self.fix_spelling(tokens, &mut corrections);
        let tokens = self.drop_fillers(tokens, &mut corrections);
        let tokens = self.convert_numerals(tokens, &mut corrections);

        let joined = tokens.join(" ");
        let resolved = self.resolve_relative_dates(&joined, &mut corrections);
        let clean_text = resolved.split_whitespace().collect::<Vec<_>>().join(" ");

        if clean_text.is_empty() {
            // Everything was filler; hand the input back as is.
            return NormalizedText::unchanged(text);
        }

        tracing::debug!(
            corrections = corrections.len(),
            clean_len = clean_text.len(),
            "Normalized turn"
        );
        NormalizedText {
            clean_text,
            corrections,
        }
    }

    fn cleanup(&self, text: &str, corrections: &mut Vec<Correction>) -> String {
        let mut out = String::with_capacity(text.len());
        let mut removed: Vec<char> = Vec::new();
        for c in text.chars() {
            if is_invisible_mark(c) {
                continue;
            }
            if is_stray_punctuation(c) {
                if !removed.contains(&c) {
                    removed.push(c);
                }
                out.push(' ');
                continue;
            }
            out.extend(c.to_lowercase());
        }
        for c in removed {
            corrections.push(Correction::new(c.to_string(), "", CorrectionKind::Cleanup));
        }
        // A trailing period is sentence punctuation, not part of a date or number.
        out.trim_end().trim_end_matches('.').to_string()
    }

    fn fix_spelling(&self, tokens: Vec<String>, corrections: &mut Vec<Correction>) -> Vec<String> {
        tokens
            .into_iter()
            .map(|token| {
                let variants = prefix_variants(&token);
                for variant in &variants {
                    if let Some((_, right)) = TYPOS.iter().find(|(wrong, _)| wrong == variant) {
                        let prefix = &token[..token.len() - variant.len()];
                        let fixed = format!("{}{}", prefix, right);
                        corrections.push(Correction::new(token.clone(), fixed.clone(), CorrectionKind::Spelling));
                        return fixed;
                    }
                }
                token
            })
            .collect()
    }

    fn drop_fillers(&self, tokens: Vec<String>, corrections: &mut Vec<Correction>) -> Vec<String> {
        tokens
            .into_iter()
            .filter(|token| {
                if FILLERS.contains(&token.as_str()) {
                    corrections.push(Correction::new(token.clone(), "", CorrectionKind::Filler));
                    false
                } else {
                    true
                }
            })
            .collect()
    }

    fn convert_numerals(&self, tokens: Vec<String>, corrections: &mut Vec<Correction>) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(tokens.len());
        let mut i = 0;
        while i < tokens.len() {
            let token = &tokens[i];
            let next = tokens.get(i + 1).map(String::as_str);

            // "one"/"אחת" only before a count noun; elsewhere it is a pronoun.
            if SINGULAR_ONE.contains(&token.as_str()) {
                if next.is_some_and(|n| COUNT_NOUNS.contains(&n)) {
                    corrections.push(Correction::new(token.clone(), "1", CorrectionKind::Numeral));
                    out.push("1".to_string());
                } else {
                    out.push(token.clone());
                }
                i += 1;
                continue;
            }

            let Some((prefix, value)) = numeral_with_prefix(token) else {
                out.push(token.clone());
                i += 1;
                continue;
            };

            let mut value = value;
            let mut consumed = 1;
            let mut original = token.clone();
            if let Some(next) = next {
                if value < 10 && HEBREW_TEENS_SUFFIX.contains(&next) {
                    // "שלוש עשרה" → 13
                    value += 10;
                    consumed = 2;
                    original = format!("{} {}", token, next);
                } else if value >= 20 && value % 10 == 0 {
                    // "twenty five", "עשרים וחמש"
                    let unit = numeral_value(next)
                        .or_else(|| next.strip_prefix('ו').and_then(numeral_value))
                        .filter(|u| *u < 10);
                    if let Some(unit) = unit {
                        value += unit;
                        consumed = 2;
                        original = format!("{} {}", token, next);
                    }
                }
            }

            let digits = format!("{}{}", prefix, value);
            corrections.push(Correction::new(original, digits.clone(), CorrectionKind::Numeral));
            out.push(digits);
            i += consumed;
        }
        out
    }

    fn resolve_relative_dates(&self, text: &str, corrections: &mut Vec<Correction>) -> String {
        let year = self.today().year();
        let text = replace_matches(&LAST_N_YEARS_EN, text, corrections, |caps| {
            first_year_of_last(year, caps.get(1)?.as_str()).map(|y| format!("since {}", y))
        });
        let text = replace_matches(&LAST_N_YEARS_HE, &text, corrections, |caps| {
            first_year_of_last(year, caps.get(1)?.as_str()).map(|y| format!("מאז {}", y))
        });
        let text = replace_matches(&LAST_YEAR_EN, &text, corrections, |_| {
            Some((year - 1).to_string())
        });
        let text = replace_matches(&LAST_YEAR_HE, &text, corrections, |_| {
            Some(format!("בשנת {}", year - 1))
        });
        let text = replace_matches(&THIS_YEAR_EN, &text, corrections, |_| Some(year.to_string()));
        replace_matches(&THIS_YEAR_HE, &text, corrections, |_| {
            Some(format!("בשנת {}", year))
        })
    }
}

/// First year of "the last `n` years", counting the current one.
fn first_year_of_last(year: i32, n: &str) -> Option<i32> {
    let n: i32 = n.parse().ok()?;
    (n > 0).then_some(year - n + 1)
}

/// Replace every match `render` accepts, recording each replacement.
fn replace_matches(
    re: &regex::Regex,
    text: &str,
    corrections: &mut Vec<Correction>,
    render: impl Fn(&regex::Captures<'_>) -> Option<String>,
) -> String {
    let mut result = String::with_capacity(text.len());
    let mut last = 0;
    for caps in re.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let Some(replacement) = render(&caps) else {
            continue;
        };
        result.push_str(&text[last..whole.start()]);
        result.push_str(&replacement);
        corrections.push(Correction::new(
            whole.as_str(),
            replacement,
            CorrectionKind::RelativeDate,
        ));
        last = whole.end();
    }
    result.push_str(&text[last..]);
    result
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

fn numeral_value(word: &str) -> Option<u32> {
    NUMERALS.iter().find(|(w, _)| *w == word).map(|(_, v)| *v)
}

/// A spelled-out numeral, possibly with attached Hebrew prefixes ("בשלוש").
fn numeral_with_prefix(token: &str) -> Option<(&str, u32)> {
    prefix_variants(token).into_iter().find_map(|variant| {
        numeral_value(variant).map(|v| (&token[..token.len() - variant.len()], v))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> Normalizer {
        Normalizer::with_today(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
    }

    #[test]
    fn test_empty_and_symbol_input_unchanged() {
        let n = normalizer();
        assert_eq!(n.normalize("   ").clean_text, "   ");
        let out = n.normalize("???");
        assert_eq!(out.clean_text, "???");
        assert!(out.corrections.is_empty());
    }

    #[test]
    fn test_cleanup_and_lowercase() {
        let out = normalizer().normalize("  How many\u{200F} decisions?? ");
        assert_eq!(out.clean_text, "how many decisions");
        assert!(out.corrections.iter().any(|c| c.kind == CorrectionKind::Cleanup && c.original == "?"));
    }

    #[test]
    fn test_typo_correction_keeps_hebrew_prefix() {
        let out = normalizer().normalize("החלטות בממשלא 37");
        assert_eq!(out.clean_text, "החלטות בממשלה 37");
        assert_eq!(out.corrections[0].kind, CorrectionKind::Spelling);

        let out = normalizer().normalize("desicion 12 of the goverment");
        assert_eq!(out.clean_text, "decision 12 of the government");
    }

    #[test]
    fn test_numerals() {
        assert_eq!(normalizer().normalize("show five decisions").clean_text, "show 5 decisions");
        assert_eq!(normalizer().normalize("twenty five results").clean_text, "25 results");
        assert_eq!(normalizer().normalize("שלוש עשרה החלטות").clean_text, "13 החלטות");
        assert_eq!(normalizer().normalize("עשרים וחמש החלטות").clean_text, "25 החלטות");
    }

    #[test]
    fn test_one_stays_a_pronoun() {
        assert_eq!(normalizer().normalize("the second one").clean_text, "the second one");
        assert_eq!(normalizer().normalize("one decision").clean_text, "1 decision");
    }

    #[test]
    fn test_relative_dates() {
        assert_eq!(
            normalizer().normalize("decisions in the last three years").clean_text,
            "decisions since 2022"
        );
        assert_eq!(normalizer().normalize("decisions this year").clean_text, "decisions 2024");
        assert_eq!(normalizer().normalize("decisions last year").clean_text, "decisions 2023");
        assert_eq!(
            normalizer().normalize("החלטות בשלוש השנים האחרונות").clean_text,
            "החלטות מאז 2022"
        );
        assert_eq!(normalizer().normalize("החלטות השנה").clean_text, "החלטות בשנת 2024");
        assert_eq!(
            normalizer().normalize("החלטות בשנה שעברה").clean_text,
            "החלטות בשנת 2023"
        );
    }

    #[test]
    fn test_fillers_removed() {
        let out = normalizer().normalize("please show um education decisions");
        assert_eq!(out.clean_text, "show education decisions");
        assert_eq!(
            out.corrections.iter().filter(|c| c.kind == CorrectionKind::Filler).count(),
            2
        );
    }

    #[test]
    fn test_dates_survive_cleanup() {
        assert_eq!(
            normalizer().normalize("decisions since 01.03.2020.").clean_text,
            "decisions since 01.03.2020"
        );
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let n = normalizer();
        let once = n.normalize("please show five decisions about helth last year").clean_text;
        let twice = n.normalize(&once).clean_text;
        assert_eq!(once, twice);
    }
}
