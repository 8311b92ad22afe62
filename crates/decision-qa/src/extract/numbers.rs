//! Numeric slot binding: result limits, decision numbers, government numbers.
//!
//! A number directly in front of a count noun is always a limit. That pass
//! runs before identifier binding so "10 ההחלטות האחרונות של הממשלה" never
//! turns 10 into a government number.

use std::sync::LazyLock;

use super::Claims;
use crate::types::ExtractedEntities;

const MAX_LIMIT_TOKEN: u32 = 1000;
const MAX_GOVERNMENT: u32 = 999;

static COUNT_NOUN_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"(\d+)\s+(?:most\s+recent\s+|latest\s+|last\s+|recent\s+|new\s+)?[הבלמוש]{0,2}(?:decisions|results|records|items|rows|resolutions|entries|החלטות|תוצאות|רשומות|פריטים)\b",
    )
    .expect("count noun regex is valid")
});

static LAST_N_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\b(?:last|latest|top|first|recent|most\s+recent|newest)\s+(\d+)")
        .expect("last-n regex is valid")
});

static HEBREW_LAST_N_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(\d+)\s+ה?(?:אחרונות|אחרונים|חדשות)")
        .expect("hebrew last-n regex is valid")
});

static DECISION_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"(?:\bdecision|\bresolution|\b[הבלמוש]{0,2}החלט[הת])\s*(?:(?:of\s+(?:the\s+)?)?government\s+|ה?ממשלה\s+)?(?:number|num\.?|no\.?|#|מספר|מס['׳.]?)?\s*#?\s*(\d+)",
    )
    .expect("decision regex is valid")
});

static GOVERNMENT_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"(?:\bgovernment|\bgovt\.?|\bgov\.?|\bcabinet|\bbody|\b[הבלמוש]{0,2}ממשל[הת])\s*(?:number|num\.?|no\.?|#|מספר|מס['׳.]?)?\s*#?\s*(?:ה-|ה־|ה)?(\d+)",
    )
    .expect("government regex is valid")
});

static GOVERNMENT_ORDINAL_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\b(\d{1,3})(?:st|nd|rd|th)\s+(?:government|cabinet)")
        .expect("government ordinal regex is valid")
});

static DIGITS_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\d+").expect("digits regex is valid"));

/// Bind the requested result count.
pub(crate) fn extract_limit(text: &str, claims: &mut Claims, entities: &mut ExtractedEntities) {
    for re in [&*COUNT_NOUN_RE, &*LAST_N_RE, &*HEBREW_LAST_N_RE] {
        for caps in re.captures_iter(text) {
            let (Some(whole), Some(num)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let Ok(value) = num.as_str().parse::<u32>() else {
                continue;
            };
            if value == 0 || value > MAX_LIMIT_TOKEN || !claims.is_free(&num.range()) {
                continue;
            }
            claims.claim(whole.range());
            if entities.limit.is_none() {
                entities.limit = Some(value);
            }
        }
    }
}

/// Bind decision and government numbers. Decision nouns go first so the
/// construct form "החלטת ממשלה 123" yields a decision number.
pub(crate) fn extract_identifiers(
    text: &str,
    claims: &mut Claims,
    entities: &mut ExtractedEntities,
) {
    for caps in DECISION_RE.captures_iter(text) {
        let (Some(whole), Some(num)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if !claims.is_free(&whole.range()) {
            continue;
        }
        if let Ok(value) = num.as_str().parse::<u32>() {
            claims.claim(whole.range());
            if entities.decision_number.is_none() {
                entities.decision_number = Some(value);
            }
        }
    }

    for re in [&*GOVERNMENT_ORDINAL_RE, &*GOVERNMENT_RE] {
        for caps in re.captures_iter(text) {
            let (Some(whole), Some(num)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if !claims.is_free(&whole.range()) {
                continue;
            }
            match num.as_str().parse::<u32>() {
                Ok(value) if value > 0 && value <= MAX_GOVERNMENT => {
                    claims.claim(whole.range());
                    if entities.government_number.is_none() {
                        entities.government_number = Some(value);
                    }
                }
                _ => {}
            }
        }
    }
}

/// Numbers left unbound after every other pass.
pub(crate) fn collect_ambiguous(text: &str, claims: &Claims, entities: &mut ExtractedEntities) {
    for m in DIGITS_RE.find_iter(text) {
        if !claims.is_free(&m.range()) {
            continue;
        }
        if let Ok(value) = m.as_str().parse::<u32>() {
            if !entities.ambiguous_numbers.contains(&value) {
                entities.ambiguous_numbers.push(value);
            }
        }
    }
}
