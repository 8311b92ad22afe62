//! Policy-area canonicalisation.
//!
//! A topic phrase resolves in three steps: synonym table, typo table, then
//! edit distance against every synonym. Anything left over becomes a
//! free-text filter.

use super::{prefix_variants, words};
use crate::types::TopicFilter;

pub struct Category {
    /// Canonical `tags_policy_area` value.
    pub tag: &'static str,
    pub synonyms: &'static [&'static str],
}

pub const CATEGORIES: &[Category] = &[
    Category {
        tag: "חינוך",
        synonyms: &["education", "schools", "school", "teachers", "חינוך", "השכלה", "בתי ספר", "מורים"],
    },
    Category {
        tag: "בריאות ורפואה",
        synonyms: &["health", "healthcare", "medicine", "hospitals", "בריאות", "רפואה", "בתי חולים"],
    },
    Category {
        tag: "ביטחון לאומי וצה\"ל",
        synonyms: &["security", "defense", "defence", "military", "army", "idf", "ביטחון", "צבא", "צה\"ל"],
    },
    Category {
        tag: "תחבורה ציבורית ותשתיות",
        synonyms: &["transport", "transportation", "roads", "railway", "infrastructure", "תחבורה", "כבישים", "רכבת", "תשתיות"],
    },
    Category {
        tag: "דיור ונדל\"ן",
        synonyms: &["housing", "real estate", "construction", "דיור", "נדל\"ן", "מגורים", "בנייה"],
    },
    Category {
        tag: "כלכלה ותקציב",
        synonyms: &["economy", "economics", "budget", "finance", "taxes", "כלכלה", "תקציב", "מיסים", "אוצר"],
    },
    Category {
        tag: "סביבה ואקלים",
        synonyms: &["environment", "climate", "pollution", "סביבה", "אקלים", "זיהום", "איכות הסביבה"],
    },
    Category {
        tag: "רווחה ושירותים חברתיים",
        synonyms: &["welfare", "social services", "poverty", "רווחה", "עוני", "שירותים חברתיים"],
    },
    Category {
        tag: "תעסוקה ועבודה",
        synonyms: &["employment", "jobs", "labor", "labour", "תעסוקה", "שוק העבודה"],
    },
    Category {
        tag: "אנרגיה",
        synonyms: &["energy", "electricity", "natural gas", "אנרגיה", "חשמל", "גז טבעי"],
    },
    Category {
        tag: "חקלאות",
        synonyms: &["agriculture", "farming", "farmers", "חקלאות", "חקלאים"],
    },
    Category {
        tag: "תרבות וספורט",
        synonyms: &["culture", "sport", "sports", "arts", "תרבות", "ספורט", "אמנות"],
    },
    Category {
        tag: "משפט ואכיפה",
        synonyms: &["justice", "law enforcement", "police", "courts", "משפט", "משטרה", "אכיפה", "בתי משפט"],
    },
    Category {
        tag: "עלייה וקליטה",
        synonyms: &["immigration", "aliyah", "absorption", "עלייה", "קליטה", "עולים"],
    },
    Category {
        tag: "מדע וטכנולוגיה",
        synonyms: &["science", "technology", "innovation", "cyber", "מדע", "טכנולוגיה", "חדשנות", "סייבר"],
    },
    Category {
        tag: "תיירות",
        synonyms: &["tourism", "tourists", "תיירות", "תיירים"],
    },
    Category {
        tag: "מים",
        synonyms: &["water", "desalination", "מים", "התפלה"],
    },
    Category {
        tag: "שלטון מקומי",
        synonyms: &["local government", "municipalities", "local authorities", "שלטון מקומי", "רשויות מקומיות", "עיריות"],
    },
    Category {
        tag: "החברה הערבית",
        synonyms: &["arab society", "arab sector", "arab community", "החברה הערבית", "המגזר הערבי"],
    },
    Category {
        tag: "דיגיטל וממשל זמין",
        synonyms: &["digital", "e-government", "digitization", "דיגיטל", "דיגיטציה", "ממשל זמין"],
    },
];

/// Common misspellings mapped to a synonym.
const TYPOS: &[(&str, &str)] = &[
    ("educaton", "education"),
    ("eduction", "education"),
    ("helth", "health"),
    ("enviroment", "environment"),
    ("enviornment", "environment"),
    ("transportaion", "transportation"),
    ("secuirty", "security"),
    ("econmy", "economy"),
    ("welfair", "welfare"),
    ("tourisim", "tourism"),
    ("חנוך", "חינוך"),
    ("בריאת", "בריאות"),
    ("ביטחן", "ביטחון"),
    ("בטחון", "ביטחון"),
    ("תחבורא", "תחבורה"),
    ("כלכלא", "כלכלה"),
    ("תקציפ", "תקציב"),
    ("רוחה", "רווחה"),
    ("תעסוקא", "תעסוקה"),
    ("טכנולגיה", "טכנולוגיה"),
];

const TOPIC_MARKERS: &[&str] = &[
    "on", "about", "regarding", "concerning", "בנושא", "בתחום", "על", "לגבי", "בעניין",
];

/// Words skipped between a marker and the topic itself.
const LEADING_FILLER: &[&str] = &["the", "topic", "subject", "of", "area", "field", "a", "נושא", "תחום", "ה"];

/// Words that end a topic phrase.
const PHRASE_STOP: &[&str] = &[
    "did", "does", "do", "in", "by", "of", "from", "since", "between", "until", "during", "were",
    "was", "are", "made", "issued", "passed", "government", "gov", "cabinet", "body", "decision",
    "decisions", "and", "or", "that", "this", "it", "one", "first", "second", "third", "last",
    "latest", "for", "with", "per", "ידי", "של", "בין", "מאז", "עד", "ממשלה", "הממשלה", "בממשלה",
    "החלטה", "החלטות", "ההחלטות", "שהתקבלו", "התקבלו", "קיבלה", "הזו", "הזאת", "אותה", "השנייה",
    "הראשונה", "האחרונה", "לפי", "ב", "ו",
];

const MAX_PHRASE_WORDS: usize = 3;

fn exact(phrase: &str) -> Option<&'static str> {
    CATEGORIES
        .iter()
        .find(|c| c.tag == phrase || c.synonyms.contains(&phrase))
        .map(|c| c.tag)
}

fn typo(phrase: &str) -> Option<&'static str> {
    TYPOS
        .iter()
        .find(|(wrong, _)| *wrong == phrase)
        .and_then(|(_, right)| exact(right))
}

fn fuzzy(phrase: &str) -> Option<&'static str> {
    let len = phrase.chars().count();
    if len < 3 {
        return None;
    }
    let threshold = if len <= 5 { 1 } else { 2 };

    let mut best: Option<(usize, &'static str)> = None;
    for category in CATEGORIES {
        for candidate in category.synonyms.iter().chain(std::iter::once(&category.tag)) {
            let distance = strsim::levenshtein(phrase, candidate);
            if distance <= threshold && best.map_or(true, |(d, _)| distance < d) {
                best = Some((distance, category.tag));
            }
        }
    }
    best.map(|(_, tag)| tag)
}

/// Stems of a phrase whose first word may carry Hebrew prefix letters.
fn phrase_variants(phrase: &str) -> Vec<String> {
    let (first, rest) = match phrase.split_once(' ') {
        Some((f, r)) => (f, Some(r)),
        None => (phrase, None),
    };
    prefix_variants(first)
        .into_iter()
        .map(|stem| match rest {
            Some(r) => format!("{} {}", stem, r),
            None => stem.to_string(),
        })
        .collect()
}

/// Resolve a phrase to a canonical policy-area tag.
pub fn canonicalize_topic(phrase: &str) -> Option<&'static str> {
    let phrase = phrase.trim().to_lowercase();
    if phrase.is_empty() {
        return None;
    }
    let variants = phrase_variants(&phrase);
    variants
        .iter()
        .find_map(|v| exact(v))
        .or_else(|| variants.iter().find_map(|v| typo(v)))
        .or_else(|| variants.iter().find_map(|v| fuzzy(v)))
}

fn is_stop(word: &str) -> bool {
    PHRASE_STOP.contains(&word) || word.chars().any(|c| c.is_ascii_digit())
}

/// The topic filter for a lowercased turn, if any.
pub fn extract_topic(text: &str) -> Option<TopicFilter> {
    let tokens = words(text);

    for (i, token) in tokens.iter().enumerate() {
        if !TOPIC_MARKERS.contains(token) {
            continue;
        }
        let phrase: Vec<&str> = tokens[i + 1..]
            .iter()
            .copied()
            .skip_while(|w| LEADING_FILLER.contains(w))
            .take_while(|w| !is_stop(w) && !TOPIC_MARKERS.contains(w))
            .take(MAX_PHRASE_WORDS)
            .collect();
        if phrase.is_empty() {
            continue;
        }

        for n in (1..=phrase.len()).rev() {
            if let Some(tag) = canonicalize_topic(&phrase[..n].join(" ")) {
                return Some(TopicFilter::Canonical(tag.to_string()));
            }
        }
        if let Some(tag) = phrase.iter().find_map(|w| canonicalize_topic(w)) {
            return Some(TopicFilter::Canonical(tag.to_string()));
        }
        return Some(TopicFilter::FreeText(phrase.join(" ")));
    }

    // No marker: only an exact synonym anywhere in the text counts.
    for n in (1..=MAX_PHRASE_WORDS).rev() {
        for window in tokens.windows(n) {
            let joined = window.join(" ");
            if let Some(tag) = phrase_variants(&joined).iter().find_map(|v| exact(v)) {
                return Some(TopicFilter::Canonical(tag.to_string()));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synonyms_both_languages() {
        assert_eq!(canonicalize_topic("education"), Some("חינוך"));
        assert_eq!(canonicalize_topic("Health"), Some("בריאות ורפואה"));
        assert_eq!(canonicalize_topic("הבריאות"), Some("בריאות ורפואה"));
        assert_eq!(canonicalize_topic("real estate"), Some("דיור ונדל\"ן"));
    }

    #[test]
    fn test_typo_table_then_fuzzy() {
        assert_eq!(canonicalize_topic("helth"), Some("בריאות ורפואה"));
        assert_eq!(canonicalize_topic("חנוך"), Some("חינוך"));
        // Not in the typo table: one edit from "housing".
        assert_eq!(canonicalize_topic("housng"), Some("דיור ונדל\"ן"));
        assert_eq!(canonicalize_topic("astronomy"), None);
    }

    #[test]
    fn test_short_words_allow_one_edit() {
        // "arts" is a synonym; "ants" is one edit away and four chars long.
        assert_eq!(canonicalize_topic("ants"), Some("תרבות וספורט"));
        // Nothing within one edit of a short word.
        assert_eq!(canonicalize_topic("moon"), None);
    }

    #[test]
    fn test_marker_phrase() {
        assert_eq!(
            extract_topic("how many decisions about education did government 37 make"),
            Some(TopicFilter::Canonical("חינוך".to_string()))
        );
        assert_eq!(
            extract_topic("החלטות בתחום הבריאות"),
            Some(TopicFilter::Canonical("בריאות ורפואה".to_string()))
        );
    }

    #[test]
    fn test_free_text_fallback() {
        assert_eq!(
            extract_topic("decisions regarding space exploration"),
            Some(TopicFilter::FreeText("space exploration".to_string()))
        );
    }

    #[test]
    fn test_no_marker_requires_exact_synonym() {
        assert_eq!(
            extract_topic("show transport decisions"),
            Some(TopicFilter::Canonical("תחבורה ציבורית ותשתיות".to_string()))
        );
        assert_eq!(extract_topic("show decisions of government 37"), None);
    }

    #[test]
    fn test_marker_followed_by_reference_is_ignored() {
        assert_eq!(extract_topic("tell me about it"), None);
        assert_eq!(extract_topic("tell me about the second one"), None);
    }
}
