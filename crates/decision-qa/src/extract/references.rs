//! Pointers back into the previous result list, and full-detail requests.

use std::sync::LazyLock;

use super::Claims;
use crate::types::{ExtractedEntities, Reference};

static ORDINAL_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"\b(?:the\s+)?(first|second|third|fourth|fifth|1st|2nd|3rd|4th|5th)\s+(?:one|decision|result|item|record|resolution)\b|\b(הראשונה|הראשון|השנייה|השניה|השני|השלישית|השלישי|הרביעית|הרביעי|החמישית|החמישי)\b",
    )
    .expect("ordinal regex is valid")
});

static LIST_POSITION_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"\b(?:item|result|number|#)\s*(\d{1,2})\s+(?:on|in|from)\s+the\s+list\b|\bמספר\s+(\d{1,2})\s+ברשימה",
    )
    .expect("list position regex is valid")
});

static LATEST_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\b(?:the\s+)?(?:last|final)\s+one\b|האחרונה\s+ברשימה|התוצאה\s+האחרונה")
        .expect("latest-reference regex is valid")
});

static DEMONSTRATIVE_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r#"\b(?:that|this|the\s+same)\s+(?:decision|one|result|resolution)\b|\b(?:about|of|on|for)\s+it\b|\b(?:הזו|הזאת|הזה|הנ"ל|הנ״ל|עליה|אותה)\b"#,
    )
    .expect("demonstrative regex is valid")
});

static FULL_DETAIL_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"\bfull\s+(?:text|content|details?|decision)\b|\bmore\s+(?:details|info|information)\b|\bdetails\b|התוכן\s+המלא|תוכן\s+מלא|הטקסט\s+המלא|טקסט\s+מלא|פרטים\s+נוספים|עוד\s+פרטים|\bפרטים\b|\bפירוט\b",
    )
    .expect("full-detail regex is valid")
});

fn ordinal_value(word: &str) -> Option<usize> {
    let n = match word {
        "first" | "1st" | "הראשונה" | "הראשון" => 1,
        "second" | "2nd" | "השנייה" | "השניה" | "השני" => 2,
        "third" | "3rd" | "השלישית" | "השלישי" => 3,
        "fourth" | "4th" | "הרביעית" | "הרביעי" => 4,
        "fifth" | "5th" | "החמישית" | "החמישי" => 5,
        _ => return None,
    };
    Some(n)
}

pub(crate) fn extract(text: &str, claims: &mut Claims, entities: &mut ExtractedEntities) {
    if let Some(caps) = LIST_POSITION_RE.captures(text) {
        let position = caps
            .get(1)
            .or_else(|| caps.get(2))
            .and_then(|m| m.as_str().parse::<usize>().ok());
        if let (Some(whole), Some(n)) = (caps.get(0), position) {
            if claims.is_free(&whole.range()) {
                claims.claim(whole.range());
                entities.reference = Some(Reference::Ordinal(n));
            }
        }
    }

    if entities.reference.is_none() {
        for caps in ORDINAL_RE.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            if !claims.is_free(&whole.range()) {
                continue;
            }
            let word = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str());
            if let Some(n) = word.and_then(ordinal_value) {
                claims.claim(whole.range());
                entities.reference = Some(Reference::Ordinal(n));
                break;
            }
        }
    }

    if entities.reference.is_none() && LATEST_RE.is_match(text) {
        entities.reference = Some(Reference::Latest);
    }

    if entities.reference.is_none() && DEMONSTRATIVE_RE.is_match(text) {
        entities.reference = Some(Reference::Demonstrative);
    }

    entities.wants_full_detail = FULL_DETAIL_RE.is_match(text);
}
