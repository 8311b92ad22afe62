//! Boolean and proper-noun filters.

use super::{prefix_variants, words};

/// Canonical prime-minister names with the aliases users type.
pub const PRIME_MINISTERS: &[(&str, &[&str])] = &[
    ("בנימין נתניהו", &["נתניהו", "ביבי", "netanyahu", "bibi"]),
    ("נפתלי בנט", &["בנט", "bennett", "bennet"]),
    ("יאיר לפיד", &["לפיד", "lapid"]),
    ("אהוד אולמרט", &["אולמרט", "olmert"]),
    ("אריאל שרון", &["שרון", "sharon"]),
    ("אהוד ברק", &["אהוד ברק", "ehud barak"]),
    ("יצחק רבין", &["רבין", "rabin"]),
    ("שמעון פרס", &["שמעון פרס", "peres"]),
    ("יצחק שמיר", &["שמיר", "shamir"]),
    ("מנחם בגין", &["מנחם בגין", "menachem begin"]),
    ("גולדה מאיר", &["גולדה", "golda meir", "golda"]),
];

const OPERATIVE: &[&str] = &["operative", "binding", "אופרטיבית", "אופרטיביות", "אופרטיבי"];
const DECLARATIVE: &[&str] = &["declarative", "non-operative", "דקלרטיבית", "דקלרטיביות", "הצהרתיות"];

/// `Some(true)` for operative-only, `Some(false)` for declarative-only.
pub(crate) fn detect_operativity(text: &str) -> Option<bool> {
    if DECLARATIVE.iter().any(|w| text.contains(w)) {
        return Some(false);
    }
    let tokens = words(text);
    let operative = tokens
        .iter()
        .any(|t| prefix_variants(t).iter().any(|v| OPERATIVE.contains(v)));
    operative.then_some(true)
}

pub(crate) fn detect_prime_minister(text: &str) -> Option<String> {
    let tokens = words(text);
    for (name, aliases) in PRIME_MINISTERS {
        for alias in aliases.iter() {
            let matched = if alias.contains(' ') {
                text.contains(alias)
            } else {
                tokens
                    .iter()
                    .any(|t| prefix_variants(t).iter().any(|v| v == alias))
            };
            if matched {
                return Some(name.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operativity() {
        assert_eq!(detect_operativity("operative decisions on housing"), Some(true));
        assert_eq!(detect_operativity("החלטות אופרטיביות"), Some(true));
        assert_eq!(detect_operativity("only non-operative ones"), Some(false));
        assert_eq!(detect_operativity("housing decisions"), None);
    }

    #[test]
    fn test_prime_minister_aliases() {
        assert_eq!(detect_prime_minister("decisions under netanyahu").as_deref(), Some("בנימין נתניהו"));
        assert_eq!(detect_prime_minister("בממשלת בנט").as_deref(), Some("נפתלי בנט"));
        assert_eq!(detect_prime_minister("decisions on energy"), None);
    }
}
