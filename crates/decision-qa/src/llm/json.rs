//! Lenient extraction of JSON from model output.
//!
//! Handles common LLM quirks: markdown fences, leading/trailing prose, and
//! partial objects where only some fields survived.

use serde::de::DeserializeOwned;

/// Strip markdown code fences if present.
pub fn strip_fences(raw: &str) -> &str {
    raw.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// The outermost `{...}` span, or the cleaned input when none is found.
pub fn object_slice(raw: &str) -> &str {
    let cleaned = strip_fences(raw);
    match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if end > start => &cleaned[start..=end],
        _ => cleaned,
    }
}

/// Strict parse of the object span.
pub fn parse_object<T: DeserializeOwned>(raw: &str) -> Option<T> {
    serde_json::from_str::<T>(object_slice(raw)).ok()
}

/// Extract a JSON string field value by scanning for `"field":"value"`.
pub fn extract_json_string(json: &str, field: &str) -> Option<String> {
    let pattern = format!("\"{}\"", field);
    let pos = json.find(&pattern)?;
    let after_key = &json[pos + pattern.len()..];
    let after_colon = after_key.trim_start().strip_prefix(':')?;
    let trimmed = after_colon.trim_start();

    let content = trimmed.strip_prefix('"')?;

    // Find the closing quote, handling escaped quotes
    let mut escaped = false;
    for (i, ch) in content.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if ch == '\\' {
            escaped = true;
            continue;
        }
        if ch == '"' {
            return Some(content[..i].replace("\\\"", "\""));
        }
    }
    None
}

/// Extract a numeric field by scanning for `"field": 0.75`.
pub fn extract_json_number(json: &str, field: &str) -> Option<f64> {
    let pattern = format!("\"{}\"", field);
    let pos = json.find(&pattern)?;
    let after_key = &json[pos + pattern.len()..];
    let after_colon = after_key.trim_start().strip_prefix(':')?.trim_start();
    let number: String = after_colon
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    number.parse().ok()
}

/// Extract a JSON string array field by scanning for `"field":["v1","v2"]`.
pub fn extract_json_array(json: &str, field: &str) -> Option<Vec<String>> {
    let pattern = format!("\"{}\"", field);
    let pos = json.find(&pattern)?;
    let after_key = &json[pos + pattern.len()..];
    let after_colon = after_key.trim_start().strip_prefix(':')?.trim_start();

    if !after_colon.starts_with('[') {
        return None;
    }

    let bracket_end = after_colon.find(']')?;
    let arr_str = &after_colon[1..bracket_end];

    let items: Vec<String> = arr_str
        .split(',')
        .filter_map(|s| {
            let trimmed = s.trim().trim_matches('"');
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect();

    Some(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_slice_with_fences_and_prose() {
        let raw = "Sure! ```json\n{\"a\": 1}\n``` hope that helps";
        assert_eq!(object_slice(raw), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_object_strict() {
        #[derive(serde::Deserialize)]
        struct A {
            a: i32,
        }
        let parsed: A = parse_object("here: {\"a\": 7} done").unwrap();
        assert_eq!(parsed.a, 7);
        assert!(parse_object::<A>("nothing here").is_none());
    }

    #[test]
    fn test_extract_string_with_escapes() {
        let json = r#"{"sql":"SELECT \"x\" FROM t","other":1}"#;
        assert_eq!(
            extract_json_string(json, "sql").as_deref(),
            Some("SELECT \"x\" FROM t")
        );
        assert!(extract_json_string(json, "missing").is_none());
    }

    #[test]
    fn test_extract_number() {
        let json = r#"{"intent":"STATISTICAL","confidence": 0.82}"#;
        assert_eq!(extract_json_number(json, "confidence"), Some(0.82));
    }

    #[test]
    fn test_extract_array() {
        let json = r#"{"suggestions":["a", "b"],"x":1}"#;
        assert_eq!(
            extract_json_array(json, "suggestions"),
            Some(vec!["a".to_string(), "b".to_string()])
        );
    }
}
