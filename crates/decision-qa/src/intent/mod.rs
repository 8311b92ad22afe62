//! Intent Classifier
//!
//! Ordered rule checks over the normalized text, optionally preceded by a
//! model judgment. Entities always come from the shared extractor so the
//! label source never changes how slots are filled. The confidence gate is
//! applied last and overrides any label.

use serde::{Deserialize, Serialize};

use crate::extract::{prefix_variants, words, EntityExtractor};
use crate::llm::{json, LLMManager};
use crate::types::{ExtractedEntities, Intent};

const CLASSIFY_OUTPUT_TOKENS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierSource {
    Rules,
    Model,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    /// Final label after the confidence gate.
    pub intent: Intent,
    /// Label before the gate.
    pub raw_intent: Intent,
    pub confidence: f32,
    pub entities: ExtractedEntities,
    pub source: ClassifierSource,
}

impl Classification {
    pub fn gated(&self) -> bool {
        self.intent != self.raw_intent
    }
}

/// What the classifier may know about the conversation so far.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriorContext {
    /// Records shown in the previous turn.
    pub result_count: usize,
}

#[derive(Deserialize)]
struct ModelLabel {
    intent: String,
    #[serde(default)]
    confidence: Option<f32>,
}

pub struct IntentClassifier {
    extractor: EntityExtractor,
    llm: LLMManager,
    use_model: bool,
    threshold: f32,
}

impl IntentClassifier {
    /// Rule-only classifier.
    pub fn new(threshold: f32) -> Self {
        Self {
            extractor: EntityExtractor::new(),
            llm: LLMManager::disabled(),
            use_model: false,
            threshold,
        }
    }

    /// Consult the model first; rules remain the fallback.
    pub fn with_model(mut self, llm: LLMManager) -> Self {
        self.use_model = llm.is_enabled();
        self.llm = llm;
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub async fn classify(&self, text: &str, prior: Option<PriorContext>) -> Classification {
        let entities = self.extractor.extract(text);
        let prior = prior.unwrap_or_default();

        let (raw_intent, confidence, source) = match self.classify_with_model(text).await {
            Some((intent, confidence)) => (intent, confidence, ClassifierSource::Model),
            None => {
                let (intent, confidence) = classify_rules(text, &entities, &prior);
                (intent, confidence, ClassifierSource::Rules)
            }
        };

        let intent = if confidence < self.threshold {
            Intent::Unclear
        } else {
            raw_intent
        };

        tracing::info!(
            intent = %intent.as_str(),
            raw_intent = %raw_intent.as_str(),
            confidence = confidence,
            source = ?source,
            "Classified turn"
        );

        Classification {
            intent,
            raw_intent,
            confidence,
            entities,
            source,
        }
    }

    async fn classify_with_model(&self, text: &str) -> Option<(Intent, f32)> {
        if !self.use_model {
            return None;
        }
        let prompt = format!(
            "Classify a question about Israeli government decisions into exactly one intent.\n\
             DATA_QUERY: look up or list decisions.\n\
             STATISTICAL: count or aggregate decisions.\n\
             ANALYSIS: evaluate or analyse one specific decision.\n\
             RESULT_REF: refers to a result from the previous answer (\"the second one\", \"that decision\").\n\
             UNCLEAR: none of the above, or too vague to act on.\n\n\
             Question: \"{}\"\n\n\
             Respond with ONLY a JSON object: {{\"intent\": \"...\", \"confidence\": 0.0-1.0}}",
            text
        );

        let raw = match self.llm.generate_custom(&prompt, CLASSIFY_OUTPUT_TOKENS).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Model intent classification failed: {}, using rules", e);
                return None;
            }
        };

        let parsed = parse_model_label(&raw);
        if parsed.is_none() {
            tracing::warn!(
                output = %raw.chars().take(200).collect::<String>(),
                "Could not parse model intent, using rules"
            );
        }
        parsed
    }
}

/// Strict serde first, then field-by-field extraction.
fn parse_model_label(raw: &str) -> Option<(Intent, f32)> {
    let (label, confidence) = match json::parse_object::<ModelLabel>(raw) {
        Some(parsed) => (parsed.intent, parsed.confidence),
        None => {
            let slice = json::object_slice(raw);
            let label = json::extract_json_string(slice, "intent")?;
            let confidence = json::extract_json_number(slice, "confidence").map(|c| c as f32);
            (label, confidence)
        }
    };
    let intent = Intent::parse(&label)?;
    let confidence = confidence.unwrap_or(0.7).clamp(0.0, 1.0);
    Some((intent, confidence))
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Deterministic label and confidence. Checks run in order; the first hit wins.
pub fn classify_rules(text: &str, entities: &ExtractedEntities, prior: &PriorContext) -> (Intent, f32) {
    let query = text.to_lowercase();
    let word_count = query.split_whitespace().count();

    if word_count == 0 || !query.chars().any(|c| c.is_alphanumeric()) {
        return (Intent::Unclear, 0.1);
    }

    if is_result_reference(entities) {
        let confidence = if prior.result_count > 0 { 0.9 } else { 0.6 };
        return (Intent::ResultRef, confidence);
    }

    if is_analysis(&query) {
        let confidence = if entities.decision_number.is_some() || entities.reference.is_some() {
            0.85
        } else {
            0.55
        };
        return (Intent::Analysis, confidence);
    }

    if is_statistical(&query) {
        return (Intent::Statistical, 0.9);
    }

    let has_filters = entities.has_filters() || entities.limit.is_some();
    if is_data_query(&query) || has_filters {
        let confidence = if has_filters { 0.8 } else { 0.6 };
        return (Intent::DataQuery, confidence);
    }

    (Intent::Unclear, 0.2)
}

fn is_result_reference(entities: &ExtractedEntities) -> bool {
    if entities.decision_number.is_some() {
        return false;
    }
    entities.reference.is_some() || (entities.wants_full_detail && !entities.has_filters())
}

fn is_analysis(query: &str) -> bool {
    let patterns = [
        "analyze", "analyse", "analysis", "evaluate", "evaluation", "assess", "how effective",
        "how good", "score", "rate this", "נתח", "ניתוח", "הערכה", "הערך", "תעריך", "מה דעתך",
        "אפקטיבי", "ישימות", "יישום",
    ];
    patterns.iter().any(|p| query.contains(p))
}

fn is_statistical(query: &str) -> bool {
    let phrases = [
        "how many", "count", "counts", "number of", "total", "totals", "statistic*", "per year", "by year",
        "each year", "breakdown", "distribution", "per topic", "by topic", "כמה", "מספר ההחלטות",
        "מספר החלטות", "סך", "סה\"כ", "סטטיסטיק*", "התפלגות", "לפי שנה", "לפי שנים", "בכל שנה", "לפי נושא",
        "לפי תחום",
    ];
    has_phrase(query, &phrases)
}

/// True when some phrase appears as a run of whole words. The first word may
/// carry attached Hebrew prefix letters, and a trailing `*` lets the last word
/// match as a stem.
fn has_phrase(query: &str, phrases: &[&str]) -> bool {
    let tokens = words(query);
    phrases.iter().any(|phrase| {
        let (phrase, stem) = match phrase.strip_suffix('*') {
            Some(p) => (p, true),
            None => (*phrase, false),
        };
        let wanted = words(phrase);
        if wanted.is_empty() {
            return false;
        }
        let last = wanted.len() - 1;
        tokens.windows(wanted.len()).any(|window| {
            window.iter().zip(&wanted).enumerate().all(|(i, (&got, &want))| {
                let candidates = if i == 0 { prefix_variants(got) } else { vec![got] };
                candidates
                    .iter()
                    .any(|c| if stem && i == last { c.starts_with(want) } else { *c == want })
            })
        })
    })
}

fn is_data_query(query: &str) -> bool {
    let patterns = [
        "show", "list", "find", "search", "give me", "what", "which", "get", "display", "latest",
        "recent", "decision", "הצג", "הראה", "תראה", "תן", "מצא", "חפש", "אילו", "מה ", "רשימ",
        "החלטה", "החלטות", "ההחלטות", "אחרונות",
    ];
    patterns.iter().any(|p| query.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::{manager, ScriptedProvider};

    fn rules(text: &str) -> (Intent, f32) {
        let entities = EntityExtractor::new().extract(text);
        classify_rules(text, &entities, &PriorContext { result_count: 3 })
    }

    #[test]
    fn test_rule_labels() {
        assert_eq!(rules("how many decisions about education did government 37 make").0, Intent::Statistical);
        assert_eq!(rules("כמה החלטות בנושא חינוך").0, Intent::Statistical);
        assert_eq!(rules("decision number 12 of body 5").0, Intent::DataQuery);
        assert_eq!(rules("show me the second one").0, Intent::ResultRef);
        assert_eq!(rules("analyze decision 1234").0, Intent::Analysis);
        assert_eq!(rules("hello there").0, Intent::Unclear);
    }

    #[test]
    fn test_statistical_cues_match_whole_words_only() {
        assert_ne!(rules("show decisions about the country's economy").0, Intent::Statistical);
        assert_ne!(rules("decisions on totalitarian regimes").0, Intent::Statistical);
        assert_eq!(rules("show decisions about the country's economy").0, Intent::DataQuery);
        assert_eq!(rules("how many decisions in 2020").0, Intent::Statistical);
        assert_eq!(rules("statistics on housing decisions").0, Intent::Statistical);
        assert_eq!(rules("וכמה החלטות התקבלו").0, Intent::Statistical);
        assert_eq!(rules("סה\"כ החלטות בנושא דיור").0, Intent::Statistical);
    }

    #[test]
    fn test_analysis_without_identifier_is_less_confident() {
        let (intent, confidence) = rules("evaluate the housing policy");
        assert_eq!(intent, Intent::Analysis);
        assert!(confidence < 0.6);
    }

    #[test]
    fn test_reference_without_prior_results_is_weaker() {
        let text = "the second one";
        let entities = EntityExtractor::new().extract(text);
        let (_, with_prior) = classify_rules(text, &entities, &PriorContext { result_count: 3 });
        let (_, without) = classify_rules(text, &entities, &PriorContext::default());
        assert!(with_prior > without);
    }

    #[tokio::test]
    async fn test_confidence_gate_forces_unclear() {
        let classifier = IntentClassifier::new(0.5);
        let result = classifier.classify("hello there", None).await;
        assert_eq!(result.intent, Intent::Unclear);

        let strict = IntentClassifier::new(0.95);
        let result = strict.classify("how many decisions about education", None).await;
        assert_eq!(result.raw_intent, Intent::Statistical);
        assert_eq!(result.intent, Intent::Unclear);
        assert!(result.gated());
    }

    #[tokio::test]
    async fn test_model_label_with_fences_and_prose() {
        let provider = ScriptedProvider::ok(
            "Sure:\n```json\n{\"intent\": \"STATISTICAL\", \"confidence\": 0.92}\n```",
        );
        let classifier = IntentClassifier::new(0.5).with_model(manager(provider));
        let result = classifier.classify("number of housing decisions", None).await;
        assert_eq!(result.source, ClassifierSource::Model);
        assert_eq!(result.intent, Intent::Statistical);
        assert!((result.confidence - 0.92).abs() < 1e-6);
        assert!(result.entities.topic.is_some());
    }

    #[tokio::test]
    async fn test_low_model_confidence_is_gated() {
        let provider = ScriptedProvider::ok(r#"{"intent": "DATA_QUERY", "confidence": 0.3}"#);
        let classifier = IntentClassifier::new(0.5).with_model(manager(provider));
        let result = classifier.classify("stuff", None).await;
        assert_eq!(result.raw_intent, Intent::DataQuery);
        assert_eq!(result.intent, Intent::Unclear);
    }

    #[tokio::test]
    async fn test_model_failure_falls_back_to_rules() {
        let provider = ScriptedProvider::new(vec![Err("connection refused".into())]);
        let classifier = IntentClassifier::new(0.5).with_model(manager(provider));
        let result = classifier.classify("how many decisions in 2020", None).await;
        assert_eq!(result.source, ClassifierSource::Rules);
        assert_eq!(result.intent, Intent::Statistical);
    }

    #[test]
    fn test_parse_model_label_field_fallback() {
        let raw = r#"{"intent": "RESULT_REF", "confidence": 0.8, "reason": "trailing"#;
        let (intent, confidence) = parse_model_label(raw).unwrap();
        assert_eq!(intent, Intent::ResultRef);
        assert!((confidence - 0.8).abs() < 1e-6);
        assert!(parse_model_label("no json at all").is_none());
    }
}
