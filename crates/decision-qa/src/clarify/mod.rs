//! Clarification Generator
//!
//! Template-based follow-up questions, one set per clarification type, in the
//! language of the turn. An optional model pass may reword the questions; the
//! suggested answers and refinements are never touched by it.

use chrono::{Datelike, Utc};
use serde::Deserialize;

use crate::extract::{dates::describe_range, CATEGORIES};
use crate::llm::{json, LLMManager};
use crate::types::{
    ClarificationQuestion, ClarificationRequest, ClarificationType, ExtractedEntities, Intent, Lang,
    TopicFilter,
};

const REPHRASE_OUTPUT_TOKENS: usize = 300;

#[derive(Deserialize)]
struct Rephrased {
    questions: Vec<String>,
}

pub struct ClarificationGenerator {
    llm: LLMManager,
    use_model: bool,
}

impl Default for ClarificationGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ClarificationGenerator {
    pub fn new() -> Self {
        Self {
            llm: LLMManager::disabled(),
            use_model: false,
        }
    }

    pub fn with_model(mut self, llm: LLMManager) -> Self {
        self.use_model = llm.is_enabled();
        self.llm = llm;
        self
    }

    pub async fn generate(
        &self,
        original_text: &str,
        intent: Intent,
        entities: &ExtractedEntities,
        confidence: f32,
        kind: ClarificationType,
    ) -> ClarificationRequest {
        let lang = Lang::detect(original_text);
        let mut request = build(lang, intent, entities, confidence, kind);

        if self.use_model {
            self.rephrase(original_text, lang, &mut request).await;
        }

        tracing::info!(
            clarification = ?kind,
            questions = request.questions.len(),
            "Generated clarification"
        );
        request
    }

    async fn rephrase(&self, original_text: &str, lang: Lang, request: &mut ClarificationRequest) {
        let questions: Vec<&str> = request.questions.iter().map(|q| q.question.as_str()).collect();
        let language = match lang {
            Lang::Hebrew => "Hebrew",
            Lang::English => "English",
        };
        let prompt = format!(
            "A user asked: \"{}\"\n\
             We need to ask them these follow-up questions:\n{}\n\n\
             Reword each question so it reads naturally for this user, in {}. \
             Keep the meaning and keep the same number of questions in the same order.\n\
             Respond with ONLY a JSON object: {{\"questions\": [\"...\"]}}",
            original_text,
            serde_json::to_string(&questions).unwrap_or_default(),
            language
        );

        let raw = match self.llm.generate_custom(&prompt, REPHRASE_OUTPUT_TOKENS).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Clarification rephrase failed: {}, keeping templates", e);
                return;
            }
        };

        let rephrased = json::parse_object::<Rephrased>(&raw)
            .map(|r| r.questions)
            .or_else(|| json::extract_json_array(json::object_slice(&raw), "questions"));
        match rephrased {
            Some(rephrased)
                if rephrased.len() == request.questions.len()
                    && rephrased.iter().all(|q| !q.trim().is_empty()) =>
            {
                for (question, text) in request.questions.iter_mut().zip(rephrased) {
                    question.question = text.trim().to_string();
                }
            }
            _ => tracing::warn!("Clarification rephrase unusable, keeping templates"),
        }
    }
}

fn t(lang: Lang, he: &str, en: &str) -> String {
    match lang {
        Lang::Hebrew => he.to_string(),
        Lang::English => en.to_string(),
    }
}

fn question(text: String, answers: Vec<String>) -> ClarificationQuestion {
    ClarificationQuestion {
        question: text,
        suggested_answers: answers,
    }
}

/// Deterministic clarification for one type. Always 2–3 questions with 3–4
/// suggested answers each.
pub fn build(
    lang: Lang,
    intent: Intent,
    entities: &ExtractedEntities,
    confidence: f32,
    kind: ClarificationType,
) -> ClarificationRequest {
    let questions = match kind {
        ClarificationType::MissingEntity => missing_entity(lang, intent),
        ClarificationType::AmbiguousTimeRange => ambiguous_time_range(lang, entities),
        ClarificationType::VagueIntent => vague_intent(lang, false),
        ClarificationType::LowConfidence => vague_intent(lang, true),
        ClarificationType::MultipleInterpretations => multiple_interpretations(lang, entities),
    };

    ClarificationRequest {
        clarification_type: kind,
        questions,
        suggestions: suggestions(lang, entities),
        rationale: rationale(lang, kind, confidence),
    }
}

fn missing_entity(lang: Lang, intent: Intent) -> Vec<ClarificationQuestion> {
    let first = if intent == Intent::ResultRef {
        question(
            t(lang, "לא מצאתי רשימת תוצאות קודמת. לאיזו החלטה התכוונת?", "I have no earlier result list to refer to. Which decision did you mean?"),
            vec![
                t(lang, "החלטה מספר 1234", "decision number 1234"),
                t(lang, "5 ההחלטות האחרונות", "the latest 5 decisions"),
                t(lang, "החלטות בנושא חינוך", "decisions on education"),
            ],
        )
    } else {
        question(
            t(lang, "איזו החלטה תרצה שאבדוק?", "Which decision should I look at?"),
            vec![
                t(lang, "מספר ההחלטה (למשל 1234)", "the decision number (e.g. 1234)"),
                t(lang, "ההחלטה האחרונה שהתקבלה", "the most recent decision"),
                t(lang, "החלטה בנושא מסוים", "a decision on a specific topic"),
                t(lang, "החלטה מתאריך מסוים", "a decision from a specific date"),
            ],
        )
    };

    vec![
        first,
        question(
            t(lang, "של איזו ממשלה?", "From which government?"),
            vec![
                t(lang, "ממשלה 37", "government 37"),
                t(lang, "ממשלה 36", "government 36"),
                t(lang, "ממשלה 35", "government 35"),
                t(lang, "כל הממשלות", "any government"),
            ],
        ),
    ]
}

fn ambiguous_time_range(lang: Lang, entities: &ExtractedEntities) -> Vec<ClarificationQuestion> {
    let mut periods = Vec::new();
    if let (Some(from), Some(to)) = (entities.date_from, entities.date_to) {
        let (start, end) = if from > to { (to.year(), from.year()) } else { (from.year(), to.year()) };
        periods.push(match lang {
            Lang::Hebrew => format!("מ-{} עד {}", start, end),
            Lang::English => format!("from {} to {}", start, end),
        });
    }
    periods.push(t(lang, "השנה האחרונה", "the last year"));
    periods.push(t(lang, "5 השנים האחרונות", "the last 5 years"));
    periods.push(t(lang, "כל התקופות", "any time"));

    vec![
        question(t(lang, "לאיזו תקופה התכוונת?", "Which period did you mean?"), periods),
        question(
            t(lang, "האם להתמקד בממשלה מסוימת?", "Should I focus on a specific government?"),
            vec![
                t(lang, "ממשלה 37", "government 37"),
                t(lang, "ממשלה 36", "government 36"),
                t(lang, "לא, כל הממשלות", "no, any government"),
            ],
        ),
    ]
}

fn vague_intent(lang: Lang, low_confidence: bool) -> Vec<ClarificationQuestion> {
    let mut questions = vec![
        question(
            t(lang, "מה תרצה לדעת?", "What would you like to know?"),
            vec![
                t(lang, "למצוא החלטות בנושא מסוים", "find decisions on a topic"),
                t(lang, "לספור כמה החלטות התקבלו", "count how many decisions were made"),
                t(lang, "לראות פרטי החלטה מסוימת", "see the details of one decision"),
                t(lang, "לנתח החלטה מסוימת", "analyse a specific decision"),
            ],
        ),
        question(
            t(lang, "באיזה נושא?", "On which topic?"),
            CATEGORIES.iter().take(4).map(|c| c.tag.to_string()).collect(),
        ),
    ];

    if low_confidence {
        let year = Utc::now().year();
        questions.push(question(
            t(lang, "באיזו תקופה?", "For which period?"),
            vec![
                year.to_string(),
                (year - 1).to_string(),
                t(lang, "5 השנים האחרונות", "the last 5 years"),
                t(lang, "כל התקופות", "any time"),
            ],
        ));
    }
    questions
}

fn multiple_interpretations(lang: Lang, entities: &ExtractedEntities) -> Vec<ClarificationQuestion> {
    let mut questions: Vec<ClarificationQuestion> = entities
        .ambiguous_numbers
        .iter()
        .take(2)
        .map(|n| {
            let mut answers = vec![
                match lang {
                    Lang::Hebrew => format!("החלטה מספר {}", n),
                    Lang::English => format!("decision number {}", n),
                },
                match lang {
                    Lang::Hebrew => format!("ממשלה {}", n),
                    Lang::English => format!("government {}", n),
                },
                match lang {
                    Lang::Hebrew => format!("{} תוצאות", n),
                    Lang::English => format!("{} results", n),
                },
            ];
            if (1948..=2100).contains(n) {
                answers.push(match lang {
                    Lang::Hebrew => format!("החלטות משנת {}", n),
                    Lang::English => format!("decisions from {}", n),
                });
            }
            let text = match lang {
                Lang::Hebrew => format!("למה התכוונת במספר {}?", n),
                Lang::English => format!("What does {} refer to?", n),
            };
            question(text, answers)
        })
        .collect();

    if questions.is_empty() {
        questions.push(question(
            t(lang, "לאיזו מהתוצאות הקודמות התכוונת?", "Which of the previous results did you mean?"),
            vec![
                t(lang, "הראשונה", "the first one"),
                t(lang, "השנייה", "the second one"),
                t(lang, "האחרונה", "the last one"),
            ],
        ));
    }

    questions.push(question(
        t(lang, "איך להציג את התשובה?", "How should I answer?"),
        vec![
            t(lang, "רשימת החלטות", "a list of decisions"),
            t(lang, "מספר ההחלטות בלבד", "just the number of decisions"),
            t(lang, "פרטי החלטה אחת", "the details of one decision"),
        ],
    ));
    questions
}

/// Whole-query rephrasings built from whatever the user already stated.
fn suggestions(lang: Lang, entities: &ExtractedEntities) -> Vec<String> {
    let topic = match &entities.topic {
        Some(TopicFilter::Canonical(tag)) => tag.clone(),
        Some(TopicFilter::FreeText(text)) => text.clone(),
        None => CATEGORIES[0].tag.to_string(),
    };
    let government = entities.government_number.unwrap_or(37);
    let period = describe_range(entities.date_from, entities.date_to)
        .unwrap_or_else(|| (Utc::now().year() - 1).to_string());

    match lang {
        Lang::Hebrew => vec![
            format!("החלטות ממשלה {} בנושא {}", government, topic),
            format!("כמה החלטות בנושא {} התקבלו ב-{}", topic, period),
            "החלטה מספר 1234 של ממשלה 37".to_string(),
        ],
        Lang::English => vec![
            format!("decisions of government {} on {}", government, topic),
            format!("how many decisions on {} were made in {}", topic, period),
            "decision number 1234 of government 37".to_string(),
        ],
    }
}

fn rationale(lang: Lang, kind: ClarificationType, confidence: f32) -> String {
    match (kind, lang) {
        (ClarificationType::MissingEntity, Lang::Hebrew) => "חסר פרט מזהה כדי לאתר את ההחלטה.".into(),
        (ClarificationType::MissingEntity, Lang::English) => {
            "An identifying detail is missing, so I cannot tell which decision you mean.".into()
        }
        (ClarificationType::AmbiguousTimeRange, Lang::Hebrew) => "טווח התאריכים אינו ברור.".into(),
        (ClarificationType::AmbiguousTimeRange, Lang::English) => "The time range is unclear.".into(),
        (ClarificationType::VagueIntent, Lang::Hebrew) => "לא ברור איזה סוג מידע מבוקש.".into(),
        (ClarificationType::VagueIntent, Lang::English) => {
            "It is not clear what kind of information you are after.".into()
        }
        (ClarificationType::LowConfidence, Lang::Hebrew) => {
            format!("לא הצלחתי להבין את השאלה בוודאות מספקת ({:.0}%).", confidence * 100.0)
        }
        (ClarificationType::LowConfidence, Lang::English) => format!(
            "I could not understand the question with enough certainty ({:.0}%).",
            confidence * 100.0
        ),
        (ClarificationType::MultipleInterpretations, Lang::Hebrew) => "לשאלה יש כמה פירושים אפשריים.".into(),
        (ClarificationType::MultipleInterpretations, Lang::English) => {
            "The question can be read in more than one way.".into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::{manager, ScriptedProvider};
    use chrono::NaiveDate;

    const ALL_KINDS: [ClarificationType; 5] = [
        ClarificationType::MissingEntity,
        ClarificationType::AmbiguousTimeRange,
        ClarificationType::VagueIntent,
        ClarificationType::LowConfidence,
        ClarificationType::MultipleInterpretations,
    ];

    #[test]
    fn test_question_and_answer_counts() {
        let entities = ExtractedEntities {
            ambiguous_numbers: vec![2020, 7],
            ..Default::default()
        };
        for lang in [Lang::Hebrew, Lang::English] {
            for kind in ALL_KINDS {
                let request = build(lang, Intent::DataQuery, &entities, 0.3, kind);
                assert!(
                    (2..=3).contains(&request.questions.len()),
                    "{:?} gave {} questions",
                    kind,
                    request.questions.len()
                );
                for q in &request.questions {
                    assert!((3..=4).contains(&q.suggested_answers.len()), "{:?}: {}", kind, q.question);
                }
                assert!(!request.suggestions.is_empty());
                assert!(!request.rationale.is_empty());
            }
        }
    }

    #[test]
    fn test_reversed_range_is_offered_corrected() {
        let entities = ExtractedEntities {
            date_from: NaiveDate::from_ymd_opt(2023, 1, 1),
            date_to: NaiveDate::from_ymd_opt(2020, 12, 31),
            ..Default::default()
        };
        let request = build(Lang::English, Intent::DataQuery, &entities, 0.9, ClarificationType::AmbiguousTimeRange);
        assert_eq!(request.questions[0].suggested_answers[0], "from 2020 to 2023");
    }

    #[test]
    fn test_suggestions_reuse_stated_topic() {
        let entities = ExtractedEntities {
            topic: Some(TopicFilter::Canonical("בריאות ורפואה".into())),
            ..Default::default()
        };
        let request = build(Lang::Hebrew, Intent::Unclear, &entities, 0.2, ClarificationType::LowConfidence);
        assert!(request.suggestions[0].contains("בריאות ורפואה"));
        assert!(request.questions[0].question.contains("מה תרצה"));
    }

    #[tokio::test]
    async fn test_model_rephrase_keeps_answers() {
        let provider = ScriptedProvider::ok(r#"{"questions": ["So, what are you after?", "Which area interests you?"]}"#);
        let generator = ClarificationGenerator::new().with_model(manager(provider));
        let request = generator
            .generate("stuff", Intent::Unclear, &ExtractedEntities::default(), 0.7, ClarificationType::VagueIntent)
            .await;
        assert_eq!(request.questions[0].question, "So, what are you after?");
        assert_eq!(request.questions[0].suggested_answers[0], "find decisions on a topic");
    }

    #[tokio::test]
    async fn test_model_rephrase_with_wrong_count_is_ignored() {
        let provider = ScriptedProvider::ok(r#"{"questions": ["only one"]}"#);
        let generator = ClarificationGenerator::new().with_model(manager(provider));
        let request = generator
            .generate("stuff", Intent::Unclear, &ExtractedEntities::default(), 0.7, ClarificationType::VagueIntent)
            .await;
        assert_eq!(request.questions[0].question, "What would you like to know?");
    }
}
