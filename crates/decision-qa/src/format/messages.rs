//! User-visible strings, one table per language.

use crate::types::Lang;

pub(crate) struct Messages {
    pub no_results: &'static str,
    pub no_results_hint: &'static str,
    pub generic_error: &'static str,
    pub timeout_error: &'static str,
    pub unavailable_error: &'static str,
    pub decision: &'static str,
    pub government: &'static str,
    pub date: &'static str,
    pub prime_minister: &'static str,
    pub operativity: &'static str,
    pub summary: &'static str,
    pub content: &'static str,
    pub link: &'static str,
    pub count_label: &'static str,
    pub relevance: &'static str,
    pub clarification_intro: &'static str,
    pub options: &'static str,
    pub you_may_also_ask: &'static str,
    pub untitled: &'static str,
    pub legacy_note: &'static str,
}

const HEBREW: Messages = Messages {
    no_results: "לא נמצאו החלטות התואמות את החיפוש.",
    no_results_hint: "אפשר לנסות להרחיב את טווח התאריכים או לנסח את הנושא אחרת.",
    generic_error: "לא הצלחנו להשלים את החיפוש. נסו שוב בעוד מספר רגעים.",
    timeout_error: "החיפוש נמשך זמן רב מדי. נסו לצמצם את השאלה ולשאול שוב.",
    unavailable_error: "השירות אינו זמין כרגע. נסו שוב מאוחר יותר.",
    decision: "החלטה",
    government: "ממשלה",
    date: "תאריך",
    prime_minister: "ראש הממשלה",
    operativity: "סוג",
    summary: "תקציר",
    content: "תוכן",
    link: "קישור",
    count_label: "מספר החלטות",
    relevance: "רלוונטיות",
    clarification_intro: "כדי לדייק את התשובה, אשמח לכמה פרטים:",
    options: "אפשרויות",
    you_may_also_ask: "אפשר גם לשאול",
    untitled: "ללא כותרת",
    legacy_note: "התוצאות התקבלו בחיפוש מילות מפתח פשוט.",
};

const ENGLISH: Messages = Messages {
    no_results: "No decisions matched your search.",
    no_results_hint: "Try widening the date range or phrasing the topic differently.",
    generic_error: "We could not complete the search. Please try again shortly.",
    timeout_error: "The search took too long. Try narrowing the question and asking again.",
    unavailable_error: "The service is currently unavailable. Please try again later.",
    decision: "Decision",
    government: "Government",
    date: "Date",
    prime_minister: "Prime minister",
    operativity: "Type",
    summary: "Summary",
    content: "Content",
    link: "Link",
    count_label: "Decisions",
    relevance: "Relevance",
    clarification_intro: "To answer precisely, I need a few details:",
    options: "Options",
    you_may_also_ask: "You may also ask",
    untitled: "Untitled",
    legacy_note: "These results come from a plain keyword search.",
};

pub(crate) fn messages(lang: Lang) -> &'static Messages {
    match lang {
        Lang::Hebrew => &HEBREW,
        Lang::English => &ENGLISH,
    }
}

/// "There are N decisions" with correct number agreement.
pub(crate) fn count_sentence(lang: Lang, count: i64, criteria: &str) -> String {
    match lang {
        Lang::Hebrew => match count {
            0 => format!("לא נמצאו החלטות{}.", criteria),
            1 => format!("נמצאה החלטה אחת{}.", criteria),
            n => format!("נמצאו {} החלטות{}.", n, criteria),
        },
        Lang::English => match count {
            0 => format!("There are no decisions{}.", criteria),
            1 => format!("There is 1 decision{}.", criteria),
            n => format!("There are {} decisions{}.", n, criteria),
        },
    }
}

pub(crate) fn list_header(lang: Lang, count: usize, criteria: &str) -> String {
    match lang {
        Lang::Hebrew if count == 1 => format!("נמצאה החלטה אחת{}:", criteria),
        Lang::Hebrew => format!("נמצאו {} החלטות{}:", count, criteria),
        Lang::English if count == 1 => format!("Found 1 decision{}:", criteria),
        Lang::English => format!("Found {} decisions{}:", count, criteria),
    }
}

pub(crate) fn topic_phrase(lang: Lang, topic: &str) -> String {
    match lang {
        Lang::Hebrew => format!(" בנושא {}", topic),
        Lang::English => format!(" on {}", topic),
    }
}

pub(crate) fn government_phrase(lang: Lang, government: u32) -> String {
    match lang {
        Lang::Hebrew => format!(" של ממשלה {}", government),
        Lang::English => format!(" by government {}", government),
    }
}

pub(crate) fn prime_minister_phrase(lang: Lang, name: &str) -> String {
    match lang {
        Lang::Hebrew => format!(" בתקופת {}", name),
        Lang::English => format!(" under {}", name),
    }
}

pub(crate) fn period_phrase(lang: Lang, period: &str) -> String {
    match lang {
        Lang::Hebrew => format!(" בתקופה {}", period),
        Lang::English => format!(" in {}", period),
    }
}

pub(crate) fn operative_phrase(lang: Lang, operative: bool) -> &'static str {
    match (lang, operative) {
        (Lang::Hebrew, true) => " אופרטיביות",
        (Lang::Hebrew, false) => " דקלרטיביות",
        (Lang::English, true) => " (operative)",
        (Lang::English, false) => " (declarative)",
    }
}
