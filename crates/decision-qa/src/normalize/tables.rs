//! Static vocabularies for the normalizer.

/// Misspelling → correction, matched per token after Hebrew prefixes are
/// peeled off (the prefix is re-attached to the correction).
pub(super) const TYPOS: &[(&str, &str)] = &[
    ("desicion", "decision"),
    ("decison", "decision"),
    ("descision", "decision"),
    ("desicions", "decisions"),
    ("decisons", "decisions"),
    ("goverment", "government"),
    ("govenment", "government"),
    ("governmnet", "government"),
    ("statistcs", "statistics"),
    ("helth", "health"),
    ("educaton", "education"),
    ("enviroment", "environment"),
    ("latst", "latest"),
    ("recnet", "recent"),
    ("החלתה", "החלטה"),
    ("החלתות", "החלטות"),
    ("החלטוט", "החלטות"),
    ("ממשלא", "ממשלה"),
    ("מימשלה", "ממשלה"),
    ("כמא", "כמה"),
    ("חנוך", "חינוך"),
    ("בטחון", "ביטחון"),
    ("תחבורא", "תחבורה"),
    ("אחרונוט", "אחרונות"),
];

pub(super) const FILLERS: &[&str] = &[
    "please", "pls", "plz", "kindly", "um", "umm", "uh", "uhh", "hmm", "erm", "just",
    "בבקשה", "בבקשא", "אממ", "אמ", "אהה", "נו", "בקיצור", "פליז", "יאללה",
];

/// Spelled-out numerals 2–20 and tens to 90. "One" is handled separately.
pub(super) const NUMERALS: &[(&str, u32)] = &[
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
    ("seven", 7),
    ("eight", 8),
    ("nine", 9),
    ("ten", 10),
    ("eleven", 11),
    ("twelve", 12),
    ("thirteen", 13),
    ("fourteen", 14),
    ("fifteen", 15),
    ("sixteen", 16),
    ("seventeen", 17),
    ("eighteen", 18),
    ("nineteen", 19),
    ("twenty", 20),
    ("thirty", 30),
    ("forty", 40),
    ("fifty", 50),
    ("sixty", 60),
    ("seventy", 70),
    ("eighty", 80),
    ("ninety", 90),
    ("שתיים", 2),
    ("שניים", 2),
    ("שתי", 2),
    ("שלוש", 3),
    ("שלושה", 3),
    ("שלושת", 3),
    ("ארבע", 4),
    ("ארבעה", 4),
    ("ארבעת", 4),
    ("חמש", 5),
    ("חמישה", 5),
    ("חמשת", 5),
    ("שש", 6),
    ("שישה", 6),
    ("ששת", 6),
    ("שבע", 7),
    ("שבעה", 7),
    ("שמונה", 8),
    ("תשע", 9),
    ("תשעה", 9),
    ("עשר", 10),
    ("עשרה", 10),
    ("עשרים", 20),
    ("שלושים", 30),
    ("ארבעים", 40),
    ("חמישים", 50),
    ("שישים", 60),
    ("שבעים", 70),
    ("שמונים", 80),
    ("תשעים", 90),
];

/// "שלוש עשרה" = 13.
pub(super) const HEBREW_TEENS_SUFFIX: &[&str] = &["עשרה", "עשר"];

pub(super) const SINGULAR_ONE: &[&str] = &["one", "אחת", "אחד"];

pub(super) const COUNT_NOUNS: &[&str] = &[
    "decision", "result", "record", "item", "resolution", "החלטה", "תוצאה", "רשומה",
];
