//! Date bounds: full calendar dates, month + year, year ranges, bare years.
//!
//! The first construct that sets a bound wins; later constructs only claim
//! their digits so they are not reported as ambiguous.

use chrono::{Datelike, NaiveDate};
use std::sync::LazyLock;

use super::Claims;
use crate::types::ExtractedEntities;

pub const MIN_YEAR: i32 = 1948;
pub const MAX_YEAR: i32 = 2100;

static DMY_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(\d{1,2})[./-](\d{1,2})[./-](\d{4})").expect("dmy regex is valid")
});
static ISO_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(\d{4})-(\d{1,2})-(\d{1,2})").expect("iso date regex is valid")
});
static MONTH_YEAR_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"\b[בל]?(january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec|ינואר|פברואר|מרץ|מרס|אפריל|מאי|יוני|יולי|אוגוסט|ספטמבר|אוקטובר|נובמבר|דצמבר)\s+(\d{4})",
    )
    .expect("month-year regex is valid")
});
static BETWEEN_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"(?:\bbetween|\bבין)\s+(?:the\s+years\s+|השנים\s+|שנת\s+)?(\d{4})\s*(?:and|to|-|–|לבין|ו-?|ל-?|עד)\s*(\d{4})",
    )
    .expect("between regex is valid")
});
static FROM_TO_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"(?:\bfrom\s+|\bמשנת\s+|\bמאז\s+|(?:^|\s)מ-?)?(\d{4})\s*(?:to|until|till|through|-|–|עד|ל-)\s*(?:שנת\s+)?(\d{4})",
    )
    .expect("from-to regex is valid")
});
static SINCE_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"(\bsince|\bafter|\bfrom|\bstarting\s+(?:in|from)|\bמאז|\bמשנת|\bהחל\s+מ-?|\bאחרי|\bלאחר|(?:^|\s)מ-)\s*(?:שנת\s+)?(\d{4})",
    )
    .expect("since regex is valid")
});
static UNTIL_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"(\buntil|\btill|\bup\s+to|\bbefore|\bעד|\bלפני)\s*(?:שנת\s+)?(\d{4})",
    )
    .expect("until regex is valid")
});
static FOUR_DIGITS_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\d+").expect("digit run regex is valid"));

const SINCE_WORDS: &[&str] = &["since", "from", "after", "starting", "מאז", "החל מ", "מ-", "מתאריך", "אחרי", "לאחר"];
const UNTIL_WORDS: &[&str] = &["until", "till", "before", "up to", "עד", "לפני", "עד לתאריך"];

pub fn year_start(year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, 1, 1)
}

pub fn year_end(year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, 12, 31)
}

pub fn month_end(year: i32, month: u32) -> Option<NaiveDate> {
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    next.and_then(|d| d.pred_opt())
}

fn plausible_year(raw: &str) -> Option<i32> {
    raw.parse::<i32>()
        .ok()
        .filter(|y| (MIN_YEAR..=MAX_YEAR).contains(y))
}

fn month_number(name: &str) -> Option<u32> {
    let month = match name {
        "january" | "jan" | "ינואר" => 1,
        "february" | "feb" | "פברואר" => 2,
        "march" | "mar" | "מרץ" | "מרס" => 3,
        "april" | "apr" | "אפריל" => 4,
        "may" | "מאי" => 5,
        "june" | "jun" | "יוני" => 6,
        "july" | "jul" | "יולי" => 7,
        "august" | "aug" | "אוגוסט" => 8,
        "september" | "sept" | "sep" | "ספטמבר" => 9,
        "october" | "oct" | "אוקטובר" => 10,
        "november" | "nov" | "נובמבר" => 11,
        "december" | "dec" | "דצמבר" => 12,
        _ => return None,
    };
    Some(month)
}

fn has_no_dates(entities: &ExtractedEntities) -> bool {
    entities.date_from.is_none() && entities.date_to.is_none()
}

/// Which bound a lone date fills, judged by the words just before it.
fn bound_hint(text: &str, start: usize) -> Option<bool> {
    let before = text[..start].trim_end();
    let tail: String = before
        .chars()
        .rev()
        .take(12)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if SINCE_WORDS.iter().any(|w| tail.ends_with(w)) {
        Some(true)
    } else if UNTIL_WORDS.iter().any(|w| tail.ends_with(w)) {
        Some(false)
    } else {
        None
    }
}

/// `dd/mm/yyyy`, `dd.mm.yyyy`, `dd-mm-yyyy` and `yyyy-mm-dd`.
pub(crate) fn extract_full_dates(
    text: &str,
    claims: &mut Claims,
    entities: &mut ExtractedEntities,
) {
    let mut found: Vec<(usize, NaiveDate)> = Vec::new();

    for caps in ISO_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let date = (|| {
            let y = caps.get(1)?.as_str().parse().ok()?;
            let m = caps.get(2)?.as_str().parse().ok()?;
            let d = caps.get(3)?.as_str().parse().ok()?;
            NaiveDate::from_ymd_opt(y, m, d)
        })();
        if let Some(date) = date {
            claims.claim(whole.range());
            found.push((whole.start(), date));
        }
    }

    for caps in DMY_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        if !claims.is_free(&whole.range()) {
            continue;
        }
        let date = (|| {
            let d = caps.get(1)?.as_str().parse().ok()?;
            let m = caps.get(2)?.as_str().parse().ok()?;
            let y = caps.get(3)?.as_str().parse().ok()?;
            NaiveDate::from_ymd_opt(y, m, d)
        })();
        if let Some(date) = date {
            claims.claim(whole.range());
            found.push((whole.start(), date));
        }
    }

    found.sort_by_key(|(pos, _)| *pos);
    match found.as_slice() {
        [] => {}
        [(pos, date)] => match bound_hint(text, *pos) {
            Some(true) => entities.date_from = Some(*date),
            Some(false) => entities.date_to = Some(*date),
            None => {
                entities.date_from = Some(*date);
                entities.date_to = Some(*date);
            }
        },
        [(_, first), .., (_, last)] => {
            entities.date_from = Some(*first);
            entities.date_to = Some(*last);
        }
    }
}

/// "March 2023", "במרץ 2023". Two of them form a range.
pub(crate) fn extract_month_years(
    text: &str,
    claims: &mut Claims,
    entities: &mut ExtractedEntities,
) {
    let mut months: Vec<(i32, u32)> = Vec::new();
    for caps in MONTH_YEAR_RE.captures_iter(text) {
        let (Some(whole), Some(name), Some(year)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        if !claims.is_free(&whole.range()) {
            continue;
        }
        let (Some(month), Some(year)) = (month_number(name.as_str()), plausible_year(year.as_str()))
        else {
            continue;
        };
        claims.claim(whole.range());
        months.push((year, month));
    }

    if !has_no_dates(entities) {
        return;
    }
    match months.as_slice() {
        [] => {}
        [(y, m)] => {
            entities.date_from = NaiveDate::from_ymd_opt(*y, *m, 1);
            entities.date_to = month_end(*y, *m);
        }
        [(y1, m1), .., (y2, m2)] => {
            entities.date_from = NaiveDate::from_ymd_opt(*y1, *m1, 1);
            entities.date_to = month_end(*y2, *m2);
        }
    }
}

/// Year ranges ("between 2019 and 2021", "מאז 2020", "עד 2018") and bare years.
pub(crate) fn extract_years(text: &str, claims: &mut Claims, entities: &mut ExtractedEntities) {
    for re in [&*BETWEEN_RE, &*FROM_TO_RE] {
        for caps in re.captures_iter(text) {
            let (Some(whole), Some(a), Some(b)) = (caps.get(0), caps.get(1), caps.get(2)) else {
                continue;
            };
            if !claims.is_free(&whole.range()) {
                continue;
            }
            let (Some(y1), Some(y2)) = (plausible_year(a.as_str()), plausible_year(b.as_str()))
            else {
                continue;
            };
            claims.claim(whole.range());
            if has_no_dates(entities) {
                // Order is preserved; a reversed range is flagged by the router.
                entities.date_from = year_start(y1);
                entities.date_to = year_end(y2);
            }
        }
    }

    for caps in SINCE_RE.captures_iter(text) {
        let (Some(whole), Some(word), Some(year)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        if !claims.is_free(&whole.range()) {
            continue;
        }
        let Some(year) = plausible_year(year.as_str()) else {
            continue;
        };
        claims.claim(whole.range());
        let exclusive = matches!(word.as_str().trim(), "after" | "אחרי" | "לאחר");
        if entities.date_from.is_none() {
            entities.date_from = year_start(if exclusive { year + 1 } else { year });
        }
    }

    for caps in UNTIL_RE.captures_iter(text) {
        let (Some(whole), Some(word), Some(year)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        if !claims.is_free(&whole.range()) {
            continue;
        }
        let Some(year) = plausible_year(year.as_str()) else {
            continue;
        };
        claims.claim(whole.range());
        let exclusive = matches!(word.as_str().trim(), "before" | "לפני");
        if entities.date_to.is_none() {
            entities.date_to = year_end(if exclusive { year - 1 } else { year });
        }
    }

    let mut bare: Vec<i32> = Vec::new();
    for m in FOUR_DIGITS_RE.find_iter(text) {
        if m.as_str().len() != 4 || !claims.is_free(&m.range()) {
            continue;
        }
        if let Some(year) = plausible_year(m.as_str()) {
            claims.claim(m.range());
            bare.push(year);
        }
    }
    if has_no_dates(entities) {
        if let (Some(min), Some(max)) = (bare.iter().min(), bare.iter().max()) {
            entities.date_from = year_start(*min);
            entities.date_to = year_end(*max);
        }
    }
}

/// Years spanned by a bound pair, for prompts and rationales.
pub fn describe_range(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Option<String> {
    match (from, to) {
        (Some(f), Some(t)) if f.year() == t.year() && f.ordinal() == 1 && t.month() == 12 && t.day() == 31 => {
            Some(f.year().to_string())
        }
        (Some(f), Some(t)) => Some(format!("{} – {}", f, t)),
        (Some(f), None) => Some(format!("≥ {}", f)),
        (None, Some(t)) => Some(format!("≤ {}", t)),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, day)
    }

    fn run(text: &str) -> ExtractedEntities {
        let mut claims = Claims::default();
        let mut entities = ExtractedEntities::default();
        extract_full_dates(text, &mut claims, &mut entities);
        extract_month_years(text, &mut claims, &mut entities);
        extract_years(text, &mut claims, &mut entities);
        entities
    }

    #[test]
    fn test_full_date_formats() {
        let e = run("decisions from 01/03/2020 to 15.06.2021");
        assert_eq!(e.date_from, d(2020, 3, 1));
        assert_eq!(e.date_to, d(2021, 6, 15));

        let e = run("since 2022-02-10");
        assert_eq!(e.date_from, d(2022, 2, 10));
        assert_eq!(e.date_to, None);

        let e = run("on 05-11-2019");
        assert_eq!(e.date_from, d(2019, 11, 5));
        assert_eq!(e.date_to, d(2019, 11, 5));
    }

    #[test]
    fn test_month_year() {
        let e = run("decisions in march 2023");
        assert_eq!(e.date_from, d(2023, 3, 1));
        assert_eq!(e.date_to, d(2023, 3, 31));

        let e = run("החלטות בפברואר 2024");
        assert_eq!(e.date_from, d(2024, 2, 1));
        assert_eq!(e.date_to, d(2024, 2, 29));
    }

    #[test]
    fn test_year_ranges() {
        let e = run("between 2018 and 2020");
        assert_eq!(e.date_from, d(2018, 1, 1));
        assert_eq!(e.date_to, d(2020, 12, 31));

        let e = run("בין 2015 ל-2017");
        assert_eq!(e.date_from, d(2015, 1, 1));
        assert_eq!(e.date_to, d(2017, 12, 31));

        let e = run("2019-2021");
        assert_eq!(e.date_from, d(2019, 1, 1));
        assert_eq!(e.date_to, d(2021, 12, 31));
    }

    #[test]
    fn test_open_ranges() {
        let e = run("מאז 2020");
        assert_eq!(e.date_from, d(2020, 1, 1));
        assert_eq!(e.date_to, None);

        let e = run("before 2010");
        assert_eq!(e.date_from, None);
        assert_eq!(e.date_to, d(2009, 12, 31));
    }

    #[test]
    fn test_reversed_range_is_kept_as_stated() {
        let e = run("between 2022 and 2019");
        assert!(e.date_from > e.date_to);
    }

    #[test]
    fn test_out_of_range_year_ignored() {
        let e = run("1200 decisions");
        assert_eq!(e.date_from, None);
    }

    #[test]
    fn test_describe_range() {
        assert_eq!(describe_range(d(2020, 1, 1), d(2020, 12, 31)).as_deref(), Some("2020"));
        assert_eq!(describe_range(None, None), None);
    }
}
