//! Time-expression patterns: detection, extraction, and removal.

use std::sync::LazyLock;

use chrono::{Duration, NaiveTime, Weekday};
use regex::{Captures, Regex};

const CLOCK_12H: &str = r"\b(\d{1,2})(?::([0-5]\d))?\s*([ap])\.?m\b\.?";
const CLOCK_24H: &str = r"\b([01]?\d|2[0-3]):([0-5]\d)\b";
const CLOCK_NAMED: &str = r"\b(noon|midnight)\b";
const RELATIVE_DAY: &str = r"\b(today|tonight|tomorrow|tmrw|tmr)\b";
const WEEKDAY: &str =
    r"\b(?:(?:next|this|on)\s+)?(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b";
const OFFSET: &str = r"\bin\s+(\d+|an?|one|two|three|four|five|six|seven|eight|nine|ten|twelve)\s+(minutes?|mins?|hours?|hrs?|days?|weeks?)\b";
const DATE_NUMERIC: &str = r"\b\d{1,2}/\d{1,2}(?:/\d{2,4})?\b";
const DATE_ISO: &str = r"\b\d{4}-\d{2}-\d{2}\b";
const DATE_MONTH_DAY: &str = r"\b(?:jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\.?\s+\d{1,2}(?:st|nd|rd|th)?\b";
const DATE_DAY_MONTH: &str = r"\b\d{1,2}(?:st|nd|rd|th)?\s+(?:of\s+)?(?:january|february|march|april|may|june|july|august|september|october|november|december)\b";

static CLOCK_12H_RE: LazyLock<Regex> = LazyLock::new(|| ci(CLOCK_12H));
static CLOCK_24H_RE: LazyLock<Regex> = LazyLock::new(|| ci(CLOCK_24H));
static CLOCK_NAMED_RE: LazyLock<Regex> = LazyLock::new(|| ci(CLOCK_NAMED));
static RELATIVE_DAY_RE: LazyLock<Regex> = LazyLock::new(|| ci(RELATIVE_DAY));
static WEEKDAY_RE: LazyLock<Regex> = LazyLock::new(|| ci(WEEKDAY));
static OFFSET_RE: LazyLock<Regex> = LazyLock::new(|| ci(OFFSET));
static AT_RE: LazyLock<Regex> = LazyLock::new(|| ci(r"\bat\b"));
static ON_RE: LazyLock<Regex> = LazyLock::new(|| ci(r"\bon\b"));

/// Every time expression, used for detection.
static DETECT_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        CLOCK_12H,
        CLOCK_24H,
        CLOCK_NAMED,
        RELATIVE_DAY,
        WEEKDAY,
        OFFSET,
        DATE_NUMERIC,
        DATE_ISO,
        DATE_MONTH_DAY,
        DATE_DAY_MONTH,
    ]
    .into_iter()
    .map(ci)
    .collect()
});

/// One alternation over every time expression, swallowing a leading preposition.
static STRIP_RE: LazyLock<Regex> = LazyLock::new(|| {
    let alternatives = [
        CLOCK_12H,
        CLOCK_24H,
        CLOCK_NAMED,
        RELATIVE_DAY,
        WEEKDAY,
        OFFSET,
        DATE_NUMERIC,
        DATE_ISO,
        DATE_MONTH_DAY,
        DATE_DAY_MONTH,
    ]
    .iter()
    .map(|p| format!("(?:{p})"))
    .collect::<Vec<_>>()
    .join("|");
    ci(&format!(
        r"(?:\b(?:at|on|by|before|until|from)\s+)?(?:{alternatives})"
    ))
});

fn ci(pattern: &str) -> Regex {
    Regex::new(&format!("(?i){pattern}")).unwrap()
}

/// A day named relative to today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelativeDay {
    Today,
    Tonight,
    Tomorrow,
}

/// Does the text contain any recognised time expression?
pub fn has_time_pattern(text: &str) -> bool {
    DETECT_RES.iter().any(|re| re.is_match(text))
}

/// Number of distinct `at` / `on` prepositions present (0–2).
pub fn preposition_count(text: &str) -> usize {
    [&*AT_RE, &*ON_RE]
        .iter()
        .filter(|re| re.is_match(text))
        .count()
}

/// First clock time in the text. 12-hour forms win over 24-hour forms.
pub fn find_clock_time(text: &str) -> Option<NaiveTime> {
    if let Some(time) = CLOCK_12H_RE.captures_iter(text).find_map(|c| clock_12h(&c)) {
        return Some(time);
    }
    if let Some(time) = CLOCK_24H_RE.captures_iter(text).find_map(|c| {
        let hour = c.get(1)?.as_str().parse().ok()?;
        let minute = c.get(2)?.as_str().parse().ok()?;
        NaiveTime::from_hms_opt(hour, minute, 0)
    }) {
        return Some(time);
    }
    CLOCK_NAMED_RE.captures(text).and_then(|c| {
        match c.get(1)?.as_str().to_ascii_lowercase().as_str() {
            "noon" => NaiveTime::from_hms_opt(12, 0, 0),
            _ => NaiveTime::from_hms_opt(0, 0, 0),
        }
    })
}

fn clock_12h(c: &Captures<'_>) -> Option<NaiveTime> {
    let hour: u32 = c.get(1)?.as_str().parse().ok()?;
    if !(1..=12).contains(&hour) {
        return None;
    }
    let minute: u32 = match c.get(2) {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };
    let pm = c.get(3)?.as_str().eq_ignore_ascii_case("p");
    let hour = match (hour, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, true) => h + 12,
        (h, false) => h,
    };
    NaiveTime::from_hms_opt(hour, minute, 0)
}

pub fn find_relative_day(text: &str) -> Option<RelativeDay> {
    let word = RELATIVE_DAY_RE.captures(text)?.get(1)?.as_str().to_ascii_lowercase();
    match word.as_str() {
        "today" => Some(RelativeDay::Today),
        "tonight" => Some(RelativeDay::Tonight),
        _ => Some(RelativeDay::Tomorrow),
    }
}

pub fn find_weekday(text: &str) -> Option<Weekday> {
    let name = WEEKDAY_RE.captures(text)?.get(1)?.as_str().to_ascii_lowercase();
    name.parse::<Weekday>().ok()
}

/// Relative offset such as "in 3 hours" or "in a day".
pub fn find_offset(text: &str) -> Option<Duration> {
    let caps = OFFSET_RE.captures(text)?;
    let amount = parse_amount(&caps.get(1)?.as_str().to_ascii_lowercase())?;
    let unit = caps.get(2)?.as_str().to_ascii_lowercase();
    if unit.starts_with("min") {
        Duration::try_minutes(amount)
    } else if unit.starts_with('h') {
        Duration::try_hours(amount)
    } else if unit.starts_with('d') {
        Duration::try_days(amount)
    } else {
        Duration::try_weeks(amount)
    }
}

fn parse_amount(word: &str) -> Option<i64> {
    let n = match word {
        "a" | "an" | "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        "twelve" => 12,
        digits => digits.parse().ok()?,
    };
    Some(n)
}

/// Remove every time expression (and a preposition directly before it).
pub fn strip_time_expressions(text: &str) -> String {
    STRIP_RE.replace_all(text, " ").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn twelve_hour_clock() {
        assert_eq!(find_clock_time("at 3pm"), Some(t(15, 0)));
        assert_eq!(find_clock_time("at 3:30 PM"), Some(t(15, 30)));
        assert_eq!(find_clock_time("at 12am"), Some(t(0, 0)));
        assert_eq!(find_clock_time("12 p.m. lunch"), Some(t(12, 0)));
        assert_eq!(find_clock_time("7 a.m."), Some(t(7, 0)));
    }

    #[test]
    fn twenty_four_hour_clock() {
        assert_eq!(find_clock_time("standup at 09:15"), Some(t(9, 15)));
        assert_eq!(find_clock_time("at 18:00"), Some(t(18, 0)));
        assert_eq!(find_clock_time("25:00"), None);
    }

    #[test]
    fn meridiem_requires_word_boundary() {
        assert_eq!(find_clock_time("3 amazing ideas"), None);
        assert!(!has_time_pattern("3 amazing ideas"));
    }

    #[test]
    fn named_clock_times() {
        assert_eq!(find_clock_time("lunch at noon"), Some(t(12, 0)));
    }

    #[test]
    fn relative_days() {
        assert_eq!(find_relative_day("do it Tomorrow"), Some(RelativeDay::Tomorrow));
        assert_eq!(find_relative_day("tmrw please"), Some(RelativeDay::Tomorrow));
        assert_eq!(find_relative_day("tonight"), Some(RelativeDay::Tonight));
        assert_eq!(find_relative_day("todays news"), None);
    }

    #[test]
    fn weekdays() {
        assert_eq!(find_weekday("next Monday"), Some(Weekday::Mon));
        assert_eq!(find_weekday("on friday"), Some(Weekday::Fri));
        assert_eq!(find_weekday("mondays are long"), None);
    }

    #[test]
    fn offsets() {
        assert_eq!(find_offset("in 2 hours"), Duration::try_hours(2));
        assert_eq!(find_offset("in an hour"), Duration::try_hours(1));
        assert_eq!(find_offset("in 15 mins"), Duration::try_minutes(15));
        assert_eq!(find_offset("in three days"), Duration::try_days(3));
        assert_eq!(find_offset("in 2 weeks"), Duration::try_weeks(2));
        assert_eq!(find_offset("in the morning"), None);
    }

    #[test]
    fn calendar_dates_detected() {
        assert!(has_time_pattern("due 12/25"));
        assert!(has_time_pattern("on 2026-03-01"));
        assert!(has_time_pattern("by March 3rd"));
        assert!(has_time_pattern("the 3rd of March"));
        assert!(!has_time_pattern("meeting with the board"));
    }

    #[test]
    fn prepositions() {
        assert_eq!(preposition_count("call at 3 on friday"), 2);
        assert_eq!(preposition_count("Monday person"), 0);
        assert_eq!(preposition_count("on it"), 1);
    }

    #[test]
    fn strips_expressions_with_prepositions() {
        let stripped = strip_time_expressions("call Alice tomorrow at 3pm");
        assert_eq!(stripped.split_whitespace().collect::<Vec<_>>(), ["call", "Alice"]);

        let stripped = strip_time_expressions("stretch in 2 hours");
        assert_eq!(stripped.trim(), "stretch");
    }
}
