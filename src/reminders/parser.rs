//! The reminder intent pipeline: score → gate → title → date/time → type → importance.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Days, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike};
use regex::Regex;
use tracing::{debug, warn};

use super::model::{ExtractedData, Importance, ReminderIntent, ReminderKind};
use super::patterns::{self, RelativeDay};
use super::rules::{DateOnlyDefault, ReminderRules, count_word_matches};

static DEFAULT_PARSER: LazyLock<ReminderIntentParser> = LazyLock::new(ReminderIntentParser::default);

/// Score `text` with the canonical rule set.
pub fn parse_reminder_intent<Tz: TimeZone>(text: &str, now: &DateTime<Tz>) -> ReminderIntent {
    DEFAULT_PARSER.parse(text, now)
}

/// Stateless reminder parser over a fixed set of [`ReminderRules`].
///
/// Parsing is a pure function of `(text, now)` and never fails; unusable
/// input simply yields a low-confidence, non-reminder result.
pub struct ReminderIntentParser {
    rules: ReminderRules,
    /// Case-insensitive trigger matchers, longest phrase first.
    triggers: Vec<Regex>,
    /// The same phrases anchored at word boundaries, for title stripping.
    title_triggers: Vec<Regex>,
    /// Lowercased connectives, longest first.
    connectives: Vec<String>,
}

impl ReminderIntentParser {
    pub fn new(rules: ReminderRules) -> Self {
        let mut phrases: Vec<&String> = rules.trigger_phrases.iter().filter(|p| !p.is_empty()).collect();
        phrases.sort_by_key(|p| std::cmp::Reverse(p.len()));
        let triggers = phrases
            .iter()
            .filter_map(|p| compile_phrase(p, regex::escape(p)))
            .collect();
        let title_triggers = phrases
            .iter()
            .filter_map(|p| compile_phrase(p, word_bounded(p)))
            .collect();

        let mut connectives: Vec<String> =
            rules.connective_words.iter().map(|w| w.to_lowercase()).collect();
        connectives.sort_by_key(|w| std::cmp::Reverse(w.len()));

        Self {
            rules,
            triggers,
            title_triggers,
            connectives,
        }
    }

    pub fn rules(&self) -> &ReminderRules {
        &self.rules
    }

    /// Run the full pipeline.
    pub fn parse<Tz: TimeZone>(&self, text: &str, now: &DateTime<Tz>) -> ReminderIntent {
        if text.trim().is_empty() {
            return ReminderIntent::none(text);
        }

        let confidence = self.score(text);
        let is_reminder = confidence >= self.rules.weights.threshold;

        let extracted_data = if is_reminder {
            let lower = text.to_lowercase();
            ExtractedData {
                title: Some(self.extract_title(text)),
                date_time: self.extract_date_time(text, now).map(|dt| dt.fixed_offset()),
                kind: Some(self.classify_kind(&lower)),
                importance: Some(self.classify_importance(&lower)),
            }
        } else {
            ExtractedData::default()
        };

        debug!(confidence, is_reminder, "Scored reminder intent");

        ReminderIntent {
            is_reminder,
            confidence,
            extracted_data,
            raw_text: text.to_string(),
        }
    }

    /// Confidence in `[0, 1]`, rounded to two decimals.
    pub fn score(&self, text: &str) -> f64 {
        let weights = &self.rules.weights;
        let mut confidence = 0.0;

        if self.triggers.iter().any(|re| re.is_match(text)) {
            confidence += weights.trigger;
        }
        if patterns::has_time_pattern(text) {
            confidence += weights.time_pattern;
            let prepositions = patterns::preposition_count(text) as f64 * weights.preposition;
            confidence += prepositions.min(weights.preposition_max);
        }

        ((confidence * 100.0).round() / 100.0).clamp(0.0, 1.0)
    }

    /// Title with triggers, time expressions and leading connectives removed.
    pub fn extract_title(&self, text: &str) -> String {
        let mut title = text.to_string();
        for re in &self.title_triggers {
            title = re.replace_all(&title, " ").into_owned();
        }
        title = patterns::strip_time_expressions(&title);
        let mut title = title.split_whitespace().collect::<Vec<_>>().join(" ");

        loop {
            let trimmed = trim_punctuation(&title);
            let stripped = self.strip_leading_connective(trimmed);
            if stripped.len() == title.len() {
                break;
            }
            title = stripped.to_string();
        }

        capitalize(&title)
    }

    fn strip_leading_connective<'a>(&self, text: &'a str) -> &'a str {
        for word in &self.connectives {
            let Some(head) = text.get(..word.len()) else {
                continue;
            };
            if !head.eq_ignore_ascii_case(word) {
                continue;
            }
            let rest = &text[word.len()..];
            if rest.is_empty() || rest.starts_with(|c: char| !c.is_alphanumeric()) {
                return rest.trim_start();
            }
        }
        text
    }

    /// Resolve the first usable time reference to an absolute instant.
    pub fn extract_date_time<Tz: TimeZone>(&self, text: &str, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let today = now.date_naive();
        let clock = patterns::find_clock_time(text);

        if let Some(day) = patterns::find_relative_day(text) {
            return match (day, clock) {
                (RelativeDay::Tomorrow, time) => {
                    let time = time.or_else(|| self.date_only_time(now))?;
                    at_local(now, today.checked_add_days(Days::new(1))?, time)
                }
                (RelativeDay::Today, Some(time)) => roll_if_passed(now, today, time),
                (RelativeDay::Today, None) => now.clone().checked_add_signed(Duration::hours(1)),
                (RelativeDay::Tonight, time) => {
                    let time = match time {
                        Some(time) => time,
                        None => NaiveTime::from_hms_opt(self.rules.tonight_hour, 0, 0)?,
                    };
                    roll_if_passed(now, today, time)
                }
            };
        }

        if let Some(offset) = patterns::find_offset(text) {
            return now.clone().checked_add_signed(offset);
        }

        if let Some(weekday) = patterns::find_weekday(text) {
            let ahead = (7 + weekday.num_days_from_monday() - today.weekday().num_days_from_monday()) % 7;
            let ahead = if ahead == 0 { 7 } else { ahead };
            let date = today.checked_add_days(Days::new(u64::from(ahead)))?;
            let time = clock.or_else(|| self.date_only_time(now))?;
            return at_local(now, date, time);
        }

        clock.and_then(|time| roll_if_passed(now, today, time))
    }

    fn date_only_time<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<NaiveTime> {
        match self.rules.date_only_default {
            DateOnlyDefault::FixedHour => NaiveTime::from_hms_opt(self.rules.default_hour, 0, 0),
            DateOnlyDefault::NextWholeHour => NaiveTime::from_hms_opt((now.hour() + 1) % 24, 0, 0),
        }
    }

    /// Task vs calendar by keyword count.
    pub fn classify_kind(&self, lower: &str) -> ReminderKind {
        let tasks = keyword_count(lower, &self.rules.task_keywords);
        let events = keyword_count(lower, &self.rules.calendar_keywords);

        match tasks.cmp(&events) {
            std::cmp::Ordering::Greater => ReminderKind::Task,
            std::cmp::Ordering::Less => ReminderKind::Calendar,
            std::cmp::Ordering::Equal
                if keyword_count(lower, &self.rules.calendar_tiebreak_keywords) > 0 =>
            {
                ReminderKind::Calendar
            }
            std::cmp::Ordering::Equal => ReminderKind::Task,
        }
    }

    pub fn classify_importance(&self, lower: &str) -> Importance {
        if keyword_count(lower, &self.rules.high_importance_keywords) > 0 {
            Importance::High
        } else if keyword_count(lower, &self.rules.low_importance_keywords) > 0 {
            Importance::Low
        } else {
            Importance::Normal
        }
    }
}

impl Default for ReminderIntentParser {
    fn default() -> Self {
        Self::new(ReminderRules::default())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn compile_phrase(phrase: &str, pattern: String) -> Option<Regex> {
    match Regex::new(&format!("(?i){pattern}")) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(phrase = %phrase, error = %e, "Skipping unusable trigger phrase");
            None
        }
    }
}

/// Escape `phrase`, requiring word boundaries where it starts or ends with a word character.
fn word_bounded(phrase: &str) -> String {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let start = if phrase.starts_with(is_word) { r"\b" } else { "" };
    let end = if phrase.ends_with(is_word) { r"\b" } else { "" };
    format!("{start}{}{end}", regex::escape(phrase))
}

fn keyword_count(lower: &str, words: &[String]) -> usize {
    words
        .iter()
        .map(|w| count_word_matches(lower, &w.to_lowercase()))
        .sum()
}

/// `date` at `time` in `now`'s timezone, skipping forward over a DST gap.
fn at_local<Tz: TimeZone>(now: &DateTime<Tz>, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Tz>> {
    let naive = NaiveDateTime::new(date, time);
    let tz = now.timezone();
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
}

/// Today at `time`, or tomorrow if that moment is not in the future.
fn roll_if_passed<Tz: TimeZone>(now: &DateTime<Tz>, today: NaiveDate, time: NaiveTime) -> Option<DateTime<Tz>> {
    let candidate = at_local(now, today, time)?;
    if candidate > *now {
        Some(candidate)
    } else {
        at_local(now, today.checked_add_days(Days::new(1))?, time)
    }
}

fn trim_punctuation(text: &str) -> &str {
    text.trim_matches(|c: char| c.is_whitespace() || ",.;:!?-–".contains(c))
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
