//! Keyword tables and scoring constants for reminder detection.
//!
//! Everything here is data: tables can be loaded from JSON so the parser
//! can be re-tuned without code changes. Two built-in profiles exist:
//! [`ReminderRules::default`] is canonical, [`ReminderRules::legacy`]
//! reproduces the older chat-composer behavior for parity checks.

use serde::{Deserialize, Serialize};

/// Default time of day applied when only a date was mentioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateOnlyDefault {
    /// Use `ReminderRules::default_hour` on that date.
    FixedHour,
    /// Use the next whole hour after the current time of day.
    NextWholeHour,
}

/// Confidence contributions and the classification threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceWeights {
    /// Added once when any trigger phrase matches.
    pub trigger: f64,
    /// Added once when any time expression matches.
    pub time_pattern: f64,
    /// Added per `at` / `on` preposition, only alongside a time expression.
    pub preposition: f64,
    /// Cap on the total preposition contribution.
    pub preposition_max: f64,
    /// `is_reminder` iff confidence reaches this value.
    pub threshold: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            trigger: 0.6,
            time_pattern: 0.3,
            preposition: 0.1,
            preposition_max: 0.2,
            threshold: 0.5,
        }
    }
}

/// Keyword tables driving every stage of the reminder pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderRules {
    /// Phrases that signal reminder intent (case-insensitive substring match).
    pub trigger_phrases: Vec<String>,
    /// Words stripped from the start of a title.
    pub connective_words: Vec<String>,
    pub task_keywords: Vec<String>,
    pub calendar_keywords: Vec<String>,
    /// On a task/calendar tie, any of these makes the result calendar.
    pub calendar_tiebreak_keywords: Vec<String>,
    pub high_importance_keywords: Vec<String>,
    pub low_importance_keywords: Vec<String>,
    pub weights: ConfidenceWeights,
    /// Hour used for "tomorrow" / weekday mentions without a clock time.
    pub default_hour: u32,
    /// Hour used for "tonight" without a clock time.
    pub tonight_hour: u32,
    pub date_only_default: DateOnlyDefault,
}

impl Default for ReminderRules {
    fn default() -> Self {
        Self {
            trigger_phrases: strings(&[
                "remind me",
                "remind us",
                "reminder",
                "set a reminder",
                "don't forget",
                "dont forget",
                "do not forget",
                "remember to",
                "schedule meeting",
                "schedule a meeting",
                "schedule a call",
                "schedule",
                "book a meeting",
                "set up a meeting",
                "add to my calendar",
                "add to calendar",
                "deadline",
                "due by",
                "due on",
                "alert me",
                "notify me",
                "ping me",
                "make sure to",
                "to-do",
                "todo",
            ]),
            connective_words: strings(&[
                "i need to",
                "i have to",
                "we need to",
                "need to",
                "please",
                "to",
                "that",
                "about",
                "of",
                "for",
                "me",
                "with",
                "and",
            ]),
            task_keywords: strings(&[
                "task", "todo", "to-do", "finish", "complete", "submit", "send", "buy", "pay",
                "call", "email", "review", "write", "fix", "pick up", "clean", "prepare",
                "check", "deadline", "renew", "book",
            ]),
            calendar_keywords: strings(&[
                "meeting",
                "appointment",
                "event",
                "calendar",
                "schedule",
                "conference",
                "interview",
                "lunch",
                "dinner",
                "party",
                "birthday",
                "standup",
                "sync",
                "webinar",
            ]),
            calendar_tiebreak_keywords: strings(&["meeting", "call"]),
            high_importance_keywords: strings(&[
                "urgent",
                "urgently",
                "asap",
                "as soon as possible",
                "critical",
                "important",
                "immediately",
                "emergency",
                "high priority",
                "top priority",
            ]),
            low_importance_keywords: strings(&[
                "whenever",
                "eventually",
                "someday",
                "sometime",
                "no rush",
                "low priority",
                "when you can",
                "if possible",
            ]),
            weights: ConfidenceWeights::default(),
            default_hour: 9,
            tonight_hour: 20,
            date_only_default: DateOnlyDefault::FixedHour,
        }
    }
}

impl ReminderRules {
    /// The older composer profile: narrower tables, heavier trigger weight,
    /// and next-whole-hour defaults for date-only mentions.
    pub fn legacy() -> Self {
        Self {
            trigger_phrases: strings(&[
                "remind me",
                "reminder",
                "don't forget",
                "remember to",
                "schedule meeting",
                "deadline",
                "appointment",
            ]),
            connective_words: strings(&["to", "that", "about", "for"]),
            task_keywords: strings(&["task", "todo", "finish", "submit", "buy", "pay", "call"]),
            calendar_keywords: strings(&["meeting", "appointment", "event", "calendar"]),
            calendar_tiebreak_keywords: strings(&["meeting", "call"]),
            high_importance_keywords: strings(&["urgent", "asap", "critical", "important"]),
            low_importance_keywords: strings(&["whenever", "eventually", "someday"]),
            weights: ConfidenceWeights {
                trigger: 0.7,
                time_pattern: 0.2,
                preposition: 0.1,
                preposition_max: 0.1,
                threshold: 0.5,
            },
            default_hour: 9,
            tonight_hour: 20,
            date_only_default: DateOnlyDefault::NextWholeHour,
        }
    }

    /// Load tables from JSON. Missing fields keep their canonical defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Count whole-word occurrences of `needle` in `haystack` (both lowercase).
pub(crate) fn count_word_matches(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    haystack
        .match_indices(needle)
        .filter(|(pos, _)| {
            let before = haystack[..*pos].chars().next_back();
            let after = haystack[pos + needle.len()..].chars().next();
            !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
        })
        .count()
}
