//! Reminder intent data model.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Whether a reminder belongs on the calendar or the task list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    Calendar,
    Task,
}

/// How urgent the reminder sounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    Low,
    #[default]
    Normal,
    High,
}

impl std::fmt::Display for Importance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        };
        write!(f, "{s}")
    }
}

/// Structured fields pulled out of reminder-like text.
///
/// Every field is `None` unless the text was classified as a reminder.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExtractedData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Absolute instant in the caller's timezone offset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<DateTime<FixedOffset>>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<ReminderKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<Importance>,
}

impl ExtractedData {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.date_time.is_none()
            && self.kind.is_none()
            && self.importance.is_none()
    }
}

/// Result of scoring a piece of user text for reminder intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderIntent {
    pub is_reminder: bool,
    /// Always in `[0, 1]`, reported even below the threshold.
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "ExtractedData::is_empty")]
    pub extracted_data: ExtractedData,
    pub raw_text: String,
}

impl ReminderIntent {
    /// A non-reminder result with zero confidence.
    pub fn none(raw_text: impl Into<String>) -> Self {
        Self {
            is_reminder: false,
            confidence: 0.0,
            extracted_data: ExtractedData::default(),
            raw_text: raw_text.into(),
        }
    }
}
