//! Reminder intent detection for outgoing user text.

pub mod model;
pub mod parser;
pub mod patterns;
pub mod rules;

pub use model::{ExtractedData, Importance, ReminderIntent, ReminderKind};
pub use parser::{ReminderIntentParser, parse_reminder_intent};
pub use rules::{ConfidenceWeights, DateOnlyDefault, ReminderRules};
