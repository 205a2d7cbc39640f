//! Date buckets for the conversation list.
//!
//! Labels are derived from `now` on every call and never cached, so a list
//! rendered before midnight and again after it regroups on its own.

use chrono::{DateTime, Datelike, Month, NaiveDate, TimeZone, Weekday};
use serde::Serialize;

use super::model::Conversation;

/// Which bucket a conversation falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BucketKind {
    Today,
    Yesterday,
    /// Two to six days old.
    Weekday { weekday: Weekday },
    /// Older than a week, same calendar month.
    ThisMonth,
    Month { year: i32, month: u32 },
}

impl BucketKind {
    /// Classify `date` relative to `today`.
    pub fn classify(date: NaiveDate, today: NaiveDate) -> Self {
        let age = (today - date).num_days();
        if age <= 0 {
            Self::Today
        } else if age == 1 {
            Self::Yesterday
        } else if age < 7 {
            Self::Weekday {
                weekday: date.weekday(),
            }
        } else if date.year() == today.year() && date.month() == today.month() {
            Self::ThisMonth
        } else {
            Self::Month {
                year: date.year(),
                month: date.month(),
            }
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::Today => "Today".to_string(),
            Self::Yesterday => "Yesterday".to_string(),
            Self::Weekday { weekday } => weekday_name(*weekday).to_string(),
            Self::ThisMonth => "This Month".to_string(),
            Self::Month { year, month } => {
                let name = u8::try_from(*month)
                    .ok()
                    .and_then(|m| Month::try_from(m).ok())
                    .map(|m| m.name())
                    .unwrap_or("Unknown");
                format!("{name} {year}")
            }
        }
    }
}

impl std::fmt::Display for BucketKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A labeled group of conversations, most recently updated first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateBucket {
    pub kind: BucketKind,
    pub label: String,
    pub conversations: Vec<Conversation>,
}

/// Group conversations by how long ago they were updated, as seen from `now`.
///
/// Buckets come out newest first; members are `updated_at` descending.
pub fn group_by_date<Tz: TimeZone>(conversations: &[Conversation], now: &DateTime<Tz>) -> Vec<DateBucket> {
    let tz = now.timezone();
    let today = now.date_naive();

    let mut sorted: Vec<&Conversation> = conversations.iter().collect();
    sorted.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));

    let mut buckets: Vec<DateBucket> = Vec::new();
    for conv in sorted {
        let date = tz
            .timestamp_millis_opt(conv.updated_at)
            .earliest()
            .map(|dt| dt.date_naive())
            .unwrap_or(today);
        let kind = BucketKind::classify(date, today);

        match buckets.iter_mut().find(|b| b.kind == kind) {
            Some(bucket) => bucket.conversations.push(conv.clone()),
            None => buckets.push(DateBucket {
                kind,
                label: kind.label(),
                conversations: vec![conv.clone()],
            }),
        }
    }
    buckets
}

fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    fn conv(id: &str, updated_at: DateTime<Utc>) -> Conversation {
        let mut c = Conversation::new(id, 0).with_id(id);
        c.updated_at = updated_at.timestamp_millis();
        c
    }

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, d, h, 0, 0).unwrap()
    }

    /// Friday 2026-03-20 12:00 UTC.
    fn now() -> DateTime<Utc> {
        at(20, 12)
    }

    fn labels(buckets: &[DateBucket]) -> Vec<&str> {
        buckets.iter().map(|b| b.label.as_str()).collect()
    }

    #[test]
    fn buckets_in_recency_order() {
        let list = vec![
            conv("older-month", Utc.with_ymd_and_hms(2026, 1, 15, 9, 0, 0).unwrap()),
            conv("today-early", at(20, 1)),
            conv("yesterday", at(19, 23)),
            conv("tuesday", at(17, 8)),
            conv("this-month", at(3, 8)),
            conv("today-late", at(20, 11)),
            conv("last-year", Utc.with_ymd_and_hms(2025, 12, 31, 9, 0, 0).unwrap()),
        ];

        let buckets = group_by_date(&list, &now());
        assert_eq!(
            labels(&buckets),
            ["Today", "Yesterday", "Tuesday", "This Month", "January 2026", "December 2025"]
        );
        let today: Vec<&str> = buckets[0].conversations.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(today, ["today-late", "today-early"]);
    }

    #[test]
    fn grouping_is_idempotent() {
        let list = vec![conv("a", at(20, 1)), conv("b", at(18, 1)), conv("c", at(1, 1))];
        assert_eq!(group_by_date(&list, &now()), group_by_date(&list, &now()));
    }

    #[test]
    fn labels_shift_past_midnight() {
        let list = vec![conv("a", at(20, 11))];
        assert_eq!(labels(&group_by_date(&list, &now())), ["Today"]);
        assert_eq!(labels(&group_by_date(&list, &at(21, 0))), ["Yesterday"]);
        assert_eq!(labels(&group_by_date(&list, &at(23, 0))), ["Friday"]);
    }

    #[test]
    fn future_timestamps_count_as_today() {
        let list = vec![conv("skewed", at(21, 3))];
        assert_eq!(labels(&group_by_date(&list, &now())), ["Today"]);
    }

    #[test]
    fn uses_caller_timezone() {
        // 23:30 UTC on the 19th is already the 20th at UTC+2.
        let list = vec![conv("late", Utc.with_ymd_and_hms(2026, 3, 19, 23, 30, 0).unwrap())];
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let now_plus2 = now().with_timezone(&tz);
        assert_eq!(labels(&group_by_date(&list, &now_plus2)), ["Today"]);
        assert_eq!(labels(&group_by_date(&list, &now())), ["Yesterday"]);
    }

    #[test]
    fn week_old_in_previous_month_uses_month_label() {
        let now = at(2, 12);
        let list = vec![conv("feb", Utc.with_ymd_and_hms(2026, 2, 20, 9, 0, 0).unwrap())];
        assert_eq!(labels(&group_by_date(&list, &now)), ["February 2026"]);
    }

    #[test]
    fn empty_list() {
        assert!(group_by_date(&[], &now()).is_empty());
    }
}
