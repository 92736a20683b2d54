use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime, Weekday};
use serde::Serialize;
use uuid::Uuid;

pub const SNAPSHOT_HANDLER: &str = "create_weekly_snapshot";

/// A time-based trigger firing once a week at the top of `hour`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeeklyTrigger {
    pub id: Uuid,
    pub handler: String,
    pub weekday: Weekday,
    pub hour: u32,
}

impl WeeklyTrigger {
    pub fn new(handler: &str, weekday: Weekday, hour: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            handler: handler.to_string(),
            weekday,
            hour: hour.min(23),
        }
    }

    /// Monday at 11:00, ahead of the Tuesday data refresh.
    pub fn weekly_snapshot() -> Self {
        Self::new(SNAPSHOT_HANDLER, Weekday::Mon, 11)
    }

    /// First firing strictly after `after`.
    pub fn next_fire(&self, after: NaiveDateTime) -> NaiveDateTime {
        let at = NaiveTime::from_hms_opt(self.hour, 0, 0).unwrap_or(NaiveTime::MIN);
        let days_ahead = (self.weekday.num_days_from_monday() + 7
            - after.weekday().num_days_from_monday())
            % 7;
        let candidate = (after.date() + Duration::days(i64::from(days_ahead))).and_time(at);
        if candidate > after {
            candidate
        } else {
            candidate + Duration::weeks(1)
        }
    }
}

/// Which existing triggers a registration replaces.
pub fn superseded<'a>(existing: &'a [WeeklyTrigger], trigger: &WeeklyTrigger) -> Vec<&'a WeeklyTrigger> {
    existing
        .iter()
        .filter(|t| t.handler == trigger.handler)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn snapshot_trigger_fires_monday_at_eleven() {
        let trigger = WeeklyTrigger::weekly_snapshot();
        assert_eq!(trigger.handler, SNAPSHOT_HANDLER);
        // 2025-03-12 is a Wednesday
        assert_eq!(trigger.next_fire(at(2025, 3, 12, 8, 0)), at(2025, 3, 17, 11, 0));
        assert_eq!(trigger.next_fire(at(2025, 3, 17, 10, 59)), at(2025, 3, 17, 11, 0));
        assert_eq!(trigger.next_fire(at(2025, 3, 17, 11, 0)), at(2025, 3, 24, 11, 0));
    }

    #[test]
    fn registration_replaces_only_the_same_handler() {
        let existing = vec![
            WeeklyTrigger::weekly_snapshot(),
            WeeklyTrigger::new("send_tier2_instructor_emails", Weekday::Fri, 7),
            WeeklyTrigger::weekly_snapshot(),
        ];
        let replaced = superseded(&existing, &WeeklyTrigger::weekly_snapshot());
        assert_eq!(replaced.len(), 2);
        assert!(replaced.iter().all(|t| t.handler == SNAPSHOT_HANDLER));
    }
}
