use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::{Datelike, Duration, NaiveDate};
use regex::Regex;

use crate::error::HubResult;
use crate::models::{name_key, RecentActivity};
use crate::reader::{read_records, SPARTAN_HOUR_SCHEMA};
use crate::sheet::{Workbook, SPARTAN_HOUR_SHEET};

pub const RECENT_WINDOW_DAYS: i64 = 7;

fn date_tag() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"\((\d{1,2})/(\d{1,2})\)").expect("valid date tag pattern"))
}

/// Resolves an `(M/D)` tag to this year, or last year when it would be in the future.
pub fn implied_date(entry: &str, today: NaiveDate) -> Option<NaiveDate> {
    let captures = date_tag().captures(entry)?;
    let month: u32 = captures.get(1)?.as_str().parse().ok()?;
    let day: u32 = captures.get(2)?.as_str().parse().ok()?;

    let date = NaiveDate::from_ymd_opt(today.year(), month, day)?;
    if date > today {
        NaiveDate::from_ymd_opt(today.year() - 1, month, day)
    } else {
        Some(date)
    }
}

/// Entries of a multi-value cell dated within the trailing window ending today.
pub fn recent_entries(cell: &str, today: NaiveDate) -> Vec<String> {
    let window_start = today - Duration::days(RECENT_WINDOW_DAYS);
    cell.split(['\n', ','])
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter(|entry| {
            implied_date(entry, today)
                .map(|date| date >= window_start && date <= today)
                .unwrap_or(false)
        })
        .map(str::to_string)
        .collect()
}

pub fn recent_joined(cell: &str, today: NaiveDate) -> String {
    recent_entries(cell, today).join("<br>")
}

/// The first listed request, whatever its date.
pub fn most_recent_entry(cell: &str) -> String {
    cell.split(['\n', ','])
        .next()
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}

/// Recent Spartan Hour activity keyed by normalized student name. Optional sheet.
pub fn read_recent_activity(
    workbook: &Workbook,
    today: NaiveDate,
) -> HubResult<HashMap<String, RecentActivity>> {
    let mut activity: HashMap<String, RecentActivity> = HashMap::new();
    let Some(sheet) = workbook.sheet(SPARTAN_HOUR_SHEET) else {
        return Ok(activity);
    };

    for record in read_records(sheet, SPARTAN_HOUR_SCHEMA)? {
        let recent = RecentActivity {
            requests: recent_joined(&record.text("requests"), today),
            skipped: recent_joined(&record.text("skipped"), today),
            signups: recent_joined(&record.text("signups"), today),
        };
        if recent.is_empty() {
            continue;
        }
        activity
            .entry(name_key(&record.text("studentName")))
            .or_default()
            .merge(recent);
    }

    Ok(activity)
}

/// First request per student, regardless of date.
pub fn read_latest_requests(workbook: &Workbook) -> HubResult<HashMap<String, String>> {
    let mut latest = HashMap::new();
    let Some(sheet) = workbook.sheet(SPARTAN_HOUR_SHEET) else {
        return Ok(latest);
    };
    for record in read_records(sheet, SPARTAN_HOUR_SCHEMA)? {
        if record.is_blank("requests") {
            continue;
        }
        latest.insert(
            name_key(&record.text("studentName")),
            most_recent_entry(&record.text("requests")),
        );
    }
    Ok(latest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::{CellValue, Sheet};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn window_includes_exactly_seven_trailing_days() {
        let today = day(2025, 3, 10);
        let cell = "Algebra (3/3)\nBiology (3/2), Chem (3/10)";
        assert_eq!(recent_entries(cell, today), vec!["Algebra (3/3)", "Chem (3/10)"]);
    }

    #[test]
    fn future_tags_roll_back_a_year() {
        let today = day(2025, 1, 3);
        assert_eq!(implied_date("Math (12/30)", today), Some(day(2024, 12, 30)));
        assert_eq!(recent_joined("Math (12/30)", today), "Math (12/30)");
        assert_eq!(implied_date("Math (1/4)", today), Some(day(2024, 1, 4)));
    }

    #[test]
    fn malformed_entries_degrade_to_not_recent() {
        let today = day(2025, 3, 10);
        let cell = "No tag here, Bad (13/40), Good (3/9)";
        assert_eq!(recent_joined(cell, today), "Good (3/9)");
        assert_eq!(recent_joined("", today), "");
    }

    #[test]
    fn most_recent_request_is_the_first_entry() {
        assert_eq!(most_recent_entry(" Math (3/9)\nBio (3/1)"), "Math (3/9)");
        assert_eq!(most_recent_entry(""), "");
    }

    #[test]
    fn rows_for_the_same_student_are_merged() {
        let today = day(2025, 3, 10);
        let mut sheet = Sheet::new(SPARTAN_HOUR_SHEET);
        sheet.set_values(1, 3, vec![vec!["Student".into()]]);
        sheet.set_value(2, 3, CellValue::text("Lee, Avery"));
        sheet.set_value(2, 8, CellValue::text("Math (3/9)"));
        sheet.set_value(3, 3, CellValue::text("lee, avery "));
        sheet.set_value(3, 8, CellValue::text("Bio (3/8), Old (1/2)"));
        sheet.set_value(3, 16, CellValue::text("Chem (3/7)"));
        sheet.set_value(4, 3, CellValue::text("Moreno, Jules"));
        sheet.set_value(4, 8, CellValue::text("Old (1/2)"));
        let mut workbook = Workbook::new();
        workbook.load_sheet(sheet);

        let activity = read_recent_activity(&workbook, today).unwrap();
        assert_eq!(activity.len(), 1);
        let avery = &activity["lee, avery"];
        assert_eq!(avery.requests, "Math (3/9)<br>Bio (3/8)");
        assert_eq!(avery.skipped, "Chem (3/7)");
        assert!(avery.signups.is_empty());
    }
}
