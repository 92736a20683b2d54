use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;

/// One row of the hub roster.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub ineligible: bool,
    pub student_name: String,
    pub grade: i64,
    pub id: i64,
    pub case_manager: String,
    pub activity: String,
    pub unserved_detention: i64,
    pub total_detention: i64,
    pub discipline_detention: i64,
    pub attendance_detention: i64,
    pub is_failing: bool,
    pub failing_classes: String,
    pub num_f_grades: i64,
    pub unexcused_absences: i64,
    pub unexcused_tardies: i64,
    pub medical_absences: i64,
    pub illness_absences: i64,
    pub truancy_absences: i64,
    pub total_absences: i64,
    pub total_absence_days: String,
    pub attendance_letters: String,
    pub dishonesty_referrals: String,
    pub tier2_interventions: String,
    pub tier2_instructor: String,
    pub spartan_hour_total_requests: i64,
    pub spartan_hour_skipped_requests: i64,
    #[serde(rename = "spartanHourReqsHighPriority")]
    pub spartan_hour_reqs_high_priority: i64,
    pub total_club_meetings_attended: i64,
    pub clubs_attended: String,
    pub consecutive_weeks: i64,
    pub most_recent_spartan_hour_request: String,
}

impl Student {
    /// Lookup key shared by the supplementary sheets.
    pub fn key(&self) -> String {
        name_key(&self.student_name)
    }

    /// Failing classes as listed in the hub cell, one per line.
    pub fn failing_class_list(&self) -> Vec<&str> {
        self.failing_classes
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect()
    }
}

pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instructor {
    pub full_name: String,
    pub first_name: String,
    pub last_name_key: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Counselor {
    pub name: String,
    pub first_name: String,
    pub email: String,
    pub alpha_start: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseManager {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl CaseManager {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

/// A staff member who receives one of the weekly group reports.
#[derive(Debug, Clone, PartialEq)]
pub struct Recipient {
    pub name: String,
    pub first_name: String,
    pub email: String,
}

impl From<&Instructor> for Recipient {
    fn from(value: &Instructor) -> Self {
        Self {
            name: value.full_name.clone(),
            first_name: value.first_name.clone(),
            email: value.email.clone(),
        }
    }
}

impl From<&Counselor> for Recipient {
    fn from(value: &Counselor) -> Self {
        Self {
            name: value.name.clone(),
            first_name: value.first_name.clone(),
            email: value.email.clone(),
        }
    }
}

impl From<&CaseManager> for Recipient {
    fn from(value: &CaseManager) -> Self {
        Self {
            name: value.full_name(),
            first_name: value.first_name.clone(),
            email: value.email.clone(),
        }
    }
}

/// A row of the activity advisors sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvisorRow {
    /// 1-based sheet row, used to write back the send state.
    pub sheet_row: usize,
    pub activity: String,
    pub students: String,
    pub primary_email: String,
    pub secondary_email: String,
    pub other_emails: String,
    pub send: bool,
}

impl AdvisorRow {
    pub fn recipients(&self) -> Vec<String> {
        let mut recipients = Vec::new();
        for email in [&self.primary_email, &self.secondary_email] {
            if !email.trim().is_empty() {
                recipients.push(email.trim().to_string());
            }
        }
        recipients.extend(
            self.other_emails
                .split(',')
                .map(str::trim)
                .filter(|email| !email.is_empty())
                .map(str::to_string),
        );
        recipients
    }

    pub fn student_names(&self) -> Vec<&str> {
        self.students
            .lines()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .collect()
    }
}

/// Spartan Hour entries from the last seven days, already joined with `<br>`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecentActivity {
    pub requests: String,
    pub skipped: String,
    pub signups: String,
}

impl RecentActivity {
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty() && self.skipped.is_empty() && self.signups.is_empty()
    }

    pub fn merge(&mut self, other: RecentActivity) {
        append_line(&mut self.requests, other.requests);
        append_line(&mut self.skipped, other.skipped);
        append_line(&mut self.signups, other.signups);
    }
}

fn append_line(target: &mut String, addition: String) {
    if addition.is_empty() {
        return;
    }
    if target.is_empty() {
        *target = addition;
    } else {
        target.push_str("<br>");
        target.push_str(&addition);
    }
}

pub const PERIOD_LABELS: [&str; 9] = ["P0", "P1", "P2", "P3", "P4", "P5", "P6", "P7", "SpHr"];

/// Absences for periods 0 through 7 followed by Spartan Hour.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PeriodAbsences(pub [i64; 9]);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum Role {
    Admin,
    Teacher,
    Other(String),
}

impl Role {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "ADMIN" => Role::Admin,
            "TEACHER" => Role::Teacher,
            other => Role::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "ADMIN"),
            Role::Teacher => write!(f, "TEACHER"),
            Role::Other(role) => write!(f, "{role}"),
        }
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserInfo {
    pub email: String,
    pub name: String,
    pub role: Role,
}

/// A snapshot row read back into named metric values.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub snapshot_date: NaiveDateTime,
    pub formatted_date: String,
    #[serde(flatten)]
    pub metrics: BTreeMap<String, f64>,
}

impl Snapshot {
    pub fn metric(&self, key: &str) -> f64 {
        self.metrics.get(key).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotListEntry {
    pub date: NaiveDateTime,
    pub formatted_date: String,
    pub timestamp: i64,
}

/// Result of one report run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchOutcome {
    pub report: String,
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
    pub warnings: Vec<String>,
    pub aborted: Option<String>,
}

impl BatchOutcome {
    pub fn new(report: &str) -> Self {
        Self {
            report: report.to_string(),
            ..Self::default()
        }
    }

    pub fn success(&self) -> bool {
        self.aborted.is_none() && self.failed == 0
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(report = %self.report, "{message}");
        self.warnings.push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advisor_recipients_combine_all_address_columns() {
        let row = AdvisorRow {
            sheet_row: 2,
            activity: "Soccer".to_string(),
            students: "Lee, Avery\n\nMoreno, Jules".to_string(),
            primary_email: " coach@school.org ".to_string(),
            secondary_email: String::new(),
            other_emails: "a@school.org, b@school.org,".to_string(),
            send: true,
        };
        assert_eq!(
            row.recipients(),
            vec!["coach@school.org", "a@school.org", "b@school.org"]
        );
        assert_eq!(row.student_names(), vec!["Lee, Avery", "Moreno, Jules"]);
    }

    #[test]
    fn recent_activity_merges_with_line_breaks() {
        let mut first = RecentActivity {
            requests: "Math (3/4)".to_string(),
            ..RecentActivity::default()
        };
        first.merge(RecentActivity {
            requests: "Bio (3/5)".to_string(),
            skipped: "Chem (3/5)".to_string(),
            signups: String::new(),
        });
        assert_eq!(first.requests, "Math (3/4)<br>Bio (3/5)");
        assert_eq!(first.skipped, "Chem (3/5)");
        assert!(first.signups.is_empty());
    }

    #[test]
    fn roles_normalize_case() {
        assert_eq!(Role::parse(" admin "), Role::Admin);
        assert_eq!(Role::parse("Teacher"), Role::Teacher);
        assert_eq!(Role::parse("counselor").to_string(), "COUNSELOR");
    }

    #[test]
    fn outcome_success_requires_no_abort_and_no_failures() {
        let mut outcome = BatchOutcome::new("tier2");
        assert!(outcome.success());
        outcome.failed = 1;
        assert!(!outcome.success());
    }
}
