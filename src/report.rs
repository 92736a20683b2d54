use std::collections::HashMap;

use chrono::NaiveDateTime;

use crate::activity::read_recent_activity;
use crate::error::HubResult;
use crate::matcher::{collate, collation_key, AlphaRangeRouter, CaseManagerRouter, LastNameRouter, Route, Router};
use crate::models::{name_key, BatchOutcome, Recipient, Student};
use crate::notify::{deliver, Mailer, OutgoingEmail};
use crate::reader::{
    read_absences, read_admin_emails, read_admin_names, read_advisor_rows, read_case_managers,
    read_counselors, read_instructors, read_students,
};
use crate::render::{self, EligibilityEntry};
use crate::sheet::{CellValue, Workbook, ADMIN_SETTINGS_SHEET, ADVISORS_SHEET, HUB_SHEET};

pub const SEND_COLUMN: usize = 9;
pub const SENT_AT_COLUMN: usize = 10;

pub struct RunContext<'a> {
    pub now: NaiveDateTime,
    pub mailer: &'a mut dyn Mailer,
    pub spreadsheet_url: Option<String>,
}

/// How a staff digest lays out its students.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Cards { intro: &'static str },
    CounselorTable,
}

/// One weekly staff digest: who receives it, how students are routed, how it looks.
pub struct StaffReport<R: Router> {
    pub name: &'static str,
    pub subject: &'static str,
    pub recipients: Vec<Recipient>,
    pub router: R,
    pub include: fn(&Student) -> bool,
    pub layout: Layout,
}

/// Runs a report body, turning a configuration error into an aborted outcome.
pub fn run_report(
    name: &str,
    body: impl FnOnce(&mut BatchOutcome) -> HubResult<()>,
) -> BatchOutcome {
    let mut outcome = BatchOutcome::new(name);
    if let Err(err) = body(&mut outcome) {
        tracing::error!(report = name, error = %err, "report aborted");
        outcome.aborted = Some(err.to_string());
    }
    outcome
}

pub fn run_staff_report<R: Router>(
    workbook: &Workbook,
    report: &StaffReport<R>,
    ctx: &mut RunContext<'_>,
    outcome: &mut BatchOutcome,
) -> HubResult<()> {
    let today = ctx.now.date();
    let students: Vec<Student> = read_students(workbook)?
        .into_iter()
        .filter(|s| (report.include)(s))
        .collect();
    let activity = read_recent_activity(workbook, today)?;
    let absences = read_absences(workbook)?;

    let mut groups: Vec<Vec<&Student>> = vec![Vec::new(); report.recipients.len()];
    for student in &students {
        match report.router.route(student) {
            Route::To(idx) => groups[idx].push(student),
            Route::Drop => {}
            Route::Unresolved(message) => outcome.warn(message),
        }
    }

    for (recipient, mut group) in report.recipients.iter().zip(groups) {
        if group.is_empty() {
            tracing::info!(report = report.name, recipient = %recipient.name, "no students to report, skipping email");
            outcome.skipped += 1;
            continue;
        }
        group.sort_by(|a, b| collate(&a.student_name, &b.student_name));

        let html_body = match report.layout {
            Layout::Cards { intro } => {
                let cards: String = group
                    .iter()
                    .map(|s| {
                        let key = s.key();
                        render::student_card(
                            s,
                            &activity.get(&key).cloned().unwrap_or_default(),
                            &absences.get(&key).copied().unwrap_or_default(),
                        )
                    })
                    .collect();
                render::card_digest_email(&recipient.first_name, intro, &cards)
            }
            Layout::CounselorTable => {
                let rows: String = group
                    .iter()
                    .map(|s| {
                        render::counselor_row(s, &activity.get(&s.key()).cloned().unwrap_or_default())
                    })
                    .collect();
                render::counselor_email(&recipient.first_name, ctx.now, &rows)
            }
        };

        let email = OutgoingEmail {
            to: recipient.email.clone(),
            subject: format!("{} - {}", report.subject, render::subject_date(ctx.now)),
            html_body,
        };
        tracing::info!(report = report.name, recipient = %recipient.name, students = group.len(), "sending digest");
        deliver(ctx.mailer, &recipient.name, &email, outcome);
    }
    Ok(())
}

fn has_text(value: &str) -> bool {
    !value.trim().is_empty()
}

fn require_staff_sheets(workbook: &Workbook) -> HubResult<()> {
    workbook.require(ADMIN_SETTINGS_SHEET)?;
    workbook.require(HUB_SHEET)?;
    Ok(())
}

pub fn send_tier2_instructor_emails(workbook: &Workbook, ctx: &mut RunContext<'_>) -> BatchOutcome {
    run_report("tier2", |outcome| {
        require_staff_sheets(workbook)?;
        let instructors = read_instructors(workbook)?;
        if instructors.is_empty() {
            outcome.warn("no valid Tier 2 instructor entries found");
            return Ok(());
        }
        let report = StaffReport {
            name: "tier2",
            subject: "Weekly Tier 2 Summary",
            router: LastNameRouter::new(&instructors),
            recipients: instructors.iter().map(Recipient::from).collect(),
            include: |s| has_text(&s.tier2_instructor),
            layout: Layout::Cards {
                intro: "Here is the weekly summary for the students you serve in tier 2:",
            },
        };
        run_staff_report(workbook, &report, ctx, outcome)
    })
}

pub fn send_counselor_summary_emails(workbook: &Workbook, ctx: &mut RunContext<'_>) -> BatchOutcome {
    run_report("counselor", |outcome| {
        require_staff_sheets(workbook)?;
        let mut counselors = read_counselors(workbook)?;
        if counselors.is_empty() {
            outcome.warn("no valid counselor entries found");
            return Ok(());
        }
        counselors.sort_by_key(|c| collation_key(&c.alpha_start));
        let report = StaffReport {
            name: "counselor",
            subject: "Weekly Academic Summary for Your Alpha List",
            router: AlphaRangeRouter::new(&counselors),
            recipients: counselors.iter().map(Recipient::from).collect(),
            include: |s| has_text(&s.failing_classes),
            layout: Layout::CounselorTable,
        };
        run_staff_report(workbook, &report, ctx, outcome)
    })
}

pub fn send_case_manager_summary_emails(
    workbook: &Workbook,
    ctx: &mut RunContext<'_>,
) -> BatchOutcome {
    run_report("case-manager", |outcome| {
        require_staff_sheets(workbook)?;
        let case_managers = read_case_managers(workbook)?;
        if case_managers.is_empty() {
            outcome.warn("no case manager data found in Admin Settings C:E");
            return Ok(());
        }
        tracing::info!(count = case_managers.len(), "found case managers");
        let report = StaffReport {
            name: "case-manager",
            subject: "Weekly Caseload Summary",
            router: CaseManagerRouter::new(&case_managers),
            recipients: case_managers.iter().map(Recipient::from).collect(),
            include: |s| has_text(&s.case_manager),
            layout: Layout::Cards {
                intro: "Here is the weekly summary for the students on your caseload:",
            },
        };
        run_staff_report(workbook, &report, ctx, outcome)
    })
}

/// Per-activity alerts for every advisors row with its Send box checked.
pub fn send_ineligibility_notifications(
    workbook: &mut Workbook,
    ctx: &mut RunContext<'_>,
) -> BatchOutcome {
    run_report("ineligibility-notices", |outcome| {
        let rows = read_advisor_rows(workbook)?;
        let contact = render::contact_message(&read_admin_names(workbook)?);
        let mut updates: Vec<(usize, usize, CellValue)> = Vec::new();

        for row in rows.iter().filter(|row| row.send) {
            let students = row.student_names();
            if students.is_empty() {
                updates.push((row.sheet_row, SEND_COLUMN, CellValue::Bool(false)));
                outcome.skipped += 1;
                outcome.warn(format!(
                    "row {}: skipped, no students listed; box unchecked",
                    row.sheet_row
                ));
                continue;
            }
            let recipients = row.recipients();
            if recipients.is_empty() {
                updates.push((row.sheet_row, SEND_COLUMN, CellValue::Bool(false)));
                outcome.skipped += 1;
                outcome.warn(format!(
                    "row {}: skipped, no recipient emails for '{}'; box unchecked",
                    row.sheet_row, row.activity
                ));
                continue;
            }

            let email = OutgoingEmail {
                to: recipients.join(","),
                subject: format!("Ineligible Students for {}", row.activity),
                html_body: render::ineligibility_alert(&row.activity, &students, ctx.now, &contact),
            };
            if deliver(ctx.mailer, &row.activity, &email, outcome) {
                updates.push((row.sheet_row, SENT_AT_COLUMN, CellValue::DateTime(ctx.now)));
                updates.push((row.sheet_row, SEND_COLUMN, CellValue::Bool(false)));
            }
        }

        if !updates.is_empty() {
            if let Some(sheet) = workbook.sheet_mut(ADVISORS_SHEET) {
                for (row, column, value) in updates {
                    sheet.set_value(row, column, value);
                }
            }
        }
        Ok(())
    })
}

/// Ineligible (2+ failing classes) and at-risk (exactly 1) activity members.
pub fn classify_eligibility(
    workbook: &Workbook,
) -> HubResult<(Vec<EligibilityEntry>, Vec<EligibilityEntry>)> {
    let failures: HashMap<String, (usize, String)> = read_students(workbook)?
        .iter()
        .filter_map(|s| {
            let classes = s.failing_class_list();
            (!classes.is_empty()).then(|| (s.key(), (classes.len(), classes.join("\n"))))
        })
        .collect();

    let mut ineligible = Vec::new();
    let mut at_risk = Vec::new();
    for row in read_advisor_rows(workbook)? {
        if row.activity.is_empty() {
            continue;
        }
        for name in row.student_names() {
            let Some((count, classes)) = failures.get(&name_key(name)) else {
                continue;
            };
            let entry = EligibilityEntry {
                student: name.to_string(),
                activity: row.activity.clone(),
                classes: classes.clone(),
            };
            match *count {
                1 => at_risk.push(entry),
                _ => ineligible.push(entry),
            }
        }
    }

    let by_activity_then_student = |a: &EligibilityEntry, b: &EligibilityEntry| {
        collate(&a.activity, &b.activity).then_with(|| collate(&a.student, &b.student))
    };
    ineligible.sort_by(by_activity_then_student);
    at_risk.sort_by(by_activity_then_student);
    Ok((ineligible, at_risk))
}

pub fn send_ineligibility_summary(workbook: &Workbook, ctx: &mut RunContext<'_>) -> BatchOutcome {
    run_report("eligibility-summary", |outcome| {
        workbook.require(HUB_SHEET)?;
        workbook.require(ADVISORS_SHEET)?;

        let (ineligible, at_risk) = classify_eligibility(workbook)?;
        if ineligible.is_empty() && at_risk.is_empty() {
            tracing::info!("no ineligible or at-risk students to report");
            outcome.skipped += 1;
            return Ok(());
        }

        let recipients = read_admin_emails(workbook)?;
        if recipients.is_empty() {
            outcome.warn("no administrator emails found to send the summary to");
            return Ok(());
        }

        let email = OutgoingEmail {
            to: recipients.join(","),
            subject: format!("Eligibility Report - {}", render::subject_date(ctx.now)),
            html_body: render::eligibility_summary(
                &ineligible,
                &at_risk,
                ctx.now,
                ctx.spreadsheet_url.as_deref(),
            ),
        };
        deliver(ctx.mailer, "administrators", &email, outcome);
        Ok(())
    })
}
