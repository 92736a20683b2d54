use std::fmt::Write;

use chrono::NaiveDateTime;

use crate::error::HubResult;
use crate::models::{PeriodAbsences, RecentActivity, Student, UserInfo, PERIOD_LABELS};

const FOOTER: &str = "This is an automated notification from the OHS Academics &amp; Attendance Hub.";

pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Escapes each line and rejoins them with `separator`.
fn escape_lines(value: &str, separator: &str) -> String {
    value
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(escape_html)
        .collect::<Vec<_>>()
        .join(separator)
}

/// Escapes `<br>`-joined activity entries without escaping the separators.
fn escape_activity(value: &str) -> String {
    value
        .split("<br>")
        .map(escape_html)
        .collect::<Vec<_>>()
        .join("<br>")
}

pub fn subject_date(now: NaiveDateTime) -> String {
    now.format("%B %-d, %Y").to_string()
}

pub fn body_timestamp(now: NaiveDateTime) -> String {
    now.format("%B %-d, %Y at %-I:%M %p").to_string()
}

pub fn absence_color(absences: i64) -> &'static str {
    if absences >= 5 {
        "#f8d7da"
    } else if absences >= 3 {
        "#fff3cd"
    } else {
        "#ffffff"
    }
}

fn or_zero(value: &str) -> String {
    if value.is_empty() {
        "0".to_string()
    } else {
        escape_activity(value)
    }
}

/// One student card for the Tier-2 and caseload digests.
pub fn student_card(
    student: &Student,
    activity: &RecentActivity,
    absences: &PeriodAbsences,
) -> String {
    let failing = student.failing_class_list();
    let is_failing = !failing.is_empty();
    let failing_text = if is_failing {
        failing.iter().map(|c| escape_html(c)).collect::<Vec<_>>().join(", ")
    } else {
        "None".to_string()
    };
    let border = if is_failing { "#d9534f" } else { "#ddd" };
    let failing_color = if is_failing { "#d9534f" } else { "inherit" };
    let detention_bg = if student.unserved_detention > 0 {
        "#fff3cd"
    } else {
        "transparent"
    };

    let mut html = String::new();
    let _ = write!(
        html,
        r#"<div style="border: 1px solid {border}; border-radius: 8px; margin-bottom: 20px; padding: 16px; background-color: #f9f9f9;">"#
    );
    let _ = write!(
        html,
        r#"<h3 style="margin: 0 0 12px; font-size: 20px; color: #333;">{}</h3>"#,
        escape_html(&student.student_name)
    );
    html.push_str(r#"<table style="width: 100%;"><tr><td style="width: 50%; vertical-align: top;">"#);
    let _ = write!(
        html,
        r#"<p style="margin: 0 0 8px;"><strong>Grade:</strong> {}</p>"#,
        student.grade
    );
    let _ = write!(
        html,
        r#"<p style="margin: 0 0 8px;"><strong>Failing Classes:</strong> <span style="color: {failing_color}">{failing_text}</span></p>"#
    );
    let _ = write!(
        html,
        r#"<p style="margin: 0 0 8px;"><strong>Consecutive Weeks on D/F List:</strong> {}</p>"#,
        student.consecutive_weeks
    );
    let _ = write!(
        html,
        r#"<p style="margin: 0 0 16px;"><strong>Unserved Detention:</strong> <span style="background-color: {detention_bg}; padding: 2px 5px;">{} hours</span></p>"#,
        student.unserved_detention
    );
    html.push_str(r#"</td><td style="width: 50%; vertical-align: top;">"#);
    html.push_str(r#"<h4 style="margin: 0 0 8px; font-size: 16px; color: #555;">Spartan Hour Summary (Last 7 Days)</h4>"#);
    html.push_str(r#"<ul style="margin: 0; padding-left: 20px; list-style-type: none;">"#);
    let _ = write!(html, "<li><strong>Requests:</strong> {}</li>", or_zero(&activity.requests));
    let _ = write!(html, "<li><strong>Sign-ups:</strong> {}</li>", or_zero(&activity.signups));
    let _ = write!(
        html,
        "<li><strong>Skipped Sessions:</strong> {}</li>",
        or_zero(&activity.skipped)
    );
    html.push_str("</ul></td></tr></table>");

    html.push_str(r#"<h4 style="margin: 16px 0 8px; font-size: 16px; color: #555;">Absences by Period</h4>"#);
    html.push_str(r#"<table style="width: 100%; border-collapse: collapse; text-align: center;"><thead><tr style="background-color: #eee;">"#);
    for label in PERIOD_LABELS {
        let _ = write!(html, r#"<th style="padding: 4px; border: 1px solid #ddd;">{label}</th>"#);
    }
    html.push_str("</tr></thead><tbody><tr>");
    for count in absences.0 {
        let _ = write!(
            html,
            r#"<td style="padding: 4px; border: 1px solid #ddd; background-color: {};">{count}</td>"#,
            absence_color(count)
        );
    }
    html.push_str("</tr></tbody></table></div>");
    html
}

/// Full digest document wrapping a list of student cards.
pub fn card_digest_email(first_name: &str, intro: &str, cards: &str) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html><html><body style=\"margin: 0; padding: 20px; background-color: #f0f0f0; font-family: Arial, sans-serif;\">");
    html.push_str("<div style=\"max-width: 800px; margin: auto; background-color: #ffffff; padding: 40px; border-radius: 8px;\">");
    html.push_str("<h1 style=\"font-size: 24px; margin: 0 0 20px; color: #4356a0;\">Weekly Student Summary</h1>");
    let _ = write!(
        html,
        "<p style=\"margin: 0 0 20px; font-size: 16px;\">Hi {},</p>",
        escape_html(first_name)
    );
    let _ = write!(
        html,
        "<p style=\"margin: 0 0 30px; font-size: 16px;\">{}</p>",
        escape_html(intro)
    );
    html.push_str(cards);
    let _ = write!(
        html,
        "<p style=\"margin-top: 30px; font-size: 12px; color: #7f8c8d; text-align: center;\">{FOOTER}</p>"
    );
    html.push_str("</div></body></html>");
    html
}

const CELL: &str = "padding: 8px 12px; border-bottom: 1px solid #ddd; font-size: 12px;";

/// One table row of the counselor digest.
pub fn counselor_row(student: &Student, activity: &RecentActivity) -> String {
    let classes: String = student
        .failing_class_list()
        .iter()
        .map(|c| format!("<div style=\"white-space: nowrap;\">{}</div>", escape_html(c)))
        .collect();
    let mut html = String::from("<tr>");
    let _ = write!(html, "<td style=\"{CELL}\">{}</td>", escape_html(&student.student_name));
    let _ = write!(html, "<td style=\"{CELL} text-align: center;\">{}</td>", student.grade);
    let _ = write!(html, "<td style=\"{CELL}\">{classes}</td>");
    let _ = write!(
        html,
        "<td style=\"{CELL} text-align: center;\">{}</td>",
        student.unserved_detention
    );
    let _ = write!(
        html,
        "<td style=\"{CELL} text-align: center;\">{}</td>",
        student.total_absences
    );
    let _ = write!(
        html,
        "<td style=\"{CELL} text-align: center;\">{}</td>",
        student.consecutive_weeks
    );
    let _ = write!(html, "<td style=\"{CELL}\">{}</td>", escape_activity(&activity.requests));
    let _ = write!(html, "<td style=\"{CELL}\">{}</td>", escape_activity(&activity.skipped));
    html.push_str("</tr>");
    html
}

const COUNSELOR_COLUMNS: [&str; 8] = [
    "Student Name",
    "Grade",
    "Failing Class(es)",
    "Unserved Detention",
    "Total Absences",
    "Consecutive Weeks on D/F List",
    "Spartan Hour Request (Past 7 days)",
    "Skipped Session(s) (Past 7 days)",
];

pub fn counselor_email(first_name: &str, now: NaiveDateTime, rows: &str) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html><html><body style=\"margin: 0; padding: 0; background-color: #f0f0f0; font-family: Arial, sans-serif;\">");
    html.push_str("<table align=\"center\" width=\"800\" style=\"border-collapse: collapse; background-color: #ffffff;\">");
    html.push_str("<tr><td align=\"center\" style=\"padding: 40px 0 30px 0; background-color: #4356a0; color: #ffffff;\"><h1 style=\"font-size: 24px; margin: 0;\">Weekly Academic Summary Report</h1></td></tr>");
    html.push_str("<tr><td style=\"padding: 20px 30px 40px 30px; color: #153643; font-size: 14px;\">");
    let _ = write!(html, "<p style=\"margin: 0;\">Hi {},</p>", escape_html(first_name));
    let _ = write!(
        html,
        "<p style=\"margin: 15px 0 10px 0;\">As of <strong>{}</strong>, the following students in your alpha list are failing one or more classes:</p>",
        body_timestamp(now)
    );
    html.push_str("<table width=\"100%\" style=\"border-collapse: collapse; border: 1px solid #ddd;\"><thead><tr style=\"background-color: #f2f2f2;\">");
    for column in COUNSELOR_COLUMNS {
        let _ = write!(
            html,
            "<th style=\"padding: 10px 12px; text-align: left; font-size: 10px;\">{column}</th>"
        );
    }
    let _ = write!(html, "</tr></thead><tbody>{rows}</tbody></table>");
    html.push_str("</td></tr>");
    let _ = write!(
        html,
        "<tr><td style=\"padding: 20px 30px; background-color: #ecf0f1; text-align: center; font-size: 12px; color: #7f8c8d;\">{FOOTER}</td></tr>"
    );
    html.push_str("</table></body></html>");
    html
}

/// Closing line naming whom to contact, in natural list form.
pub fn contact_message(admin_names: &[String]) -> String {
    let names: Vec<String> = admin_names.iter().map(|n| escape_html(n)).collect();
    match names.as_slice() {
        [] => "If you have any questions, please contact a school administrator for additional information.".to_string(),
        [only] => format!("If you have any questions, please contact {only} for additional information."),
        [first, second] => format!(
            "If you have any questions, please contact {first} or {second} for additional information."
        ),
        [rest @ .., last] => format!(
            "If you have any questions, please contact {}, or {last} for additional information.",
            rest.join(", ")
        ),
    }
}

pub fn ineligibility_alert(
    activity: &str,
    students: &[&str],
    sent_at: NaiveDateTime,
    contact: &str,
) -> String {
    let rows: String = students
        .iter()
        .map(|name| {
            format!(
                "<tr><td style=\"padding: 8px 12px; border-bottom: 1px solid #ddd; background-color: #f9f9f9; font-size: 14px;\">{}</td></tr>",
                escape_html(name)
            )
        })
        .collect();

    let mut html = String::new();
    html.push_str("<!DOCTYPE html><html><body style=\"margin: 0; padding: 0; background-color: #f0f0f0; font-family: Arial, sans-serif;\">");
    html.push_str("<table align=\"center\" width=\"600\" style=\"border-collapse: collapse; background-color: #ffffff;\">");
    html.push_str("<tr><td align=\"center\" style=\"padding: 40px 0 30px 0; background-color: #2c3e50; color: #ffffff;\"><h1 style=\"font-size: 24px; margin: 0;\">Ineligibility Alert</h1></td></tr>");
    html.push_str("<tr><td style=\"padding: 20px 30px 40px 30px;\">");
    let _ = write!(
        html,
        "<p>Hello,</p><p>As of <strong>{}</strong>, the following students are currently flagged as ineligible for <strong>{}</strong>:</p>",
        body_timestamp(sent_at),
        escape_html(activity)
    );
    let _ = write!(
        html,
        "<table width=\"100%\" style=\"border-collapse: collapse; border: 1px solid #ddd;\">{rows}</table>"
    );
    let _ = write!(html, "<p style=\"margin-top: 20px;\">{contact}</p>");
    html.push_str("<p style=\"margin-top: 20px; font-size: 12px; color: #888;\">This is an automated notification. Please do not reply directly to this email.</p>");
    html.push_str("</td></tr><tr><td style=\"padding: 20px 30px; background-color: #ecf0f1; text-align: center; font-size: 12px; color: #7f8c8d;\">This notification was generated by the school's eligibility tracking system.</td></tr>");
    html.push_str("</table></body></html>");
    html
}

/// A student listed under an activity in the eligibility summary.
#[derive(Debug, Clone, PartialEq)]
pub struct EligibilityEntry {
    pub student: String,
    pub activity: String,
    pub classes: String,
}

struct Section<'a> {
    title: &'a str,
    background: &'a str,
    color: &'a str,
    accent: &'a str,
}

const INELIGIBLE_SECTION: Section<'static> = Section {
    title: "Ineligible: Students Failing 2 or More Classes",
    background: "#f8d7da",
    color: "#721c24",
    accent: "#d9534f",
};

const AT_RISK_SECTION: Section<'static> = Section {
    title: "At-Risk: Students Failing 1 Class",
    background: "#fff3cd",
    color: "#856404",
    accent: "#ffc107",
};

fn eligibility_section(html: &mut String, section: &Section<'_>, entries: &[EligibilityEntry]) {
    if entries.is_empty() {
        return;
    }
    let _ = write!(
        html,
        "<div style=\"margin-bottom: 30px;\"><div style=\"background-color: {}; color: {}; padding: 12px; border-left: 5px solid {}; margin-bottom: 10px;\"><h2 style=\"margin: 0; font-size: 18px;\">{}</h2></div>",
        section.background, section.color, section.accent, section.title
    );
    let _ = write!(
        html,
        "<table width=\"100%\" style=\"border-collapse: collapse; border: 1px solid #ddd; border-left: 5px solid {};\"><thead><tr style=\"background-color: #f2f2f2;\"><th style=\"padding: 10px 12px; text-align: left; width: 30%;\">Student Name</th><th style=\"padding: 10px 12px; text-align: left; width: 30%;\">Activity</th><th style=\"padding: 10px 12px; text-align: left; width: 40%;\">Classes with Failing Grade</th></tr></thead><tbody>",
        section.accent
    );
    for (idx, entry) in entries.iter().enumerate() {
        let background = if idx % 2 == 0 { "#ffffff" } else { "#f9f9f9" };
        let cell = format!("padding: 8px 12px; border-bottom: 1px solid #ddd; background-color: {background}; font-size: 14px;");
        let _ = write!(
            html,
            "<tr><td style=\"{cell}\">{}</td><td style=\"{cell}\">{}</td><td style=\"{cell}\">{}</td></tr>",
            escape_html(&entry.student),
            escape_html(&entry.activity),
            escape_lines(&entry.classes, "<br>")
        );
    }
    html.push_str("</tbody></table></div>");
}

pub fn eligibility_summary(
    ineligible: &[EligibilityEntry],
    at_risk: &[EligibilityEntry],
    now: NaiveDateTime,
    spreadsheet_url: Option<&str>,
) -> String {
    let mut sections = String::new();
    eligibility_section(&mut sections, &INELIGIBLE_SECTION, ineligible);
    eligibility_section(&mut sections, &AT_RISK_SECTION, at_risk);

    let mut html = String::new();
    html.push_str("<!DOCTYPE html><html><body style=\"margin: 0; padding: 0; background-color: #f0f0f0; font-family: Arial, sans-serif;\">");
    html.push_str("<table align=\"center\" width=\"600\" style=\"border-collapse: collapse; background-color: #ffffff;\">");
    html.push_str("<tr><td align=\"center\" style=\"padding: 40px 0 30px 0; background-color: #2c3e50; color: #ffffff;\"><h1 style=\"font-size: 24px; margin: 0;\">Academic Eligibility Summary</h1></td></tr>");
    html.push_str("<tr><td style=\"padding: 20px 30px 40px 30px; color: #153643; font-size: 16px;\">");
    let _ = write!(
        html,
        "<p style=\"margin: 0;\">Hello,</p><p style=\"margin: 15px 0 25px 0;\">As of <strong>{}</strong>, here is the summary of students currently flagged for academic reasons:</p>",
        subject_date(now)
    );
    html.push_str(&sections);
    if let Some(url) = spreadsheet_url {
        let _ = write!(
            html,
            "<p style=\"padding: 30px 30px 10px 30px; text-align: center;\"><a href=\"{}\" target=\"_blank\" style=\"font-size: 16px; color: #ffffff; text-decoration: none; background-color: #4356a0; padding: 15px 25px; border-radius: 8px; display: inline-block; font-weight: bold;\">View detailed information on the OHS Academic Standing &amp; Attendance Hub</a></p>",
            escape_html(url)
        );
    }
    html.push_str("</td></tr><tr><td style=\"padding: 20px 30px; background-color: #ecf0f1; text-align: center; font-size: 12px; color: #7f8c8d;\">This summary was generated automatically by the school's eligibility tracking system.</td></tr>");
    html.push_str("</table></body></html>");
    html
}

pub fn access_denied_page(email: Option<&str>) -> String {
    let email = escape_html(email.filter(|e| !e.trim().is_empty()).unwrap_or("Unknown"));
    let mut html = String::new();
    html.push_str("<!DOCTYPE html><html><head><meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\"><title>Access Denied</title>");
    html.push_str("<style>body{font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,sans-serif;display:flex;justify-content:center;align-items:center;min-height:100vh;margin:0;background-color:#f3f4f6}.container{text-align:center;padding:2rem;background:white;border-radius:8px;max-width:400px}h1{color:#dc2626}.email{font-weight:bold;color:#1f2937}.contact{margin-top:1.5rem;font-size:.875rem;color:#6b7280}</style></head>");
    html.push_str("<body><div class=\"container\"><h1>Access Denied</h1><p>You do not have permission to access this dashboard.</p>");
    let _ = write!(html, "<p>Your email: <span class=\"email\">{email}</span></p>");
    html.push_str("<p class=\"contact\">Please contact an administrator if you believe you should have access.</p></div></body></html>");
    html
}

/// Keeps embedded JSON from closing its script element.
fn escape_json_for_script(json: &str) -> String {
    json.replace("</", "<\\/")
}

/// The dashboard with the caller's identity and the data they may see embedded.
pub fn dashboard_page(
    user: &UserInfo,
    students_json: &str,
    history_json: &str,
) -> HubResult<String> {
    let user_json = serde_json::to_string(user)?;
    let mut html = String::with_capacity(8_192);
    html.push_str("<!DOCTYPE html><html><head><meta charset=\"utf-8\"><meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">");
    html.push_str("<title>OHS Academics &amp; Attendance Dashboard</title>");
    html.push_str("<style>body{font-family:Arial,sans-serif;margin:0;background:#f3f4f6}header{background:#4356a0;color:#fff;padding:16px 24px}main{padding:24px}.kpis{display:flex;flex-wrap:wrap;gap:16px}.kpi{background:#fff;border-radius:8px;padding:16px;min-width:160px}.kpi-value{font-size:28px;font-weight:bold}table{border-collapse:collapse;width:100%;background:#fff;margin-top:24px}td,th{border-bottom:1px solid #ddd;padding:6px 10px;text-align:left;font-size:13px}</style></head><body>");
    let _ = write!(
        html,
        "<header><h1 style=\"margin:0;font-size:22px\">OHS Academics &amp; Attendance Dashboard</h1><div data-user-role=\"{}\" data-user-email=\"{}\">Signed in as {} ({})</div></header>",
        escape_html(&user.role.to_string()),
        escape_html(&user.email),
        escape_html(if user.name.is_empty() { &user.email } else { &user.name }),
        escape_html(&user.role.to_string())
    );
    html.push_str("<main><section class=\"kpis\" id=\"kpis\"></section><table id=\"students\"><thead></thead><tbody></tbody></table></main>");
    let _ = write!(
        html,
        "<script>const USER={};const STUDENTS={};const HISTORY={};</script>",
        escape_json_for_script(&user_json),
        escape_json_for_script(students_json),
        escape_json_for_script(history_json)
    );
    html.push_str(DASHBOARD_SCRIPT);
    html.push_str("</body></html>");
    Ok(html)
}

const DASHBOARD_SCRIPT: &str = r#"<script>
(function () {
  const kpis = document.getElementById('kpis');
  const total = STUDENTS.length;
  const ineligible = STUDENTS.filter(s => s.ineligible).length;
  const rate = total > 0 ? (ineligible / total * 100).toFixed(1) : '0.0';
  const absences = STUDENTS.reduce((sum, s) => sum + s.totalAbsences, 0);
  [['Students', total], ['Ineligible', ineligible], ['Ineligibility Rate', rate + '%'], ['Total Absences', absences]]
    .forEach(([label, value]) => {
      const card = document.createElement('div');
      card.className = 'kpi';
      card.innerHTML = '<div class="kpi-label"></div><div class="kpi-value"></div>';
      card.children[0].textContent = label;
      card.children[1].textContent = value;
      kpis.appendChild(card);
    });
  const columns = ['studentName', 'grade', 'ineligible', 'numFGrades', 'totalAbsences', 'unservedDetention'];
  const head = document.querySelector('#students thead');
  const body = document.querySelector('#students tbody');
  const headRow = head.insertRow();
  columns.forEach(c => { const th = document.createElement('th'); th.textContent = c; headRow.appendChild(th); });
  STUDENTS.forEach(s => {
    const row = body.insertRow();
    columns.forEach(c => { row.insertCell().textContent = s[c]; });
  });
})();
</script>"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn dates_use_long_month_format() {
        let now = at(2025, 3, 4, 14, 5);
        assert_eq!(subject_date(now), "March 4, 2025");
        assert_eq!(body_timestamp(now), "March 4, 2025 at 2:05 PM");
    }

    #[test]
    fn card_highlights_failing_classes_and_absences() {
        let student = Student {
            student_name: "Lee, <Avery>".to_string(),
            failing_classes: "Algebra I\nBiology".to_string(),
            unserved_detention: 2,
            ..Student::default()
        };
        let activity = RecentActivity {
            requests: "Math (3/3)<br>Bio (3/4)".to_string(),
            ..RecentActivity::default()
        };
        let absences = PeriodAbsences([0, 3, 5, 0, 0, 0, 0, 0, 1]);
        let html = student_card(&student, &activity, &absences);
        assert!(html.contains("Lee, &lt;Avery&gt;"));
        assert!(html.contains("Algebra I, Biology"));
        assert!(html.contains("#d9534f"));
        assert!(html.contains("Math (3/3)<br>Bio (3/4)"));
        assert!(html.contains("<strong>Skipped Sessions:</strong> 0"));
        assert!(html.contains("background-color: #f8d7da;\">5</td>"));
        assert!(html.contains("background-color: #fff3cd;\">3</td>"));
    }

    #[test]
    fn card_without_failing_classes_says_none() {
        let html = student_card(
            &Student::default(),
            &RecentActivity::default(),
            &PeriodAbsences::default(),
        );
        assert!(html.contains("None"));
        assert!(html.contains("border: 1px solid #ddd"));
    }

    #[test]
    fn contact_message_lists_admins_naturally() {
        let names = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert!(contact_message(&[]).contains("a school administrator"));
        assert!(contact_message(&names(&["Dana"])).contains("contact Dana for"));
        assert!(contact_message(&names(&["Dana", "Lou"])).contains("contact Dana or Lou for"));
        assert!(contact_message(&names(&["Dana", "Lou", "Kim"])).contains("contact Dana, Lou, or Kim for"));
    }

    #[test]
    fn access_denied_escapes_the_email() {
        let html = access_denied_page(Some("<x>@school.org"));
        assert!(html.contains("&lt;x&gt;@school.org"));
        assert!(access_denied_page(None).contains("Unknown"));
    }

    #[test]
    fn eligibility_summary_omits_empty_sections() {
        let entry = EligibilityEntry {
            student: "Lee, Avery".to_string(),
            activity: "Soccer".to_string(),
            classes: "Algebra I\nBiology".to_string(),
        };
        let html = eligibility_summary(&[entry], &[], at(2025, 3, 4, 9, 0), None);
        assert!(html.contains("Ineligible: Students Failing 2 or More Classes"));
        assert!(!html.contains("At-Risk"));
        assert!(html.contains("Algebra I<br>Biology"));
        assert!(!html.contains("<a href"));
    }

    #[test]
    fn dashboard_embeds_user_and_data() {
        let user = UserInfo {
            email: "dcruz@school.org".to_string(),
            name: "Dana Cruz".to_string(),
            role: Role::Admin,
        };
        let html = dashboard_page(&user, "[{\"note\":\"</script>\"}]", "{}").unwrap();
        assert!(html.contains("\"role\":\"ADMIN\""));
        assert!(html.contains("Signed in as Dana Cruz (ADMIN)"));
        assert!(html.contains("<\\/script>"));
    }

    #[test]
    fn dashboard_user_is_embedded_as_json() {
        let user = UserInfo {
            email: "x@y.org".to_string(),
            name: "Dana\\\nCruz\"".to_string(),
            role: Role::Admin,
        };
        let html = dashboard_page(&user, "[]", "{}").unwrap();
        let start = html.find("const USER=").unwrap() + "const USER=".len();
        let end = start + html[start..].find(";const STUDENTS=").unwrap();
        let embedded: serde_json::Value = serde_json::from_str(&html[start..end]).unwrap();
        assert_eq!(embedded["name"], "Dana\\\nCruz\"");
        assert_eq!(embedded["email"], "x@y.org");
        assert_eq!(embedded["role"], "ADMIN");
    }
}
