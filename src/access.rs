use crate::activity::read_latest_requests;
use crate::error::{HubError, HubResult};
use crate::metrics::MetricRegistry;
use crate::models::{Role, Student, UserInfo};
use crate::reader::{read_records, read_students, STAFF_ROLES_SCHEMA};
use crate::render;
use crate::snapshot::historical_data;
use crate::sheet::{Workbook, STAFF_ROLES_SHEET};

/// Looks the caller up in the Staff Roles sheet by case-insensitive email.
pub fn current_user_role(workbook: &Workbook, email: &str) -> HubResult<Option<UserInfo>> {
    let wanted = email.trim().to_lowercase();
    if wanted.is_empty() {
        return Ok(None);
    }
    let Some(sheet) = workbook.sheet(STAFF_ROLES_SHEET) else {
        tracing::warn!("{STAFF_ROLES_SHEET} sheet not found");
        return Ok(None);
    };

    Ok(read_records(sheet, STAFF_ROLES_SCHEMA)?
        .into_iter()
        .find(|r| r.trimmed("email").to_lowercase() == wanted)
        .map(|r| UserInfo {
            email: email.trim().to_string(),
            name: r.trimmed("name"),
            role: Role::parse(&r.text("role")),
        }))
}

fn require_user(workbook: &Workbook, email: &str) -> HubResult<UserInfo> {
    current_user_role(workbook, email)?
        .ok_or_else(|| HubError::AccessDenied("user not authorized".to_string()))
}

/// Full roster with each student's most recent Spartan Hour request. ADMIN only.
pub fn student_data(workbook: &Workbook, email: &str) -> HubResult<Vec<Student>> {
    let user = require_user(workbook, email)
        .map_err(|_| HubError::AccessDenied("ADMIN role required for student data".to_string()))?;
    if user.role != Role::Admin {
        return Err(HubError::AccessDenied(
            "ADMIN role required for student data".to_string(),
        ));
    }

    let latest = read_latest_requests(workbook)?;
    let mut students = read_students(workbook)?;
    for student in &mut students {
        if let Some(request) = latest.get(&student.key()) {
            student.most_recent_spartan_hour_request = request.clone();
        }
    }
    Ok(students)
}

fn presence(value: &str) -> String {
    if value.trim().is_empty() {
        String::new()
    } else {
        "Yes".to_string()
    }
}

/// Roster with identifying fields stripped. Any listed role.
pub fn anonymized_student_data(workbook: &Workbook, email: &str) -> HubResult<Vec<Student>> {
    require_user(workbook, email)?;
    Ok(read_students(workbook)?
        .into_iter()
        .enumerate()
        .map(|(idx, student)| Student {
            student_name: format!("Student {}", idx + 1),
            id: 0,
            case_manager: presence(&student.case_manager),
            tier2_instructor: presence(&student.tier2_instructor),
            most_recent_spartan_hour_request: String::new(),
            ..student
        })
        .collect())
}

/// The dashboard for a listed user, or the access-denied page for anyone else.
pub fn serve_dashboard(
    workbook: &Workbook,
    registry: &MetricRegistry,
    email: Option<&str>,
) -> HubResult<String> {
    let user = match email {
        Some(email) => current_user_role(workbook, email)?,
        None => None,
    };
    let Some(user) = user else {
        tracing::info!(email = email.unwrap_or("Unknown"), "dashboard access denied");
        return Ok(render::access_denied_page(email));
    };

    let students = match user.role {
        Role::Admin => student_data(workbook, &user.email)?,
        _ => anonymized_student_data(workbook, &user.email)?,
    };
    let students_json = serde_json::to_string(&students)?;
    let history_json = serde_json::to_string(&historical_data(workbook, registry))?;
    render::dashboard_page(&user, &students_json, &history_json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::tests::{hub_row, hub_sheet};
    use crate::sheet::{CellValue, Sheet, SPARTAN_HOUR_SHEET};

    fn workbook() -> Workbook {
        let mut workbook = Workbook::new();
        workbook.load_sheet(Sheet::with_rows(
            STAFF_ROLES_SHEET,
            vec![
                vec!["Name".into(), "Email".into(), "Role".into()],
                vec!["Dana Cruz".into(), "DCruz@School.org".into(), "admin".into()],
                vec!["Ann Smith".into(), "asmith@school.org".into(), "Teacher".into()],
            ],
        ));
        workbook.load_sheet(hub_sheet(vec![
            hub_row("Lopez, Ana", |row| {
                row[3] = CellValue::Number(1001.0);
                row[4] = "Troy".into();
            }),
            vec![CellValue::Empty; 30],
            hub_row("Zhou, Li", |row| {
                row[3] = CellValue::Number(1002.0);
                row[23] = "Smith".into();
            }),
        ]));
        let mut spartan = Sheet::new(SPARTAN_HOUR_SHEET);
        spartan.set_value(1, 3, "Student".into());
        spartan.set_value(2, 3, "lopez, ana ".into());
        spartan.set_value(2, 8, "Math (3/9)\nArt (3/2)".into());
        workbook.load_sheet(spartan);
        workbook
    }

    #[test]
    fn role_lookup_ignores_case() {
        let workbook = workbook();
        let user = current_user_role(&workbook, " dcruz@school.ORG").unwrap().unwrap();
        assert_eq!(user.role, Role::Admin);
        assert_eq!(user.name, "Dana Cruz");
        assert!(current_user_role(&workbook, "stranger@school.org").unwrap().is_none());
        assert!(current_user_role(&Workbook::new(), "dcruz@school.org").unwrap().is_none());
    }

    #[test]
    fn student_data_requires_admin() {
        let workbook = workbook();
        let students = student_data(&workbook, "dcruz@school.org").unwrap();
        assert_eq!(students.len(), 2);
        assert_eq!(students[0].most_recent_spartan_hour_request, "Math (3/9)");
        assert_eq!(students[1].most_recent_spartan_hour_request, "");

        let err = student_data(&workbook, "asmith@school.org").unwrap_err();
        assert!(matches!(err, HubError::AccessDenied(_)));
        assert!(student_data(&workbook, "stranger@school.org").is_err());
    }

    #[test]
    fn anonymized_data_hides_identity() {
        let workbook = workbook();
        let students = anonymized_student_data(&workbook, "asmith@school.org").unwrap();
        assert_eq!(students.len(), 2);
        assert_eq!(students[0].student_name, "Student 1");
        assert_eq!(students[1].student_name, "Student 2");
        assert_eq!(students[0].id, 0);
        assert_eq!(students[0].case_manager, "Yes");
        assert_eq!(students[0].tier2_instructor, "");
        assert_eq!(students[1].tier2_instructor, "Yes");
        assert!(anonymized_student_data(&workbook, "stranger@school.org").is_err());
    }

    #[test]
    fn dashboard_is_gated_by_role() {
        let workbook = workbook();
        let registry = MetricRegistry::standard();

        let denied = serve_dashboard(&workbook, &registry, Some("<b>x@y.org</b>")).unwrap();
        assert!(denied.contains("Access Denied"));
        assert!(denied.contains("&lt;b&gt;x@y.org&lt;/b&gt;"));
        let unknown = serve_dashboard(&workbook, &registry, None).unwrap();
        assert!(unknown.contains("Unknown"));

        let teacher = serve_dashboard(&workbook, &registry, Some("asmith@school.org")).unwrap();
        assert!(teacher.contains("\"role\":\"TEACHER\""));
        assert!(teacher.contains("Student 1"));
        assert!(!teacher.contains("Lopez, Ana"));

        let admin = serve_dashboard(&workbook, &registry, Some("dcruz@school.org")).unwrap();
        assert!(admin.contains("Lopez, Ana"));
        assert!(admin.contains("const HISTORY={\"trends\":[],\"snapshotList\":[]}"));
    }
}
