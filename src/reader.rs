//! Schema-driven row decoding for the workbook's sheets.
//!
//! Every sheet the reports consume is described once as an ordered list of
//! typed fields anchored at a first column. Rows are decoded positionally and
//! coerced by field kind, so no call site indexes raw cells.

use std::collections::HashMap;

use crate::error::HubResult;
use crate::models::{
    name_key, AdvisorRow, CaseManager, Counselor, Instructor, PeriodAbsences, Student,
};
use crate::sheet::{
    column_index, CellValue, Sheet, Workbook, ABSENCES_SHEET, ADMIN_SETTINGS_SHEET,
    ADVISORS_SHEET, HUB_SHEET,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Flag,
    Int,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn flag(name: &'static str) -> Field {
    Field {
        name,
        kind: FieldKind::Flag,
    }
}

const fn int(name: &'static str) -> Field {
    Field {
        name,
        kind: FieldKind::Int,
    }
}

const fn text(name: &'static str) -> Field {
    Field {
        name,
        kind: FieldKind::Text,
    }
}

/// Fields that do not carry data but keep later fields at the right offset.
const SKIP: Field = text("");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    pub first_column: &'static str,
    pub fields: &'static [Field],
    /// Rows where any of these fields is blank are skipped.
    pub required: &'static [&'static str],
}

/// Hub columns A..AD. Older hub layouts kept the Tier 2 instructor at a
/// different offset; only this 30-column layout is read.
pub const HUB_SCHEMA: Schema = Schema {
    first_column: "A",
    fields: &[
        flag("ineligible"),
        text("studentName"),
        int("grade"),
        int("id"),
        text("caseManager"),
        text("activity"),
        int("unservedDetention"),
        int("totalDetention"),
        int("disciplineDetention"),
        int("attendanceDetention"),
        flag("isFailing"),
        text("failingClasses"),
        int("numFGrades"),
        int("unexcusedAbsences"),
        int("unexcusedTardies"),
        int("medicalAbsences"),
        int("illnessAbsences"),
        int("truancyAbsences"),
        int("totalAbsences"),
        text("totalAbsenceDays"),
        text("attendanceLetters"),
        text("dishonestyReferrals"),
        text("tier2Interventions"),
        text("tier2Instructor"),
        int("spartanHourTotalRequests"),
        int("spartanHourSkippedRequests"),
        int("spartanHourReqsHighPriority"),
        int("totalClubMeetingsAttended"),
        text("clubsAttended"),
        int("consecutiveWeeks"),
    ],
    required: &["studentName"],
};

pub const INSTRUCTOR_SCHEMA: Schema = Schema {
    first_column: "J",
    fields: &[text("fullName"), SKIP, text("email")],
    required: &["fullName", "email"],
};

pub const COUNSELOR_SCHEMA: Schema = Schema {
    first_column: "F",
    fields: &[text("name"), text("email"), text("alphaStart")],
    required: &["name", "email", "alphaStart"],
};

pub const CASE_MANAGER_SCHEMA: Schema = Schema {
    first_column: "C",
    fields: &[text("firstName"), text("lastName"), text("email")],
    required: &["lastName", "email"],
};

pub const ADMIN_NAME_SCHEMA: Schema = Schema {
    first_column: "A",
    fields: &[text("name")],
    required: &["name"],
};

pub const ADMIN_EMAIL_SCHEMA: Schema = Schema {
    first_column: "B",
    fields: &[text("email")],
    required: &["email"],
};

pub const ADVISOR_SCHEMA: Schema = Schema {
    first_column: "A",
    fields: &[
        text("activity"),
        text("students"),
        SKIP,
        text("primaryEmail"),
        SKIP,
        text("secondaryEmail"),
        SKIP,
        text("otherEmails"),
        flag("send"),
    ],
    required: &[],
};

pub const SPARTAN_HOUR_SCHEMA: Schema = Schema {
    first_column: "C",
    fields: &[
        text("studentName"),
        SKIP,
        SKIP,
        SKIP,
        SKIP,
        text("requests"),
        SKIP,
        SKIP,
        SKIP,
        SKIP,
        SKIP,
        SKIP,
        SKIP,
        text("skipped"),
        text("signups"),
    ],
    required: &["studentName"],
};

pub const ABSENCE_SCHEMA: Schema = Schema {
    first_column: "A",
    fields: &[
        text("studentName"),
        SKIP,
        int("p0"),
        int("p1"),
        int("p2"),
        int("p3"),
        int("p4"),
        int("p5"),
        int("p6"),
        int("p7"),
        int("sphr"),
    ],
    required: &["studentName"],
};

pub const STAFF_ROLES_SCHEMA: Schema = Schema {
    first_column: "A",
    fields: &[text("name"), text("email"), text("role")],
    required: &["email"],
};

/// One decoded row; values are coerced according to the field's kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    schema: Schema,
    cells: Vec<CellValue>,
    /// 1-based sheet row the record came from.
    pub sheet_row: usize,
}

impl Record {
    fn cell(&self, name: &str) -> Option<&CellValue> {
        let position = self.schema.fields.iter().position(|f| f.name == name);
        debug_assert!(position.is_some(), "unknown field {name}");
        position.and_then(|idx| self.cells.get(idx))
    }

    pub fn text(&self, name: &str) -> String {
        self.cell(name).map(CellValue::as_text).unwrap_or_default()
    }

    pub fn trimmed(&self, name: &str) -> String {
        self.text(name).trim().to_string()
    }

    pub fn int(&self, name: &str) -> i64 {
        self.cell(name).map(CellValue::as_int).unwrap_or(0)
    }

    pub fn flag(&self, name: &str) -> bool {
        self.cell(name).map(CellValue::as_flag).unwrap_or(false)
    }

    pub fn is_blank(&self, name: &str) -> bool {
        self.cell(name).map(CellValue::is_blank).unwrap_or(true)
    }
}

/// Decodes every data row of `sheet` against `schema`.
pub fn read_records(sheet: &Sheet, schema: Schema) -> HubResult<Vec<Record>> {
    let first = column_index(schema.first_column)?;
    let rows = sheet.data_rows(first, schema.fields.len());

    Ok(rows
        .into_iter()
        .enumerate()
        .map(|(idx, cells)| Record {
            schema,
            cells,
            sheet_row: idx + 2,
        })
        .filter(|record| schema.required.iter().all(|name| !record.is_blank(name)))
        .collect())
}

impl From<&Record> for Student {
    fn from(r: &Record) -> Self {
        Student {
            ineligible: r.flag("ineligible"),
            student_name: r.text("studentName"),
            grade: r.int("grade"),
            id: r.int("id"),
            case_manager: r.text("caseManager"),
            activity: r.text("activity"),
            unserved_detention: r.int("unservedDetention"),
            total_detention: r.int("totalDetention"),
            discipline_detention: r.int("disciplineDetention"),
            attendance_detention: r.int("attendanceDetention"),
            is_failing: r.flag("isFailing"),
            failing_classes: r.text("failingClasses"),
            num_f_grades: r.int("numFGrades"),
            unexcused_absences: r.int("unexcusedAbsences"),
            unexcused_tardies: r.int("unexcusedTardies"),
            medical_absences: r.int("medicalAbsences"),
            illness_absences: r.int("illnessAbsences"),
            truancy_absences: r.int("truancyAbsences"),
            total_absences: r.int("totalAbsences"),
            total_absence_days: r.text("totalAbsenceDays"),
            attendance_letters: r.text("attendanceLetters"),
            dishonesty_referrals: r.text("dishonestyReferrals"),
            tier2_interventions: r.text("tier2Interventions"),
            tier2_instructor: r.text("tier2Instructor"),
            spartan_hour_total_requests: r.int("spartanHourTotalRequests"),
            spartan_hour_skipped_requests: r.int("spartanHourSkippedRequests"),
            spartan_hour_reqs_high_priority: r.int("spartanHourReqsHighPriority"),
            total_club_meetings_attended: r.int("totalClubMeetingsAttended"),
            clubs_attended: r.text("clubsAttended"),
            consecutive_weeks: r.int("consecutiveWeeks"),
            most_recent_spartan_hour_request: String::new(),
        }
    }
}

pub fn read_students(workbook: &Workbook) -> HubResult<Vec<Student>> {
    let sheet = workbook.require(HUB_SHEET)?;
    Ok(read_records(sheet, HUB_SCHEMA)?
        .iter()
        .map(Student::from)
        .collect())
}

pub fn read_instructors(workbook: &Workbook) -> HubResult<Vec<Instructor>> {
    let sheet = workbook.require(ADMIN_SETTINGS_SHEET)?;
    Ok(read_records(sheet, INSTRUCTOR_SCHEMA)?
        .iter()
        .map(|r| {
            let full_name = r.trimmed("fullName");
            let mut parts = full_name.split_whitespace();
            let first_name = parts.next().unwrap_or_default().to_string();
            let last_name_key = full_name
                .split_whitespace()
                .last()
                .unwrap_or_default()
                .to_lowercase();
            Instructor {
                first_name,
                last_name_key,
                email: r.trimmed("email"),
                full_name,
            }
        })
        .collect())
}

/// Counselors in the order they were listed; routing sorts them itself.
pub fn read_counselors(workbook: &Workbook) -> HubResult<Vec<Counselor>> {
    let sheet = workbook.require(ADMIN_SETTINGS_SHEET)?;
    Ok(read_records(sheet, COUNSELOR_SCHEMA)?
        .iter()
        .map(|r| {
            let name = r.trimmed("name");
            Counselor {
                first_name: name.split_whitespace().next().unwrap_or_default().to_string(),
                email: r.trimmed("email"),
                alpha_start: r.trimmed("alphaStart"),
                name,
            }
        })
        .collect())
}

pub fn read_case_managers(workbook: &Workbook) -> HubResult<Vec<CaseManager>> {
    let sheet = workbook.require(ADMIN_SETTINGS_SHEET)?;
    Ok(read_records(sheet, CASE_MANAGER_SCHEMA)?
        .iter()
        .map(|r| CaseManager {
            first_name: r.trimmed("firstName"),
            last_name: r.trimmed("lastName"),
            email: r.trimmed("email"),
        })
        .collect())
}

/// Administrator names, or an empty list when the settings sheet is absent.
pub fn read_admin_names(workbook: &Workbook) -> HubResult<Vec<String>> {
    let Some(sheet) = workbook.sheet(ADMIN_SETTINGS_SHEET) else {
        tracing::warn!("{ADMIN_SETTINGS_SHEET} sheet not found");
        return Ok(Vec::new());
    };
    Ok(read_records(sheet, ADMIN_NAME_SCHEMA)?
        .iter()
        .map(|r| r.trimmed("name"))
        .collect())
}

pub fn read_admin_emails(workbook: &Workbook) -> HubResult<Vec<String>> {
    let Some(sheet) = workbook.sheet(ADMIN_SETTINGS_SHEET) else {
        tracing::warn!("{ADMIN_SETTINGS_SHEET} sheet not found");
        return Ok(Vec::new());
    };
    Ok(read_records(sheet, ADMIN_EMAIL_SCHEMA)?
        .iter()
        .map(|r| r.trimmed("email"))
        .collect())
}

pub fn read_advisor_rows(workbook: &Workbook) -> HubResult<Vec<AdvisorRow>> {
    let sheet = workbook.require(ADVISORS_SHEET)?;
    Ok(read_records(sheet, ADVISOR_SCHEMA)?
        .iter()
        .map(|r| AdvisorRow {
            sheet_row: r.sheet_row,
            activity: r.trimmed("activity"),
            students: r.text("students"),
            primary_email: r.trimmed("primaryEmail"),
            secondary_email: r.trimmed("secondaryEmail"),
            other_emails: r.text("otherEmails"),
            send: r.flag("send"),
        })
        .collect())
}

/// Absences by period keyed by normalized student name. Optional sheet.
pub fn read_absences(workbook: &Workbook) -> HubResult<HashMap<String, PeriodAbsences>> {
    let mut absences = HashMap::new();
    let Some(sheet) = workbook.sheet(ABSENCES_SHEET) else {
        return Ok(absences);
    };
    const PERIODS: [&str; 9] = ["p0", "p1", "p2", "p3", "p4", "p5", "p6", "p7", "sphr"];
    for record in read_records(sheet, ABSENCE_SCHEMA)? {
        let counts = PERIODS.map(|period| record.int(period));
        absences.insert(
            name_key(&record.text("studentName")),
            PeriodAbsences(counts),
        );
    }
    Ok(absences)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn hub_row(name: &str, edit: impl FnOnce(&mut Vec<CellValue>)) -> Vec<CellValue> {
        let mut row = vec![CellValue::Empty; HUB_SCHEMA.fields.len()];
        row[1] = CellValue::text(name);
        edit(&mut row);
        row
    }

    pub(crate) fn hub_sheet(rows: Vec<Vec<CellValue>>) -> Sheet {
        let header = HUB_SCHEMA
            .fields
            .iter()
            .map(|f| CellValue::text(f.name))
            .collect();
        let mut all = vec![header];
        all.extend(rows);
        Sheet::with_rows(HUB_SHEET, all)
    }

    #[test]
    fn hub_rows_decode_with_type_coercion() {
        let mut workbook = Workbook::new();
        workbook.load_sheet(hub_sheet(vec![hub_row("Lee, Avery", |row| {
            row[0] = CellValue::text("true");
            row[2] = CellValue::Number(10.0);
            row[6] = CellValue::text("3");
            row[11] = CellValue::text("Algebra I\nBiology");
            row[12] = CellValue::text("two");
            row[23] = CellValue::text("Smith");
        })]));

        let students = read_students(&workbook).unwrap();
        assert_eq!(students.len(), 1);
        let student = &students[0];
        assert!(student.ineligible);
        assert_eq!(student.grade, 10);
        assert_eq!(student.unserved_detention, 3);
        assert_eq!(student.num_f_grades, 0);
        assert_eq!(student.failing_classes, "Algebra I\nBiology");
        assert_eq!(student.tier2_instructor, "Smith");
        assert!(!student.is_failing);
    }

    #[test]
    fn rows_without_a_student_name_are_skipped() {
        let mut workbook = Workbook::new();
        workbook.load_sheet(hub_sheet(vec![
            hub_row("Lee, Avery", |_| {}),
            hub_row("  ", |row| row[2] = CellValue::Number(9.0)),
            hub_row("Moreno, Jules", |_| {}),
        ]));
        let names: Vec<String> = read_students(&workbook)
            .unwrap()
            .into_iter()
            .map(|s| s.student_name)
            .collect();
        assert_eq!(names, vec!["Lee, Avery", "Moreno, Jules"]);
    }

    #[test]
    fn reading_twice_yields_identical_rows() {
        let mut workbook = Workbook::new();
        workbook.load_sheet(hub_sheet(vec![
            hub_row("Lee, Avery", |row| row[12] = CellValue::Number(1.0)),
            hub_row("Patel, Kiara", |row| row[0] = CellValue::Bool(true)),
        ]));
        assert_eq!(
            read_students(&workbook).unwrap(),
            read_students(&workbook).unwrap()
        );
    }

    #[test]
    fn records_compare_by_schema_and_cells() {
        let sheet = hub_sheet(vec![hub_row("Lee, Avery", |row| row[2] = CellValue::Number(9.0))]);
        let first = read_records(&sheet, HUB_SCHEMA).unwrap();
        assert_eq!(first, read_records(&sheet, HUB_SCHEMA).unwrap());
        assert_eq!(first[0].schema, HUB_SCHEMA);
        assert_ne!(first[0].schema, ABSENCE_SCHEMA);
    }

    #[test]
    fn missing_hub_sheet_is_reported() {
        assert!(read_students(&Workbook::new()).is_err());
    }

    #[test]
    fn staff_rosters_come_from_their_settings_columns() {
        let mut settings = Sheet::new(ADMIN_SETTINGS_SHEET);
        settings.set_values(
            2,
            1,
            vec![vec![
                "Dana Cruz".into(),
                "dcruz@school.org".into(),
                "Pat".into(),
                "Troy".into(),
                "ptroy@school.org".into(),
                "Sam Reyes".into(),
                "sreyes@school.org".into(),
                "A".into(),
                CellValue::Empty,
                "Maria de la Cruz".into(),
                CellValue::Empty,
                " mcruz@school.org ".into(),
            ]],
        );
        settings.set_values(3, 6, vec![vec!["Incomplete Row".into()]]);
        let mut workbook = Workbook::new();
        workbook.load_sheet(settings);

        let instructors = read_instructors(&workbook).unwrap();
        assert_eq!(instructors.len(), 1);
        assert_eq!(instructors[0].last_name_key, "cruz");
        assert_eq!(instructors[0].first_name, "Maria");
        assert_eq!(instructors[0].email, "mcruz@school.org");

        let counselors = read_counselors(&workbook).unwrap();
        assert_eq!(counselors.len(), 1);
        assert_eq!(counselors[0].alpha_start, "A");

        let case_managers = read_case_managers(&workbook).unwrap();
        assert_eq!(case_managers[0].full_name(), "Pat Troy");

        assert_eq!(read_admin_names(&workbook).unwrap(), vec!["Dana Cruz"]);
        assert_eq!(read_admin_emails(&workbook).unwrap(), vec!["dcruz@school.org"]);
    }

    #[test]
    fn absences_are_keyed_by_normalized_name() {
        let mut workbook = Workbook::new();
        workbook.load_sheet(Sheet::with_rows(
            ABSENCES_SHEET,
            vec![
                vec!["Student".into()],
                vec![
                    " Lee, Avery ".into(),
                    "x".into(),
                    1.0.into(),
                    CellValue::Empty,
                    5.0.into(),
                ],
            ],
        ));
        let absences = read_absences(&workbook).unwrap();
        let row = absences.get("lee, avery").unwrap();
        assert_eq!(row.0[0], 1);
        assert_eq!(row.0[1], 0);
        assert_eq!(row.0[2], 5);
    }
}
