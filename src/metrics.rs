//! Global aggregate metrics over the student roster.
//!
//! The registry is an ordered list of descriptors; a descriptor's position is
//! its column in the snapshot sheet (column 1 holds the snapshot date).
//! Independent metrics see only the roster. Dependent metrics also receive
//! the values of the independent metrics, never of other dependent ones.

use std::collections::BTreeMap;

use crate::models::Student;

pub type MetricValues = BTreeMap<&'static str, f64>;

#[derive(Clone, Copy)]
pub enum Aggregator {
    Independent(fn(&[Student]) -> f64),
    Dependent(fn(&[Student], &MetricValues) -> f64),
}

#[derive(Clone, Copy)]
pub struct MetricDef {
    pub key: &'static str,
    pub header: &'static str,
    pub aggregator: Aggregator,
    pub precision: Option<usize>,
}

impl MetricDef {
    /// Formats a value with the metric's display precision, if it has one.
    pub fn display(&self, value: f64) -> String {
        match self.precision {
            Some(digits) => format!("{value:.digits$}"),
            None => crate::sheet::format_number(value),
        }
    }
}

pub const SNAPSHOT_DATE_HEADER: &str = "Snapshot Date";

/// Ordered metric descriptors, built once and passed around explicitly.
pub struct MetricRegistry {
    metrics: Vec<MetricDef>,
}

fn count(data: &[Student], pred: impl Fn(&Student) -> bool) -> f64 {
    data.iter().filter(|s| pred(s)).count() as f64
}

/// Totals saturate at `i64::MAX`.
fn sum(data: &[Student], field: impl Fn(&Student) -> i64) -> f64 {
    data.iter().map(field).fold(0i64, i64::saturating_add) as f64
}

/// Ratio that evaluates to 0 when the denominator is 0.
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

fn has_text(value: &str) -> bool {
    !value.trim().is_empty()
}

fn independent(key: &'static str, header: &'static str, f: fn(&[Student]) -> f64) -> MetricDef {
    MetricDef {
        key,
        header,
        aggregator: Aggregator::Independent(f),
        precision: None,
    }
}

fn dependent(
    key: &'static str,
    header: &'static str,
    precision: usize,
    f: fn(&[Student], &MetricValues) -> f64,
) -> MetricDef {
    MetricDef {
        key,
        header,
        aggregator: Aggregator::Dependent(f),
        precision: Some(precision),
    }
}

fn get(metrics: &MetricValues, key: &str) -> f64 {
    metrics.get(key).copied().unwrap_or(0.0)
}

impl MetricRegistry {
    pub fn standard() -> Self {
        let metrics = vec![
            independent("totalStudents", "Total Students", |d| d.len() as f64),
            independent("ineligibleStudents", "Ineligible Students", |d| {
                count(d, |s| s.ineligible)
            }),
            dependent("ineligibilityRate", "Ineligibility Rate (%)", 1, |_, m| {
                ratio(get(m, "ineligibleStudents"), get(m, "totalStudents")) * 100.0
            }),
            independent("studentsWithFGrades", "Students with F Grades", |d| {
                count(d, |s| s.num_f_grades > 0)
            }),
            independent("studentsWith1F", "Students with 1 F", |d| {
                count(d, |s| s.num_f_grades == 1)
            }),
            independent("studentsWith2PlusF", "Students with 2+ F", |d| {
                count(d, |s| s.num_f_grades >= 2)
            }),
            independent("totalFGrades", "Total F Grades", |d| sum(d, |s| s.num_f_grades)),
            dependent("avgUnservedDetention", "Avg Unserved Detention", 2, |d, m| {
                ratio(sum(d, |s| s.unserved_detention), get(m, "totalStudents"))
            }),
            independent("studentsWithDetention", "Students with Detention", |d| {
                count(d, |s| s.unserved_detention > 0)
            }),
            independent("totalAbsences", "Total Absences", |d| sum(d, |s| s.total_absences)),
            dependent("avgAbsences", "Avg Absences", 2, |_, m| {
                ratio(get(m, "totalAbsences"), get(m, "totalStudents"))
            }),
            independent("unexcusedAbsences", "Unexcused Absences", |d| {
                sum(d, |s| s.unexcused_absences)
            }),
            independent("truancyAbsences", "Truancy Absences", |d| {
                sum(d, |s| s.truancy_absences)
            }),
            independent("medicalAbsences", "Medical Absences", |d| {
                sum(d, |s| s.medical_absences)
            }),
            independent("illnessAbsences", "Illness Absences", |d| {
                sum(d, |s| s.illness_absences)
            }),
            independent(
                "spartanHourTotalRequests",
                "Spartan Hour Total Requests",
                |d| sum(d, |s| s.spartan_hour_total_requests),
            ),
            independent(
                "spartanHourSkippedRequests",
                "Spartan Hour Skipped Requests",
                |d| sum(d, |s| s.spartan_hour_skipped_requests),
            ),
            independent(
                "spartanHourHighPriorityRequests",
                "Spartan Hour High Priority Requests",
                |d| sum(d, |s| s.spartan_hour_reqs_high_priority),
            ),
            independent(
                "studentsWithClubParticipation",
                "Students with Club Participation",
                |d| count(d, |s| s.total_club_meetings_attended > 0 || has_text(&s.clubs_attended)),
            ),
            independent("studentsInActivities", "Students in Activities", |d| {
                count(d, |s| has_text(&s.activity))
            }),
            independent("studentsWithTier2", "Students with Tier 2", |d| {
                count(d, |s| has_text(&s.tier2_interventions))
            }),
            independent("studentsWithSpecialEd", "Students with Special Ed", |d| {
                count(d, |s| has_text(&s.case_manager))
            }),
        ];
        Self { metrics }
    }

    pub fn metrics(&self) -> &[MetricDef] {
        &self.metrics
    }

    #[cfg(test)]
    pub fn find(&self, key: &str) -> Option<&MetricDef> {
        self.metrics.iter().find(|m| m.key == key)
    }

    /// Snapshot sheet headers: the date column followed by every metric.
    pub fn headers(&self) -> Vec<&'static str> {
        std::iter::once(SNAPSHOT_DATE_HEADER)
            .chain(self.metrics.iter().map(|m| m.header))
            .collect()
    }

    /// 1-based snapshot sheet column of a metric.
    #[cfg(test)]
    pub fn column_of(&self, key: &str) -> Option<usize> {
        self.metrics.iter().position(|m| m.key == key).map(|idx| idx + 2)
    }

    pub fn compute(&self, data: &[Student]) -> MetricValues {
        let mut values = MetricValues::new();
        for metric in &self.metrics {
            if let Aggregator::Independent(f) = metric.aggregator {
                values.insert(metric.key, f(data));
            }
        }

        let independent_values = values.clone();
        for metric in &self.metrics {
            if let Aggregator::Dependent(f) = metric.aggregator {
                values.insert(metric.key, f(data, &independent_values));
            }
        }
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(name: &str, edit: impl FnOnce(&mut Student)) -> Student {
        let mut s = Student {
            student_name: name.to_string(),
            ..Student::default()
        };
        edit(&mut s);
        s
    }

    #[test]
    fn registry_has_twenty_two_metrics_after_the_date() {
        let registry = MetricRegistry::standard();
        assert_eq!(registry.metrics().len(), 22);
        assert_eq!(registry.headers()[0], SNAPSHOT_DATE_HEADER);
        assert_eq!(registry.column_of("totalStudents"), Some(2));
        assert_eq!(registry.column_of("studentsWithSpecialEd"), Some(23));
    }

    #[test]
    fn empty_roster_yields_zero_rates() {
        let values = MetricRegistry::standard().compute(&[]);
        assert_eq!(values["ineligibilityRate"], 0.0);
        assert_eq!(values["avgAbsences"], 0.0);
        assert_eq!(values["avgUnservedDetention"], 0.0);
        assert!(values.values().all(|v| v.is_finite()));
    }

    #[test]
    fn no_ineligible_students_means_zero_rate() {
        let data = vec![student("A", |_| {}), student("B", |_| {})];
        let values = MetricRegistry::standard().compute(&data);
        assert_eq!(values["ineligibilityRate"], 0.0);
    }

    #[test]
    fn ten_student_roster_matches_expected_snapshot() {
        let data: Vec<Student> = (0..10)
            .map(|i| {
                student(&format!("Student {i}"), |s| {
                    s.ineligible = i < 3;
                    s.num_f_grades = match i {
                        0 | 1 => 1,
                        2 => 3,
                        _ => 0,
                    };
                    s.total_absences = 5;
                })
            })
            .collect();

        let values = MetricRegistry::standard().compute(&data);
        assert_eq!(values["totalStudents"], 10.0);
        assert_eq!(values["ineligibleStudents"], 3.0);
        assert!((values["ineligibilityRate"] - 30.0).abs() < 1e-9);
        assert_eq!(values["studentsWith1F"], 2.0);
        assert_eq!(values["studentsWith2PlusF"], 1.0);
        assert_eq!(values["studentsWithFGrades"], 3.0);
        assert_eq!(values["totalFGrades"], 5.0);
        assert_eq!(values["avgAbsences"], 5.0);
    }

    #[test]
    fn participation_counts_use_text_presence() {
        let data = vec![
            student("A", |s| s.clubs_attended = "Chess".to_string()),
            student("B", |s| s.total_club_meetings_attended = 2),
            student("C", |s| {
                s.activity = "  ".to_string();
                s.case_manager = "Troy".to_string();
            }),
        ];
        let values = MetricRegistry::standard().compute(&data);
        assert_eq!(values["studentsWithClubParticipation"], 2.0);
        assert_eq!(values["studentsInActivities"], 0.0);
        assert_eq!(values["studentsWithSpecialEd"], 1.0);
    }

    #[test]
    fn dependent_metrics_only_see_independent_values() {
        let registry = MetricRegistry {
            metrics: vec![
                independent("a", "A", |_| 10.0),
                dependent("b", "B", 0, |_, m| get(m, "a") * 2.0),
                dependent("c", "C", 0, |_, m| {
                    if m.contains_key("b") {
                        -1.0
                    } else {
                        1.0
                    }
                }),
            ],
        };
        let values = registry.compute(&[]);
        assert_eq!(values["a"], 10.0);
        assert_eq!(values["b"], 20.0);
        assert_eq!(values["c"], 1.0);
    }

    #[test]
    fn huge_totals_saturate_instead_of_overflowing() {
        let data = vec![
            student("A", |s| s.total_absences = i64::MAX),
            student("B", |s| s.total_absences = i64::MAX),
        ];
        let values = MetricRegistry::standard().compute(&data);
        assert_eq!(values["totalAbsences"], i64::MAX as f64);
        assert!(values["avgAbsences"].is_finite());
    }

    #[test]
    fn display_respects_precision() {
        let registry = MetricRegistry::standard();
        assert_eq!(registry.find("ineligibilityRate").unwrap().display(30.0), "30.0");
        assert_eq!(registry.find("totalStudents").unwrap().display(10.0), "10");
        assert_eq!(registry.find("avgAbsences").unwrap().display(1.0 / 3.0), "0.33");
    }
}
