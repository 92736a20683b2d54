use std::cmp::Ordering;
use std::collections::HashMap;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::models::{CaseManager, Counselor, Instructor, Student};

/// Where a student ends up in one staff report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Index into the report's staff roster.
    To(usize),
    /// Not part of this report.
    Drop,
    /// Had a staff reference that matched nobody.
    Unresolved(String),
}

pub trait Router {
    fn route(&self, student: &Student) -> Route;
}

/// Case- and accent-insensitive comparison key.
pub fn collation_key(value: &str) -> String {
    value
        .trim()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

pub fn collate(a: &str, b: &str) -> Ordering {
    collation_key(a).cmp(&collation_key(b))
}

/// Tier-2 routing: the student's instructor cell names the instructor's last name.
pub struct LastNameRouter {
    keys: Vec<String>,
}

impl LastNameRouter {
    pub fn new(instructors: &[Instructor]) -> Self {
        Self {
            keys: instructors.iter().map(|i| i.last_name_key.clone()).collect(),
        }
    }
}

impl Router for LastNameRouter {
    fn route(&self, student: &Student) -> Route {
        let wanted = student.tier2_instructor.trim().to_lowercase();
        if wanted.is_empty() {
            return Route::Drop;
        }
        self.keys
            .iter()
            .position(|key| *key == wanted)
            .map(Route::To)
            .unwrap_or(Route::Drop)
    }
}

/// Counselor routing by surname against sorted alpha-range starts.
pub struct AlphaRangeRouter {
    /// (collation key of the range start, roster index), ascending.
    starts: Vec<(String, usize)>,
}

impl AlphaRangeRouter {
    pub fn new(counselors: &[Counselor]) -> Self {
        let mut starts: Vec<(String, usize)> = counselors
            .iter()
            .enumerate()
            .map(|(idx, c)| (collation_key(&c.alpha_start), idx))
            .collect();
        starts.sort_by(|a, b| a.0.cmp(&b.0));
        Self { starts }
    }

    pub fn route_surname(&self, surname: &str) -> Option<usize> {
        let key = collation_key(surname);
        if key.is_empty() {
            return None;
        }
        let upper = self.starts.partition_point(|(start, _)| start.as_str() <= key.as_str());
        upper.checked_sub(1).map(|pos| self.starts[pos].1)
    }
}

/// Text before the first comma of a "Last, First" name.
pub fn surname(full_name: &str) -> &str {
    full_name.split(',').next().unwrap_or_default().trim()
}

impl Router for AlphaRangeRouter {
    fn route(&self, student: &Student) -> Route {
        self.route_surname(surname(&student.student_name))
            .map(Route::To)
            .unwrap_or(Route::Drop)
    }
}

/// Lower-cased with whitespace and punctuation other than commas removed.
pub fn normalize_staff_key(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ',')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Case manager routing through `last,initial` and `last` keys.
pub struct CaseManagerRouter {
    keys: HashMap<String, usize>,
}

impl CaseManagerRouter {
    pub fn new(case_managers: &[CaseManager]) -> Self {
        let mut keys = HashMap::new();
        for (idx, manager) in case_managers.iter().enumerate() {
            let last = normalize_staff_key(&manager.last_name);
            if last.is_empty() {
                continue;
            }
            if let Some(initial) = normalize_staff_key(&manager.first_name).chars().next() {
                keys.entry(format!("{last},{initial}")).or_insert(idx);
            }
            keys.entry(last).or_insert(idx);
        }
        Self { keys }
    }

    pub fn resolve(&self, reference: &str) -> Option<usize> {
        self.keys.get(&normalize_staff_key(reference)).copied()
    }
}

impl Router for CaseManagerRouter {
    fn route(&self, student: &Student) -> Route {
        let reference = student.case_manager.trim();
        if reference.is_empty() {
            return Route::Drop;
        }
        match self.resolve(reference) {
            Some(idx) => Route::To(idx),
            None => Route::Unresolved(format!(
                "no case manager matches \"{reference}\" for {}",
                student.student_name
            )),
        }
    }
}
