use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{HubError, HubResult};

pub const HUB_SHEET: &str = "⭐Academics & Attendance Hub";
pub const ADMIN_SETTINGS_SHEET: &str = "Admin Settings";
pub const ADVISORS_SHEET: &str = "✎Activity Advisors & Coaches";
pub const SPARTAN_HOUR_SHEET: &str = "Spartan Hour Intervention";
pub const ABSENCES_SHEET: &str = "Absences (total)";
pub const STAFF_ROLES_SHEET: &str = "Staff Roles";
pub const SNAPSHOT_SHEET: &str = "Historical Snapshots";

/// A single cell as stored by the sheet store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    #[default]
    Empty,
    Bool(bool),
    Number(f64),
    Text(String),
    DateTime(NaiveDateTime),
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        CellValue::Text(value.into())
    }

    /// Blank cells and whitespace-only text are both treated as empty.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Bool(true) => "TRUE".to_string(),
            CellValue::Bool(false) => "FALSE".to_string(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Text(text) => text.clone(),
            CellValue::DateTime(at) => at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    /// Checkbox semantics: literal `true` or the string "TRUE" in any case.
    pub fn as_flag(&self) -> bool {
        match self {
            CellValue::Bool(value) => *value,
            CellValue::Text(text) => text.trim().eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    /// Leading-integer parse; anything unparseable becomes 0.
    pub fn as_int(&self) -> i64 {
        match self {
            CellValue::Number(n) if n.is_finite() => n.trunc() as i64,
            CellValue::Text(text) => parse_leading_int(text).unwrap_or(0),
            _ => 0,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            CellValue::Number(n) if n.is_finite() => *n,
            CellValue::Text(text) => text.trim().parse::<f64>().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            CellValue::DateTime(at) => Some(*at),
            CellValue::Text(text) => parse_datetime(text),
            _ => None,
        }
    }

    /// Best-effort typing for values arriving as plain text (CSV imports).
    pub fn infer(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return CellValue::Empty;
        }
        match raw.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => CellValue::Number(n),
            _ => CellValue::Text(raw.to_string()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

fn parse_leading_int(text: &str) -> Option<i64> {
    let trimmed = text.trim_start();
    let mut end = 0;
    for (idx, ch) in trimmed.char_indices() {
        if ch.is_ascii_digit() || (idx == 0 && (ch == '-' || ch == '+')) {
            end = idx + ch.len_utf8();
        } else {
            break;
        }
    }
    trimmed[..end].parse().ok()
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Converts a column reference such as `B` or `AD` into a 1-based index.
pub fn column_index(letters: &str) -> HubResult<usize> {
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(HubError::InvalidColumn(letters.to_string()));
    }
    Ok(letters
        .to_ascii_uppercase()
        .bytes()
        .fold(0usize, |acc, b| acc * 26 + (b - b'A' + 1) as usize))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    name: String,
    rows: Vec<Vec<CellValue>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
        }
    }

    pub fn with_rows(name: impl Into<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows[..self.last_row()]
    }

    /// 1-based index of the last row holding any non-blank cell.
    pub fn last_row(&self) -> usize {
        self.rows
            .iter()
            .rposition(|row| row.iter().any(|cell| !cell.is_blank()))
            .map(|idx| idx + 1)
            .unwrap_or(0)
    }

    pub fn last_column(&self) -> usize {
        self.rows
            .iter()
            .filter_map(|row| row.iter().rposition(|cell| !cell.is_blank()))
            .max()
            .map(|idx| idx + 1)
            .unwrap_or(0)
    }

    /// Rectangular read with 1-based coordinates; cells past the data read as empty.
    pub fn values(
        &self,
        row: usize,
        column: usize,
        num_rows: usize,
        num_columns: usize,
    ) -> Vec<Vec<CellValue>> {
        (0..num_rows)
            .map(|r| {
                let source = row
                    .checked_sub(1)
                    .and_then(|start| self.rows.get(start + r));
                (0..num_columns)
                    .map(|c| {
                        source
                            .and_then(|cells| cells.get(column.saturating_sub(1) + c))
                            .cloned()
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .collect()
    }

    /// Every row below the header, `width` columns starting at `column`.
    pub fn data_rows(&self, column: usize, width: usize) -> Vec<Vec<CellValue>> {
        let last = self.last_row();
        if last < 2 {
            return Vec::new();
        }
        self.values(2, column, last - 1, width)
    }

    pub fn set_values(&mut self, row: usize, column: usize, values: Vec<Vec<CellValue>>) {
        for (r, cells) in values.into_iter().enumerate() {
            for (c, value) in cells.into_iter().enumerate() {
                self.set_value(row + r, column + c, value);
            }
        }
    }

    pub fn set_value(&mut self, row: usize, column: usize, value: CellValue) {
        if row == 0 || column == 0 {
            return;
        }
        if self.rows.len() < row {
            self.rows.resize_with(row, Vec::new);
        }
        let cells = &mut self.rows[row - 1];
        if cells.len() < column {
            cells.resize(column, CellValue::Empty);
        }
        cells[column - 1] = value;
    }

    pub fn append_row(&mut self, cells: Vec<CellValue>) {
        let next = self.last_row() + 1;
        self.set_values(next, 1, vec![cells]);
    }
}

/// The in-memory view of the sheet store for one invocation.
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    sheets: BTreeMap<String, Sheet>,
    dirty: BTreeSet<String>,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sheet as loaded from the store, without marking it modified.
    pub fn load_sheet(&mut self, sheet: Sheet) {
        self.sheets.insert(sheet.name.clone(), sheet);
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.get(name)
    }

    pub fn require(&self, name: &str) -> HubResult<&Sheet> {
        self.sheet(name)
            .ok_or_else(|| HubError::MissingSheet(name.to_string()))
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Sheet> {
        let sheet = self.sheets.get_mut(name)?;
        self.dirty.insert(name.to_string());
        Some(sheet)
    }

    pub fn insert_sheet(&mut self, name: &str) -> &mut Sheet {
        self.dirty.insert(name.to_string());
        self.sheets
            .entry(name.to_string())
            .or_insert_with(|| Sheet::new(name))
    }

    /// Replaces a sheet wholesale.
    pub fn put_sheet(&mut self, sheet: Sheet) {
        self.dirty.insert(sheet.name.clone());
        self.sheets.insert(sheet.name.clone(), sheet);
    }

    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.keys().map(String::as_str)
    }

    pub fn dirty_sheets(&self) -> impl Iterator<Item = &Sheet> {
        self.dirty.iter().filter_map(|name| self.sheets.get(name))
    }

    pub fn mark_clean(&mut self) {
        self.dirty.clear();
    }
}
