use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Serialize, Serializer};

use crate::error::{HubError, HubResult};
use crate::metrics::{MetricDef, MetricRegistry};
use crate::models::{Snapshot, SnapshotListEntry};
use crate::reader::read_students;
use crate::sheet::{CellValue, Workbook, HUB_SHEET, SNAPSHOT_SHEET};

pub fn snapshot_label(at: NaiveDateTime) -> String {
    at.format("%b %-d, %Y").to_string()
}

/// Appends one row of global metrics and returns its 1-based sheet row.
pub fn create_weekly_snapshot(
    workbook: &mut Workbook,
    registry: &MetricRegistry,
    now: NaiveDateTime,
) -> HubResult<usize> {
    let students = read_students(workbook)?;

    let created = workbook.sheet(SNAPSHOT_SHEET).is_none();
    let sheet = workbook.insert_sheet(SNAPSHOT_SHEET);
    if created || sheet.last_row() == 0 {
        sheet.set_values(
            1,
            1,
            vec![registry.headers().into_iter().map(CellValue::text).collect()],
        );
        tracing::info!("created {SNAPSHOT_SHEET} sheet");
    }

    if students.is_empty() {
        tracing::warn!("no student data found, snapshot not written");
        return Err(HubError::EmptyRoster(HUB_SHEET.to_string()));
    }
    let values = registry.compute(&students);
    let sheet = workbook.insert_sheet(SNAPSHOT_SHEET);

    let mut row = vec![CellValue::DateTime(now)];
    row.extend(
        registry
            .metrics()
            .iter()
            .map(|m| CellValue::Number(values.get(m.key).copied().unwrap_or(0.0))),
    );
    sheet.append_row(row);
    let written = sheet.last_row();
    tracing::info!(
        row = written,
        students = students.len(),
        "weekly snapshot created for {}",
        snapshot_label(now)
    );
    Ok(written)
}

/// Every stored snapshot in sheet order. Rows without a date are ignored.
pub fn all_snapshots(workbook: &Workbook, registry: &MetricRegistry) -> Vec<Snapshot> {
    let Some(sheet) = workbook.sheet(SNAPSHOT_SHEET) else {
        return Vec::new();
    };
    let width = registry.metrics().len() + 1;
    sheet
        .data_rows(1, width)
        .into_iter()
        .filter_map(|cells| {
            let snapshot_date = cells.first()?.as_datetime()?;
            let metrics = registry
                .metrics()
                .iter()
                .enumerate()
                .map(|(idx, m)| {
                    let value = cells.get(idx + 1).map(CellValue::as_f64).unwrap_or(0.0);
                    (m.key.to_string(), value)
                })
                .collect();
            Some(Snapshot {
                snapshot_date,
                formatted_date: snapshot_label(snapshot_date),
                metrics,
            })
        })
        .collect()
}

/// First snapshot taken on the same calendar day.
pub fn snapshot_by_date(
    workbook: &Workbook,
    registry: &MetricRegistry,
    date: NaiveDate,
) -> Option<Snapshot> {
    all_snapshots(workbook, registry)
        .into_iter()
        .find(|s| s.snapshot_date.date() == date)
}

fn list_entry(snapshot: &Snapshot) -> SnapshotListEntry {
    SnapshotListEntry {
        date: snapshot.snapshot_date,
        formatted_date: snapshot.formatted_date.clone(),
        timestamp: snapshot.snapshot_date.and_utc().timestamp_millis(),
    }
}

/// Newest first.
pub fn snapshot_list(workbook: &Workbook, registry: &MetricRegistry) -> Vec<SnapshotListEntry> {
    let mut entries: Vec<SnapshotListEntry> =
        all_snapshots(workbook, registry).iter().map(list_entry).collect();
    entries.sort_by(|a, b| b.date.cmp(&a.date));
    entries
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalData {
    /// Oldest first, for trend charts.
    pub trends: Vec<Snapshot>,
    /// Newest first, for the comparison selectors.
    pub snapshot_list: Vec<SnapshotListEntry>,
}

pub fn historical_data(workbook: &Workbook, registry: &MetricRegistry) -> HistoricalData {
    let mut trends = all_snapshots(workbook, registry);
    trends.sort_by(|a, b| a.snapshot_date.cmp(&b.snapshot_date));
    let mut snapshot_list: Vec<SnapshotListEntry> = trends.iter().map(list_entry).collect();
    snapshot_list.sort_by(|a, b| b.date.cmp(&a.date));
    HistoricalData {
        trends,
        snapshot_list,
    }
}

/// Percent change between two metric values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PercentChange {
    /// Both values are zero.
    Unchanged,
    /// The old value is zero and the new one is not; no finite percentage exists.
    FromZero,
    Percent(f64),
}

impl PercentChange {
    pub fn between(old: f64, new: f64) -> Self {
        if old == 0.0 {
            if new == 0.0 {
                PercentChange::Unchanged
            } else {
                PercentChange::FromZero
            }
        } else {
            PercentChange::Percent((new - old) / old * 100.0)
        }
    }
}

impl fmt::Display for PercentChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PercentChange::Unchanged => f.write_str("0"),
            PercentChange::FromZero => f.write_str("N/A (from zero)"),
            PercentChange::Percent(value) => write!(f, "{value:.1}"),
        }
    }
}

impl Serialize for PercentChange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricChange {
    pub metric: &'static str,
    pub old_value: String,
    pub new_value: String,
    pub delta: String,
    pub percent_change: PercentChange,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricPair {
    pub metric: &'static str,
    pub value1: String,
    pub value2: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotComparison {
    pub date1: String,
    pub date2: String,
    /// Only metrics whose displayed delta is non-zero.
    pub changes: Vec<MetricChange>,
    pub all_metrics: Vec<MetricPair>,
}

fn metric_change(metric: &MetricDef, old: f64, new: f64) -> MetricChange {
    let delta = new - old;
    MetricChange {
        metric: metric.header,
        old_value: metric.display(old),
        new_value: metric.display(new),
        delta: metric.display(delta),
        percent_change: PercentChange::between(old, new),
    }
}

fn displayed_zero(value: &str) -> bool {
    value.parse::<f64>().map(|v| v == 0.0).unwrap_or(false)
}

pub fn compare_snapshots(
    workbook: &Workbook,
    registry: &MetricRegistry,
    date1: NaiveDate,
    date2: NaiveDate,
) -> HubResult<SnapshotComparison> {
    let first = snapshot_by_date(workbook, registry, date1);
    let second = snapshot_by_date(workbook, registry, date2);
    let (Some(first), Some(second)) = (first, second) else {
        return Err(HubError::SnapshotNotFound {
            date1: date1.format("%b %-d, %Y").to_string(),
            date2: date2.format("%b %-d, %Y").to_string(),
        });
    };

    let changes = registry
        .metrics()
        .iter()
        .map(|m| metric_change(m, first.metric(m.key), second.metric(m.key)))
        .filter(|change| !displayed_zero(&change.delta))
        .collect();
    let all_metrics = registry
        .metrics()
        .iter()
        .map(|m| MetricPair {
            metric: m.header,
            value1: m.display(first.metric(m.key)),
            value2: m.display(second.metric(m.key)),
        })
        .collect();

    Ok(SnapshotComparison {
        date1: first.formatted_date,
        date2: second.formatted_date,
        changes,
        all_metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::tests::{hub_row, hub_sheet};
    use crate::sheet::Sheet;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn roster(absences: i64) -> Sheet {
        hub_sheet(vec![
            hub_row("Lopez, Ana", |row| {
                row[0] = CellValue::Bool(true);
                row[18] = CellValue::Number(absences as f64);
            }),
            hub_row("Zhou, Li", |_| {}),
        ])
    }

    fn workbook_with_snapshots(days: &[(NaiveDateTime, i64)]) -> Workbook {
        let registry = MetricRegistry::standard();
        let mut workbook = Workbook::new();
        for (when, absences) in days {
            workbook.put_sheet(roster(*absences));
            create_weekly_snapshot(&mut workbook, &registry, *when).unwrap();
        }
        workbook
    }

    #[test]
    fn first_snapshot_creates_the_sheet_with_headers() {
        let registry = MetricRegistry::standard();
        let mut workbook = Workbook::new();
        workbook.load_sheet(roster(4));
        let row = create_weekly_snapshot(&mut workbook, &registry, at(2025, 3, 10, 11)).unwrap();
        assert_eq!(row, 2);

        let sheet = workbook.sheet(SNAPSHOT_SHEET).unwrap();
        assert_eq!(sheet.last_column(), 23);
        assert_eq!(sheet.values(1, 1, 1, 1)[0][0], CellValue::text("Snapshot Date"));
        let stored = &sheet.values(2, 1, 1, 4)[0];
        assert_eq!(stored[0], CellValue::DateTime(at(2025, 3, 10, 11)));
        assert_eq!(stored[1], CellValue::Number(2.0));
        assert_eq!(stored[3], CellValue::Number(50.0));
        assert!(workbook.dirty_sheets().any(|s| s.name() == SNAPSHOT_SHEET));
    }

    #[test]
    fn empty_roster_leaves_only_the_header() {
        let registry = MetricRegistry::standard();
        let mut workbook = Workbook::new();
        workbook.load_sheet(hub_sheet(Vec::new()));
        let err = create_weekly_snapshot(&mut workbook, &registry, at(2025, 3, 10, 11)).unwrap_err();
        assert!(matches!(err, HubError::EmptyRoster(_)));

        let sheet = workbook.sheet(SNAPSHOT_SHEET).unwrap();
        assert_eq!(sheet.last_row(), 1);
        assert_eq!(sheet.values(1, 1, 1, 1)[0][0], CellValue::text("Snapshot Date"));
        assert!(all_snapshots(&workbook, &registry).is_empty());
    }

    #[test]
    fn snapshots_read_back_by_calendar_day() {
        let registry = MetricRegistry::standard();
        let workbook = workbook_with_snapshots(&[(at(2025, 3, 3, 11), 50), (at(2025, 3, 10, 11), 65)]);
        let all = all_snapshots(&workbook, &registry);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].formatted_date, "Mar 3, 2025");

        let found = snapshot_by_date(&workbook, &registry, NaiveDate::from_ymd_opt(2025, 3, 10).unwrap())
            .unwrap();
        assert_eq!(found.metric("totalAbsences"), 65.0);
        assert!(snapshot_by_date(&workbook, &registry, NaiveDate::from_ymd_opt(2025, 3, 11).unwrap()).is_none());
    }

    #[test]
    fn same_day_duplicates_resolve_to_the_first_row() {
        let registry = MetricRegistry::standard();
        let workbook = workbook_with_snapshots(&[(at(2025, 3, 10, 9), 10), (at(2025, 3, 10, 15), 20)]);
        assert_eq!(all_snapshots(&workbook, &registry).len(), 2);
        let found = snapshot_by_date(&workbook, &registry, NaiveDate::from_ymd_opt(2025, 3, 10).unwrap())
            .unwrap();
        assert_eq!(found.metric("totalAbsences"), 10.0);
    }

    #[test]
    fn list_is_newest_first_and_trends_oldest_first() {
        let registry = MetricRegistry::standard();
        let workbook = workbook_with_snapshots(&[
            (at(2025, 2, 24, 11), 1),
            (at(2025, 3, 3, 11), 2),
            (at(2025, 3, 10, 11), 3),
        ]);
        let list = snapshot_list(&workbook, &registry);
        assert_eq!(list[0].formatted_date, "Mar 10, 2025");
        assert_eq!(list[2].formatted_date, "Feb 24, 2025");
        assert_eq!(list[0].timestamp, at(2025, 3, 10, 11).and_utc().timestamp_millis());

        let history = historical_data(&workbook, &registry);
        assert_eq!(history.trends[0].formatted_date, "Feb 24, 2025");
        assert_eq!(history.snapshot_list, list);
        let json = serde_json::to_value(&history).unwrap();
        assert_eq!(json["trends"][2]["totalAbsences"], 3.0);
        assert!(json["snapshotList"].is_array());
    }

    #[test]
    fn comparison_reports_delta_and_percent() {
        let registry = MetricRegistry::standard();
        let workbook = workbook_with_snapshots(&[(at(2025, 3, 3, 11), 50), (at(2025, 3, 10, 11), 65)]);
        let comparison = compare_snapshots(
            &workbook,
            &registry,
            NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
        )
        .unwrap();

        assert_eq!(comparison.date1, "Mar 3, 2025");
        assert_eq!(comparison.all_metrics.len(), 22);
        let absences = comparison
            .changes
            .iter()
            .find(|c| c.metric == "Total Absences")
            .unwrap();
        assert_eq!(absences.delta, "15");
        assert_eq!(absences.percent_change.to_string(), "30.0");
        let avg = comparison
            .changes
            .iter()
            .find(|c| c.metric == "Avg Absences")
            .unwrap();
        assert_eq!(avg.old_value, "25.00");
        assert_eq!(avg.delta, "7.50");
        assert!(comparison.changes.iter().all(|c| c.metric != "Total Students"));
    }

    #[test]
    fn percent_change_from_zero_is_flagged() {
        assert_eq!(PercentChange::between(0.0, 0.0).to_string(), "0");
        assert_eq!(PercentChange::between(0.0, 4.0), PercentChange::FromZero);
        assert_eq!(PercentChange::between(0.0, 4.0).to_string(), "N/A (from zero)");
        assert_eq!(PercentChange::between(4.0, 3.0).to_string(), "-25.0");
        assert_eq!(
            serde_json::to_value(PercentChange::FromZero).unwrap(),
            serde_json::json!("N/A (from zero)")
        );
    }

    #[test]
    fn comparing_a_missing_date_names_both_dates() {
        let registry = MetricRegistry::standard();
        let workbook = workbook_with_snapshots(&[(at(2025, 3, 3, 11), 50)]);
        let err = compare_snapshots(
            &workbook,
            &registry,
            NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 17).unwrap(),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "one or both snapshots not found (Mar 3, 2025, Mar 17, 2025)"
        );
    }
}
