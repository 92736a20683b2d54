use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{anyhow, Context};
use chrono::{Duration, Local, NaiveDate, Weekday};
use sqlx::types::Json;
use sqlx::{PgPool, Row};

use crate::reader::HUB_SCHEMA;
use crate::schedule::{superseded, WeeklyTrigger};
use crate::sheet::{
    column_index, CellValue, Sheet, Workbook, ABSENCES_SHEET, ADMIN_SETTINGS_SHEET,
    ADVISORS_SHEET, HUB_SHEET, SPARTAN_HOUR_SHEET, STAFF_ROLES_SHEET,
};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Reads every stored sheet into a clean workbook.
pub async fn load_workbook(pool: &PgPool) -> anyhow::Result<Workbook> {
    let names = sqlx::query("SELECT name FROM academics_hub.sheets ORDER BY name")
        .fetch_all(pool)
        .await
        .context("failed to list sheets")?;
    let mut rows_by_sheet: BTreeMap<String, Vec<Vec<CellValue>>> = names
        .iter()
        .map(|row| (row.get::<String, _>("name"), Vec::new()))
        .collect();

    let rows = sqlx::query(
        "SELECT sheet_name, row_index, cells FROM academics_hub.sheet_rows \
         ORDER BY sheet_name, row_index",
    )
    .fetch_all(pool)
    .await
    .context("failed to read sheet rows")?;

    for row in rows {
        let sheet_name: String = row.get("sheet_name");
        let row_index: i32 = row.get("row_index");
        let Json(cells): Json<Vec<CellValue>> = row.get("cells");
        let target = rows_by_sheet.entry(sheet_name).or_default();
        let position = usize::try_from(row_index).unwrap_or(0).saturating_sub(1);
        if target.len() <= position {
            target.resize_with(position + 1, Vec::new);
        }
        target[position] = cells;
    }

    let mut workbook = Workbook::new();
    for (name, rows) in rows_by_sheet {
        workbook.load_sheet(Sheet::with_rows(name, rows));
    }
    tracing::debug!(sheets = workbook.sheet_names().count(), "workbook loaded");
    Ok(workbook)
}

/// Replaces one stored sheet in a single transaction.
pub async fn save_sheet(pool: &PgPool, sheet: &Sheet) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query(
        r#"
        INSERT INTO academics_hub.sheets (name)
        VALUES ($1)
        ON CONFLICT (name) DO UPDATE SET updated_at = now()
        "#,
    )
    .bind(sheet.name())
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM academics_hub.sheet_rows WHERE sheet_name = $1")
        .bind(sheet.name())
        .execute(&mut *tx)
        .await?;

    for (idx, cells) in sheet.rows().iter().enumerate() {
        if cells.iter().all(CellValue::is_blank) {
            continue;
        }
        sqlx::query(
            r#"
            INSERT INTO academics_hub.sheet_rows (sheet_name, row_index, cells)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(sheet.name())
        .bind(i32::try_from(idx + 1)?)
        .bind(Json(cells))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit()
        .await
        .with_context(|| format!("failed to save sheet '{}'", sheet.name()))?;
    Ok(())
}

/// Persists the sheets modified during this run.
pub async fn save_workbook(pool: &PgPool, workbook: &mut Workbook) -> anyhow::Result<usize> {
    let dirty: Vec<Sheet> = workbook.dirty_sheets().cloned().collect();
    for sheet in &dirty {
        save_sheet(pool, sheet).await?;
        tracing::info!(sheet = sheet.name(), rows = sheet.last_row(), "sheet saved");
    }
    workbook.mark_clean();
    Ok(dirty.len())
}

/// Parses a header-included CSV into a sheet, typing each cell from its text.
pub fn read_csv_sheet(name: &str, input: impl Read) -> anyhow::Result<Sheet> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(input);
    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("invalid CSV row {}", idx + 1))?;
        rows.push(record.iter().map(CellValue::infer).collect());
    }
    Ok(Sheet::with_rows(name, rows))
}

pub fn write_csv_sheet(sheet: &Sheet, output: impl Write) -> anyhow::Result<usize> {
    let mut writer = csv::Writer::from_writer(output);
    let width = sheet.last_column();
    let rows = sheet.values(1, 1, sheet.last_row(), width);
    for row in &rows {
        writer.write_record(row.iter().map(CellValue::as_text))?;
    }
    writer.flush()?;
    Ok(rows.len())
}

pub async fn import_csv(pool: &PgPool, sheet_name: &str, csv_path: &Path) -> anyhow::Result<usize> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let sheet = read_csv_sheet(sheet_name, file)?;
    save_sheet(pool, &sheet).await?;
    Ok(sheet.last_row())
}

pub async fn export_csv(pool: &PgPool, sheet_name: &str, csv_path: &Path) -> anyhow::Result<usize> {
    let workbook = load_workbook(pool).await?;
    let sheet = workbook.require(sheet_name)?;
    let file = std::fs::File::create(csv_path)
        .with_context(|| format!("failed to create {}", csv_path.display()))?;
    write_csv_sheet(sheet, file)
}

fn sparse_row(cells: &[(&str, CellValue)]) -> anyhow::Result<Vec<CellValue>> {
    let mut row = Vec::new();
    for (column, value) in cells {
        let idx = column_index(column)? - 1;
        if row.len() <= idx {
            row.resize(idx + 1, CellValue::Empty);
        }
        row[idx] = value.clone();
    }
    Ok(row)
}

fn month_day(date: NaiveDate) -> String {
    date.format("%-m/%-d").to_string()
}

/// A small, self-consistent school workbook for demos.
pub fn demo_workbook(today: NaiveDate) -> anyhow::Result<Workbook> {
    let mut workbook = Workbook::new();

    let admin = vec![
        sparse_row(&[
            ("A", "Administrator".into()),
            ("B", "Admin Email".into()),
            ("C", "CM First".into()),
            ("D", "CM Last".into()),
            ("E", "CM Email".into()),
            ("F", "Counselor".into()),
            ("G", "Counselor Email".into()),
            ("H", "Alpha Start".into()),
            ("J", "Tier 2 Instructor".into()),
            ("L", "Instructor Email".into()),
        ])?,
        sparse_row(&[
            ("A", "Dana Cruz".into()),
            ("B", "dana.cruz@ohs.example.org".into()),
            ("C", "Pat".into()),
            ("D", "Troy".into()),
            ("E", "pat.troy@ohs.example.org".into()),
            ("F", "Sam Reyes".into()),
            ("G", "sam.reyes@ohs.example.org".into()),
            ("H", "A".into()),
            ("J", "Ann Smith".into()),
            ("L", "ann.smith@ohs.example.org".into()),
        ])?,
        sparse_row(&[
            ("A", "Lou Park".into()),
            ("B", "lou.park@ohs.example.org".into()),
            ("C", "Kim".into()),
            ("D", "Ortiz".into()),
            ("E", "kim.ortiz@ohs.example.org".into()),
            ("F", "Val Tan".into()),
            ("G", "val.tan@ohs.example.org".into()),
            ("H", "M".into()),
            ("J", "Bo Jones".into()),
            ("L", "bo.jones@ohs.example.org".into()),
        ])?,
    ];
    workbook.put_sheet(Sheet::with_rows(ADMIN_SETTINGS_SHEET, admin));

    // name, grade, id, case manager, activity, failing classes, unserved detention,
    // total absences, tier 2 intervention, tier 2 instructor
    let students = [
        ("Abbott, Cy", 9, 10231, "", "Soccer", "", 0, 2, "", ""),
        ("Lopez, Ana", 10, 10452, "Troy", "Soccer", "Algebra I", 1, 6, "Math Lab", "Smith"),
        ("Martinez, Luis", 11, 10877, "Ortiz, K", "Band", "Biology\nChemistry", 3, 9, "", ""),
        ("Nguyen, Bao", 12, 10990, "", "", "", 0, 1, "Reading", "Jones"),
        ("Zhou, Li", 9, 11004, "", "Band", "Art", 0, 4, "Math Lab", "Smith"),
    ];
    let mut hub = vec![HUB_SCHEMA
        .fields
        .iter()
        .map(|f| CellValue::text(f.name))
        .collect::<Vec<_>>()];
    for (name, grade, id, case_manager, activity, failing, detention, absences, tier2, instructor) in
        students
    {
        let failing_count = failing.lines().count();
        hub.push(sparse_row(&[
            ("A", CellValue::Bool(failing_count >= 2)),
            ("B", name.into()),
            ("C", f64::from(grade).into()),
            ("D", f64::from(id).into()),
            ("E", case_manager.into()),
            ("F", activity.into()),
            ("G", f64::from(detention).into()),
            ("H", f64::from(detention).into()),
            ("K", CellValue::Bool(failing_count > 0)),
            ("L", failing.into()),
            ("M", (failing_count as f64).into()),
            ("S", f64::from(absences).into()),
            ("W", tier2.into()),
            ("X", instructor.into()),
            ("AD", CellValue::Number(0.0)),
        ])?);
    }
    workbook.put_sheet(Sheet::with_rows(HUB_SHEET, hub));

    let recent = month_day(today - Duration::days(2));
    let stale = month_day(today - Duration::days(30));
    let spartan = vec![
        sparse_row(&[("C", "Student".into()), ("H", "Requests".into()), ("P", "Skipped".into()), ("Q", "Sign-ups".into())])?,
        sparse_row(&[
            ("C", "Lopez, Ana".into()),
            ("H", CellValue::text(format!("Algebra ({recent}), History ({stale})"))),
            ("P", CellValue::text(format!("Algebra ({recent})"))),
        ])?,
        sparse_row(&[
            ("C", "Martinez, Luis".into()),
            ("H", CellValue::text(format!("Biology ({recent})"))),
            ("Q", CellValue::text(format!("Chemistry ({recent})"))),
        ])?,
    ];
    workbook.put_sheet(Sheet::with_rows(SPARTAN_HOUR_SHEET, spartan));

    let absences = vec![
        sparse_row(&[("A", "Student".into()), ("C", "P0".into())])?,
        sparse_row(&[("A", "Lopez, Ana".into()), ("D", CellValue::Number(3.0)), ("F", CellValue::Number(5.0))])?,
        sparse_row(&[("A", "Martinez, Luis".into()), ("E", CellValue::Number(6.0)), ("K", CellValue::Number(1.0))])?,
    ];
    workbook.put_sheet(Sheet::with_rows(ABSENCES_SHEET, absences));

    let advisors = vec![
        sparse_row(&[
            ("A", "Activity".into()),
            ("B", "Students".into()),
            ("D", "Primary Email".into()),
            ("F", "Secondary Email".into()),
            ("H", "Other Emails".into()),
            ("I", "Send".into()),
            ("J", "Last Sent".into()),
        ])?,
        sparse_row(&[
            ("A", "Soccer".into()),
            ("B", "Abbott, Cy\nLopez, Ana".into()),
            ("D", "coach.reed@ohs.example.org".into()),
            ("I", CellValue::Bool(false)),
        ])?,
        sparse_row(&[
            ("A", "Band".into()),
            ("B", "Martinez, Luis\nZhou, Li".into()),
            ("D", "band.director@ohs.example.org".into()),
            ("H", "band.boosters@ohs.example.org".into()),
            ("I", CellValue::Bool(true)),
        ])?,
    ];
    workbook.put_sheet(Sheet::with_rows(ADVISORS_SHEET, advisors));

    let roles = vec![
        vec!["Name".into(), "Email".into(), "Role".into()],
        vec!["Dana Cruz".into(), "dana.cruz@ohs.example.org".into(), "ADMIN".into()],
        vec!["Ann Smith".into(), "ann.smith@ohs.example.org".into(), "TEACHER".into()],
    ];
    workbook.put_sheet(Sheet::with_rows(STAFF_ROLES_SHEET, roles));

    Ok(workbook)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<usize> {
    let mut workbook = demo_workbook(Local::now().date_naive())?;
    save_workbook(pool, &mut workbook).await
}

pub async fn list_triggers(pool: &PgPool) -> anyhow::Result<Vec<WeeklyTrigger>> {
    let rows = sqlx::query(
        "SELECT id, handler, weekday, hour FROM academics_hub.triggers ORDER BY created_at, id",
    )
    .fetch_all(pool)
    .await?;

    let mut triggers = Vec::new();
    for row in rows {
        let weekday: String = row.get("weekday");
        let hour: i32 = row.get("hour");
        triggers.push(WeeklyTrigger {
            id: row.get("id"),
            handler: row.get("handler"),
            weekday: weekday
                .parse::<Weekday>()
                .map_err(|_| anyhow!("invalid weekday '{weekday}' in triggers table"))?,
            hour: u32::try_from(hour)?,
        });
    }
    Ok(triggers)
}

/// Stores `trigger`, first deleting earlier triggers for the same handler.
pub async fn register_weekly_trigger(
    pool: &PgPool,
    trigger: &WeeklyTrigger,
) -> anyhow::Result<usize> {
    let existing = list_triggers(pool).await?;
    let replaced = superseded(&existing, trigger);

    let mut tx = pool.begin().await?;
    for old in &replaced {
        sqlx::query("DELETE FROM academics_hub.triggers WHERE id = $1")
            .bind(old.id)
            .execute(&mut *tx)
            .await?;
    }
    sqlx::query(
        r#"
        INSERT INTO academics_hub.triggers (id, handler, weekday, hour)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(trigger.id)
    .bind(&trigger.handler)
    .bind(trigger.weekday.to_string())
    .bind(i32::try_from(trigger.hour)?)
    .execute(&mut *tx)
    .await?;
    tx.commit().await.context("failed to register trigger")?;
    Ok(replaced.len())
}
