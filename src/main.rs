use std::path::PathBuf;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;

mod access;
mod activity;
mod config;
mod db;
mod error;
mod matcher;
mod metrics;
mod models;
mod notify;
mod reader;
mod render;
mod report;
mod schedule;
mod sheet;
mod snapshot;

use crate::metrics::MetricRegistry;
use crate::models::BatchOutcome;
use crate::notify::OutboxMailer;
use crate::report::RunContext;
use crate::schedule::WeeklyTrigger;

#[derive(Parser)]
#[command(name = "academics-hub")]
#[command(about = "Academics & attendance hub: weekly snapshots, staff digests and the dashboard", long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: config::Settings,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a small demo workbook
    Seed,
    /// Replace a sheet with the contents of a CSV file
    Import {
        #[arg(long)]
        sheet: String,
        #[arg(long)]
        csv: PathBuf,
    },
    /// Write a sheet out as CSV
    Export {
        #[arg(long)]
        sheet: String,
        #[arg(long)]
        csv: PathBuf,
    },
    /// Append this week's aggregate snapshot
    Snapshot,
    /// Register the weekly snapshot trigger (Mondays at 11:00)
    Schedule,
    /// List registered triggers and when they fire next
    Triggers,
    /// List stored snapshots, newest first
    Snapshots,
    /// Compare the snapshots taken on two dates (YYYY-MM-DD)
    Compare { date1: NaiveDate, date2: NaiveDate },
    /// Print trend data and the snapshot selector list as JSON
    History,
    /// Email each Tier 2 instructor their weekly student summary
    Tier2Emails,
    /// Email each counselor the failing students in their alpha range
    CounselorEmails,
    /// Email each case manager a summary of their caseload
    CaseManagerEmails,
    /// Send the ineligibility alerts checked on the advisors sheet
    IneligibilityNotices,
    /// Email administrators the ineligible and at-risk activity roster
    EligibilitySummary,
    /// Show the role recorded for a staff member
    Role {
        #[arg(long = "as")]
        as_user: String,
    },
    /// Print roster data as JSON for a staff member
    StudentData {
        #[arg(long = "as")]
        as_user: String,
        #[arg(long)]
        anonymized: bool,
    },
    /// Render the dashboard page for a staff member
    Dashboard {
        #[arg(long = "as")]
        as_user: Option<String>,
        #[arg(long, default_value = "dashboard.html")]
        out: PathBuf,
    },
}

fn print_outcome(outcome: &BatchOutcome) {
    match &outcome.aborted {
        Some(reason) => println!("{}: aborted ({reason}).", outcome.report),
        None => println!(
            "{}: {} sent, {} failed, {} skipped.",
            outcome.report, outcome.sent, outcome.failed, outcome.skipped
        ),
    }
    for warning in &outcome.warnings {
        println!("- {warning}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    config::init_tracing(&cli.settings.log);

    let database_url = cli
        .settings
        .database_url
        .clone()
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    let registry = MetricRegistry::standard();
    let now = Local::now().naive_local();

    match &cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
            return Ok(());
        }
        Commands::Seed => {
            let sheets = db::seed(&pool).await?;
            println!("Seeded {sheets} sheets.");
            return Ok(());
        }
        Commands::Import { sheet, csv } => {
            let rows = db::import_csv(&pool, sheet, csv).await?;
            println!("Imported {rows} rows into '{sheet}' from {}.", csv.display());
            return Ok(());
        }
        Commands::Export { sheet, csv } => {
            let rows = db::export_csv(&pool, sheet, csv).await?;
            println!("Exported {rows} rows of '{sheet}' to {}.", csv.display());
            return Ok(());
        }
        Commands::Schedule => {
            let trigger = WeeklyTrigger::weekly_snapshot();
            let replaced = db::register_weekly_trigger(&pool, &trigger).await?;
            tracing::info!(replaced, "weekly snapshot trigger set up for Mondays at 11:00");
            println!(
                "Registered {} (replaced {replaced}); next run {}.",
                trigger.handler,
                trigger.next_fire(now).format("%a %b %-d, %Y %H:%M")
            );
            return Ok(());
        }
        Commands::Triggers => {
            let triggers = db::list_triggers(&pool).await?;
            if triggers.is_empty() {
                println!("No triggers registered.");
            }
            for trigger in triggers {
                println!(
                    "- {} every {} at {:02}:00, next {}",
                    trigger.handler,
                    trigger.weekday,
                    trigger.hour,
                    trigger.next_fire(now).format("%Y-%m-%d %H:%M")
                );
            }
            return Ok(());
        }
        _ => {}
    }

    let mut workbook = db::load_workbook(&pool).await?;
    let mut mailer = OutboxMailer::new(cli.settings.outbox_dir.clone());
    let mut ctx = RunContext {
        now,
        mailer: &mut mailer,
        spreadsheet_url: cli.settings.spreadsheet_url.clone(),
    };

    match cli.command {
        Commands::Snapshot => {
            let row = match snapshot::create_weekly_snapshot(&mut workbook, &registry, now) {
                Ok(row) => row,
                Err(err) => {
                    db::save_workbook(&pool, &mut workbook).await?;
                    return Err(err.into());
                }
            };
            println!(
                "Snapshot for {} written to row {row}.",
                snapshot::snapshot_label(now)
            );
        }
        Commands::Snapshots => {
            let list = snapshot::snapshot_list(&workbook, &registry);
            if list.is_empty() {
                println!("No snapshots stored.");
            }
            for entry in list {
                println!("- {} ({})", entry.formatted_date, entry.date.format("%Y-%m-%d %H:%M"));
            }
        }
        Commands::Compare { date1, date2 } => {
            let comparison = snapshot::compare_snapshots(&workbook, &registry, date1, date2)?;
            println!("{} -> {}", comparison.date1, comparison.date2);
            if comparison.changes.is_empty() {
                println!("No metric changed.");
            }
            for change in &comparison.changes {
                println!(
                    "- {}: {} -> {} (delta {}, percent change {})",
                    change.metric,
                    change.old_value,
                    change.new_value,
                    change.delta,
                    change.percent_change
                );
            }
        }
        Commands::History => {
            let history = snapshot::historical_data(&workbook, &registry);
            println!("{}", serde_json::to_string_pretty(&history)?);
        }
        Commands::Tier2Emails => {
            print_outcome(&report::send_tier2_instructor_emails(&workbook, &mut ctx));
        }
        Commands::CounselorEmails => {
            print_outcome(&report::send_counselor_summary_emails(&workbook, &mut ctx));
        }
        Commands::CaseManagerEmails => {
            print_outcome(&report::send_case_manager_summary_emails(&workbook, &mut ctx));
        }
        Commands::IneligibilityNotices => {
            print_outcome(&report::send_ineligibility_notifications(&mut workbook, &mut ctx));
        }
        Commands::EligibilitySummary => {
            print_outcome(&report::send_ineligibility_summary(&workbook, &mut ctx));
        }
        Commands::Role { as_user } => match access::current_user_role(&workbook, &as_user)? {
            Some(user) => println!("{} <{}>: {}", user.name, user.email, user.role),
            None => println!("{as_user} is not listed in Staff Roles."),
        },
        Commands::StudentData {
            as_user,
            anonymized,
        } => {
            let students = if anonymized {
                access::anonymized_student_data(&workbook, &as_user)?
            } else {
                access::student_data(&workbook, &as_user)?
            };
            println!("{}", serde_json::to_string_pretty(&students)?);
        }
        Commands::Dashboard { as_user, out } => {
            let page = access::serve_dashboard(&workbook, &registry, as_user.as_deref())?;
            std::fs::write(&out, page)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Dashboard written to {}.", out.display());
        }
        Commands::InitDb
        | Commands::Seed
        | Commands::Import { .. }
        | Commands::Export { .. }
        | Commands::Schedule
        | Commands::Triggers => {}
    }

    let saved = db::save_workbook(&pool, &mut workbook).await?;
    if saved > 0 {
        tracing::info!(sheets = saved, "workbook changes saved");
    }
    Ok(())
}
