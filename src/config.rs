use std::path::PathBuf;

use clap::Args;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Settings shared by every subcommand, from flags or the environment.
#[derive(Debug, Args)]
pub struct Settings {
    #[arg(
        long,
        env = "DATABASE_URL",
        hide_env_values = true,
        global = true,
        help = "Postgres connection string for the sheet store"
    )]
    pub database_url: Option<String>,

    #[arg(
        long,
        env = "HUB_OUTBOX_DIR",
        default_value = "outbox",
        global = true,
        help = "Directory outgoing emails are written to"
    )]
    pub outbox_dir: PathBuf,

    #[arg(
        long,
        env = "HUB_SPREADSHEET_URL",
        global = true,
        help = "Link to the hub spreadsheet, shown in the eligibility summary"
    )]
    pub spreadsheet_url: Option<String>,

    #[arg(
        long,
        env = "HUB_LOG",
        default_value = "info",
        global = true,
        help = "Log filter directives, e.g. info or academics_hub=debug"
    )]
    pub log: String,
}

pub fn env_filter(directives: &str) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .parse_lossy(directives)
}

pub fn init_tracing(directives: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(directives))
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
