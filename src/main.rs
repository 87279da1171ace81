use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;
use tracing_subscriber::EnvFilter;

use connect_attendance::attendance::{self, round_to_tenth};
use connect_attendance::models::{AttendanceReport, Member};
use connect_attendance::{report, snapshot};

mod config;
mod db;

use config::Config;

#[derive(Parser)]
#[command(name = "connect-attendance")]
#[command(about = "Weekly attendance trends for Connect groups", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import members and reports from a JSON export
    Import {
        #[arg(long)]
        json: PathBuf,
    },
    /// Print the weekly attendance trend
    Trend {
        /// Restrict to one group; omit for the whole church
        #[arg(long)]
        group: Option<String>,
        /// Number of reporting weeks to show (defaults to TREND_WEEKS)
        #[arg(long, value_parser = config::parse_trend_weeks)]
        weeks: Option<usize>,
        /// Read a JSON export instead of the database
        #[arg(long)]
        from_json: Option<PathBuf>,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        group: Option<String>,
        #[arg(long, value_parser = config::parse_trend_weeks)]
        weeks: Option<usize>,
        #[arg(long)]
        from_json: Option<PathBuf>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        /// Also write the weekly series as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::InitDb => {
            let pool = connect(&config).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect(&config).await?;
            let (members, reports) = db::seed(&pool).await?;
            println!("Seed data inserted ({members} members, {reports} reports).");
        }
        Commands::Import { json } => {
            let pool = connect(&config).await?;
            let export = snapshot::load_snapshot(&json)?;
            let (members, reports) = db::import_snapshot(&pool, &export).await?;
            println!(
                "Imported {members} members and {reports} reports from {}.",
                json.display()
            );
        }
        Commands::Trend {
            group,
            weeks,
            from_json,
        } => {
            let trend_weeks = config.trend_weeks(weeks)?;
            let (members, reports) =
                load(&config, group.as_deref(), from_json.as_deref()).await?;
            let summaries = attendance::compute_weekly_summaries_for(
                &reports,
                &members,
                group.as_deref(),
                trend_weeks,
            );

            if summaries.is_empty() {
                println!("No attendance reports found.");
                return Ok(());
            }

            println!(
                "Weekly attendance for {}:",
                group.as_deref().unwrap_or("all groups")
            );
            for summary in summaries.iter() {
                println!(
                    "- {}: avg {:.1} incl. guests, {:.1} guests across {} groups",
                    summary.label,
                    round_to_tenth(summary.average_present_plus_guests),
                    round_to_tenth(summary.average_guests_only),
                    summary.reporting_group_count
                );
            }
        }
        Commands::Report {
            group,
            weeks,
            from_json,
            out,
            csv,
        } => {
            let trend_weeks = config.trend_weeks(weeks)?;
            let (members, reports) =
                load(&config, group.as_deref(), from_json.as_deref()).await?;
            let totals =
                attendance::compute_week_totals(&reports, &members, group.as_deref(), trend_weeks);
            let summaries: Vec<_> = totals.iter().map(attendance::summarize_week).collect();
            let groups =
                report::summarize_by_group(&report::reports_in_window(&reports, trend_weeks), &members);

            let output =
                report::build_report(group.as_deref(), trend_weeks, &totals, &summaries, &groups);
            std::fs::write(&out, output)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());

            if let Some(path) = csv {
                report::write_summaries_csv(&path, &summaries)?;
                println!("Weekly series written to {}.", path.display());
            }
        }
    }

    Ok(())
}

async fn connect(config: &Config) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.max_connections()?)
        .connect(config.database_url()?)
        .await
        .context("failed to connect to Postgres")
}

async fn load(
    config: &Config,
    group: Option<&str>,
    from_json: Option<&Path>,
) -> anyhow::Result<(Vec<Member>, Vec<AttendanceReport>)> {
    let (members, reports) = match from_json {
        Some(path) => {
            let export = snapshot::load_snapshot(path)?;
            let reports: Vec<AttendanceReport> = export
                .reports()
                .into_iter()
                .filter(|report| group.is_none() || report.group_id.as_deref() == group)
                .collect();
            (export.members(), reports)
        }
        None => {
            let pool = connect(config).await?;
            (db::fetch_members(&pool).await?, db::fetch_reports(&pool, group).await?)
        }
    };

    info!(
        members = members.len(),
        reports = reports.len(),
        "loaded attendance data"
    );
    Ok((members, reports))
}
