use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

mod aggregate;
mod db;
mod models;
mod report;

use models::ReportRecord;

#[derive(Parser)]
#[command(name = "unit-report-analytics")]
#[command(about = "Aggregate analytics over business-unit performance reports", long_about = None)]
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
    /// Import report records from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Rank units by mean score, with deltas against the preceding window
    Leaderboard {
        #[arg(long)]
        unit: Option<String>,
        #[arg(long)]
        indicator: Option<String>,
        #[arg(long, default_value_t = 30)]
        since_days: i64,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Emit the full aggregate snapshot as JSON
    Snapshot {
        #[arg(long)]
        unit: Option<String>,
        #[arg(long)]
        indicator: Option<String>,
        #[arg(long, default_value_t = 30)]
        since_days: i64,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        unit: Option<String>,
        #[arg(long)]
        indicator: Option<String>,
        #[arg(long, default_value_t = 30)]
        since_days: i64,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn normalize_all(raw: Vec<models::RawReport>) -> Vec<ReportRecord> {
    raw.into_iter().map(aggregate::normalize).collect()
}

/// Fetch the current window plus the preceding window of equal length, both
/// already normalized. The prior window feeds the leaderboard deltas.
async fn fetch_windows(
    pool: &PgPool,
    since_days: i64,
    unit: Option<&str>,
    indicator: Option<&str>,
) -> anyhow::Result<(chrono::DateTime<chrono::Utc>, Vec<ReportRecord>, Vec<ReportRecord>)> {
    let since = aggregate::cutoff_date(since_days);
    let prior_since = aggregate::cutoff_date(since_days.max(1) * 2);

    let current = db::fetch_reports(pool, since, None, unit, indicator).await?;
    let prior = db::fetch_reports(pool, prior_since, Some(since), unit, indicator).await?;

    Ok((since, normalize_all(current), normalize_all(prior)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} reports from {}.", csv.display());
        }
        Commands::Leaderboard {
            unit,
            indicator,
            since_days,
            limit,
        } => {
            let (_, current, prior) =
                fetch_windows(&pool, since_days, unit.as_deref(), indicator.as_deref()).await?;
            let rows = aggregate::build_leaderboard(&current, &prior);

            if rows.is_empty() {
                println!("No scored reports found for this window.");
                return Ok(());
            }

            println!("Units ranked by mean score:");
            for row in rows.iter().take(limit) {
                let delta = match row.delta {
                    Some(value) => format!("{value:+.1}"),
                    None => "n/a".to_string(),
                };
                println!(
                    "{}. {} mean {:.1} across {} scored reports (change {})",
                    row.rank, row.unit, row.mean_score, row.report_count, delta
                );
            }
        }
        Commands::Snapshot {
            unit,
            indicator,
            since_days,
            out,
        } => {
            let (_, current, prior) =
                fetch_windows(&pool, since_days, unit.as_deref(), indicator.as_deref()).await?;
            let snapshot = aggregate::build_snapshot(&current, &prior);
            let json = serde_json::to_string_pretty(&snapshot)?;

            match out {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    println!("Snapshot written to {}.", path.display());
                }
                None => println!("{json}"),
            }
        }
        Commands::Report {
            unit,
            indicator,
            since_days,
            out,
        } => {
            let (since, current, prior) =
                fetch_windows(&pool, since_days, unit.as_deref(), indicator.as_deref()).await?;
            let snapshot = aggregate::build_snapshot(&current, &prior);
            let report = report::build_report(
                unit.as_deref().or(indicator.as_deref()),
                since,
                &snapshot,
            );
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
