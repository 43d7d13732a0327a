use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod cache;
mod calendar;
mod db;
mod models;
mod report;
mod signals;
mod status;
mod summary;
#[cfg(test)]
mod testutil;
mod timings;

use cache::CacheStore;
use db::{DataSource, PgDataSource};
use status::ClassStatusDeriver;
use summary::SummaryService;
use timings::PeriodTimingResolver;

#[derive(Parser)]
#[command(name = "teacher-dashboard")]
#[command(about = "Daily-status dashboard aggregation for teachers", long_about = None)]
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
    /// Import holiday rows from a CSV file with date,name columns
    ImportHolidays {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Derive a teacher's class list with statuses for one date
    Classes {
        #[arg(long)]
        teacher: Uuid,
        /// Defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Build (or serve from cache) the full dashboard summary
    Summary {
        #[arg(long)]
        teacher: Uuid,
        /// Bypass the freshness window and aggregate now
        #[arg(long, default_value_t = false)]
        force: bool,
        /// Print the summary as JSON instead of text
        #[arg(long, default_value_t = false)]
        json: bool,
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
    /// Drop a user's cached summary (for logout / identity changes)
    ClearCache {
        #[arg(long)]
        teacher: Uuid,
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
}

fn cache_dir(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| std::env::var_os("TEACHER_DASHBOARD_CACHE_DIR").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(".dashboard-cache"))
}

/// Connects lazily so commands that never touch Postgres (clear-cache) run
/// without a `DATABASE_URL`.
async fn pg_pool() -> anyhow::Result<sqlx::PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;
    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

fn clear_cache(dir: Option<PathBuf>, teacher: Uuid) -> anyhow::Result<()> {
    let store = CacheStore::new(cache_dir(dir));
    store.clear(teacher)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::InitDb => {
            let pool = pg_pool().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = pg_pool().await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::ImportHolidays { csv } => {
            let pool = pg_pool().await?;
            let inserted = db::import_holidays_csv(&pool, &csv).await?;
            println!("Inserted {inserted} holidays from {}.", csv.display());
        }
        Commands::Classes { teacher, date } => {
            let source = Arc::new(PgDataSource::new(pg_pool().await?));
            let resolver = Arc::new(PeriodTimingResolver::new(source.clone()));
            let deriver = ClassStatusDeriver::new(source.clone(), resolver);

            let year = source
                .current_academic_year()
                .await?
                .context("no current academic year configured")?;
            let local_now = Local::now();
            let date = date.unwrap_or_else(|| local_now.date_naive());

            let classes = deriver
                .derive_today_classes(teacher, year.id, date, local_now.time())
                .await;
            if classes.is_empty() {
                println!("No classes on {date}.");
            } else {
                println!("Classes on {date}:");
                for class in classes.iter() {
                    println!("{}", report::class_line(class));
                }
            }
        }
        Commands::Summary {
            teacher,
            force,
            json,
            cache_dir: dir,
        } => {
            let source = Arc::new(PgDataSource::new(pg_pool().await?));
            let store = CacheStore::new(cache_dir(dir));
            let service = SummaryService::new(source, store);

            let summary = service.refresh(teacher, force).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print!("{}", report::render_summary(&summary));
            }
        }
        Commands::ClearCache {
            teacher,
            cache_dir: dir,
        } => {
            clear_cache(dir, teacher)?;
            println!("Cache slot cleared for {teacher}.");
        }
    }

    Ok(())
}
