use anyhow::Result;
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use tracing::info;

use termly::calendar::{self, TermCalendar};
use termly::config::Config;
use termly::db;
use termly::error::WarehouseError;
use termly::grades;
use termly::report_card;
use termly::seed;

#[derive(Parser)]
#[command(name = "termly")]
#[command(about = "Seeds a school-management training warehouse and builds the termly report card")]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every stage in order, stopping at the first failure
    Run,
    /// Replace dim_dates from the configured CSV
    LoadDates,
    /// Replace dim_report_grade from CSV or config defaults
    LoadGrades,
    /// Fabricate teaching groups for the current academic year
    SeedClasses,
    /// Enrol students into teaching groups
    SeedEnrolments,
    /// Fabricate report events for every enrolment and term
    SeedReports,
    /// Rebuild the pivoted termly report card
    ReportCard,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = Config::load(&args.config)?;
    let pool = db::connect(&config.database).await?;
    let today = chrono::Local::now().date_naive();

    match args.command {
        Command::Run => {
            load_dates(&pool, &config).await?;
            load_grades(&pool, &config).await?;
            seed_classes(&pool, &config, today).await?;
            seed_enrolments(&pool, &config, today).await?;
            seed_reports(&pool, &config, today).await?;
            report_card::build_report_card(&pool, &config, today).await?;
            info!("✅ Warehouse run complete");
        }
        Command::LoadDates => load_dates(&pool, &config).await?,
        Command::LoadGrades => load_grades(&pool, &config).await?,
        Command::SeedClasses => seed_classes(&pool, &config, today).await?,
        Command::SeedEnrolments => seed_enrolments(&pool, &config, today).await?,
        Command::SeedReports => seed_reports(&pool, &config, today).await?,
        Command::ReportCard => report_card::build_report_card(&pool, &config, today).await?,
    }

    Ok(())
}

async fn load_dates(pool: &sqlx::MySqlPool, config: &Config) -> Result<()> {
    let path = config.data_files.dim_dates_csv_path.as_deref().ok_or_else(|| {
        WarehouseError::Config("data_files.dim_dates_csv_path is not set".to_string())
    })?;
    info!("Loading dim_dates from {}", path);
    calendar::load_dim_dates(pool, Path::new(path)).await?;
    Ok(())
}

async fn load_grades(pool: &sqlx::MySqlPool, config: &Config) -> Result<()> {
    info!("Loading dim_report_grade");
    grades::load_dim_report_grade(pool, config).await?;
    Ok(())
}

async fn seed_classes(
    pool: &sqlx::MySqlPool,
    config: &Config,
    today: chrono::NaiveDate,
) -> Result<()> {
    let academic_year = calendar::academic_year_for(pool, today).await?;
    info!("Seeding teaching groups for {}", academic_year);
    let mut rng = StdRng::seed_from_u64(config.seed);
    seed::classes::seed_classes(pool, config, &academic_year, today, &mut rng).await?;
    Ok(())
}

async fn seed_enrolments(
    pool: &sqlx::MySqlPool,
    config: &Config,
    today: chrono::NaiveDate,
) -> Result<()> {
    info!("Seeding class enrolments");
    let mut rng = StdRng::seed_from_u64(config.seed);
    seed::enrolments::seed_enrolments(pool, config, today, &mut rng).await?;
    Ok(())
}

async fn seed_reports(
    pool: &sqlx::MySqlPool,
    config: &Config,
    today: chrono::NaiveDate,
) -> Result<()> {
    let academic_year = calendar::academic_year_for(pool, today).await?;
    info!("Seeding report events for {}", academic_year);
    let term_calendar = TermCalendar::load(pool).await?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    seed::reports::seed_reports(pool, &term_calendar, &academic_year, &mut rng).await?;
    Ok(())
}
