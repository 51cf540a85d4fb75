//! Report Aggregation & Pivot Transform.
//!
//! Turns the flat per-event report feed into one wide row per
//! (student, academic year, term, subject, teacher-tag), with one column
//! triple per data type, a year group joined from the student validity
//! dimension, forward-filled gaps and derived difference columns. The
//! output table is replaced wholesale on every run; a failure anywhere
//! leaves the previous table untouched.

pub mod derive;
pub mod event;
pub mod fill;
pub mod transform;

pub use event::{ReportEvent, StudentValidityWindow};
pub use transform::{MeasureCell, PivotTable, PivotedRow};

use crate::calendar::{self, TermCalendar};
use crate::config::Config;
use crate::db;
use crate::error::Result;
use chrono::NaiveDate;
use sqlx::mysql::MySqlPool;
use std::collections::HashSet;
use tracing::info;

/// The pure transform: steps 1-6 over in-memory inputs. Loading and the
/// final write live in [`build_report_card`].
pub fn run_transform(
    events: Vec<ReportEvent>,
    windows: &[StudentValidityWindow],
    calendar: &TermCalendar,
    config: &crate::config::ReportCardConfig,
) -> PivotTable {
    let repeatable: HashSet<String> = config.repeatable_data_types.iter().cloned().collect();
    let transition: HashSet<String> = config.transition_year_groups.iter().cloned().collect();

    let average_dates = transform::average_entry_dates(&events, &repeatable);
    let survivors = transform::dedupe_first_wins(events);
    let table = transform::pivot(survivors, &average_dates);
    let mut table = transform::join_year_groups(table, windows);
    fill::fill_down(&mut table, calendar, &transition, config.cross_year_fill_limit);
    table
}

/// Build and replace the termly report card for the academic year covering
/// `today`.
pub async fn build_report_card(
    pool: &MySqlPool,
    config: &Config,
    today: NaiveDate,
) -> Result<()> {
    let academic_year = calendar::academic_year_for(pool, today).await?;
    info!("Building report card for academic year {}", academic_year);

    let term_calendar = TermCalendar::load(pool).await?;
    let events = event::load_events(pool, &academic_year, &config.report_card.data_types).await?;
    let windows = event::load_windows(pool).await?;
    info!(
        "Loaded {} report events and {} validity windows",
        events.len(),
        windows.len()
    );

    let table = run_transform(events, &windows, &term_calendar, &config.report_card);
    let output = derive::to_output_table(&table, &config.report_card);

    db::replace_into(pool, &config.report_card.output_table, &output).await?;
    info!(
        "✅ {} rebuilt with {} rows and {} columns",
        config.report_card.output_table,
        output.len(),
        output.columns.len()
    );
    Ok(())
}
