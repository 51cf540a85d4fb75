//! Academic calendar reference.
//!
//! `dim_dates` holds one row per calendar day with its academic year, term
//! name and holiday flags. This module loads that dimension from CSV,
//! answers "which academic year covers this date" (fatal when nothing does,
//! since every downstream stage scopes by academic year), and derives the
//! chronological term ordering the fill-down step needs: term names alone do
//! not sort chronologically, so each (academic year, term) gets an ordinal
//! from the first calendar date of the term.

use crate::db;
use crate::error::{Result, WarehouseError};
use crate::ingest;
use chrono::NaiveDate;
use sqlx::mysql::MySqlPool;
use sqlx::Row;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// One term of one academic year.
#[derive(Debug, Clone)]
pub struct Term {
    pub academic_year: String,
    pub name: String,
    /// First calendar day of the term; doubles as the entry date seeded
    /// report events use.
    pub first_date: NaiveDate,
    /// Chronological position within the academic year, starting at 0.
    pub ordinal: u32,
}

/// Chronological term ordering across all academic years in the warehouse.
#[derive(Debug, Clone, Default)]
pub struct TermCalendar {
    terms: Vec<Term>,
    ordinals: HashMap<(String, String), u32>,
}

impl TermCalendar {
    /// Build from (academic year, term name, first date) triples, e.g. out
    /// of a query or a test fixture. Ordinals restart per academic year.
    pub fn from_terms(mut entries: Vec<(String, String, NaiveDate)>) -> Self {
        entries.sort_by(|a, b| (&a.0, a.2).cmp(&(&b.0, b.2)));

        let mut terms = Vec::with_capacity(entries.len());
        let mut ordinals = HashMap::new();
        let mut current_year: Option<String> = None;
        let mut next_ordinal = 0u32;

        for (academic_year, name, first_date) in entries {
            if current_year.as_deref() != Some(academic_year.as_str()) {
                current_year = Some(academic_year.clone());
                next_ordinal = 0;
            }
            ordinals.insert((academic_year.clone(), name.clone()), next_ordinal);
            terms.push(Term {
                academic_year,
                name,
                first_date,
                ordinal: next_ordinal,
            });
            next_ordinal += 1;
        }

        Self { terms, ordinals }
    }

    /// Load term boundaries for every academic year in `dim_dates`.
    pub async fn load(pool: &MySqlPool) -> Result<Self> {
        let rows = sqlx::query(
            "SELECT `Academic Year`, `Term name`, MIN(`Date`) AS `first date` \
             FROM `dim_dates` \
             WHERE `Term name` IS NOT NULL AND `Term name` <> '' \
             GROUP BY `Academic Year`, `Term name`",
        )
        .fetch_all(pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let academic_year: String = row.try_get("Academic Year")?;
            let name: String = row.try_get("Term name")?;
            let first_date = date_column(&row, "first date")?;
            entries.push((academic_year, name, first_date));
        }
        Ok(Self::from_terms(entries))
    }

    pub fn ordinal(&self, academic_year: &str, term: &str) -> Option<u32> {
        self.ordinals
            .get(&(academic_year.to_string(), term.to_string()))
            .copied()
    }

    /// Terms of one academic year in chronological order.
    pub fn terms_for(&self, academic_year: &str) -> Vec<&Term> {
        self.terms
            .iter()
            .filter(|t| t.academic_year == academic_year)
            .collect()
    }
}

/// Load `dim_dates` from CSV and replace the warehouse copy.
pub async fn load_dim_dates(pool: &MySqlPool, csv_path: &Path) -> Result<()> {
    let df = ingest::read_csv(csv_path)?;
    let table = ingest::dataframe_to_table(&df)?;
    db::replace_into(pool, "dim_dates", &table).await?;
    info!("dim_dates loaded from {}", csv_path.display());
    Ok(())
}

/// The academic year whose calendar covers `date`. Fatal when the calendar
/// has no row for the date: without an academic year nothing can be scoped.
pub async fn academic_year_for(pool: &MySqlPool, date: NaiveDate) -> Result<String> {
    let row = sqlx::query(
        "SELECT DISTINCT `Academic Year` FROM `dim_dates` WHERE `Date` = ? LIMIT 1",
    )
    .bind(date)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(row.try_get("Academic Year")?),
        None => Err(WarehouseError::Calendar(format!(
            "no academic year covers {}",
            date
        ))),
    }
}

/// Read a date column that may come back as DATE or as ISO-8601 text,
/// depending on how the dimension was loaded.
fn date_column(row: &sqlx::mysql::MySqlRow, column: &str) -> Result<NaiveDate> {
    if let Ok(date) = row.try_get::<NaiveDate, _>(column) {
        return Ok(date);
    }
    let text: String = row.try_get(column)?;
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
        .map_err(|e| WarehouseError::Calendar(format!("unparseable date '{}': {}", text, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_ordinals_follow_first_dates_not_names() {
        // "Autumn" < "Spring" alphabetically too, so include a term whose
        // name order and date order disagree.
        let calendar = TermCalendar::from_terms(vec![
            ("2024/25".into(), "Spring".into(), date(2025, 1, 6)),
            ("2024/25".into(), "Autumn".into(), date(2024, 9, 2)),
            ("2024/25".into(), "A-Summer".into(), date(2025, 4, 21)),
        ]);

        assert_eq!(calendar.ordinal("2024/25", "Autumn"), Some(0));
        assert_eq!(calendar.ordinal("2024/25", "Spring"), Some(1));
        assert_eq!(calendar.ordinal("2024/25", "A-Summer"), Some(2));
        assert_eq!(calendar.ordinal("2024/25", "Winter"), None);
    }

    #[test]
    fn test_ordinals_restart_per_year() {
        let calendar = TermCalendar::from_terms(vec![
            ("2023/24".into(), "Autumn".into(), date(2023, 9, 4)),
            ("2023/24".into(), "Spring".into(), date(2024, 1, 8)),
            ("2024/25".into(), "Autumn".into(), date(2024, 9, 2)),
        ]);

        assert_eq!(calendar.ordinal("2023/24", "Spring"), Some(1));
        assert_eq!(calendar.ordinal("2024/25", "Autumn"), Some(0));
        assert_eq!(calendar.terms_for("2023/24").len(), 2);
    }
}
