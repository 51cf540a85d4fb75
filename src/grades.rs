//! Report-grade dimension.
//!
//! `dim_report_grade` maps a grade string to its numeric value, data type
//! and category. It is refreshed either from a configured CSV or, when none
//! is given, from the defaults in config. [`GradePool`] then serves seeded
//! uniform sampling over slices of the dimension for the report seeder.

use crate::config::Config;
use crate::db::{self, SqlValue, Table};
use crate::error::{Result, WarehouseError};
use crate::ingest;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use sqlx::mysql::MySqlPool;
use sqlx::Row;
use std::path::Path;
use tracing::{info, warn};

/// One row of the grade dimension.
#[derive(Debug, Clone)]
pub struct GradeRow {
    pub id: i64,
    pub result: String,
    pub numerical_result: Option<f64>,
    pub data_type: String,
    pub category: Option<String>,
}

/// Replace `dim_report_grade` from CSV when configured, otherwise from the
/// default grade list in config.
pub async fn load_dim_report_grade(pool: &MySqlPool, config: &Config) -> Result<()> {
    let table = match &config.data_files.dim_report_grade_csv_path {
        Some(path) => {
            let df = ingest::read_csv(Path::new(path))?;
            let mut table = ingest::dataframe_to_table(&df)?;
            ensure_id_column(&mut table);
            info!("dim_report_grade loaded from {}", path);
            table
        }
        None => {
            warn!("No grade CSV configured, creating default report grades");
            from_defaults(config)
        }
    };

    if table.is_empty() {
        return Err(WarehouseError::Grades(
            "grade dimension would be empty".to_string(),
        ));
    }
    db::replace_into(pool, "dim_report_grade", &table).await
}

fn from_defaults(config: &Config) -> Table {
    let mut table = Table::new(vec![
        "id",
        "result",
        "numerical_result",
        "data_type",
        "category",
    ]);
    for (idx, grade) in config.school.default_report_grades.iter().enumerate() {
        table.push(vec![
            SqlValue::Int(idx as i64 + 1),
            SqlValue::Text(grade.result.clone()),
            SqlValue::opt_float(grade.numerical_result),
            SqlValue::Text(grade.data_type.clone()),
            SqlValue::opt_text(grade.category.clone()),
        ]);
    }
    table
}

/// A CSV export of the dimension usually omits the surrogate key; synthesize
/// sequential ids so sampled rows can still carry a result key.
fn ensure_id_column(table: &mut Table) {
    if table.columns.iter().any(|c| c == "id") {
        return;
    }
    table.columns.insert(0, "id".to_string());
    for (idx, row) in table.rows.iter_mut().enumerate() {
        row.insert(0, SqlValue::Int(idx as i64 + 1));
    }
}

/// In-memory slice of the grade dimension with seeded sampling.
#[derive(Debug, Clone)]
pub struct GradePool {
    rows: Vec<GradeRow>,
}

impl GradePool {
    pub async fn load(pool: &MySqlPool) -> Result<Self> {
        let rows = sqlx::query(
            "SELECT `id`, `result`, `numerical_result`, `data_type`, `category` \
             FROM `dim_report_grade`",
        )
        .fetch_all(pool)
        .await?;

        let mut grades = Vec::with_capacity(rows.len());
        for row in rows {
            grades.push(GradeRow {
                id: row.try_get("id")?,
                result: row.try_get("result")?,
                numerical_result: row.try_get("numerical_result")?,
                data_type: row.try_get("data_type")?,
                category: row.try_get("category")?,
            });
        }
        Ok(Self { rows: grades })
    }

    pub fn from_rows(rows: Vec<GradeRow>) -> Self {
        Self { rows }
    }

    /// Narrow the pool to one data type, optionally also one category.
    /// Matching is case-insensitive, mirroring how the dimension is queried
    /// elsewhere in the warehouse.
    pub fn for_data_type(&self, data_type: &str, category: Option<&str>) -> GradePool {
        let rows = self
            .rows
            .iter()
            .filter(|g| g.data_type.eq_ignore_ascii_case(data_type))
            .filter(|g| match category {
                Some(wanted) => g
                    .category
                    .as_deref()
                    .is_some_and(|c| c.eq_ignore_ascii_case(wanted)),
                None => true,
            })
            .cloned()
            .collect();
        GradePool { rows }
    }

    pub fn sample(&self, rng: &mut StdRng) -> Option<&GradeRow> {
        self.rows.choose(rng)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
