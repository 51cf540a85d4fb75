//! Warehouse access and the generic bulk loader.
//!
//! Every stage funnels its output through [`Table`], an ordered set of
//! columns plus typed rows, and lands it with either replace semantics
//! (drop + recreate + insert, used for dimension refreshes and the report
//! card) or append semantics (insert only, used for fact feeds). All inserts
//! for one call run inside a single transaction, so a failed stage leaves
//! the previous contents of a replaced table authoritative.

use crate::config::DatabaseConfig;
use crate::error::Result;
use chrono::NaiveDate;
use itertools::Itertools;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::{MySql, Transaction};
use tracing::{debug, info};

/// Rows per INSERT statement.
const INSERT_BATCH_SIZE: usize = 500;

pub async fn connect(config: &DatabaseConfig) -> Result<MySqlPool> {
    let pool = MySqlPoolOptions::new()
        .max_connections(4)
        .connect(&config.url())
        .await?;
    Ok(pool)
}

/// A single typed cell bound into an INSERT.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
}

impl SqlValue {
    pub fn opt_int(value: Option<i64>) -> Self {
        value.map_or(SqlValue::Null, SqlValue::Int)
    }

    pub fn opt_float(value: Option<f64>) -> Self {
        value.map_or(SqlValue::Null, SqlValue::Float)
    }

    pub fn opt_text(value: Option<String>) -> Self {
        value.map_or(SqlValue::Null, SqlValue::Text)
    }

    pub fn opt_date(value: Option<NaiveDate>) -> Self {
        value.map_or(SqlValue::Null, SqlValue::Date)
    }
}

/// Column-ordered rows ready for bulk loading.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl Table {
    pub fn new<S: Into<String>>(columns: Vec<S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: Vec<SqlValue>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Infer a MySQL column type from the first non-null value per column.
    /// All-null columns fall back to TEXT.
    fn column_types(&self) -> Vec<&'static str> {
        self.columns
            .iter()
            .enumerate()
            .map(|(idx, _)| {
                self.rows
                    .iter()
                    .find_map(|row| match &row[idx] {
                        SqlValue::Null => None,
                        SqlValue::Int(_) => Some("BIGINT"),
                        SqlValue::Float(_) => Some("DOUBLE"),
                        SqlValue::Text(_) => Some("TEXT"),
                        SqlValue::Date(_) => Some("DATE"),
                    })
                    .unwrap_or("TEXT")
            })
            .collect()
    }
}

/// Backtick-quote an identifier; table names here contain spaces.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn build_insert_sql(table: &str, columns: &[String], row_count: usize) -> String {
    let placeholders = columns.iter().map(|_| "?").join(", ");
    let row = format!("({})", placeholders);
    let values = (0..row_count).map(|_| row.as_str()).join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES {}",
        quote_ident(table),
        columns.iter().map(|c| quote_ident(c)).join(", "),
        values
    )
}

async fn insert_rows(
    tx: &mut Transaction<'_, MySql>,
    table: &str,
    data: &Table,
) -> Result<()> {
    for chunk in data.rows.chunks(INSERT_BATCH_SIZE) {
        let sql = build_insert_sql(table, &data.columns, chunk.len());
        let mut query = sqlx::query(&sql);
        for row in chunk {
            for value in row {
                query = match value {
                    SqlValue::Null => query.bind(None::<String>),
                    SqlValue::Int(v) => query.bind(*v),
                    SqlValue::Float(v) => query.bind(*v),
                    SqlValue::Text(v) => query.bind(v.as_str()),
                    SqlValue::Date(v) => query.bind(*v),
                };
            }
        }
        query.execute(&mut **tx).await?;
        debug!("Inserted {} rows into {}", chunk.len(), table);
    }
    Ok(())
}

/// Drop and recreate `table` from the data's inferred schema, then load it.
/// The whole operation is one transaction: on failure the old table survives.
pub async fn replace_into(pool: &MySqlPool, table: &str, data: &Table) -> Result<()> {
    let mut tx = pool.begin().await?;

    let drop_sql = format!("DROP TABLE IF EXISTS {}", quote_ident(table));
    sqlx::query(&drop_sql).execute(&mut *tx).await?;

    let column_defs = data
        .columns
        .iter()
        .zip(data.column_types())
        .map(|(name, ty)| format!("{} {}", quote_ident(name), ty))
        .join(", ");
    let create_sql = format!("CREATE TABLE {} ({})", quote_ident(table), column_defs);
    sqlx::query(&create_sql).execute(&mut *tx).await?;

    insert_rows(&mut tx, table, data).await?;
    tx.commit().await?;

    info!("Replaced {} with {} rows", table, data.len());
    Ok(())
}

/// Append rows to an existing table inside one transaction.
pub async fn append_into(pool: &MySqlPool, table: &str, data: &Table) -> Result<()> {
    if data.is_empty() {
        info!("Nothing to append into {}", table);
        return Ok(());
    }
    let mut tx = pool.begin().await?;
    insert_rows(&mut tx, table, data).await?;
    tx.commit().await?;

    info!("Appended {} rows into {}", data.len(), table);
    Ok(())
}
