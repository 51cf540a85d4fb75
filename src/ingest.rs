//! CSV ingestion helpers.
//!
//! Reference dimensions arrive as CSV files. They are read through the lazy
//! CSV reader with schema inference and date parsing, then converted into
//! the bulk loader's [`Table`] representation cell by cell.

use crate::db::{SqlValue, Table};
use crate::error::{Result, WarehouseError};
use chrono::NaiveDate;
use polars::prelude::*;
use std::path::Path;
use tracing::debug;

/// Days between 0001-01-01 (chrono's day 1) and the Unix epoch.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Read a CSV with header, inferred schema and parsed dates.
pub fn read_csv(path: &Path) -> Result<DataFrame> {
    let df = LazyCsvReader::new(path)
        .with_has_header(true)
        .with_try_parse_dates(true)
        .with_infer_schema_length(Some(1000))
        .finish()?
        .collect()?;
    debug!(
        "Read {} rows x {} columns from {}",
        df.height(),
        df.width(),
        path.display()
    );
    Ok(df)
}

/// Convert a DataFrame into bulk-loader rows.
pub fn dataframe_to_table(df: &DataFrame) -> Result<Table> {
    let columns: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    let mut table = Table::new(columns.clone());

    for row_idx in 0..df.height() {
        let mut row = Vec::with_capacity(columns.len());
        for name in &columns {
            let series = df.column(name)?;
            row.push(any_value_to_sql(series, row_idx)?);
        }
        table.push(row);
    }
    Ok(table)
}

fn any_value_to_sql(series: &Series, row_idx: usize) -> Result<SqlValue> {
    let any_val = series
        .get(row_idx)
        .map_err(|e| WarehouseError::Calendar(format!("failed to read cell: {}", e)))?;

    let value = match any_val {
        AnyValue::Null => SqlValue::Null,
        AnyValue::Boolean(b) => SqlValue::Int(b as i64),
        AnyValue::String(s) => SqlValue::Text(s.to_string()),
        AnyValue::Int8(v) => SqlValue::Int(v as i64),
        AnyValue::Int16(v) => SqlValue::Int(v as i64),
        AnyValue::Int32(v) => SqlValue::Int(v as i64),
        AnyValue::Int64(v) => SqlValue::Int(v),
        AnyValue::UInt8(v) => SqlValue::Int(v as i64),
        AnyValue::UInt16(v) => SqlValue::Int(v as i64),
        AnyValue::UInt32(v) => SqlValue::Int(v as i64),
        AnyValue::UInt64(v) => SqlValue::Int(v as i64),
        AnyValue::Float32(v) => SqlValue::Float(v as f64),
        AnyValue::Float64(v) => SqlValue::Float(v),
        AnyValue::Date(days) => SqlValue::Date(epoch_days_to_date(days)?),
        other => SqlValue::Text(format!("{}", other)),
    };
    Ok(value)
}

/// Polars stores dates as days since the Unix epoch.
fn epoch_days_to_date(days: i32) -> Result<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(UNIX_EPOCH_DAYS_FROM_CE + days)
        .ok_or_else(|| WarehouseError::Calendar(format!("date out of range: {} days", days)))
}
