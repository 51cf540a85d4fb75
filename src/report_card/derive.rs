//! Steps 7 and 8: derived numeric columns, renames, pruning, and the final
//! wide table.
//!
//! Derived columns are pairwise differences between numeric measures. Each
//! one exists only when both operand data types were observed in the feed;
//! a data type that never appeared simply contributes no columns, which is
//! a contract of the transform, not an error.

use super::transform::{MeasureCell, PivotTable};
use crate::config::ReportCardConfig;
use crate::db::{SqlValue, Table};

/// (column label, minuend data type, subtrahend data type)
pub const DERIVED_COLUMNS: &[(&str, &str, &str)] = &[
    ("Current attainment minus target", "Attainment", "Target"),
    (
        "Current attainment minus CAT4 target",
        "Attainment",
        "If Challenged",
    ),
    ("Target minus CAT4 target", "Target", "If Challenged"),
    ("IGCSE minus target", "IGCSE Grade", "Target"),
    ("IGCSE minus CAT4", "IGCSE Grade", "If Challenged"),
    ("IGCSE minus attainment", "IGCSE Grade", "Attainment"),
    ("IGCSE minus prediction", "IGCSE Grade", "Predicted"),
    ("AS minus target", "AS Grade", "Target"),
    ("AS minus CAT4", "AS Grade", "If Challenged"),
    ("AS minus attainment", "AS Grade", "Attainment"),
    ("AS minus prediction", "AS Grade", "Predicted"),
    ("A2 minus target", "A2 Grade", "Target"),
    ("A2 minus CAT4", "A2 Grade", "If Challenged"),
    ("A2 minus attainment", "A2 Grade", "Attainment"),
    ("A2 minus prediction", "A2 Grade", "Predicted"),
    ("AS minus IGCSE", "AS Grade", "IGCSE Grade"),
    ("A2 minus IGCSE", "A2 Grade", "IGCSE Grade"),
    ("A2 minus AS", "A2 Grade", "AS Grade"),
];

/// Human-readable labels for selected `Result_*` columns.
pub const RESULT_RENAMES: &[(&str, &str)] = &[
    ("Attainment", "Current Attainment"),
    ("Target", "Target grade"),
    ("If Challenged", "CAT4 Target grade"),
    ("AB", "Attitudinal behaviours"),
    ("OB", "Organisational behaviours"),
];

const MEASURE_PREFIXES: &[&str] = &["Result", "Numeric result", "Result pk"];

/// Render the pivot into the bulk loader's wide table: key columns, year
/// group, three columns per observed data type, then the derived
/// differences. Pruned columns never make it into the schema.
pub fn to_output_table(table: &PivotTable, config: &ReportCardConfig) -> Table {
    let mut columns: Vec<String> = [
        "Student",
        "Academic year",
        "Term",
        "Subject",
        "Teacher a b or c",
        "Entry Date",
        "Year Group",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    // (prefix, data type) pairs that survive pruning, in schema order.
    let mut measure_columns: Vec<(&str, &str)> = Vec::new();
    for prefix in MEASURE_PREFIXES {
        for data_type in &table.data_types {
            let label = column_label(prefix, data_type);
            if is_deprecated(&label, config) {
                continue;
            }
            measure_columns.push((*prefix, data_type.as_str()));
            columns.push(label);
        }
    }

    let derived: Vec<&(&str, &str, &str)> = DERIVED_COLUMNS
        .iter()
        .filter(|(label, minuend, subtrahend)| {
            table.data_types.contains(*minuend)
                && table.data_types.contains(*subtrahend)
                && !is_deprecated(label, config)
        })
        .collect();
    columns.extend(derived.iter().map(|(label, _, _)| label.to_string()));

    let mut output = Table::new(columns);
    for row in &table.rows {
        let mut values = vec![
            SqlValue::Int(row.student),
            SqlValue::Text(row.academic_year.clone()),
            SqlValue::Text(row.term.clone()),
            SqlValue::Text(row.subject.clone()),
            SqlValue::Text(row.teacher_tag.clone()),
            SqlValue::opt_date(row.entry_date),
            SqlValue::opt_text(row.year_group.clone()),
        ];

        for (prefix, data_type) in &measure_columns {
            let cell = row.cells.get(*data_type);
            values.push(measure_value(cell, prefix));
        }

        for (_, minuend, subtrahend) in &derived {
            let difference = numeric(row.cells.get(*minuend))
                .zip(numeric(row.cells.get(*subtrahend)))
                .map(|(a, b)| a - b);
            values.push(SqlValue::opt_float(difference));
        }

        output.push(values);
    }
    output
}

/// `Result_Attainment` etc., with the rename table applied to `Result_*`.
fn column_label(prefix: &str, data_type: &str) -> String {
    if prefix == "Result" {
        for (from, to) in RESULT_RENAMES {
            if *from == data_type {
                return to.to_string();
            }
        }
    }
    format!("{}_{}", prefix, data_type)
}

fn is_deprecated(label: &str, config: &ReportCardConfig) -> bool {
    config
        .deprecated_fragments
        .iter()
        .any(|fragment| label.contains(fragment.as_str()))
}

fn measure_value(cell: Option<&MeasureCell>, prefix: &str) -> SqlValue {
    match (cell, prefix) {
        (Some(cell), "Result") => SqlValue::opt_text(cell.result.clone()),
        (Some(cell), "Numeric result") => SqlValue::opt_float(cell.numeric_result),
        (Some(cell), "Result pk") => SqlValue::opt_int(cell.result_key),
        _ => SqlValue::Null,
    }
}

fn numeric(cell: Option<&MeasureCell>) -> Option<f64> {
    cell.and_then(|c| c.numeric_result)
}
