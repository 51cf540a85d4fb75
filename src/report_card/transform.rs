//! Aggregation, deduplication, pivot and year-group join.
//!
//! The feed is not unique per (student, year, term, subject, teacher-tag,
//! data-type): behaviour grades (AB/OB by default) are administered
//! repeatedly. Those repeats get their entry dates averaged into a single
//! representative date per key, while exactly one survivor per
//! key + data-type is kept for the pivot, always the first occurrence in
//! input order. "First wins" is a deliberate contract of this feed: not
//! most recent, not best grade.

use super::event::{GroupKey, ReportEvent, StudentValidityWindow};
use chrono::{Datelike, NaiveDate};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::debug;

/// The three measures pivoted per data type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasureCell {
    pub result: Option<String>,
    pub numeric_result: Option<f64>,
    pub result_key: Option<i64>,
}

/// One wide output row: the key, the joined year group, and one cell per
/// observed data type.
///
/// `observed` holds the cells exactly as they came out of the feed and is
/// never touched again; `cells` is the effective view the output reads.
/// Fill-down recomputes `cells` from `observed` every time, which is what
/// makes re-running it a no-op.
#[derive(Debug, Clone, PartialEq)]
pub struct PivotedRow {
    pub student: i64,
    pub academic_year: String,
    pub term: String,
    pub subject: String,
    pub teacher_tag: String,
    /// Representative entry date: the averaged repeatable-type entry date
    /// for this key, when one exists.
    pub entry_date: Option<NaiveDate>,
    pub year_group: Option<String>,
    pub observed: BTreeMap<String, MeasureCell>,
    pub cells: BTreeMap<String, MeasureCell>,
}

/// Pivot output: the discovered column schema plus the rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PivotTable {
    /// Every data type observed anywhere in the input, i.e. the dynamic
    /// column schema of the pivot.
    pub data_types: BTreeSet<String>,
    pub rows: Vec<PivotedRow>,
}

/// Step 1: representative entry date per key.
///
/// For events of a repeatable data type, averages entry dates over their
/// ordinal day counts. The mean is rounded half away from zero; with dates
/// normalized to midnight that makes e.g. ordinals (10, 20, 30) average to
/// exactly 20.
pub fn average_entry_dates(
    events: &[ReportEvent],
    repeatable: &HashSet<String>,
) -> HashMap<GroupKey, NaiveDate> {
    let mut ordinals: HashMap<GroupKey, Vec<i64>> = HashMap::new();
    for event in events {
        if !repeatable.contains(&event.data_type) {
            continue;
        }
        if let Some(date) = event.entry_date {
            ordinals
                .entry(event.group_key())
                .or_default()
                .push(date.num_days_from_ce() as i64);
        }
    }

    ordinals
        .into_iter()
        .filter_map(|(key, days)| {
            let mean = days.iter().sum::<i64>() as f64 / days.len() as f64;
            let rounded = mean.round() as i32;
            NaiveDate::from_num_days_from_ce_opt(rounded).map(|date| (key, date))
        })
        .collect()
}

/// Step 2: one survivor per key + data type, first occurrence wins.
pub fn dedupe_first_wins(events: Vec<ReportEvent>) -> Vec<ReportEvent> {
    let mut seen: HashSet<(GroupKey, String)> = HashSet::new();
    events
        .into_iter()
        .filter(|event| seen.insert((event.group_key(), event.data_type.clone())))
        .collect()
}

/// Steps 3 and 4: attach the representative entry date to every survivor of
/// its key and spread survivors into wide rows, one cell per data type.
/// Keys with no repeatable event keep a null representative date.
pub fn pivot(
    survivors: Vec<ReportEvent>,
    average_dates: &HashMap<GroupKey, NaiveDate>,
) -> PivotTable {
    let mut data_types = BTreeSet::new();
    let mut rows: BTreeMap<GroupKey, PivotedRow> = BTreeMap::new();

    for event in survivors {
        let key = event.group_key();
        data_types.insert(event.data_type.clone());

        let row = rows.entry(key.clone()).or_insert_with(|| PivotedRow {
            student: key.student,
            academic_year: key.academic_year.clone(),
            term: key.term.clone(),
            subject: key.subject.clone(),
            teacher_tag: key.teacher_tag.clone(),
            entry_date: average_dates.get(&key).copied(),
            year_group: None,
            observed: BTreeMap::new(),
            cells: BTreeMap::new(),
        });
        row.observed.insert(
            event.data_type.clone(),
            MeasureCell {
                result: event.result,
                numeric_result: event.numeric_result,
                result_key: event.result_key,
            },
        );
    }

    let mut rows: Vec<PivotedRow> = rows.into_values().collect();
    for row in &mut rows {
        row.cells = row.observed.clone();
    }

    PivotTable { data_types, rows }
}

/// Step 5: year-group join against the validity dimension.
///
/// A row keeps the year group of the window containing its representative
/// entry date (inclusive on both ends, open windows treated as 9999-12-31).
/// Overlapping windows resolve to the one with the latest effective date,
/// ties to the latest expiration. Rows with no containing window, including
/// rows with no representative date at all, are filtered out.
pub fn join_year_groups(
    table: PivotTable,
    windows: &[StudentValidityWindow],
) -> PivotTable {
    let mut by_student: HashMap<i64, Vec<&StudentValidityWindow>> = HashMap::new();
    for window in windows {
        by_student.entry(window.student).or_default().push(window);
    }

    let before = table.rows.len();
    let rows: Vec<PivotedRow> = table
        .rows
        .into_iter()
        .filter_map(|mut row| {
            let date = row.entry_date?;
            let candidates = by_student.get(&row.student)?;
            let window = candidates
                .iter()
                .filter(|w| w.contains(date))
                .max_by_key(|w| (w.effective, w.expiration_or_far_future()))?;
            row.year_group = Some(window.year_group.clone());
            Some(row)
        })
        .collect();

    debug!(
        "Year-group join kept {} of {} pivoted rows",
        rows.len(),
        before
    );
    PivotTable {
        data_types: table.data_types,
        rows,
    }
}
