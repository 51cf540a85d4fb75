//! Step 6: temporal fill-down.
//!
//! Within each (student, subject) group, ordered chronologically via the
//! term calendar, missing measure values inherit the most recent earlier
//! value. Two passes per measure column:
//!
//! 1. unlimited forward-fill that never crosses an academic-year boundary;
//! 2. only for groups containing a transition year group (10/12 by
//!    default), a second forward-fill over the whole group, carrying at
//!    most `limit` consecutive missing rows across year boundaries.
//!
//! Fill-down reads the observed cells and rewrites the effective cells from
//! scratch, so running it again on already-filled rows changes nothing.

use super::transform::{MeasureCell, PivotTable, PivotedRow};
use crate::calendar::TermCalendar;
use std::collections::HashSet;

pub fn fill_down(
    table: &mut PivotTable,
    calendar: &TermCalendar,
    transition_year_groups: &HashSet<String>,
    cross_year_limit: usize,
) {
    sort_chronologically(&mut table.rows, calendar);

    let data_types: Vec<String> = table.data_types.iter().cloned().collect();
    let mut start = 0;
    while start < table.rows.len() {
        let end = group_end(&table.rows, start);
        fill_group(
            &mut table.rows[start..end],
            &data_types,
            transition_year_groups,
            cross_year_limit,
        );
        start = end;
    }
}

/// (student, subject) first so groups are contiguous, then academic year,
/// term ordinal, and teacher tag as a deterministic tie-break. Terms the
/// calendar does not know sort after known ones, by name.
fn sort_chronologically(rows: &mut [PivotedRow], calendar: &TermCalendar) {
    rows.sort_by(|a, b| {
        let key = |r: &PivotedRow| {
            (
                r.student,
                r.subject.clone(),
                r.academic_year.clone(),
                calendar
                    .ordinal(&r.academic_year, &r.term)
                    .unwrap_or(u32::MAX),
                r.term.clone(),
                r.teacher_tag.clone(),
            )
        };
        key(a).cmp(&key(b))
    });
}

fn group_end(rows: &[PivotedRow], start: usize) -> usize {
    let (student, subject) = (rows[start].student, rows[start].subject.clone());
    rows[start..]
        .iter()
        .position(|r| r.student != student || r.subject != subject)
        .map(|offset| start + offset)
        .unwrap_or(rows.len())
}

fn fill_group(
    rows: &mut [PivotedRow],
    data_types: &[String],
    transition_year_groups: &HashSet<String>,
    cross_year_limit: usize,
) {
    // Segment ids: one per distinct academic year, in row order.
    let mut year_segments = Vec::with_capacity(rows.len());
    let mut segment = 0u32;
    for idx in 0..rows.len() {
        if idx > 0 && rows[idx].academic_year != rows[idx - 1].academic_year {
            segment += 1;
        }
        year_segments.push(segment);
    }

    let transition = rows.iter().any(|r| {
        r.year_group
            .as_deref()
            .is_some_and(|yg| transition_year_groups.contains(yg))
    });

    for data_type in data_types {
        fill_column(
            rows,
            data_type,
            &year_segments,
            transition,
            cross_year_limit,
            |cell| cell.result.clone(),
            |cell, value| cell.result = value,
        );
        fill_column(
            rows,
            data_type,
            &year_segments,
            transition,
            cross_year_limit,
            |cell| cell.numeric_result,
            |cell, value| cell.numeric_result = value,
        );
        fill_column(
            rows,
            data_type,
            &year_segments,
            transition,
            cross_year_limit,
            |cell| cell.result_key,
            |cell, value| cell.result_key = value,
        );
    }
}

fn fill_column<T: Clone>(
    rows: &mut [PivotedRow],
    data_type: &str,
    year_segments: &[u32],
    transition: bool,
    cross_year_limit: usize,
    get: impl Fn(&MeasureCell) -> Option<T>,
    set: impl Fn(&mut MeasureCell, Option<T>),
) {
    let mut values: Vec<Option<T>> = rows
        .iter()
        .map(|row| row.observed.get(data_type).and_then(&get))
        .collect();

    forward_fill(&mut values, year_segments, None);
    if transition {
        let whole_group = vec![0u32; values.len()];
        forward_fill(&mut values, &whole_group, Some(cross_year_limit));
    }

    for (row, value) in rows.iter_mut().zip(values) {
        set(row.cells.entry(data_type.to_string()).or_default(), value);
    }
}

/// Forward-fill in place. The carried value resets at every segment
/// boundary. With a limit, only the first `limit` consecutive missing
/// entries after an observed value are filled; values written by the fill
/// itself do not extend the carry.
fn forward_fill<T: Clone>(values: &mut [Option<T>], segments: &[u32], limit: Option<usize>) {
    let mut last: Option<T> = None;
    let mut gap = 0usize;
    let mut current_segment: Option<u32> = None;

    for (value, segment) in values.iter_mut().zip(segments) {
        if current_segment != Some(*segment) {
            current_segment = Some(*segment);
            last = None;
            gap = 0;
        }
        match value {
            Some(observed) => {
                last = Some(observed.clone());
                gap = 0;
            }
            None => {
                gap += 1;
                if let Some(carry) = &last {
                    if limit.map_or(true, |max| gap <= max) {
                        *value = Some(carry.clone());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_fill_respects_segments() {
        let mut values = vec![Some(1), None, None, Some(2), None];
        let segments = vec![0, 0, 1, 1, 1];
        forward_fill(&mut values, &segments, None);
        // The segment boundary between index 1 and 2 blocks the carry.
        assert_eq!(values, vec![Some(1), Some(1), None, Some(2), Some(2)]);
    }

    #[test]
    fn test_forward_fill_limit_counts_the_original_gap() {
        let mut values = vec![Some(7), None, None, None, Some(9), None];
        let segments = vec![0; 6];
        forward_fill(&mut values, &segments, Some(2));
        // Only the first two of three consecutive gaps are filled; the
        // observed 9 resets the carry.
        assert_eq!(
            values,
            vec![Some(7), Some(7), Some(7), None, Some(9), Some(9)]
        );
    }

    #[test]
    fn test_forward_fill_without_leading_value_leaves_gaps() {
        let mut values: Vec<Option<i32>> = vec![None, None, Some(3), None];
        let segments = vec![0; 4];
        forward_fill(&mut values, &segments, None);
        assert_eq!(values, vec![None, None, Some(3), Some(3)]);
    }

    #[test]
    fn test_forward_fill_recomputes_identically() {
        // fill_down always refills from observed cells, so two fills of the
        // same input must agree.
        let original = vec![Some(1), None, None, None];
        let segments = vec![0; 4];
        let mut first = original.clone();
        forward_fill(&mut first, &segments, Some(2));
        let mut second = original;
        forward_fill(&mut second, &segments, Some(2));
        assert_eq!(first, second);
    }
}
