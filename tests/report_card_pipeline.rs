//! End-to-end scenarios for the report-card transform, driven entirely
//! through in-memory inputs.

use chrono::NaiveDate;
use termly::calendar::TermCalendar;
use termly::config::ReportCardConfig;
use termly::report_card::{derive, fill, run_transform, ReportEvent, StudentValidityWindow};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn event(
    student: i64,
    academic_year: &str,
    term: &str,
    data_type: &str,
    result: &str,
    numeric: Option<f64>,
    entry: Option<NaiveDate>,
) -> ReportEvent {
    ReportEvent {
        student,
        academic_year: academic_year.to_string(),
        term: term.to_string(),
        subject: "Maths".to_string(),
        teacher_tag: "A".to_string(),
        data_type: data_type.to_string(),
        result: Some(result.to_string()),
        numeric_result: numeric,
        result_key: Some(1),
        entry_date: entry,
    }
}

fn open_window(student: i64, year_group: &str) -> StudentValidityWindow {
    StudentValidityWindow {
        student,
        year_group: year_group.to_string(),
        effective: date(2020, 1, 1),
        expiration: None,
    }
}

fn two_term_calendar() -> TermCalendar {
    TermCalendar::from_terms(vec![
        ("2024".into(), "Autumn".into(), date(2024, 1, 1)),
        ("2024".into(), "Spring".into(), date(2024, 5, 1)),
    ])
}

fn two_year_calendar() -> TermCalendar {
    TermCalendar::from_terms(vec![
        ("2023/24".into(), "Summer".into(), date(2024, 4, 22)),
        ("2024/25".into(), "Autumn".into(), date(2024, 9, 2)),
        ("2024/25".into(), "Spring".into(), date(2025, 1, 6)),
        ("2024/25".into(), "Summer".into(), date(2025, 4, 21)),
    ])
}

/// Spec scenario: an Autumn attainment entry forward-fills into a Spring
/// row that only has behaviour grades.
#[test]
fn test_forward_fill_across_terms_within_a_year() {
    let config = ReportCardConfig::default();
    let events = vec![
        event(
            1,
            "2024",
            "Autumn",
            "Attainment",
            "B",
            Some(7.0),
            Some(date(2024, 1, 1)),
        ),
        event(1, "2024", "Autumn", "AB", "Good", Some(3.0), Some(date(2024, 1, 1))),
        event(1, "2024", "Spring", "AB", "Good", Some(3.0), Some(date(2024, 5, 1))),
    ];
    let windows = vec![StudentValidityWindow {
        student: 1,
        year_group: "11".to_string(),
        effective: date(2024, 1, 1),
        expiration: Some(date(2024, 12, 31)),
    }];

    let table = run_transform(events, &windows, &two_term_calendar(), &config);

    assert_eq!(table.rows.len(), 2);
    let spring = table.rows.iter().find(|r| r.term == "Spring").unwrap();
    assert_eq!(spring.year_group.as_deref(), Some("11"));
    let cell = spring.cells.get("Attainment").unwrap();
    assert_eq!(cell.result.as_deref(), Some("B"));
    assert_eq!(cell.numeric_result, Some(7.0));
}

/// Repeated AB/OB administrations average their entry dates into the
/// representative date for the whole key.
#[test]
fn test_repeatable_entry_dates_average() {
    let config = ReportCardConfig::default();
    let events = vec![
        event(1, "2024", "Autumn", "AB", "Good", Some(3.0), Some(date(2024, 9, 1))),
        event(1, "2024", "Autumn", "AB", "Good", Some(3.0), Some(date(2024, 9, 11))),
        event(1, "2024", "Autumn", "OB", "Good", Some(3.0), Some(date(2024, 9, 21))),
    ];
    let windows = vec![open_window(1, "11")];

    let table = run_transform(events, &windows, &two_term_calendar(), &config);

    assert_eq!(table.rows.len(), 1);
    assert_eq!(table.rows[0].entry_date, Some(date(2024, 9, 11)));
}

/// Duplicate events for a full key keep the first occurrence, regardless
/// of which grade is "better".
#[test]
fn test_first_event_wins_deduplication() {
    let config = ReportCardConfig::default();
    let events = vec![
        event(1, "2024", "Autumn", "AB", "Good", Some(3.0), Some(date(2024, 1, 2))),
        event(
            1,
            "2024",
            "Autumn",
            "Attainment",
            "B",
            Some(6.0),
            Some(date(2024, 1, 2)),
        ),
        event(
            1,
            "2024",
            "Autumn",
            "Attainment",
            "A",
            Some(7.0),
            Some(date(2024, 2, 2)),
        ),
    ];
    let windows = vec![open_window(1, "11")];

    let table = run_transform(events, &windows, &two_term_calendar(), &config);

    let cell = table.rows[0].cells.get("Attainment").unwrap();
    assert_eq!(cell.result.as_deref(), Some("B"));
    assert_eq!(cell.numeric_result, Some(6.0));
}

/// A data type that never appears contributes no derived columns.
#[test]
fn test_absent_operand_skips_derived_columns() {
    let config = ReportCardConfig::default();
    let events = vec![
        event(
            1,
            "2024",
            "Autumn",
            "Attainment",
            "B",
            Some(7.0),
            Some(date(2024, 1, 2)),
        ),
        event(1, "2024", "Autumn", "AB", "Good", Some(3.0), Some(date(2024, 1, 2))),
    ];
    let windows = vec![open_window(1, "11")];

    let table = run_transform(events, &windows, &two_term_calendar(), &config);
    let output = derive::to_output_table(&table, &config);

    assert!(!output.columns.iter().any(|c| c.contains("minus target")));
    assert!(!output.columns.iter().any(|c| c == "Target grade"));
    assert!(output.columns.iter().any(|c| c == "Current Attainment"));
}

/// Validity windows are inclusive on the expiration date; one day past it
/// the row is filtered out.
#[test]
fn test_window_expiration_boundary_is_inclusive() {
    let config = ReportCardConfig::default();
    let window = StudentValidityWindow {
        student: 1,
        year_group: "11".to_string(),
        effective: date(2024, 1, 1),
        expiration: Some(date(2024, 6, 30)),
    };

    let on_boundary = vec![event(
        1,
        "2024",
        "Autumn",
        "AB",
        "Good",
        Some(3.0),
        Some(date(2024, 6, 30)),
    )];
    let table = run_transform(
        on_boundary,
        std::slice::from_ref(&window),
        &two_term_calendar(),
        &config,
    );
    assert_eq!(table.rows.len(), 1);
    assert_eq!(table.rows[0].year_group.as_deref(), Some("11"));

    let past_boundary = vec![event(
        1,
        "2024",
        "Autumn",
        "AB",
        "Good",
        Some(3.0),
        Some(date(2024, 7, 1)),
    )];
    let table = run_transform(
        past_boundary,
        std::slice::from_ref(&window),
        &two_term_calendar(),
        &config,
    );
    assert!(table.rows.is_empty());
}

fn three_term_gap_events() -> Vec<ReportEvent> {
    vec![
        event(
            1,
            "2023/24",
            "Summer",
            "Attainment",
            "B",
            Some(7.0),
            Some(date(2024, 4, 22)),
        ),
        event(1, "2023/24", "Summer", "AB", "Good", Some(3.0), Some(date(2024, 4, 22))),
        event(1, "2024/25", "Autumn", "AB", "Good", Some(3.0), Some(date(2024, 9, 2))),
        event(1, "2024/25", "Spring", "AB", "Good", Some(3.0), Some(date(2025, 1, 6))),
        event(1, "2024/25", "Summer", "AB", "Good", Some(3.0), Some(date(2025, 4, 21))),
    ]
}

fn attainment_by_term(table: &termly::report_card::PivotTable) -> Vec<Option<String>> {
    table
        .rows
        .iter()
        .map(|r| r.cells.get("Attainment").and_then(|c| c.result.clone()))
        .collect()
}

/// A year-10 student gets at most two terms of cross-year carry; the third
/// term of the gap stays empty.
#[test]
fn test_transition_year_cross_year_fill_is_limited() {
    let config = ReportCardConfig::default();
    let windows = vec![open_window(1, "10")];

    let table = run_transform(
        three_term_gap_events(),
        &windows,
        &two_year_calendar(),
        &config,
    );

    // Rows are in chronological order after fill-down.
    assert_eq!(
        attainment_by_term(&table),
        vec![
            Some("B".to_string()),
            Some("B".to_string()),
            Some("B".to_string()),
            None,
        ]
    );
}

/// The same gap for a year-9 student receives no cross-year fill at all.
#[test]
fn test_non_transition_year_gets_no_cross_year_fill() {
    let config = ReportCardConfig::default();
    let windows = vec![open_window(1, "9")];

    let table = run_transform(
        three_term_gap_events(),
        &windows,
        &two_year_calendar(),
        &config,
    );

    assert_eq!(
        attainment_by_term(&table),
        vec![Some("B".to_string()), None, None, None]
    );
}

/// Running fill-down again on already-filled rows changes nothing.
#[test]
fn test_fill_down_is_idempotent() {
    let config = ReportCardConfig::default();
    let windows = vec![open_window(1, "10")];
    let transition = config.transition_year_groups.iter().cloned().collect();
    let calendar = two_year_calendar();

    let mut table = run_transform(three_term_gap_events(), &windows, &calendar, &config);
    let first_pass = table.clone();

    fill::fill_down(
        &mut table,
        &calendar,
        &transition,
        config.cross_year_fill_limit,
    );
    assert_eq!(table, first_pass);
}

/// Empty input produces an output table with headers and no rows.
#[test]
fn test_empty_input_is_not_an_error() {
    let config = ReportCardConfig::default();
    let table = run_transform(Vec::new(), &[], &two_term_calendar(), &config);
    assert!(table.rows.is_empty());

    let output = derive::to_output_table(&table, &config);
    assert!(output.is_empty());
    assert_eq!(output.columns.len(), 7);
}

/// Two identical runs produce identical output, column order included.
#[test]
fn test_transform_is_deterministic() {
    let config = ReportCardConfig::default();
    let windows = vec![open_window(1, "10")];
    let calendar = two_year_calendar();

    let first = run_transform(three_term_gap_events(), &windows, &calendar, &config);
    let second = run_transform(three_term_gap_events(), &windows, &calendar, &config);

    assert_eq!(first, second);
    let first_output = derive::to_output_table(&first, &config);
    let second_output = derive::to_output_table(&second, &config);
    assert_eq!(first_output.columns, second_output.columns);
    assert_eq!(first_output.rows, second_output.rows);
}
