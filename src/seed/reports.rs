//! Report-event seeding.
//!
//! For every enrolment and every term of the current academic year, emits
//! an AB, an OB and an Attainment event into `fact_report`, sampled from
//! the grade dimension, plus exactly one Target event per
//! (student, subject) for the year. Entry dates are the first calendar day
//! of the term, stored as integer YYYYMMDD as the feed expects.

use crate::calendar::TermCalendar;
use crate::db::{self, SqlValue, Table};
use crate::error::{Result, WarehouseError};
use crate::grades::GradePool;
use chrono::{Datelike, NaiveDate};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use sqlx::mysql::MySqlPool;
use sqlx::Row;
use std::collections::HashSet;
use tracing::info;

struct Enrolment {
    person_bk: i64,
    teaching_group: i64,
    subject: String,
}

pub async fn seed_reports(
    pool: &MySqlPool,
    calendar: &TermCalendar,
    academic_year: &str,
    rng: &mut StdRng,
) -> Result<()> {
    let grades = GradePool::load(pool).await?;
    let ab_grades = grades.for_data_type("AB", None);
    let ob_grades = grades.for_data_type("OB", None);
    let attainment_grades = grades.for_data_type("Attainment", Some("Single grades"));
    for (label, grade_pool) in [
        ("AB", &ab_grades),
        ("OB", &ob_grades),
        ("Attainment", &attainment_grades),
    ] {
        if grade_pool.is_empty() {
            return Err(WarehouseError::Seed(format!(
                "dim_report_grade has no {} grades",
                label
            )));
        }
    }

    let enrolments = load_enrolments(pool, academic_year).await?;
    let terms = calendar.terms_for(academic_year);
    if terms.is_empty() {
        return Err(WarehouseError::Seed(format!(
            "dim_dates has no terms for {}",
            academic_year
        )));
    }

    let mut table = Table::new(vec![
        "Student",
        "Entry Date",
        "Result",
        "Academic year",
        "Term",
        "Subject",
        "Data type",
        "Result pk",
        "Teacher a b or c",
        "Teaching group pk",
        "Numeric result",
        "SIMS aspect name",
        "SIMS result set name",
    ]);

    // One Target per (student, subject) per academic year.
    let mut target_given: HashSet<(i64, String)> = HashSet::new();

    for enrolment in &enrolments {
        for term in &terms {
            let teacher_tag = *["A", "B", "C"].choose(rng).unwrap_or(&"A");
            let entry_date = yyyymmdd(term.first_date);

            for (data_type, grade_pool) in [
                ("AB", &ab_grades),
                ("OB", &ob_grades),
                ("Attainment", &attainment_grades),
            ] {
                if let Some(grade) = grade_pool.sample(rng) {
                    table.push(event_row(
                        enrolment,
                        entry_date,
                        academic_year,
                        &term.name,
                        data_type,
                        teacher_tag,
                        &grade.result,
                        grade.numerical_result,
                        grade.id,
                    ));
                }
            }

            let key = (enrolment.person_bk, enrolment.subject.clone());
            if !target_given.contains(&key) {
                if let Some(grade) = attainment_grades.sample(rng) {
                    table.push(event_row(
                        enrolment,
                        entry_date,
                        academic_year,
                        &term.name,
                        "Target",
                        teacher_tag,
                        &grade.result,
                        grade.numerical_result,
                        grade.id,
                    ));
                    target_given.insert(key);
                }
            }
        }
    }

    db::append_into(pool, "fact_report", &table).await?;
    info!(
        "Seeded {} report events for {} enrolments in {}",
        table.len(),
        enrolments.len(),
        academic_year
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn event_row(
    enrolment: &Enrolment,
    entry_date: i64,
    academic_year: &str,
    term: &str,
    data_type: &str,
    teacher_tag: &str,
    result: &str,
    numeric_result: Option<f64>,
    result_pk: i64,
) -> Vec<SqlValue> {
    vec![
        SqlValue::Int(enrolment.person_bk),
        SqlValue::Int(entry_date),
        SqlValue::Text(result.to_string()),
        SqlValue::Text(academic_year.to_string()),
        SqlValue::Text(term.to_string()),
        SqlValue::Text(enrolment.subject.clone()),
        SqlValue::Text(data_type.to_string()),
        SqlValue::Int(result_pk),
        SqlValue::Text(teacher_tag.to_string()),
        SqlValue::Int(enrolment.teaching_group),
        SqlValue::opt_float(numeric_result),
        SqlValue::Null,
        SqlValue::Null,
    ]
}

async fn load_enrolments(pool: &MySqlPool, academic_year: &str) -> Result<Vec<Enrolment>> {
    let rows = sqlx::query(
        "SELECT e.`Student warehouse BK` AS `person_bk`, \
                e.`Teaching group ID` AS `teaching_group`, \
                g.`Subject name` AS `subject` \
         FROM `fact student class enrolement` e \
         JOIN `dim Teaching Groups` g ON e.`Teaching group ID` = g.`pk` \
         WHERE e.`Academic year` = ?",
    )
    .bind(academic_year)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(Enrolment {
                person_bk: row.try_get("person_bk")?,
                teaching_group: row.try_get("teaching_group")?,
                subject: row.try_get("subject")?,
            })
        })
        .collect()
}

fn yyyymmdd(date: NaiveDate) -> i64 {
    date.year() as i64 * 10_000 + date.month() as i64 * 100 + date.day() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yyyymmdd_encoding() {
        assert_eq!(
            yyyymmdd(NaiveDate::from_ymd_opt(2024, 9, 2).unwrap()),
            20_240_902
        );
        assert_eq!(
            yyyymmdd(NaiveDate::from_ymd_opt(2025, 1, 6).unwrap()),
            20_250_106
        );
    }
}
