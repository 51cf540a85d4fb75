//! Class-enrolment seeding.
//!
//! Fills `fact student class enrolement` by drawing 8-24 students per
//! teaching group. Students only join classes of their own year group
//! (parsed out of the class code) and never the same subject twice.

use crate::config::Config;
use crate::db::{self, SqlValue, Table};
use crate::error::Result;
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use sqlx::mysql::MySqlPool;
use sqlx::Row;
use std::collections::{HashMap, HashSet};
use tracing::info;

struct Student {
    id: i64,
    person_bk: i64,
    year_group: String,
}

struct TeachingGroup {
    pk: i64,
    class_code: String,
    subject_name: String,
    academic_year: String,
}

pub async fn seed_enrolments(
    pool: &MySqlPool,
    config: &Config,
    today: NaiveDate,
    rng: &mut StdRng,
) -> Result<()> {
    let students = load_students(pool).await?;
    let classes = load_teaching_groups(pool).await?;

    // e.g. "9A/Ph1" -> year group "9"
    let year_pattern = Regex::new(r"^(\d{1,2})[A-Z]/").unwrap();

    let mut student_subjects: HashMap<i64, HashSet<String>> = HashMap::new();
    let mut table = Table::new(vec![
        "Student ID",
        "Student warehouse BK",
        "Teaching group ID",
        "Row effective date",
        "Row expiry date",
        "Academic year",
    ]);

    for class in &classes {
        let Some(year_group) = class_year_group(&year_pattern, &class.class_code) else {
            continue;
        };

        let eligible: Vec<&Student> = students
            .iter()
            .filter(|s| s.year_group == year_group)
            .filter(|s| {
                student_subjects
                    .get(&s.id)
                    .map_or(true, |subjects| !subjects.contains(&class.subject_name))
            })
            .collect();
        if eligible.is_empty() {
            continue;
        }

        let class_size = rng
            .gen_range(config.school.min_class_size..=config.school.max_class_size)
            .min(eligible.len());

        for student in eligible.choose_multiple(rng, class_size) {
            student_subjects
                .entry(student.id)
                .or_default()
                .insert(class.subject_name.clone());
            table.push(vec![
                SqlValue::Int(student.id),
                SqlValue::Int(student.person_bk),
                SqlValue::Int(class.pk),
                SqlValue::Date(today),
                SqlValue::Null,
                SqlValue::Text(class.academic_year.clone()),
            ]);
        }
    }

    db::append_into(pool, "fact student class enrolement", &table).await?;
    info!(
        "Seeded {} enrolments across {} teaching groups",
        table.len(),
        classes.len()
    );
    Ok(())
}

async fn load_students(pool: &MySqlPool) -> Result<Vec<Student>> {
    let rows =
        sqlx::query("SELECT `id`, `Person BK`, `Year Group` FROM `dim_students_isams`")
            .fetch_all(pool)
            .await?;
    rows.into_iter()
        .map(|row| {
            let year_group: String = row.try_get("Year Group")?;
            Ok(Student {
                id: row.try_get("id")?,
                person_bk: row.try_get("Person BK")?,
                year_group: year_group.trim().to_string(),
            })
        })
        .collect()
}

async fn load_teaching_groups(pool: &MySqlPool) -> Result<Vec<TeachingGroup>> {
    let rows = sqlx::query(
        "SELECT `pk`, `Class code`, `Subject name`, `Academic year` \
         FROM `dim Teaching Groups`",
    )
    .fetch_all(pool)
    .await?;
    rows.into_iter()
        .map(|row| {
            Ok(TeachingGroup {
                pk: row.try_get("pk")?,
                class_code: row.try_get("Class code")?,
                subject_name: row.try_get("Subject name")?,
                academic_year: row.try_get("Academic year")?,
            })
        })
        .collect()
}

fn class_year_group(pattern: &Regex, class_code: &str) -> Option<String> {
    pattern
        .captures(class_code)
        .map(|captures| captures[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_year_group_extraction() {
        let pattern = Regex::new(r"^(\d{1,2})[A-Z]/").unwrap();
        assert_eq!(class_year_group(&pattern, "9A/Ph1"), Some("9".to_string()));
        assert_eq!(
            class_year_group(&pattern, "13D/En4"),
            Some("13".to_string())
        );
        assert_eq!(class_year_group(&pattern, "Sixth form"), None);
    }
}
