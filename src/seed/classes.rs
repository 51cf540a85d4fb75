//! Teaching-group seeding.
//!
//! Fabricates one `dim Teaching Groups` row per class: departments x year
//! groups x a configurable class count, each with a unique class code like
//! `10B/Ph3` and a randomly assigned teacher of record (plus optional B/C
//! co-teachers).

use crate::config::Config;
use crate::db::{self, SqlValue, Table};
use crate::error::{Result, WarehouseError};
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use sqlx::mysql::MySqlPool;
use sqlx::Row;
use std::collections::HashSet;
use tracing::{info, warn};

struct Department {
    subject_name: String,
    subject_code: String,
}

pub async fn seed_classes(
    pool: &MySqlPool,
    config: &Config,
    academic_year: &str,
    today: NaiveDate,
    rng: &mut StdRng,
) -> Result<()> {
    let departments = load_departments(pool).await?;
    let teacher_pks = load_teacher_pks(pool).await?;
    if teacher_pks.is_empty() {
        return Err(WarehouseError::Seed(
            "dim Staff is empty, cannot assign teachers".to_string(),
        ));
    }

    let mut table = Table::new(vec![
        "SIMS PK",
        "Academic year",
        "Teacher",
        "Teacher B",
        "Teacher C",
        "Teacher Name",
        "Teacher B Name",
        "Teacher C Name",
        "Class code",
        "Code and year",
        "Row effective date",
        "Row expiry date",
        "Current group",
        "Subject name",
        "Teacher a b or c",
        "iSAMS id",
    ]);

    let mut used_codes = HashSet::new();
    for department in &departments {
        for year in &config.school.year_groups {
            let class_count = classes_for(config, &department.subject_name, year);
            for _ in 0..class_count {
                let Some(class_code) = unique_class_code(
                    rng,
                    &mut used_codes,
                    year,
                    &department.subject_code,
                    academic_year,
                ) else {
                    warn!(
                        "Could not find a free class code for {} year {}",
                        department.subject_name, year
                    );
                    continue;
                };

                let teacher = *teacher_pks.choose(rng).unwrap_or(&teacher_pks[0]);
                let teacher_b = (rng.gen::<f64>() < config.school.teacher_b_probability)
                    .then(|| *teacher_pks.choose(rng).unwrap_or(&teacher_pks[0]));
                let teacher_c = (rng.gen::<f64>() < config.school.teacher_c_probability)
                    .then(|| *teacher_pks.choose(rng).unwrap_or(&teacher_pks[0]));

                table.push(vec![
                    SqlValue::Int(rng.gen_range(100_000..=999_999)),
                    SqlValue::Text(academic_year.to_string()),
                    SqlValue::Int(teacher),
                    SqlValue::opt_int(teacher_b),
                    SqlValue::opt_int(teacher_c),
                    SqlValue::Null,
                    SqlValue::Null,
                    SqlValue::Null,
                    SqlValue::Text(class_code.clone()),
                    SqlValue::Text(format!("{} {}", class_code, academic_year)),
                    SqlValue::Date(today),
                    SqlValue::Null,
                    SqlValue::Text("Yes".to_string()),
                    SqlValue::Text(department.subject_name.clone()),
                    SqlValue::Null,
                    SqlValue::Int(rng.gen_range(10_000..=99_999)),
                ]);
            }
        }
    }

    db::append_into(pool, "dim Teaching Groups", &table).await?;
    info!(
        "Seeded {} teaching groups across {} departments",
        table.len(),
        departments.len()
    );
    Ok(())
}

async fn load_departments(pool: &MySqlPool) -> Result<Vec<Department>> {
    let rows = sqlx::query(
        "SELECT `Subject name`, `iSAMS subject code` FROM `dim Departments`",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(Department {
                subject_name: row.try_get("Subject name")?,
                subject_code: row.try_get("iSAMS subject code")?,
            })
        })
        .collect()
}

async fn load_teacher_pks(pool: &MySqlPool) -> Result<Vec<i64>> {
    let rows = sqlx::query("SELECT `Warehouse PK` FROM `dim Staff`")
        .fetch_all(pool)
        .await?;
    rows.into_iter()
        .map(|row| Ok(row.try_get("Warehouse PK")?))
        .collect()
}

/// Class count for a (department, year group), honouring per-department
/// overrides. An override that omits a year group means no classes there.
fn classes_for(config: &Config, department: &str, year: &str) -> usize {
    for dist in &config.school.class_distribution {
        if dist.department.eq_ignore_ascii_case(department) {
            return dist.numbers.get(year).copied().unwrap_or(0);
        }
    }
    config.school.classes_per_group
}

/// Try up to 100 random codes of the form `{year}{letter}/{subject}{n}`
/// until one is unused for this academic year.
fn unique_class_code(
    rng: &mut StdRng,
    used: &mut HashSet<String>,
    year: &str,
    subject_code: &str,
    academic_year: &str,
) -> Option<String> {
    for _ in 0..100 {
        let letter = ['A', 'B', 'C', 'D'].choose(rng).copied()?;
        let suffix = rng.gen_range(1..=9);
        let code = format!("{}{}/{}{}", year, letter, subject_code, suffix);
        let code_and_year = format!("{} {}", code, academic_year);
        if used.insert(code_and_year) {
            return Some(code);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassDistribution;
    use rand::SeedableRng;

    #[test]
    fn test_unique_class_codes_never_repeat() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut used = HashSet::new();
        let mut codes = HashSet::new();
        for _ in 0..30 {
            if let Some(code) = unique_class_code(&mut rng, &mut used, "10", "Ph", "2024/25") {
                assert!(codes.insert(code));
            }
        }
        // 4 letters x 9 suffixes = 36 possible codes, 30 draws must fit.
        assert!(codes.len() >= 25);
    }

    #[test]
    fn test_distribution_override_wins() {
        let mut config: Config = serde_json::from_str("{}").unwrap();
        config.school.class_distribution = vec![ClassDistribution {
            department: "Physics".to_string(),
            numbers: [("10".to_string(), 5usize)].into_iter().collect(),
        }];

        assert_eq!(classes_for(&config, "physics", "10"), 5);
        // Year groups missing from an override get nothing.
        assert_eq!(classes_for(&config, "Physics", "11"), 0);
        // Departments without an override use the default.
        assert_eq!(classes_for(&config, "English", "10"), 3);
    }
}
