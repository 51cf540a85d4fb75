//! Data model for the report-card transform.

use crate::error::Result;
use chrono::NaiveDate;
use sqlx::mysql::MySqlPool;
use sqlx::Row;
use itertools::Itertools;

/// Sentinel for validity windows that never expire.
pub const FAR_FUTURE: NaiveDate = match NaiveDate::from_ymd_opt(9999, 12, 31) {
    Some(date) => date,
    None => panic!("sentinel date is valid"),
};

/// One graded observation from the report feed.
#[derive(Debug, Clone)]
pub struct ReportEvent {
    pub student: i64,
    pub academic_year: String,
    pub term: String,
    pub subject: String,
    pub teacher_tag: String,
    pub data_type: String,
    pub result: Option<String>,
    pub numeric_result: Option<f64>,
    pub result_key: Option<i64>,
    pub entry_date: Option<NaiveDate>,
}

impl ReportEvent {
    pub fn group_key(&self) -> GroupKey {
        GroupKey {
            student: self.student,
            academic_year: self.academic_year.clone(),
            term: self.term.clone(),
            subject: self.subject.clone(),
            teacher_tag: self.teacher_tag.clone(),
        }
    }
}

/// The five-part key a pivoted row is built around. `Ord` gives the output
/// a stable order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey {
    pub student: i64,
    pub academic_year: String,
    pub term: String,
    pub subject: String,
    pub teacher_tag: String,
}

/// A slowly-changing-dimension row giving a student's year group between
/// two dates. A missing expiration means the window is still open.
#[derive(Debug, Clone)]
pub struct StudentValidityWindow {
    pub student: i64,
    pub year_group: String,
    pub effective: NaiveDate,
    pub expiration: Option<NaiveDate>,
}

impl StudentValidityWindow {
    pub fn expiration_or_far_future(&self) -> NaiveDate {
        self.expiration.unwrap_or(FAR_FUTURE)
    }

    /// Inclusive on both ends.
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.effective && date <= self.expiration_or_far_future()
    }
}

/// Parse the feed's integer YYYYMMDD representation. Out-of-range values
/// come back as `None`, matching how the feed treats unparseable dates.
pub fn date_from_yyyymmdd(value: i64) -> Option<NaiveDate> {
    let year = (value / 10_000) as i32;
    let month = ((value / 100) % 100) as u32;
    let day = (value % 100) as u32;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Load all report events for one academic year, restricted to the pivot's
/// data-type allow-list. Input order is preserved: deduplication later is
/// first-occurrence-wins over exactly this order.
pub async fn load_events(
    pool: &MySqlPool,
    academic_year: &str,
    data_types: &[String],
) -> Result<Vec<ReportEvent>> {
    if data_types.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = data_types.iter().map(|_| "?").join(", ");
    let sql = format!(
        "SELECT `Student`, `Academic year`, `Term`, `Subject`, `Teacher a b or c`, \
                `Data type`, `Result`, `Numeric result`, `Result pk`, `Entry Date` \
         FROM `fact_report` \
         WHERE `Academic year` = ? AND `Data type` IN ({})",
        placeholders
    );

    let mut query = sqlx::query(&sql).bind(academic_year);
    for data_type in data_types {
        query = query.bind(data_type.as_str());
    }
    let rows = query.fetch_all(pool).await?;

    let mut events = Vec::with_capacity(rows.len());
    for row in rows {
        let entry_date: Option<i64> = row.try_get("Entry Date")?;
        events.push(ReportEvent {
            student: row.try_get("Student")?,
            academic_year: row.try_get("Academic year")?,
            term: row.try_get("Term")?,
            subject: row.try_get("Subject")?,
            teacher_tag: row.try_get("Teacher a b or c")?,
            data_type: row.try_get("Data type")?,
            result: row.try_get("Result")?,
            numeric_result: row.try_get("Numeric result")?,
            result_key: row.try_get("Result pk")?,
            entry_date: entry_date.and_then(date_from_yyyymmdd),
        });
    }
    Ok(events)
}

/// Load the full year-group validity dimension.
pub async fn load_windows(pool: &MySqlPool) -> Result<Vec<StudentValidityWindow>> {
    let rows = sqlx::query(
        "SELECT `Person BK`, `Year Group`, `Row Effective Date`, `Row Expiration Date` \
         FROM `dim_students_isams`",
    )
    .fetch_all(pool)
    .await?;

    let mut windows = Vec::with_capacity(rows.len());
    for row in rows {
        let year_group: String = row.try_get("Year Group")?;
        windows.push(StudentValidityWindow {
            student: row.try_get("Person BK")?,
            year_group: year_group.trim().to_string(),
            effective: row.try_get("Row Effective Date")?,
            expiration: row.try_get("Row Expiration Date")?,
        });
    }
    Ok(windows)
}
