use thiserror::Error;

#[derive(Error, Debug)]
pub enum WarehouseError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Calendar error: {0}")]
    Calendar(String),

    #[error("Grade dimension error: {0}")]
    Grades(String),

    #[error("Seed error: {0}")]
    Seed(String),

    #[error("Report card error: {0}")]
    ReportCard(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("DataFrame error: {0}")]
    DataFrame(#[from] polars::error::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WarehouseError>;
