use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("malformed row in {path} at line {line}: {reason}")]
    MalformedRow {
        path: PathBuf,
        line: u64,
        reason: String,
    },

    #[error("table {table} has no column {column}")]
    MissingColumn { table: String, column: String },

    #[error("column {column} of table {table} does not hold text")]
    NotText { table: String, column: String },

    #[error("invalid correction rule {name}: {reason}")]
    InvalidRule { name: String, reason: String },

    #[error("table {table} cannot move from stage {from} to {to}")]
    Stage {
        table: String,
        from: String,
        to: String,
    },

    #[error("snapshot {table} disagrees with its catalog: {reason}")]
    Catalog { table: String, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("no yearly source is defined for year {0}")]
    UnknownYear(i32),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
