// Error kinds for the pairing and feature pipeline.
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("malformed row at line {line}: {reason}")]
    MalformedRow { line: u64, reason: String },

    #[error("{team} on {date}: {candidates} opponent rows match")]
    PairingConflict {
        team: String,
        date: NaiveDate,
        candidates: usize,
    },

    #[error("invalid pair at row {index}: {reason}")]
    InvalidPair { index: usize, reason: &'static str },

    #[error("{team} has {found} games before {date}, wanted {wanted}")]
    InsufficientHistory {
        team: String,
        date: NaiveDate,
        found: usize,
        wanted: usize,
    },

    #[error("no game {team_a} vs {team_b} on {date}")]
    NotFound {
        date: NaiveDate,
        team_a: String,
        team_b: String,
    },

    #[error("dataset {0} has no usable rows")]
    EmptyDataset(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("plot error: {0}")]
    Plot(String),
}

pub type Result<T> = std::result::Result<T, PredictError>;
