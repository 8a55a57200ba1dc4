use thiserror::Error;

#[derive(Error, Debug)]
pub enum SortError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Unknown encoding: {0}")]
    Encoding(String),

    #[error("Rule table error: {0}")]
    RuleTable(String),

    #[error("Output paths clash: {0}")]
    OutputPath(String),

    #[error("Settings error: {0}")]
    Settings(String),
}

pub type Result<T> = std::result::Result<T, SortError>;

/// Why a single input row could not be normalized. Never fatal to a run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    #[error("invalid amount '{0}'")]
    InvalidAmount(String),

    #[error("invalid date '{0}' (expected {1})")]
    InvalidDate(String, String),

    #[error("empty description")]
    EmptyDescription,
}
