use std::fmt;

use thiserror::Error;

/// A statement file could not be read as CSV or OFX at all.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("File is empty: no header row found")]
    Empty,

    #[error("File has a header row but no data rows")]
    NoDataRows,

    #[error("Line {line}: expected {expected} fields, found {found}")]
    RaggedRow {
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("Malformed CSV: {0}")]
    Malformed(String),

    #[error("Not an OFX/QFX statement: no <OFX> element found")]
    NotOfx,
}

impl From<csv::Error> for ParseError {
    fn from(e: csv::Error) -> Self {
        ParseError::Malformed(e.to_string())
    }
}

/// A mapping or statement is incomplete. Carries every problem found so they
/// can be shown together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub problems: Vec<String>,
}

impl ValidationError {
    pub fn new(problems: Vec<String>) -> Self {
        Self { problems }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.problems.join("; "))
    }
}

impl std::error::Error for ValidationError {}

/// The backend refused or failed the import batch.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Import rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Could not reach the import service: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected response from the import service: {0}")]
    InvalidResponse(String),
}

/// One row that could not become a transaction. Non-fatal.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RowError {
    pub row: u64,
    pub error: String,
}

impl RowError {
    pub fn new(row: u64, error: impl Into<String>) -> Self {
        Self {
            row,
            error: error.into(),
        }
    }
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}: {}", self.row, self.error)
    }
}

#[derive(Error, Debug)]
pub enum TallyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Parse(#[from] ParseError),

    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Import(#[from] ImportError),

    #[error("Unsupported file type: {0} (expected .csv, .ofx or .qfx)")]
    UnsupportedFile(String),

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Cannot {action} while in the {step} step")]
    WrongStep {
        action: &'static str,
        step: &'static str,
    },

    #[error("Choose a {0} first")]
    MissingSelection(&'static str),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, TallyError>;
