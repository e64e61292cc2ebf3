use thiserror::Error;

/// Errors raised while loading, navigating, or writing a review workbook.
///
/// Boundary hits and "all cases complete" are not errors; see
/// [`crate::navigator::Notice`].
#[derive(Debug, Error)]
pub enum ReviewError {
    /// The upload is not a readable workbook or lacks the case sheet.
    #[error("Invalid workbook: {0}")]
    Format(String),

    /// The case sheet parsed but holds no rows.
    #[error("The case sheet '{0}' contains no cases")]
    EmptyDataset(String),

    /// A row index that no longer exists in the case table.
    #[error("Row {index} is out of range (table has {len} rows)")]
    RowOutOfRange { index: usize, len: usize },

    #[error("Failed to write workbook: {0}")]
    Write(#[from] rust_xlsxwriter::XlsxError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("No workbooks matching '{pattern}' found in {dir}")]
    NoWorkbooks { dir: String, pattern: String },

    #[error("Review session not found or expired")]
    SessionNotFound,

    /// The session moved on while a submit was being saved.
    #[error("The case changed while it was being submitted; please submit again")]
    StaleSubmit,
}

pub type Result<T> = std::result::Result<T, ReviewError>;
