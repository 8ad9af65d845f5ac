use std::path::PathBuf;

use thiserror::Error;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, EtlError>;

/// Error type covering the failures that can occur while the tool reads,
/// cleans, maps, or persists sales data.
#[derive(Debug, Error)]
pub enum EtlError {
    /// Wrapper for IO failures such as reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when a pipeline cannot be rendered as JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors bubbled up from the Excel writer implementation.
    #[error("Excel write error: {0}")]
    ExcelWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Errors bubbled up from the Excel reader implementation.
    #[error("Excel read error: {0}")]
    ExcelRead(#[from] calamine::Error),

    /// Errors raised while emitting CSV reports.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Raised when the configuration file is not valid TOML.
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    /// Errors reported by the MongoDB driver.
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    /// Raised when a document field has an unexpected BSON type.
    #[error("BSON error: {0}")]
    Bson(#[from] mongodb::bson::document::ValueAccessError),

    /// The spreadsheet path does not exist or is not a file.
    #[error("{0} is not a file or does not exist")]
    ExcelFileMissing(PathBuf),

    /// The requested sheet is absent from the workbook.
    #[error("sheet '{sheet}' does not exist in {path}")]
    ExcelSheetMissing { path: PathBuf, sheet: String },

    /// The collection is empty or absent.
    #[error("collection '{0}' does not exist")]
    CollectionMissing(String),

    /// A column the step depends on is absent from the frame.
    #[error("{context}: column '{column}' is missing")]
    ColumnMissing { context: String, column: String },

    /// A left join changed the number of rows of the left-hand frame.
    #[error("{description} mapping: expected {before} row(s), but found {after} row(s)")]
    MappingRowsExceeded {
        description: String,
        before: usize,
        after: usize,
    },

    /// A whole number does not fit into a 64-bit integer.
    #[error("numeric overflow in field '{field}'")]
    NumericOverflow { field: String },

    /// A `--field` argument could not be parsed.
    #[error("invalid field configuration '{0}', expected '<a|r>:<field>'")]
    InvalidFieldConfig(String),

    /// The requested report has no generator.
    #[error("unknown report '{0}'")]
    UnknownReport(String),

    /// An external command exited unsuccessfully.
    #[error("command '{command}' failed with status {status}")]
    CommandFailed { command: String, status: String },

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}
