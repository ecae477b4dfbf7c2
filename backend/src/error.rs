//! Error types for the consolidation pipeline.
//!
//! One enum per concern, mirroring the stages of the run:
//!
//! - [`ConfigError`] - configuration file and schema descriptor problems
//! - [`WorkbookError`] - bytes that cannot be opened as a workbook
//! - [`StructuralValidationError`] - workbook does not match the descriptor
//! - [`AcquisitionError`] - source bytes could not be fetched or read
//! - [`MalformedRecordError`] - a record lacks a field the transformer needs
//! - [`AggregationError`] - nothing left to aggregate
//! - [`OutputError`] - consolidated workbook could not be written
//! - [`FileError`] - any per-file failure, recovered at the file boundary
//! - [`PipelineError`] - top-level, fatal to the run
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors while loading configuration or building the schema descriptor.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("Cannot read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration is not valid JSON or does not fit the config types.
    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration violates the embedded config schema.
    #[error("Config does not match schema: {}", errors.join("; "))]
    Schema { errors: Vec<String> },

    /// Descriptor declares no columns.
    #[error("Schema descriptor declares no columns")]
    NoColumns,

    /// Two fields are bound to the same column letter.
    #[error("Column {column} is bound to both '{first}' and '{second}'")]
    DuplicateColumn {
        column: String,
        first: String,
        second: String,
    },

    /// Malformed column letter or cell reference.
    #[error("Invalid {what} '{value}'")]
    InvalidReference { what: &'static str, value: String },

    /// Header row must be a row number a worksheet can hold.
    #[error("Header row must be between 1 and 1048576")]
    InvalidHeaderRow,

    /// Field map is inconsistent.
    #[error("Invalid field map: {0}")]
    InvalidFieldMap(String),
}

// =============================================================================
// Workbook Errors
// =============================================================================

/// The bytes could not be opened as an `.xlsx` workbook.
#[derive(Debug, Error)]
pub enum WorkbookError {
    /// The reader rejected the content.
    #[error("Unreadable workbook: {0}")]
    Unreadable(String),

    /// Failed to read a workbook from disk.
    #[error("Cannot read workbook {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// =============================================================================
// Structural Validation Errors
// =============================================================================

/// A workbook does not match the expected layout.
///
/// Carries the offending sheet, cell or column so the reporting sink can
/// point at it without parsing a message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StructuralValidationError {
    /// The configured sheet does not exist.
    #[error("Sheet '{sheet}' does not exist in the workbook")]
    MissingSheet { sheet: String },

    /// The anchor cell holding the branch name is empty.
    #[error("Branch cell {cell} is empty")]
    MissingAnchor { cell: String },

    /// A header cell does not literally match the expected text.
    #[error("Column {column} ({field}) should be named '{expected}' but found '{found}'")]
    ColumnMismatch {
        column: String,
        field: String,
        expected: String,
        found: String,
    },
}

impl StructuralValidationError {
    /// Sheet name, cell reference or column letter at fault.
    pub fn location(&self) -> &str {
        match self {
            Self::MissingSheet { sheet } => sheet,
            Self::MissingAnchor { cell } => cell,
            Self::ColumnMismatch { column, .. } => column,
        }
    }
}

// =============================================================================
// Acquisition Errors
// =============================================================================

/// Source bytes are unavailable.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// Server answered with a non-success status.
    #[error("Download of {url} failed with status {status}")]
    HttpStatus { url: String, status: u16 },

    /// Transport-level failure.
    #[error("Download of {url} failed: {message}")]
    Request { url: String, message: String },

    /// Local file could not be read or written.
    #[error("File error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// =============================================================================
// Transformation Errors
// =============================================================================

/// A record cannot be mapped into the output field set.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MalformedRecordError {
    /// The field is not present on the record at all.
    #[error("Row {row}: missing field '{field}'")]
    MissingField { row: u32, field: String },
}

impl MalformedRecordError {
    pub fn field(&self) -> &str {
        match self {
            Self::MissingField { field, .. } => field,
        }
    }
}

// =============================================================================
// Aggregation Errors
// =============================================================================

/// Errors at the aggregation boundary. Always fatal to the run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AggregationError {
    /// No transformed records across all files.
    #[error("No records to aggregate")]
    EmptyInput,
}

// =============================================================================
// Output Errors
// =============================================================================

/// Errors while writing the consolidated workbook.
#[derive(Debug, Error)]
pub enum OutputError {
    /// Output directory or file could not be created.
    #[error("Output IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Workbook serialisation failed.
    #[error("Cannot write workbook: {0}")]
    Write(String),
}

// =============================================================================
// Per-file Errors
// =============================================================================

/// Category of a per-file failure, as reported to the log sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    Acquisition,
    MissingSheet,
    MissingAnchor,
    ColumnMismatch,
    MalformedRecord,
}

/// Any failure that skips one source file without stopping the run.
#[derive(Debug, Error)]
pub enum FileError {
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error(transparent)]
    Workbook(#[from] WorkbookError),

    #[error(transparent)]
    Structural(#[from] StructuralValidationError),

    #[error(transparent)]
    Malformed(#[from] MalformedRecordError),
}

impl FileError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Acquisition(_) | Self::Workbook(_) => FailureKind::Acquisition,
            Self::Structural(StructuralValidationError::MissingSheet { .. }) => {
                FailureKind::MissingSheet
            }
            Self::Structural(StructuralValidationError::MissingAnchor { .. }) => {
                FailureKind::MissingAnchor
            }
            Self::Structural(StructuralValidationError::ColumnMismatch { .. }) => {
                FailureKind::ColumnMismatch
            }
            Self::Malformed(_) => FailureKind::MalformedRecord,
        }
    }

    /// Offending sheet, cell, column or field, when there is one.
    pub fn location(&self) -> Option<String> {
        match self {
            Self::Structural(e) => Some(e.location().to_string()),
            Self::Malformed(e) => Some(e.field().to_string()),
            Self::Acquisition(_) | Self::Workbook(_) => None,
        }
    }
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level errors that abort a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Nothing to aggregate.
    #[error("Aggregation error: {0}")]
    Aggregation(#[from] AggregationError),

    /// Consolidated workbook could not be written.
    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    /// Download area could not be prepared.
    #[error("Acquisition error: {0}")]
    Acquisition(#[from] AcquisitionError),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for output operations.
pub type OutputResult<T> = Result<T, OutputError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        let agg_err = AggregationError::EmptyInput;
        let pipeline_err: PipelineError = agg_err.into();
        assert!(pipeline_err.to_string().contains("No records"));

        let cfg_err = ConfigError::NoColumns;
        let pipeline_err: PipelineError = cfg_err.into();
        assert!(pipeline_err.to_string().contains("no columns"));
    }

    #[test]
    fn test_column_mismatch_format() {
        let err = StructuralValidationError::ColumnMismatch {
            column: "C".into(),
            field: "mes".into(),
            expected: "Mes".into(),
            found: "Month".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Column C"));
        assert!(msg.contains("'Mes'"));
        assert!(msg.contains("'Month'"));
        assert_eq!(err.location(), "C");
    }

    #[test]
    fn test_file_error_kind_and_location() {
        let err: FileError = StructuralValidationError::MissingAnchor { cell: "B2".into() }.into();
        assert_eq!(err.kind(), FailureKind::MissingAnchor);
        assert_eq!(err.location().as_deref(), Some("B2"));

        let err: FileError = MalformedRecordError::MissingField {
            row: 7,
            field: "grupo".into(),
        }
        .into();
        assert_eq!(err.kind(), FailureKind::MalformedRecord);
        assert_eq!(err.location().as_deref(), Some("grupo"));

        let err: FileError = WorkbookError::Unreadable("zip".into()).into();
        assert_eq!(err.kind(), FailureKind::Acquisition);
        assert!(err.location().is_none());
    }
}
