//! Error types for point cloud cleaning with rich diagnostics.
//!
//! This module provides comprehensive error handling with:
//! - Machine-readable error codes for programmatic handling
//! - Recovery suggestions for common issues
//! - Terminal display via miette
//!
//! Filter steps that would empty the cloud are *not* errors. They are
//! recorded as rejections in the pipeline log and the run continues.
//!
//! # Error Codes
//!
//! Each error has a unique code in the format `CLEAN-XXXX`:
//! - `CLEAN-1xxx`: I/O errors (file reading, writing, parsing)
//! - `CLEAN-2xxx`: Input data errors (missing vertex table, empty cloud)
//! - `CLEAN-3xxx`: Configuration errors (parameters, crop bounds, presets)
//! - `CLEAN-4xxx`: Export errors (mapping invalidated, bad selections)
//! - `CLEAN-5xxx`: Run errors (advisor failure, cancellation)
//!
//! # Example
//!
//! ```rust
//! use splat_clean::{CleanError, ErrorCode};
//!
//! let err = CleanError::invalid_crop_bounds("x", 1.0, 0.5);
//! assert_eq!(err.code(), ErrorCode::InvalidCropBounds);
//! println!("Recovery: {}", err.recovery_suggestion());
//! ```

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for cleaning operations.
pub type CleanResult<T> = Result<T, CleanError>;

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // I/O errors (1xxx)
    /// CLEAN-1001: Failed to read file
    IoRead = 1001,
    /// CLEAN-1002: Failed to write file
    IoWrite = 1002,
    /// CLEAN-1003: Failed to parse file
    ParseError = 1003,

    // Input data errors (2xxx)
    /// CLEAN-2001: No `vertex` element in the file
    MissingVertexElement = 2001,
    /// CLEAN-2002: A vertex row lacks a usable x/y/z value
    MissingCoordinate = 2002,
    /// CLEAN-2003: The cloud has zero points
    EmptyCloud = 2003,

    // Configuration errors (3xxx)
    /// CLEAN-3001: A filter parameter is out of range
    InvalidParameter = 3001,
    /// CLEAN-3002: Crop bounds violate `min < max`
    InvalidCropBounds = 3002,
    /// CLEAN-3003: Named preset does not exist
    PresetNotFound = 3003,
    /// CLEAN-3004: Preset file could not be read or written
    PresetIo = 3004,
    /// CLEAN-3005: Configuration text is malformed
    ConfigParse = 3005,

    // Export errors (4xxx)
    /// CLEAN-4001: Attribute-preserving export after a resampling step
    MappingInvalidated = 4001,
    /// CLEAN-4002: Export selection is empty
    EmptySelection = 4002,
    /// CLEAN-4003: Export selection references a missing row
    IndexOutOfRange = 4003,

    // Run errors (5xxx)
    /// CLEAN-5001: Not enough points to estimate parameters
    InsufficientPoints = 5001,
    /// CLEAN-5002: The run was cancelled
    Cancelled = 5002,
}

impl ErrorCode {
    /// Returns the error code as a string in the format `CLEAN-XXXX`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::IoRead => "CLEAN-1001",
            ErrorCode::IoWrite => "CLEAN-1002",
            ErrorCode::ParseError => "CLEAN-1003",
            ErrorCode::MissingVertexElement => "CLEAN-2001",
            ErrorCode::MissingCoordinate => "CLEAN-2002",
            ErrorCode::EmptyCloud => "CLEAN-2003",
            ErrorCode::InvalidParameter => "CLEAN-3001",
            ErrorCode::InvalidCropBounds => "CLEAN-3002",
            ErrorCode::PresetNotFound => "CLEAN-3003",
            ErrorCode::PresetIo => "CLEAN-3004",
            ErrorCode::ConfigParse => "CLEAN-3005",
            ErrorCode::MappingInvalidated => "CLEAN-4001",
            ErrorCode::EmptySelection => "CLEAN-4002",
            ErrorCode::IndexOutOfRange => "CLEAN-4003",
            ErrorCode::InsufficientPoints => "CLEAN-5001",
            ErrorCode::Cancelled => "CLEAN-5002",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recovery suggestions for cleaning errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoverySuggestion {
    /// Check the input file.
    CheckInput { checks: Vec<String> },
    /// Adjust parameters for the operation.
    AdjustParameters { parameters: Vec<(String, String)> },
    /// Re-run the pipeline with different settings.
    RerunPipeline { description: String },
    /// No automatic recovery available.
    None,
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoverySuggestion::CheckInput { checks } => {
                write!(f, "Check the input for: {}", checks.join(", "))
            }
            RecoverySuggestion::AdjustParameters { parameters } => {
                let params: Vec<String> = parameters
                    .iter()
                    .map(|(k, v)| format!("{} = {}", k, v))
                    .collect();
                write!(f, "Try adjusting: {}", params.join(", "))
            }
            RecoverySuggestion::RerunPipeline { description } => write!(f, "{}", description),
            RecoverySuggestion::None => write!(f, "No automatic recovery available"),
        }
    }
}

/// Errors that can occur while loading, configuring, cleaning or exporting.
#[derive(Debug, Error, Diagnostic)]
pub enum CleanError {
    /// Error reading from a file.
    #[error("failed to read point cloud from {path}")]
    #[diagnostic(
        code(clean::io::read),
        help("Check that the file exists and is readable. Try: ls -la {}", path.display())
    )]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error writing to a file.
    #[error("failed to write point cloud to {path}")]
    #[diagnostic(
        code(clean::io::write),
        help("Check that the directory exists and is writable")
    )]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error parsing the file.
    #[error("failed to parse point cloud from {path}: {details}")]
    #[diagnostic(
        code(clean::parse::error),
        help("The file may be truncated or not a valid PLY file.")
    )]
    ParseError { path: PathBuf, details: String },

    /// The file carries no vertex table.
    #[error("PLY has no 'vertex' element")]
    #[diagnostic(
        code(clean::input::no_vertex),
        help("Only PLY files with a 'vertex' element (x, y, z properties) can be cleaned.")
    )]
    MissingVertexElement,

    /// A vertex row has no usable coordinate.
    #[error("vertex {row} has no numeric '{property}' property")]
    #[diagnostic(code(clean::input::coordinate))]
    MissingCoordinate { row: usize, property: &'static str },

    /// The cloud has no points.
    #[error("point cloud is empty: {details}")]
    #[diagnostic(code(clean::input::empty))]
    EmptyCloud { details: String },

    /// A filter parameter is out of range.
    #[error("invalid parameter {name} = {value}: {constraint}")]
    #[diagnostic(code(clean::config::parameter))]
    InvalidParameter {
        name: &'static str,
        value: String,
        constraint: &'static str,
    },

    /// Crop bounds are not strictly ordered on an axis.
    #[error("invalid crop bounds on {axis}: min {min} must be < max {max}")]
    #[diagnostic(
        code(clean::config::crop_bounds),
        help("Bounds must satisfy min < max for each axis.")
    )]
    InvalidCropBounds { axis: &'static str, min: f64, max: f64 },

    /// Named preset does not exist.
    #[error("preset '{name}' not found")]
    #[diagnostic(
        code(clean::config::preset),
        help("List the saved presets to see what is available.")
    )]
    PresetNotFound { name: String },

    /// Preset file could not be read or written.
    #[error("preset store {path}: {details}")]
    #[diagnostic(code(clean::config::preset_io))]
    PresetIo { path: PathBuf, details: String },

    /// Configuration text could not be parsed.
    #[error("invalid configuration: {details}")]
    #[diagnostic(code(clean::config::parse))]
    ConfigParse { details: String },

    /// Attribute-preserving export after a mapping-breaking step.
    #[error("cleaned points no longer map 1:1 onto source rows")]
    #[diagnostic(
        code(clean::export::mapping),
        help(
            "Pipeline included steps that break 1:1 mapping (e.g. voxel downsample). Re-run with 3DGS mode on and without voxel downsample."
        )
    )]
    MappingInvalidated,

    /// Nothing to export.
    #[error("selection is empty; nothing to save")]
    #[diagnostic(code(clean::export::empty))]
    EmptySelection,

    /// Export selection refers to a row the table does not have.
    #[error("row index {index} is out of range for a table of {row_count} rows")]
    #[diagnostic(code(clean::export::index))]
    IndexOutOfRange { index: usize, row_count: usize },

    /// Not enough points for a nearest-neighbour estimate.
    #[error("could not estimate nearest-neighbour spacing: {details}")]
    #[diagnostic(code(clean::advisor::points), help("Try another cloud."))]
    InsufficientPoints { details: String },

    /// The run was cancelled between steps.
    #[error("run cancelled after {steps_processed} steps")]
    #[diagnostic(code(clean::run::cancelled))]
    Cancelled { steps_processed: usize },
}

impl CleanError {
    /// Returns the machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            CleanError::IoRead { .. } => ErrorCode::IoRead,
            CleanError::IoWrite { .. } => ErrorCode::IoWrite,
            CleanError::ParseError { .. } => ErrorCode::ParseError,
            CleanError::MissingVertexElement => ErrorCode::MissingVertexElement,
            CleanError::MissingCoordinate { .. } => ErrorCode::MissingCoordinate,
            CleanError::EmptyCloud { .. } => ErrorCode::EmptyCloud,
            CleanError::InvalidParameter { .. } => ErrorCode::InvalidParameter,
            CleanError::InvalidCropBounds { .. } => ErrorCode::InvalidCropBounds,
            CleanError::PresetNotFound { .. } => ErrorCode::PresetNotFound,
            CleanError::PresetIo { .. } => ErrorCode::PresetIo,
            CleanError::ConfigParse { .. } => ErrorCode::ConfigParse,
            CleanError::MappingInvalidated => ErrorCode::MappingInvalidated,
            CleanError::EmptySelection => ErrorCode::EmptySelection,
            CleanError::IndexOutOfRange { .. } => ErrorCode::IndexOutOfRange,
            CleanError::InsufficientPoints { .. } => ErrorCode::InsufficientPoints,
            CleanError::Cancelled { .. } => ErrorCode::Cancelled,
        }
    }

    /// Returns a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self {
            CleanError::IoRead { .. } => RecoverySuggestion::CheckInput {
                checks: vec!["file exists".into(), "file permissions".into()],
            },
            CleanError::IoWrite { .. } => RecoverySuggestion::CheckInput {
                checks: vec!["directory exists".into(), "write permissions".into()],
            },
            CleanError::ParseError { .. } => RecoverySuggestion::CheckInput {
                checks: vec!["PLY header".into(), "file truncation".into()],
            },
            CleanError::MissingVertexElement | CleanError::MissingCoordinate { .. } => {
                RecoverySuggestion::CheckInput {
                    checks: vec!["'vertex' element".into(), "x/y/z properties".into()],
                }
            }
            CleanError::EmptyCloud { .. } => RecoverySuggestion::CheckInput {
                checks: vec!["file contains points".into()],
            },
            CleanError::InvalidParameter { name, constraint, .. } => {
                RecoverySuggestion::AdjustParameters {
                    parameters: vec![((*name).into(), (*constraint).into())],
                }
            }
            CleanError::InvalidCropBounds { axis, .. } => RecoverySuggestion::AdjustParameters {
                parameters: vec![(format!("min_{axis}/max_{axis}"), "min < max".into())],
            },
            CleanError::PresetNotFound { .. } | CleanError::PresetIo { .. } => {
                RecoverySuggestion::CheckInput {
                    checks: vec!["preset name".into(), "preset file".into()],
                }
            }
            CleanError::ConfigParse { .. } => RecoverySuggestion::CheckInput {
                checks: vec!["configuration syntax".into()],
            },
            CleanError::MappingInvalidated => RecoverySuggestion::RerunPipeline {
                description: "Re-run the clean with 3DGS mode on and without voxel downsample"
                    .into(),
            },
            CleanError::EmptySelection | CleanError::IndexOutOfRange { .. } => {
                RecoverySuggestion::RerunPipeline {
                    description: "Reset to the original cloud and run the clean again".into(),
                }
            }
            CleanError::InsufficientPoints { .. } => RecoverySuggestion::CheckInput {
                checks: vec!["at least two points".into()],
            },
            CleanError::Cancelled { .. } => RecoverySuggestion::None,
        }
    }

    // Constructor helpers for common error patterns

    /// Create an IoRead error.
    pub fn io_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CleanError::IoRead {
            path: path.into(),
            source,
        }
    }

    /// Create an IoWrite error.
    pub fn io_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CleanError::IoWrite {
            path: path.into(),
            source,
        }
    }

    /// Create a ParseError.
    pub fn parse_error(path: impl Into<PathBuf>, details: impl Into<String>) -> Self {
        CleanError::ParseError {
            path: path.into(),
            details: details.into(),
        }
    }

    /// Create an EmptyCloud error.
    pub fn empty_cloud(details: impl Into<String>) -> Self {
        CleanError::EmptyCloud {
            details: details.into(),
        }
    }

    /// Create an InvalidParameter error.
    pub fn invalid_parameter(
        name: &'static str,
        value: impl std::fmt::Display,
        constraint: &'static str,
    ) -> Self {
        CleanError::InvalidParameter {
            name,
            value: value.to_string(),
            constraint,
        }
    }

    /// Create an InvalidCropBounds error.
    pub fn invalid_crop_bounds(axis: &'static str, min: f64, max: f64) -> Self {
        CleanError::InvalidCropBounds { axis, min, max }
    }

    /// Create a PresetIo error.
    pub fn preset_io(path: impl Into<PathBuf>, details: impl std::fmt::Display) -> Self {
        CleanError::PresetIo {
            path: path.into(),
            details: details.to_string(),
        }
    }

    /// Create a ConfigParse error.
    pub fn config_parse(details: impl std::fmt::Display) -> Self {
        CleanError::ConfigParse {
            details: details.to_string(),
        }
    }

    /// Create an InsufficientPoints error.
    pub fn insufficient_points(details: impl Into<String>) -> Self {
        CleanError::InsufficientPoints {
            details: details.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = CleanError::invalid_crop_bounds("y", 2.0, 1.0);
        assert_eq!(err.code(), ErrorCode::InvalidCropBounds);
        assert_eq!(err.code().as_str(), "CLEAN-3002");
        assert_eq!(CleanError::MappingInvalidated.code().to_string(), "CLEAN-4001");
    }

    #[test]
    fn test_recovery_suggestions() {
        let err = CleanError::invalid_parameter("radius", -1.0, "must be > 0");
        match err.recovery_suggestion() {
            RecoverySuggestion::AdjustParameters { parameters } => {
                assert_eq!(parameters[0].0, "radius");
            }
            other => panic!("Expected AdjustParameters suggestion, got {other:?}"),
        }

        let suggestion = CleanError::MappingInvalidated.recovery_suggestion();
        assert!(suggestion.to_string().contains("without voxel"));
    }

    #[test]
    fn test_error_display() {
        let err = CleanError::invalid_crop_bounds("x", 3.0, 1.0);
        let display = format!("{}", err);
        assert!(display.contains("on x"));
        assert!(display.contains("min 3"));

        let err = CleanError::IndexOutOfRange {
            index: 12,
            row_count: 10,
        };
        assert!(err.to_string().contains("12"));
        assert!(err.to_string().contains("10 rows"));
    }
}
