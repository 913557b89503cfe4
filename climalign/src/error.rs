//! Error types for the climalign pipeline.
//!
//! - [`SchemaError`] - a table lacks a required column or holds the wrong kind of value
//! - [`FitError`] - a regression cannot be computed for the given points
//! - [`ConfigError`] - options or region presets could not be loaded
//! - [`PipelineError`] - top-level orchestration errors
//!
//! CSV parsing errors live next to the parser ([`crate::parser::CsvError`]) and
//! convert into [`PipelineError`] like the others, so `?` works across stages.

use thiserror::Error;

use crate::parser::CsvError;

// =============================================================================
// Schema Errors
// =============================================================================

/// A table does not have the shape a stage requires.
///
/// Fatal for the stage that raised it; never recovered internally.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    /// Required column absent.
    #[error("Missing required column '{column}' in {table} table")]
    MissingColumn { table: String, column: String },

    /// A measurement or period column holds text.
    #[error("Column '{column}' in {table} table holds non-numeric value '{value}'")]
    NonNumeric {
        table: String,
        column: String,
        value: String,
    },

    /// A period column holds something other than an integer.
    #[error("Column '{column}' in {table} table holds '{value}', expected an integer period")]
    InvalidPeriod {
        table: String,
        column: String,
        value: String,
    },

    /// Tables stacked together do not share the same columns.
    #[error("Cannot combine {table}: expected columns [{expected}], found [{found}]")]
    ColumnMismatch {
        table: String,
        expected: String,
        found: String,
    },
}

impl SchemaError {
    pub fn missing(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::MissingColumn {
            table: table.into(),
            column: column.into(),
        }
    }
}

// =============================================================================
// Regression Errors
// =============================================================================

/// A regression could not be fitted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    /// Not enough points for the requested degree or for a meaningful p-value.
    #[error("Underdetermined fit: {points} point(s), at least {required} required")]
    Underdetermined { points: usize, required: usize },

    /// `xs` and `ys` differ in length.
    #[error("Length mismatch: {xs} x value(s) but {ys} y value(s)")]
    LengthMismatch { xs: usize, ys: usize },

    /// No points at all.
    #[error("No data points")]
    Empty,

    /// The x values do not span enough distinct positions.
    #[error("Singular fit: x values do not vary enough")]
    Singular,
}

/// A fit failure attributed to one group.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Region '{group}': {error}")]
pub struct GroupFailure {
    pub group: String,
    #[source]
    pub error: FitError,
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors while loading or validating pipeline configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file.
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid JSON in the config file.
    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A value is out of range or malformed.
    #[error("Invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// A region label is not known.
    #[error("Unknown region: {0}")]
    UnknownRegion(String),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline errors.
///
/// Returned by [`crate::transform::pipeline::run`]. Per-region regression
/// failures are not errors at this level; they are reported alongside the
/// successful results.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// CSV parsing error.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// Schema error in one of the stages.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// No regions to analyze.
    #[error("No regions to analyze")]
    NoRegions,
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for schema-checked table operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Result type for regression operations.
pub type FitResult<T> = Result<T, FitError>;

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        let schema_err = SchemaError::missing("emissions", "emissions_total");
        let pipeline_err: PipelineError = schema_err.into();
        let msg = pipeline_err.to_string();
        assert!(msg.contains("emissions_total"));
        assert!(msg.contains("emissions table"));

        let config_err = ConfigError::UnknownRegion("Atlantis".into());
        let pipeline_err: PipelineError = config_err.into();
        assert!(pipeline_err.to_string().contains("Atlantis"));
    }

    #[test]
    fn test_group_failure_names_region() {
        let failure = GroupFailure {
            group: "South America".into(),
            error: FitError::Underdetermined {
                points: 2,
                required: 3,
            },
        };
        let msg = failure.to_string();
        assert!(msg.contains("South America"));
        assert!(msg.contains("2 point(s)"));
    }
}
