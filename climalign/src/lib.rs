//! # Climalign - temperature and emissions reconciliation
//!
//! Climalign reconciles a wide-format monthly temperature table with a
//! long-format annual emissions table, aggregates them per region and
//! computes per-region trend statistics.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌───────────┐   ┌─────────┐   ┌────────┐   ┌───────────┐   ┌────────────┐
//! │ Temperature │──▶│ Normalize │──▶│         │   │        │   │           │   │            │
//! │   (wide)    │   │ (reshape) │   │  Align  │──▶│  Join  │──▶│ Aggregate │──▶│ Regression │
//! │  Emissions  │──────────────────▶│ (years) │   │ (keys) │   │ (period)  │   │ (per group)│
//! │   (long)    │                   └─────────┘   └────────┘   └───────────┘   └────────────┘
//! └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use climalign::{run_files, PipelineConfig};
//!
//! let report = run_files("temperature.csv", "emissions.csv", &PipelineConfig::default()).unwrap();
//! println!("{} regions regressed", report.regressions.len());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Cells, tables and observation records
//! - [`parser`] - CSV parsing with auto-detection
//! - [`transform`] - Normalize, align, join, aggregate and the pipeline
//! - [`regression`] - Linear statistics and polynomial trendlines
//! - [`config`] - Pipeline options and region presets
//! - [`logs`] - Run log returned with every report

// Core modules
pub mod error;
pub mod models;

// Parsing
pub mod parser;

// Transformation
pub mod transform;

// Statistics
pub mod regression;

// Configuration and logging
pub mod config;
pub mod logs;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError,
    FitError,
    GroupFailure,
    PipelineError,
    SchemaError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    Cell,
    Table,
    ObservationRecord,
};

// =============================================================================
// Re-exports - CSV Parsing
// =============================================================================

pub use parser::{
    parse_table,
    parse_csv_file_auto,
    parse_bytes_auto,
    write_table,
    detect_encoding,
    detect_delimiter,
    decode_content,
    CsvError,
    ParseResult,
};

// =============================================================================
// Re-exports - Transformation
// =============================================================================

pub use transform::{
    aggregate,
    align,
    clean,
    concat,
    join,
    reshape_long_to_wide,
    reshape_wide_to_long,
    with_label,
    AlignedPair,
    ColumnReduction,
    Reduction,
};

// =============================================================================
// Re-exports - Regression
// =============================================================================

pub use regression::{
    fit_trend,
    fit_trends_by_group,
    linear_stats,
    regress_by_group,
    LinearStats,
    Polynomial,
    RegressionReport,
    RegressionResult,
    Trendline,
};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::pipeline::{
    run,
    run_files,
    prepare_temperature,
    summarize_region,
    AnalysisReport,
    RegionDetail,
};

pub use config::{PipelineConfig, PipelineOptions, RegionSpec};
pub use logs::{LogEntry, LogLevel, RunLog};
