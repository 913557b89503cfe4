//! High-level analysis API.
//!
//! Combines every stage into one run:
//! normalize → align → join → aggregate → label → concat → regress.
//!
//! # Example
//!
//! ```rust,no_run
//! use climalign::config::PipelineConfig;
//! use climalign::transform::pipeline::run_files;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let report = run_files("temperature.csv", "emissions.csv", &PipelineConfig::default())?;
//!
//!     for result in &report.regressions {
//!         println!("{}: slope {:.3}, p = {:.4}", result.region, result.slope, result.p_value);
//!     }
//!     Ok(())
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use uuid::Uuid;

use super::aggregate::{aggregate, concat, with_label};
use super::align::align;
use super::join::join;
use super::normalize::{clean, reshape_wide_to_long};
use crate::config::{PipelineConfig, PipelineOptions, RegionSpec};
use crate::error::{PipelineError, PipelineResult, SchemaResult};
use crate::logs::RunLog;
use crate::models::{Cell, Table, CODE, EMISSIONS_TOTAL, ENTITY, REGION, TEMPERATURE, YEAR};
use crate::parser::parse_csv_file_auto;
use crate::regression::{
    fit_trends_by_group, linear_stats, regress_by_group, FailureRecord, LinearStats, RegressionResult, Trendline,
};

// =============================================================================
// Report
// =============================================================================

/// Run identification
#[derive(Debug, Clone, Serialize)]
pub struct ReportMeta {
    pub run_id: Uuid,
    /// Serialized as RFC 3339
    pub run_at: DateTime<Utc>,
    pub engine_version: String,
}

impl ReportMeta {
    fn now() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            run_at: Utc::now(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Intermediate counts and the grouped summary for one region.
#[derive(Debug, Clone, Serialize)]
pub struct RegionDetail {
    pub label: String,
    pub members: usize,
    /// Temperature rows left after alignment
    pub temperature_rows: usize,
    /// Emissions rows left after alignment
    pub emissions_rows: usize,
    pub joined_rows: usize,
    pub common_years: Vec<Cell>,
    /// Grouped summary with the `Region` label column
    pub summary: Table,
}

/// Result of a complete analysis run
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub meta: ReportMeta,

    /// Options the run used
    pub options: PipelineOptions,

    pub regions: Vec<RegionDetail>,

    /// All region summaries stacked
    pub combined: Table,

    /// Linear statistics per region
    pub regressions: Vec<RegressionResult>,

    /// Regions the linear regression could not be computed for
    pub failures: Vec<FailureRecord>,

    /// Polynomial trendlines per region and measure
    pub trendlines: Vec<Trendline>,

    /// Regions or measures no trendline could be fitted for
    pub trend_failures: Vec<FailureRecord>,

    /// Temperature against emissions over all combined rows
    pub temperature_vs_emissions: Option<LinearStats>,

    pub log: RunLog,
}

// =============================================================================
// Stages
// =============================================================================

/// Clean the raw wide temperature table and unpivot it.
///
/// Output columns: `Entity, Code, Year, Month, Temperature`.
pub fn prepare_temperature(raw: &Table) -> SchemaResult<Table> {
    reshape_wide_to_long(&clean(raw), &[ENTITY, CODE, YEAR], TEMPERATURE)
}

/// Emissions are already long; cleaning is opt-in.
pub fn prepare_emissions(raw: &Table, options: &PipelineOptions) -> SchemaResult<Table> {
    raw.require(ENTITY)?;
    raw.require(YEAR)?;
    Ok(if options.clean_emissions { clean(raw) } else { raw.clone() })
}

/// Align, join and aggregate both tables for one region.
///
/// `temperature` must already be in long format.
pub fn summarize_region(
    temperature: &Table,
    emissions: &Table,
    region: &RegionSpec,
    options: &PipelineOptions,
) -> SchemaResult<RegionDetail> {
    let aligned = align(temperature, emissions, &region.member_set())?;

    let keys: Vec<&str> = options.join_keys.iter().map(String::as_str).collect();
    let joined = join(&aligned.left, &aligned.right, &keys)?;

    let summary = aggregate(&joined, &options.group_key, &options.reductions)?;
    let summary = with_label(&summary, REGION, &region.label).with_name(region.label.as_str());

    Ok(RegionDetail {
        label: region.label.clone(),
        members: region.members.len(),
        temperature_rows: aligned.left.len(),
        emissions_rows: aligned.right.len(),
        joined_rows: joined.len(),
        common_years: aligned.common_years,
        summary,
    })
}

// =============================================================================
// Entry points
// =============================================================================

/// Parse both CSV files and run the analysis.
pub fn run_files<P: AsRef<Path>, Q: AsRef<Path>>(
    temperature_path: P,
    emissions_path: Q,
    config: &PipelineConfig,
) -> PipelineResult<AnalysisReport> {
    let temperature = parse_csv_file_auto(temperature_path)?;
    let emissions = parse_csv_file_auto(emissions_path)?;
    run(&temperature.table, &emissions.table, config)
}

/// Run the analysis on raw tables.
///
/// `temperature` is the wide table, `emissions` the long one. Schema errors
/// abort the run; regions that cannot be fitted are reported in
/// [`AnalysisReport::failures`] and [`AnalysisReport::trend_failures`].
pub fn run(temperature: &Table, emissions: &Table, config: &PipelineConfig) -> PipelineResult<AnalysisReport> {
    if config.regions.is_empty() {
        return Err(PipelineError::NoRegions);
    }
    config.validate()?;
    let options = &config.options;
    let mut log = RunLog::new();

    log.info(format!("Normalizing temperature table ({} rows)", temperature.len()));
    let temperature = prepare_temperature(temperature)?;
    log.success(format!("{} long-format temperature rows", temperature.len()));

    let emissions = prepare_emissions(emissions, options)?;
    log.info(format!(
        "Emissions table: {} rows{}",
        emissions.len(),
        if options.clean_emissions { " (cleaned)" } else { "" }
    ));

    let mut regions = Vec::with_capacity(config.regions.len());
    for region in &config.regions {
        log.info(format!("Region {} ({} members)", region.label, region.members.len()));
        let detail = summarize_region(&temperature, &emissions, region, options)?;

        if detail.common_years.is_empty() {
            log.warning_indent("No common years between temperature and emissions", 1);
        } else {
            log.info_indent(format!("{} common years", detail.common_years.len()), 1);
        }
        log.success_indent(
            format!(
                "{} joined rows, {} grouped by {}",
                detail.joined_rows,
                detail.summary.len(),
                options.group_key
            ),
            1,
        );
        regions.push(detail);
    }

    let summaries: Vec<Table> = regions.iter().map(|r| r.summary.clone()).collect();
    let combined = concat("combined", &summaries)?;

    log.info(format!(
        "Regressing {} on {} per region",
        options.regression_y,
        options.predictor()
    ));
    let regression = regress_by_group(&combined, REGION, options.predictor(), &options.regression_y)?;
    for result in &regression.results {
        log.success_indent(
            format!(
                "{}: slope {:.4}, R² {:.3}, p {:.4}",
                result.region, result.slope, result.r_squared, result.p_value
            ),
            1,
        );
    }
    for failure in &regression.failures {
        log.warning_indent(failure.to_string(), 1);
    }
    if regression.results.is_empty() {
        log.error("No region could be regressed");
    }

    let mut trendlines = Vec::new();
    let mut trend_failures = Vec::new();
    for reduction in &options.reductions {
        let trends = fit_trends_by_group(
            &combined,
            REGION,
            options.predictor(),
            &reduction.column,
            options.trend_degree,
        )?;
        trend_failures.extend(trends.failures.iter().map(FailureRecord::from));
        trendlines.extend(trends.trendlines);
    }
    log.info(format!(
        "{} trendline(s) of degree {}, {} failed",
        trendlines.len(),
        options.trend_degree,
        trend_failures.len()
    ));

    let temperature_vs_emissions = pooled_fit(&combined, &mut log);

    Ok(AnalysisReport {
        meta: ReportMeta::now(),
        options: options.clone(),
        regions,
        combined,
        failures: regression.failure_records(),
        regressions: regression.results,
        trendlines,
        trend_failures,
        temperature_vs_emissions,
        log,
    })
}

/// Temperature regressed on emissions over every combined row.
fn pooled_fit(combined: &Table, log: &mut RunLog) -> Option<LinearStats> {
    let x_idx = combined.column_index(EMISSIONS_TOTAL)?;
    let y_idx = combined.column_index(TEMPERATURE)?;

    let (xs, ys): (Vec<f64>, Vec<f64>) = combined
        .rows()
        .iter()
        .filter_map(|row| Some((row[x_idx].as_f64()?, row[y_idx].as_f64()?)))
        .unzip();

    match linear_stats(&xs, &ys) {
        Ok(stats) => Some(stats),
        Err(e) => {
            log.warning(format!("Temperature vs emissions: {}", e));
            None
        }
    }
}
