//! Per-region trend statistics.
//!
//! - [`linear_stats`] - slope, intercept, R² and a two-sided p-value for one series
//! - [`fit_trend`] - least-squares polynomial through one series
//! - [`regress_by_group`] / [`fit_trends_by_group`] - the same, once per region of a table
//!
//! A region that cannot be fitted is reported as a [`GroupFailure`] and never
//! prevents the other regions from being fitted.

pub mod linear;
pub mod polynomial;

pub use linear::{linear_stats, LinearStats};
pub use polynomial::{fit_trend, Polynomial};

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{FitError, GroupFailure, SchemaError, SchemaResult};
use crate::models::{Cell, Table, REGION};

// =============================================================================
// Results
// =============================================================================

/// Linear statistics for one region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegressionResult {
    #[serde(rename = "Region")]
    pub region: String,
    #[serde(rename = "Slope")]
    pub slope: f64,
    #[serde(rename = "Intercept")]
    pub intercept: f64,
    #[serde(rename = "R-squared")]
    pub r_squared: f64,
    #[serde(rename = "P-value")]
    pub p_value: f64,
    #[serde(rename = "R-value")]
    pub r_value: f64,
    #[serde(rename = "Std-err")]
    pub std_err: f64,
    #[serde(rename = "Intercept-std-err")]
    pub intercept_std_err: f64,
    #[serde(rename = "N")]
    pub n: usize,
}

impl RegressionResult {
    fn new(region: String, stats: LinearStats) -> Self {
        Self {
            region,
            slope: stats.slope,
            intercept: stats.intercept,
            r_squared: stats.r_squared,
            p_value: stats.p_value,
            r_value: stats.r_value,
            std_err: stats.std_err,
            intercept_std_err: stats.intercept_std_err,
            n: stats.n,
        }
    }
}

/// A failed region, flattened for reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRecord {
    pub region: String,
    pub error: String,
}

impl From<&GroupFailure> for FailureRecord {
    fn from(failure: &GroupFailure) -> Self {
        Self {
            region: failure.group.clone(),
            error: failure.error.to_string(),
        }
    }
}

/// Outcome of [`regress_by_group`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegressionReport {
    /// One entry per region that could be fitted, in first-seen order.
    pub results: Vec<RegressionResult>,
    pub failures: Vec<GroupFailure>,
}

impl RegressionReport {
    pub fn failure_records(&self) -> Vec<FailureRecord> {
        self.failures.iter().map(FailureRecord::from).collect()
    }

    /// Results as a table with the same column names as the JSON output.
    pub fn to_table(&self) -> Table {
        let columns = [
            REGION,
            "Slope",
            "Intercept",
            "R-squared",
            "P-value",
            "R-value",
            "Std-err",
            "Intercept-std-err",
            "N",
        ]
        .iter()
        .map(|c| c.to_string())
        .collect();

        let rows = self
            .results
            .iter()
            .map(|r| {
                vec![
                    Cell::text(r.region.as_str()),
                    Cell::number(r.slope),
                    Cell::number(r.intercept),
                    Cell::number(r.r_squared),
                    Cell::number(r.p_value),
                    Cell::number(r.r_value),
                    Cell::number(r.std_err),
                    Cell::number(r.intercept_std_err),
                    Cell::from(r.n as i64),
                ]
            })
            .collect();

        Table::from_rows("regression", columns, rows)
    }
}

/// Polynomial trendline for one region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trendline {
    pub region: String,
    /// Fitted column
    pub measure: String,
    pub degree: usize,
    /// Serialized as raw coefficients, highest power first.
    #[serde(rename = "coefficients")]
    pub polynomial: Polynomial,
}

/// Outcome of [`fit_trends_by_group`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrendReport {
    pub trendlines: Vec<Trendline>,
    pub failures: Vec<GroupFailure>,
}

// =============================================================================
// Grouped fitting
// =============================================================================

struct GroupSeries {
    group: String,
    xs: Vec<f64>,
    ys: Vec<f64>,
}

/// Split `table` into per-group numeric series, groups in first-seen order.
///
/// Rows with a missing group, x or y are skipped. Text in `x` or `y` is a
/// schema error.
fn group_series(table: &Table, group: &str, x: &str, y: &str) -> SchemaResult<Vec<GroupSeries>> {
    let group_idx = table.require(group)?;
    let x_idx = table.require(x)?;
    let y_idx = table.require(y)?;

    let mut series: Vec<GroupSeries> = Vec::new();
    for row in table.rows() {
        if row[group_idx].is_missing() {
            continue;
        }
        let name = row[group_idx].to_string();
        let pos = match series.iter().position(|s| s.group == name) {
            Some(pos) => pos,
            None => {
                series.push(GroupSeries {
                    group: name,
                    xs: Vec::new(),
                    ys: Vec::new(),
                });
                series.len() - 1
            }
        };
        let xv = numeric(table, x, &row[x_idx])?;
        let yv = numeric(table, y, &row[y_idx])?;
        if let (Some(xv), Some(yv)) = (xv, yv) {
            series[pos].xs.push(xv);
            series[pos].ys.push(yv);
        }
    }
    Ok(series)
}

fn numeric(table: &Table, column: &str, cell: &Cell) -> SchemaResult<Option<f64>> {
    match cell {
        Cell::Number(v) => Ok(Some(*v)),
        Cell::Missing => Ok(None),
        Cell::Text(s) => Err(SchemaError::NonNumeric {
            table: table.name().to_string(),
            column: column.to_string(),
            value: s.clone(),
        }),
    }
}

fn failure(group: String, error: FitError) -> GroupFailure {
    warn!(region = %group, error = %error, "regression failed for region");
    GroupFailure { group, error }
}

/// Run [`linear_stats`] of `y` against `x` once per distinct value of `group`.
///
/// An empty table gives an empty report. Fails only when a column is absent.
pub fn regress_by_group(table: &Table, group: &str, x: &str, y: &str) -> SchemaResult<RegressionReport> {
    let mut report = RegressionReport::default();

    for s in group_series(table, group, x, y)? {
        match linear_stats(&s.xs, &s.ys) {
            Ok(stats) => {
                debug!(region = %s.group, slope = stats.slope, p_value = stats.p_value, "fitted region");
                report.results.push(RegressionResult::new(s.group, stats));
            }
            Err(error) => report.failures.push(failure(s.group, error)),
        }
    }

    Ok(report)
}

/// Fit a polynomial trendline of `degree` once per distinct value of `group`.
pub fn fit_trends_by_group(
    table: &Table,
    group: &str,
    x: &str,
    y: &str,
    degree: usize,
) -> SchemaResult<TrendReport> {
    let mut report = TrendReport::default();

    for s in group_series(table, group, x, y)? {
        match fit_trend(&s.xs, &s.ys, degree) {
            Ok(polynomial) => report.trendlines.push(Trendline {
                region: s.group,
                measure: y.to_string(),
                degree,
                polynomial,
            }),
            Err(error) => report.failures.push(failure(s.group, error)),
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchemaError;
    use crate::models::{EMISSIONS_TOTAL, YEAR};

    fn summary(rows: &[(&str, i64, Option<f64>)]) -> Table {
        Table::from_rows(
            "combined",
            vec![YEAR.to_string(), EMISSIONS_TOTAL.to_string(), REGION.to_string()],
            rows.iter()
                .map(|(region, year, value)| vec![Cell::from(*year), Cell::from(*value), Cell::text(*region)])
                .collect(),
        )
    }

    #[test]
    fn test_one_result_per_region_in_first_seen_order() {
        let table = summary(&[
            ("South America", 2000, Some(10.0)),
            ("North America", 2000, Some(100.0)),
            ("South America", 2001, Some(12.0)),
            ("North America", 2001, Some(90.0)),
            ("South America", 2002, Some(14.0)),
            ("North America", 2002, Some(80.0)),
        ]);

        let report = regress_by_group(&table, REGION, YEAR, EMISSIONS_TOTAL).unwrap();
        assert!(report.failures.is_empty());
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results[0].region, "South America");
        assert!((report.results[0].slope - 2.0).abs() < 1e-9);
        assert!((report.results[1].slope + 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_failing_region_is_isolated() {
        let table = summary(&[
            ("North America", 2000, Some(1.0)),
            ("North America", 2001, Some(2.0)),
            ("North America", 2002, Some(4.0)),
            ("South America", 2000, Some(1.0)),
            ("South America", 2001, Some(1.5)),
        ]);

        let report = regress_by_group(&table, REGION, YEAR, EMISSIONS_TOTAL).unwrap();
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].region, "North America");
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].group, "South America");
        assert_eq!(
            report.failures[0].error,
            FitError::Underdetermined {
                points: 2,
                required: 3
            }
        );
    }

    #[test]
    fn test_missing_values_skipped() {
        let table = summary(&[
            ("North America", 2000, Some(1.0)),
            ("North America", 2001, None),
            ("North America", 2002, Some(3.0)),
            ("North America", 2003, Some(4.0)),
        ]);
        let report = regress_by_group(&table, REGION, YEAR, EMISSIONS_TOTAL).unwrap();
        assert_eq!(report.results[0].n, 3);
    }

    #[test]
    fn test_text_measure_is_schema_error() {
        let table = Table::from_rows(
            "combined",
            vec![YEAR.to_string(), EMISSIONS_TOTAL.to_string(), REGION.to_string()],
            vec![
                vec![2000i64.into(), 1.0.into(), "North America".into()],
                vec![2001i64.into(), "n/a yet".into(), "North America".into()],
            ],
        );
        match regress_by_group(&table, REGION, YEAR, EMISSIONS_TOTAL) {
            Err(SchemaError::NonNumeric { column, value, .. }) => {
                assert_eq!(column, EMISSIONS_TOTAL);
                assert_eq!(value, "n/a yet");
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(fit_trends_by_group(&table, REGION, YEAR, EMISSIONS_TOTAL, 1).is_err());
    }

    #[test]
    fn test_empty_table_gives_no_results() {
        let report = regress_by_group(&summary(&[]), REGION, YEAR, EMISSIONS_TOTAL).unwrap();
        assert!(report.results.is_empty());
        assert!(report.failures.is_empty());
    }

    #[test]
    fn test_missing_group_column() {
        let table = Table::new("summary", vec![YEAR.to_string(), EMISSIONS_TOTAL.to_string()]);
        let err = regress_by_group(&table, REGION, YEAR, EMISSIONS_TOTAL).unwrap_err();
        assert_eq!(err, SchemaError::missing("summary", REGION));
    }

    #[test]
    fn test_result_serializes_with_report_names() {
        let table = summary(&[
            ("North America", 2000, Some(1.0)),
            ("North America", 2001, Some(2.0)),
            ("North America", 2002, Some(3.0)),
        ]);
        let report = regress_by_group(&table, REGION, YEAR, EMISSIONS_TOTAL).unwrap();
        let json = serde_json::to_value(&report.results[0]).unwrap();

        assert_eq!(json["Region"], "North America");
        assert!(json.get("R-squared").is_some());
        assert!(json.get("P-value").is_some());
        assert_eq!(report.to_table().columns()[4], "P-value");
    }

    #[test]
    fn test_trendlines_per_region() {
        let mut rows = Vec::new();
        for year in 2000..2006 {
            rows.push(("North America", year, Some(year as f64)));
        }
        rows.push(("South America", 2000, Some(1.0)));
        let table = summary(&rows);

        let report = fit_trends_by_group(&table, REGION, YEAR, EMISSIONS_TOTAL, 4).unwrap();
        assert_eq!(report.trendlines.len(), 1);
        assert_eq!(report.trendlines[0].degree, 4);
        assert_eq!(report.trendlines[0].measure, EMISSIONS_TOTAL);
        assert_eq!(report.trendlines[0].polynomial.coefficients().len(), 5);
        assert_eq!(report.failures[0].group, "South America");
    }
}
