//! Domain models for the climalign pipeline.
//!
//! - [`Cell`] - a single value: number, text, or missing
//! - [`CellKey`] - hashable form of a cell, used for keys and duplicate detection
//! - [`Table`] - ordered columns plus rows of cells; every stage consumes and returns these
//! - [`ObservationRecord`] - typed view of a normalized long-format row
//!
//! Column names shared by both source datasets are defined here as constants.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

use crate::error::{SchemaError, SchemaResult};

// =============================================================================
// Column Names
// =============================================================================

/// Region identity.
pub const ENTITY: &str = "Entity";
/// Short region code (may be missing).
pub const CODE: &str = "Code";
/// Annual period.
pub const YEAR: &str = "Year";
/// Sub-period produced by the wide-to-long reshape.
pub const MONTH: &str = "Month";
/// Row identifier dropped during cleaning.
pub const ID: &str = "ID";
/// Intensive measure from the temperature dataset.
pub const TEMPERATURE: &str = "Temperature";
/// Extensive measure from the emissions dataset.
pub const EMISSIONS_TOTAL: &str = "emissions_total";
/// Label attached to aggregated tables.
pub const REGION: &str = "Region";

// =============================================================================
// Cell
// =============================================================================

/// A single table value.
///
/// NaN never appears as a number: [`Cell::number`] turns it into `Missing`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Number(f64),
    Text(String),
    Missing,
}

impl Cell {
    /// Raw strings read as missing, in addition to the empty string.
    const MISSING_MARKERS: [&'static str; 9] =
        ["NA", "N/A", "NaN", "nan", "-nan", "null", "NULL", "None", "#N/A"];

    /// Build a numeric cell, mapping NaN to `Missing`.
    pub fn number(value: f64) -> Self {
        if value.is_nan() {
            Cell::Missing
        } else {
            Cell::Number(value)
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    /// Infer a cell from raw CSV text.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || Self::MISSING_MARKERS.iter().any(|m| *m == trimmed) {
            return Cell::Missing;
        }
        match trimmed.parse::<f64>() {
            Ok(v) => Cell::number(v),
            Err(_) => Cell::Text(trimmed.to_string()),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integer value of an integral number.
    pub fn as_period(&self) -> Option<i64> {
        match self {
            Cell::Number(v) if v.fract() == 0.0 && v.abs() < i64::MAX as f64 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn key(&self) -> CellKey {
        match self {
            // -0.0 and 0.0 must land on the same key
            Cell::Number(v) if *v == 0.0 => CellKey::Number(0.0f64.to_bits()),
            Cell::Number(v) => CellKey::Number(v.to_bits()),
            Cell::Text(s) => CellKey::Text(s.clone()),
            Cell::Missing => CellKey::Missing,
        }
    }

    /// Ascending sort order: numbers, then text, then missing.
    pub fn sort_cmp(&self, other: &Cell) -> Ordering {
        match (self, other) {
            (Cell::Number(a), Cell::Number(b)) => a.total_cmp(b),
            (Cell::Number(_), _) => Ordering::Less,
            (Cell::Text(_), Cell::Number(_)) => Ordering::Greater,
            (Cell::Text(a), Cell::Text(b)) => a.cmp(b),
            (Cell::Text(_), Cell::Missing) => Ordering::Less,
            (Cell::Missing, Cell::Missing) => Ordering::Equal,
            (Cell::Missing, _) => Ordering::Greater,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Number(v) if v.fract() == 0.0 && v.abs() < 1e15 => write!(f, "{}", *v as i64),
            Cell::Number(v) => write!(f, "{}", v),
            Cell::Text(s) => write!(f, "{}", s),
            Cell::Missing => Ok(()),
        }
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::number(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Number(value as f64)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<Option<f64>> for Cell {
    fn from(value: Option<f64>) -> Self {
        value.map(Cell::number).unwrap_or(Cell::Missing)
    }
}

/// Hashable identity of a [`Cell`]. `Missing` equals `Missing`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CellKey {
    Number(u64),
    Text(String),
    Missing,
}

// =============================================================================
// Table
// =============================================================================

/// Row-oriented table with ordered columns.
///
/// Every row holds exactly one cell per column. The name only shows up in
/// error messages and logs.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    name: String,
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table from rows, padding short rows with `Missing` and
    /// truncating long ones.
    pub fn from_rows(name: impl Into<String>, columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let mut table = Self::new(name, columns);
        for row in rows {
            table.push_row(row);
        }
        table
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push_row(&mut self, mut row: Vec<Cell>) {
        row.resize(self.columns.len(), Cell::Missing);
        self.rows.push(row);
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_index(column).is_some()
    }

    /// Index of a column that must exist.
    pub fn require(&self, column: &str) -> SchemaResult<usize> {
        self.column_index(column)
            .ok_or_else(|| SchemaError::missing(&self.name, column))
    }

    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = &Cell> + '_ {
        self.rows.iter().map(move |r| &r[idx])
    }

    /// New table with the same columns and the rows matching `keep`.
    pub fn filter_rows<F>(&self, mut keep: F) -> Table
    where
        F: FnMut(&[Cell]) -> bool,
    {
        Table {
            name: self.name.clone(),
            columns: self.columns.clone(),
            rows: self.rows.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }

    pub(crate) fn into_parts(self) -> (String, Vec<String>, Vec<Vec<Cell>>) {
        (self.name, self.columns, self.rows)
    }
}

impl Serialize for Table {
    /// Serializes as an array of objects, keys in column order.
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        struct RowRef<'a> {
            columns: &'a [String],
            cells: &'a [Cell],
        }

        impl Serialize for RowRef<'_> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let mut map = serializer.serialize_map(Some(self.columns.len()))?;
                for (column, cell) in self.columns.iter().zip(self.cells) {
                    map.serialize_entry(column, cell)?;
                }
                map.end()
            }
        }

        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for row in &self.rows {
            seq.serialize_element(&RowRef {
                columns: &self.columns,
                cells: row,
            })?;
        }
        seq.end()
    }
}

// =============================================================================
// Observation Record
// =============================================================================

/// One normalized long-format observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservationRecord {
    #[serde(rename = "Entity")]
    pub entity: String,
    #[serde(rename = "Code", skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(rename = "Year")]
    pub year: i64,
    #[serde(rename = "Month", skip_serializing_if = "Option::is_none")]
    pub month: Option<i64>,
    /// Measurement value; `None` when the source cell was missing.
    pub value: Option<f64>,
}

impl ObservationRecord {
    /// Extract typed records from a normalized table.
    ///
    /// `Entity`, `Year` and `measure` are required; `Code` and `Month` are
    /// picked up when present. Every `Year` must be an integer.
    pub fn collect(table: &Table, measure: &str) -> SchemaResult<Vec<ObservationRecord>> {
        let entity_idx = table.require(ENTITY)?;
        let year_idx = table.require(YEAR)?;
        let value_idx = table.require(measure)?;
        let code_idx = table.column_index(CODE);
        let month_idx = table.column_index(MONTH);

        let period = |cell: &Cell, column: &str| {
            cell.as_period().ok_or_else(|| SchemaError::InvalidPeriod {
                table: table.name().to_string(),
                column: column.to_string(),
                value: cell.to_string(),
            })
        };

        table
            .rows()
            .iter()
            .map(|row| {
                let value = match &row[value_idx] {
                    Cell::Number(v) => Some(*v),
                    Cell::Missing => None,
                    Cell::Text(s) => {
                        return Err(SchemaError::NonNumeric {
                            table: table.name().to_string(),
                            column: measure.to_string(),
                            value: s.clone(),
                        })
                    }
                };
                let month = match month_idx.map(|i| &row[i]) {
                    Some(cell) if !cell.is_missing() => Some(period(cell, MONTH)?),
                    _ => None,
                };
                Ok(ObservationRecord {
                    entity: row[entity_idx].to_string(),
                    code: code_idx
                        .map(|i| &row[i])
                        .filter(|c| !c.is_missing())
                        .map(|c| c.to_string()),
                    year: period(&row[year_idx], YEAR)?,
                    month,
                    value,
                })
            })
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_cell_parse() {
        assert_eq!(Cell::parse("2000"), Cell::Number(2000.0));
        assert_eq!(Cell::parse(" -1.5 "), Cell::Number(-1.5));
        assert_eq!(Cell::parse("CAN"), Cell::text("CAN"));
        assert_eq!(Cell::parse(""), Cell::Missing);
        assert_eq!(Cell::parse("NaN"), Cell::Missing);
        assert_eq!(Cell::parse("NA"), Cell::Missing);
    }

    #[test]
    fn test_cell_display_integral_numbers() {
        assert_eq!(Cell::Number(2000.0).to_string(), "2000");
        assert_eq!(Cell::Number(1.25).to_string(), "1.25");
        assert_eq!(Cell::Missing.to_string(), "");
    }

    #[test]
    fn test_cell_key_treats_missing_and_zero_consistently() {
        assert_eq!(Cell::Missing.key(), Cell::Missing.key());
        assert_eq!(Cell::Number(0.0).key(), Cell::Number(-0.0).key());
        assert_ne!(Cell::Number(1.0).key(), Cell::text("1").key());
    }

    #[test]
    fn test_sort_cmp_puts_missing_last() {
        let mut cells = vec![Cell::Missing, Cell::Number(3.0), Cell::text("a"), Cell::Number(-1.0)];
        cells.sort_by(|a, b| a.sort_cmp(b));
        assert_eq!(
            cells,
            vec![Cell::Number(-1.0), Cell::Number(3.0), Cell::text("a"), Cell::Missing]
        );
    }

    #[test]
    fn test_push_row_pads_to_width() {
        let mut table = Table::new("t", cols(&["a", "b", "c"]));
        table.push_row(vec![Cell::Number(1.0)]);
        assert_eq!(table.rows()[0].len(), 3);
        assert!(table.rows()[0][2].is_missing());
    }

    #[test]
    fn test_require_reports_table_name() {
        let table = Table::new("emissions", cols(&[ENTITY]));
        let err = table.require(YEAR).unwrap_err();
        assert_eq!(err, SchemaError::missing("emissions", YEAR));
    }

    #[test]
    fn test_table_serializes_in_column_order() {
        let table = Table::from_rows(
            "t",
            cols(&["Year", "Entity"]),
            vec![vec![Cell::Number(2000.0), Cell::text("Canada")]],
        );
        let json = serde_json::to_string(&table).unwrap();
        assert_eq!(json, r#"[{"Year":2000.0,"Entity":"Canada"}]"#);
    }

    #[test]
    fn test_observation_records_from_normalized_table() {
        let table = Table::from_rows(
            "temperature",
            cols(&[ENTITY, CODE, YEAR, MONTH, TEMPERATURE]),
            vec![
                vec!["Canada".into(), "CAN".into(), 2000i64.into(), 1i64.into(), (-12.5).into()],
                vec!["Kosovo".into(), Cell::Missing, 2000i64.into(), 2i64.into(), Cell::Missing],
            ],
        );
        let records = ObservationRecord::collect(&table, TEMPERATURE).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].code.as_deref(), Some("CAN"));
        assert_eq!(records[0].year, 2000);
        assert_eq!(records[0].month, Some(1));
        assert_eq!(records[1].code, None);
        assert_eq!(records[1].value, None);
    }

    #[test]
    fn test_observation_records_reject_fractional_year() {
        let table = Table::from_rows(
            "temperature",
            cols(&[ENTITY, YEAR, TEMPERATURE]),
            vec![vec!["Canada".into(), 2000.5.into(), 1.0.into()]],
        );
        let err = ObservationRecord::collect(&table, TEMPERATURE).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidPeriod { .. }));
    }
}
