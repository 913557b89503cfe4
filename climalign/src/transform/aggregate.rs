//! Group rows by a period column and reduce measurement columns.
//!
//! Intensive measures (temperature) are averaged, extensive measures
//! (emissions) are summed:
//!
//! ```text
//! Year │ Temperature │ emissions_total        Year │ Temperature │ emissions_total
//! 2000 │    -5.0     │      500         →     2000 │    10.0     │      800
//! 2000 │    25.0     │      300               2001 │    -4.0     │      510
//! 2001 │    -4.0     │      510
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::error::{SchemaError, SchemaResult};
use crate::models::{Cell, CellKey, Table, EMISSIONS_TOTAL, TEMPERATURE};

/// How a column is reduced within a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reduction {
    /// Arithmetic mean of the non-missing values; missing when there are none.
    Mean,
    /// Sum of the non-missing values; zero when there are none.
    Sum,
}

/// A reduction applied to one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnReduction {
    pub column: String,
    pub reduction: Reduction,
}

impl ColumnReduction {
    pub fn new(column: impl Into<String>, reduction: Reduction) -> Self {
        Self {
            column: column.into(),
            reduction,
        }
    }
}

/// `Temperature` by mean, `emissions_total` by sum.
pub fn default_reductions() -> Vec<ColumnReduction> {
    vec![
        ColumnReduction::new(TEMPERATURE, Reduction::Mean),
        ColumnReduction::new(EMISSIONS_TOTAL, Reduction::Sum),
    ]
}

#[derive(Default, Clone, Copy)]
struct Accumulator {
    sum: f64,
    count: usize,
}

impl Accumulator {
    fn finish(self, reduction: Reduction) -> Cell {
        match reduction {
            Reduction::Sum => Cell::number(self.sum),
            Reduction::Mean if self.count == 0 => Cell::Missing,
            Reduction::Mean => Cell::number(self.sum / self.count as f64),
        }
    }
}

/// Group `table` by `group_key` and apply `reductions`.
///
/// One output row per distinct non-missing key, ascending by key. Rows with
/// a missing key are dropped. Output columns are the key followed by the
/// reduced columns in the order given.
pub fn aggregate(table: &Table, group_key: &str, reductions: &[ColumnReduction]) -> SchemaResult<Table> {
    let key_idx = table.require(group_key)?;
    let value_idx: Vec<usize> = reductions
        .iter()
        .map(|r| table.require(&r.column))
        .collect::<SchemaResult<_>>()?;

    let mut groups: Vec<(Cell, Vec<Accumulator>)> = Vec::new();
    let mut positions: HashMap<CellKey, usize> = HashMap::new();

    for row in table.rows() {
        let key = &row[key_idx];
        if key.is_missing() {
            continue;
        }
        let pos = *positions.entry(key.key()).or_insert_with(|| {
            groups.push((key.clone(), vec![Accumulator::default(); reductions.len()]));
            groups.len() - 1
        });

        for (slot, &idx) in value_idx.iter().enumerate() {
            match &row[idx] {
                Cell::Number(v) => {
                    let acc = &mut groups[pos].1[slot];
                    acc.sum += v;
                    acc.count += 1;
                }
                Cell::Missing => {}
                Cell::Text(s) => {
                    return Err(SchemaError::NonNumeric {
                        table: table.name().to_string(),
                        column: reductions[slot].column.clone(),
                        value: s.clone(),
                    })
                }
            }
        }
    }

    groups.sort_by(|a, b| a.0.sort_cmp(&b.0));

    let mut columns = vec![group_key.to_string()];
    columns.extend(reductions.iter().map(|r| r.column.clone()));

    let rows: Vec<Vec<Cell>> = groups
        .into_iter()
        .map(|(key, accs)| {
            let mut row = vec![key];
            row.extend(
                accs.into_iter()
                    .zip(reductions)
                    .map(|(acc, r)| acc.finish(r.reduction)),
            );
            row
        })
        .collect();

    debug!(
        table = table.name(),
        group_key,
        rows_in = table.len(),
        groups = rows.len(),
        "aggregated table"
    );

    Ok(Table::from_rows(table.name(), columns, rows))
}

/// Append a column holding `label` on every row.
pub fn with_label(table: &Table, column: &str, label: &str) -> Table {
    let mut columns = table.columns().to_vec();
    columns.push(column.to_string());
    let rows = table
        .rows()
        .iter()
        .map(|row| {
            let mut row = row.clone();
            row.push(Cell::text(label));
            row
        })
        .collect();
    Table::from_rows(table.name(), columns, rows)
}

/// Stack tables with identical columns.
///
/// An empty slice gives an empty table without columns.
pub fn concat(name: &str, tables: &[Table]) -> SchemaResult<Table> {
    let Some(first) = tables.first() else {
        return Ok(Table::new(name, Vec::new()));
    };

    let mut combined = Table::new(name, first.columns().to_vec());
    for table in tables {
        if table.columns() != first.columns() {
            return Err(SchemaError::ColumnMismatch {
                table: table.name().to_string(),
                expected: first.columns().join(", "),
                found: table.columns().join(", "),
            });
        }
        for row in table.rows() {
            combined.push_row(row.clone());
        }
    }
    Ok(combined)
}
