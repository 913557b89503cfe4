//! Table cleaning and wide/long reshaping.
//!
//! # Reshape
//!
//! ```text
//! Wide (one column per year)              Long (one row per cell)
//! ┌────────┬──────┬──────┬──────┬──────┐  ┌────────┬──────┬──────┬───────┬─────────────┐
//! │ Entity │ Code │ Year │ 2000 │ 2001 │  │ Entity │ Code │ Year │ Month │ Temperature │
//! ├────────┼──────┼──────┼──────┼──────┤  ├────────┼──────┼──────┼───────┼─────────────┤
//! │ Canada │ CAN  │  1   │ -15  │ -14  │→ │ Canada │ CAN  │ 2000 │   1   │    -15      │
//! └────────┴──────┴──────┴──────┴──────┘  │ Canada │ CAN  │ 2001 │   1   │    -14      │
//!                                         └────────┴──────┴──────┴───────┴─────────────┘
//! ```
//!
//! The per-row `Year` of the wide layout is really a month number; after
//! unpivoting it becomes `Month` and the former column headers become `Year`.
//! Downstream consumers rely on exactly this naming.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::error::SchemaResult;
use crate::models::{Cell, CellKey, Table, ID, MONTH, YEAR};

/// Column headers naming a period.
static PERIOD_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+$").expect("period header pattern is valid"));

/// Clean a raw table.
///
/// 1. Drop exact-duplicate rows (first occurrence wins)
/// 2. Fill missing cells of numeric columns with the column mean
/// 3. Stable-sort by `Year` when the column exists
/// 4. Drop the `ID` column when it exists
/// 5. Drop duplicates again, since steps 2 and 4 can make rows identical
///
/// Missing cells in non-numeric columns stay missing. Cleaning an already
/// clean table returns it unchanged.
pub fn clean(table: &Table) -> Table {
    let mut columns = table.columns().to_vec();
    let mut rows = dedup_rows(table.rows().to_vec());
    let duplicates = table.len() - rows.len();

    if rows.iter().any(|row| row.iter().any(Cell::is_missing)) {
        fill_numeric_means(&mut rows, columns.len());
    }

    if let Some(idx) = table.column_index(YEAR) {
        rows.sort_by(|a, b| a[idx].sort_cmp(&b[idx]));
    }

    if let Some(idx) = table.column_index(ID) {
        columns.remove(idx);
        for row in &mut rows {
            row.remove(idx);
        }
    }

    let rows = dedup_rows(rows);
    debug!(
        table = table.name(),
        rows_in = table.len(),
        rows_out = rows.len(),
        duplicates,
        "cleaned table"
    );

    Table::from_rows(table.name(), columns, rows)
}

fn dedup_rows(rows: Vec<Vec<Cell>>) -> Vec<Vec<Cell>> {
    let mut seen: HashSet<Vec<CellKey>> = HashSet::with_capacity(rows.len());
    rows.into_iter()
        .filter(|row| seen.insert(row.iter().map(Cell::key).collect()))
        .collect()
}

/// Replace missing cells with the column mean, numeric columns only.
///
/// A column is numeric when it has at least one value and every value is a
/// number.
fn fill_numeric_means(rows: &mut [Vec<Cell>], width: usize) {
    for idx in 0..width {
        let mut sum = 0.0;
        let mut count = 0usize;
        let mut numeric = true;

        for row in rows.iter() {
            match &row[idx] {
                Cell::Number(v) => {
                    sum += v;
                    count += 1;
                }
                Cell::Text(_) => {
                    numeric = false;
                    break;
                }
                Cell::Missing => {}
            }
        }

        if !numeric || count == 0 {
            continue;
        }

        let mean = sum / count as f64;
        for row in rows.iter_mut() {
            if row[idx].is_missing() {
                row[idx] = Cell::number(mean);
            }
        }
    }
}

/// Period value encoded in a column header, `Missing` when the header is not
/// an integer.
fn header_period(header: &str) -> Cell {
    if !PERIOD_HEADER.is_match(header) {
        return Cell::Missing;
    }
    header.parse::<i64>().map(Cell::from).unwrap_or(Cell::Missing)
}

enum Slot {
    Id(usize),
    Period,
}

/// Unpivot a wide table into long format.
///
/// Every column not in `id_columns` becomes one row per input row, carrying
/// the header as the new `Year` and the cell as `value_name`. An identifier
/// named `Year` is renamed `Month`; the new `Year` column is placed just
/// before it. Rows come out column-major: all input rows for the first
/// period column, then the next.
pub fn reshape_wide_to_long(table: &Table, id_columns: &[&str], value_name: &str) -> SchemaResult<Table> {
    let id_idx: Vec<usize> = id_columns
        .iter()
        .map(|column| table.require(column))
        .collect::<SchemaResult<_>>()?;

    let mut layout = Vec::with_capacity(id_columns.len() + 2);
    let mut columns = Vec::with_capacity(id_columns.len() + 2);
    for (column, &idx) in id_columns.iter().zip(&id_idx) {
        if *column == YEAR {
            layout.push(Slot::Period);
            columns.push(YEAR.to_string());
            columns.push(MONTH.to_string());
        } else {
            columns.push(column.to_string());
        }
        layout.push(Slot::Id(idx));
    }
    if !id_columns.contains(&YEAR) {
        layout.push(Slot::Period);
        columns.push(YEAR.to_string());
    }
    columns.push(value_name.to_string());

    let value_columns: Vec<(usize, Cell)> = table
        .columns()
        .iter()
        .enumerate()
        .filter(|(idx, _)| !id_idx.contains(idx))
        .map(|(idx, header)| (idx, header_period(header)))
        .collect();

    let mut long = Table::new(table.name(), columns);
    for (value_idx, period) in &value_columns {
        for row in table.rows() {
            let mut out: Vec<Cell> = layout
                .iter()
                .map(|slot| match slot {
                    Slot::Id(idx) => row[*idx].clone(),
                    Slot::Period => period.clone(),
                })
                .collect();
            out.push(row[*value_idx].clone());
            long.push_row(out);
        }
    }

    debug!(
        table = table.name(),
        period_columns = value_columns.len(),
        rows_out = long.len(),
        "reshaped wide table to long"
    );

    Ok(long)
}

/// Pivot a long table back into wide format.
///
/// Inverse of [`reshape_wide_to_long`]: every column other than `Year` and
/// `value_name` identifies a row (with `Month` renamed back to `Year`), and
/// each distinct `Year` becomes a column in first-seen order. Rows with a
/// missing `Year` are skipped; absent combinations become missing cells.
pub fn reshape_long_to_wide(table: &Table, value_name: &str) -> SchemaResult<Table> {
    let year_idx = table.require(YEAR)?;
    let value_idx = table.require(value_name)?;

    let index_idx: Vec<usize> = (0..table.columns().len())
        .filter(|idx| *idx != year_idx && *idx != value_idx)
        .collect();

    let mut periods: Vec<Cell> = Vec::new();
    let mut period_pos: HashMap<CellKey, usize> = HashMap::new();
    let mut groups: Vec<(Vec<Cell>, Vec<Cell>)> = Vec::new();
    let mut group_pos: HashMap<Vec<CellKey>, usize> = HashMap::new();

    for row in table.rows() {
        let period = &row[year_idx];
        if period.is_missing() {
            continue;
        }
        let p = *period_pos.entry(period.key()).or_insert_with(|| {
            periods.push(period.clone());
            periods.len() - 1
        });

        let index: Vec<Cell> = index_idx.iter().map(|&i| row[i].clone()).collect();
        let g = *group_pos
            .entry(index.iter().map(Cell::key).collect())
            .or_insert_with(|| {
                groups.push((index, Vec::new()));
                groups.len() - 1
            });

        let values = &mut groups[g].1;
        if values.len() <= p {
            values.resize(p + 1, Cell::Missing);
        }
        values[p] = row[value_idx].clone();
    }

    let mut columns: Vec<String> = index_idx
        .iter()
        .map(|&i| {
            let name = &table.columns()[i];
            if name == MONTH {
                YEAR.to_string()
            } else {
                name.clone()
            }
        })
        .collect();
    columns.extend(periods.iter().map(Cell::to_string));

    let rows = groups
        .into_iter()
        .map(|(mut index, values)| {
            index.extend(values);
            index
        })
        .collect();

    Ok(Table::from_rows(table.name(), columns, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchemaError;
    use crate::models::{CODE, ENTITY, TEMPERATURE};

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn wide() -> Table {
        Table::from_rows(
            "temperature",
            cols(&[ENTITY, CODE, YEAR, "2000", "2001"]),
            vec![
                vec!["Canada".into(), "CAN".into(), 1i64.into(), (-15.0).into(), (-14.0).into()],
                vec!["Canada".into(), "CAN".into(), 2i64.into(), (-12.0).into(), (-11.5).into()],
            ],
        )
    }

    #[test]
    fn test_clean_removes_duplicates_and_sorts() {
        let table = Table::from_rows(
            "emissions",
            cols(&[ENTITY, YEAR, "emissions_total"]),
            vec![
                vec!["Canada".into(), 2001i64.into(), 5.0.into()],
                vec!["Canada".into(), 2000i64.into(), 4.0.into()],
                vec!["Canada".into(), 2001i64.into(), 5.0.into()],
            ],
        );
        let cleaned = clean(&table);
        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned.rows()[0][1], Cell::Number(2000.0));
        assert_eq!(cleaned.rows()[1][1], Cell::Number(2001.0));
    }

    #[test]
    fn test_clean_fills_numeric_columns_only() {
        let table = Table::from_rows(
            "t",
            cols(&[ENTITY, CODE, "value"]),
            vec![
                vec!["A".into(), Cell::Missing, 1.0.into()],
                vec!["B".into(), "BBB".into(), Cell::Missing],
                vec!["C".into(), "CCC".into(), 5.0.into()],
            ],
        );
        let cleaned = clean(&table);
        assert!(cleaned.rows()[0][1].is_missing());
        assert_eq!(cleaned.rows()[1][2], Cell::Number(3.0));
    }

    #[test]
    fn test_clean_drops_id_column() {
        let table = Table::from_rows(
            "t",
            cols(&[ID, ENTITY]),
            vec![vec![1i64.into(), "A".into()], vec![2i64.into(), "B".into()]],
        );
        let cleaned = clean(&table);
        assert_eq!(cleaned.columns(), &[ENTITY]);
        assert_eq!(cleaned.len(), 2);
    }

    #[test]
    fn test_clean_without_optional_columns() {
        let table = Table::from_rows("t", cols(&["a"]), vec![vec![2.0.into()], vec![1.0.into()]]);
        let cleaned = clean(&table);
        // no Year column: original order kept
        assert_eq!(cleaned.rows()[0][0], Cell::Number(2.0));
    }

    #[test]
    fn test_clean_is_idempotent() {
        let table = Table::from_rows(
            "t",
            cols(&[ID, ENTITY, YEAR, "value"]),
            vec![
                vec![1i64.into(), "A".into(), 2001i64.into(), Cell::Missing],
                vec![2i64.into(), "A".into(), 2001i64.into(), 4.0.into()],
                vec![3i64.into(), "A".into(), 2000i64.into(), 4.0.into()],
                vec![4i64.into(), "B".into(), Cell::Missing, 1.0.into()],
                vec![4i64.into(), "B".into(), Cell::Missing, 1.0.into()],
            ],
        );
        let once = clean(&table);
        let twice = clean(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_reshape_swaps_year_and_month() {
        let long = reshape_wide_to_long(&wide(), &[ENTITY, CODE, YEAR], TEMPERATURE).unwrap();

        assert_eq!(long.columns(), &[ENTITY, CODE, YEAR, MONTH, TEMPERATURE]);
        assert_eq!(long.len(), 4);
        // column-major: both rows of 2000 first
        let first: Vec<Cell> = vec!["Canada".into(), "CAN".into(), 2000i64.into(), 1i64.into(), (-15.0).into()];
        assert_eq!(long.rows()[0], first);
        assert_eq!(long.rows()[1][3], Cell::Number(2.0));
        assert_eq!(long.rows()[2][2], Cell::Number(2001.0));
    }

    #[test]
    fn test_reshape_non_integer_header_gives_missing_period() {
        let table = Table::from_rows(
            "t",
            cols(&[ENTITY, CODE, YEAR, "notes"]),
            vec![vec!["A".into(), "AAA".into(), 1i64.into(), "x".into()]],
        );
        let long = reshape_wide_to_long(&table, &[ENTITY, CODE, YEAR], TEMPERATURE).unwrap();
        assert!(long.rows()[0][2].is_missing());
    }

    #[test]
    fn test_reshape_missing_id_column() {
        let table = Table::from_rows("temperature", cols(&[ENTITY, "2000"]), vec![]);
        let err = reshape_wide_to_long(&table, &[ENTITY, CODE, YEAR], TEMPERATURE).unwrap_err();
        assert_eq!(err, SchemaError::missing("temperature", CODE));
    }

    #[test]
    fn test_reshape_round_trip() {
        let original = wide();
        let long = reshape_wide_to_long(&original, &[ENTITY, CODE, YEAR], TEMPERATURE).unwrap();
        let back = reshape_long_to_wide(&long, TEMPERATURE).unwrap();
        assert_eq!(back, original);
    }
}
