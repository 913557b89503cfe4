//! Inner relational join of two tables on shared key columns.

use std::collections::HashMap;
use tracing::debug;

use crate::error::SchemaResult;
use crate::models::{Cell, CellKey, Table};

/// Suffixes for non-key columns present on both sides.
const LEFT_SUFFIX: &str = "_x";
const RIGHT_SUFFIX: &str = "_y";

/// Inner join of `left` and `right` on `keys`.
///
/// Rows whose key tuple exists on only one side are dropped. Output rows
/// follow left order, and for each left row its matches in right order.
/// Columns: every left column, then every right non-key column; a non-key
/// name found on both sides is kept twice with `_x` / `_y` suffixes.
/// Missing key cells match each other.
pub fn join(left: &Table, right: &Table, keys: &[&str]) -> SchemaResult<Table> {
    let left_keys: Vec<usize> = keys.iter().map(|k| left.require(k)).collect::<SchemaResult<_>>()?;
    let right_keys: Vec<usize> = keys.iter().map(|k| right.require(k)).collect::<SchemaResult<_>>()?;

    let right_values: Vec<usize> = (0..right.columns().len())
        .filter(|idx| !right_keys.contains(idx))
        .collect();

    let mut columns: Vec<String> = left
        .columns()
        .iter()
        .map(|column| {
            let collides = !keys.iter().any(|k| *k == column.as_str())
                && right_values.iter().any(|&i| &right.columns()[i] == column);
            if collides {
                format!("{column}{LEFT_SUFFIX}")
            } else {
                column.clone()
            }
        })
        .collect();
    columns.extend(right_values.iter().map(|&i| {
        let column = &right.columns()[i];
        if left.has_column(column) {
            format!("{column}{RIGHT_SUFFIX}")
        } else {
            column.clone()
        }
    }));

    let mut index: HashMap<Vec<CellKey>, Vec<usize>> = HashMap::new();
    for (pos, row) in right.rows().iter().enumerate() {
        index.entry(key_of(row, &right_keys)).or_default().push(pos);
    }

    let mut joined = Table::new("joined", columns);
    for row in left.rows() {
        let Some(matches) = index.get(&key_of(row, &left_keys)) else {
            continue;
        };
        for &pos in matches {
            let other = &right.rows()[pos];
            let mut out = row.clone();
            out.extend(right_values.iter().map(|&i| other[i].clone()));
            joined.push_row(out);
        }
    }

    debug!(
        left = left.name(),
        right = right.name(),
        keys = %keys.join(","),
        rows = joined.len(),
        "joined tables"
    );

    Ok(joined)
}

fn key_of(row: &[Cell], idx: &[usize]) -> Vec<CellKey> {
    idx.iter().map(|&i| row[i].key()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchemaError;
    use crate::models::{CODE, EMISSIONS_TOTAL, ENTITY, TEMPERATURE, YEAR};

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn temperature() -> Table {
        Table::from_rows(
            "temperature",
            cols(&[ENTITY, CODE, YEAR, TEMPERATURE]),
            vec![
                vec!["Canada".into(), "CAN".into(), 2000i64.into(), (-5.0).into()],
                vec!["Brazil".into(), "BRA".into(), 2000i64.into(), 25.0.into()],
                vec!["Canada".into(), "CAN".into(), 2001i64.into(), (-4.0).into()],
            ],
        )
    }

    fn emissions() -> Table {
        Table::from_rows(
            "emissions",
            cols(&[ENTITY, CODE, YEAR, EMISSIONS_TOTAL]),
            vec![
                vec!["Brazil".into(), "BRA".into(), 2000i64.into(), 300.0.into()],
                vec!["Canada".into(), "CAN".into(), 2000i64.into(), 500.0.into()],
                vec!["Mexico".into(), "MEX".into(), 2000i64.into(), 400.0.into()],
            ],
        )
    }

    #[test]
    fn test_inner_join_drops_unmatched() {
        let joined = join(&temperature(), &emissions(), &[ENTITY, CODE, YEAR]).unwrap();

        assert_eq!(joined.columns(), &[ENTITY, CODE, YEAR, TEMPERATURE, EMISSIONS_TOTAL]);
        assert_eq!(joined.len(), 2);
        // left order preserved
        assert_eq!(joined.rows()[0][0], Cell::text("Canada"));
        assert_eq!(joined.rows()[0][4], Cell::Number(500.0));
        assert_eq!(joined.rows()[1][0], Cell::text("Brazil"));
    }

    #[test]
    fn test_join_bounded_by_smaller_side_with_unique_keys() {
        let left = temperature();
        let right = emissions();
        let joined = join(&left, &right, &[ENTITY, CODE, YEAR]).unwrap();

        assert!(joined.len() <= left.len().min(right.len()));
        for row in joined.rows() {
            let key = &row[..3];
            assert!(left.rows().iter().any(|r| &r[..3] == key));
            assert!(right.rows().iter().any(|r| &r[..3] == key));
        }
    }

    #[test]
    fn test_join_row_set_independent_of_input_order() {
        let (name, columns, mut rows) = emissions().into_parts();
        rows.reverse();
        let reversed = Table::from_rows(name, columns, rows);

        let a = join(&temperature(), &emissions(), &[ENTITY, YEAR]).unwrap();
        let b = join(&temperature(), &reversed, &[ENTITY, YEAR]).unwrap();

        let mut rows_a: Vec<String> = a.rows().iter().map(|r| format!("{:?}", r)).collect();
        let mut rows_b: Vec<String> = b.rows().iter().map(|r| format!("{:?}", r)).collect();
        rows_a.sort();
        rows_b.sort();
        assert_eq!(rows_a, rows_b);
    }

    #[test]
    fn test_colliding_columns_kept_with_suffixes() {
        // joining without Code keeps both Code columns
        let joined = join(&temperature(), &emissions(), &[ENTITY, YEAR]).unwrap();
        assert_eq!(
            joined.columns(),
            &[ENTITY, "Code_x", YEAR, TEMPERATURE, "Code_y", EMISSIONS_TOTAL]
        );
    }

    #[test]
    fn test_missing_keys_match_each_other() {
        let left = Table::from_rows(
            "l",
            cols(&[ENTITY, CODE, "a"]),
            vec![vec!["World".into(), Cell::Missing, 1.0.into()]],
        );
        let right = Table::from_rows(
            "r",
            cols(&[ENTITY, CODE, "b"]),
            vec![vec!["World".into(), Cell::Missing, 2.0.into()]],
        );
        let joined = join(&left, &right, &[ENTITY, CODE]).unwrap();
        assert_eq!(joined.len(), 1);
    }

    #[test]
    fn test_many_to_many_cross_product() {
        let left = Table::from_rows(
            "l",
            cols(&[YEAR, "month"]),
            vec![vec![2000i64.into(), 1i64.into()], vec![2000i64.into(), 2i64.into()]],
        );
        let right = Table::from_rows(
            "r",
            cols(&[YEAR, "total"]),
            vec![vec![2000i64.into(), 10.0.into()], vec![2000i64.into(), 20.0.into()]],
        );
        assert_eq!(join(&left, &right, &[YEAR]).unwrap().len(), 4);
    }

    #[test]
    fn test_missing_key_column() {
        let right = Table::new("emissions", cols(&[ENTITY]));
        let err = join(&temperature(), &right, &[ENTITY, YEAR]).unwrap_err();
        assert_eq!(err, SchemaError::missing("emissions", YEAR));
    }
}
