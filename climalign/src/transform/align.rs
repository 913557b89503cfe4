//! Restrict two tables to shared regions and shared years.

use std::collections::HashSet;
use tracing::debug;

use crate::error::SchemaResult;
use crate::models::{Cell, CellKey, Table, ENTITY, YEAR};

/// Two tables restricted to the same regions and the same set of years.
///
/// Every `Year` present on one side is present on the other.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedPair {
    pub left: Table,
    pub right: Table,
    /// Years observed on both sides, ascending.
    pub common_years: Vec<Cell>,
}

impl AlignedPair {
    pub fn is_empty(&self) -> bool {
        self.left.is_empty() && self.right.is_empty()
    }
}

/// Filter both tables to `regions`, then to the years both of them cover.
///
/// `regions` is a membership test only. No match at all yields two empty
/// tables, not an error. Fails only when `Entity` or `Year` is absent.
pub fn align(left: &Table, right: &Table, regions: &HashSet<String>) -> SchemaResult<AlignedPair> {
    let left_entity = left.require(ENTITY)?;
    let left_year = left.require(YEAR)?;
    let right_entity = right.require(ENTITY)?;
    let right_year = right.require(YEAR)?;

    let in_regions = |cell: &Cell| cell.as_str().is_some_and(|entity| regions.contains(entity));

    let left_filtered = left.filter_rows(|row| in_regions(&row[left_entity]));
    let right_filtered = right.filter_rows(|row| in_regions(&row[right_entity]));

    let left_years = year_set(&left_filtered, left_year);
    let right_years = year_set(&right_filtered, right_year);
    let common: HashSet<CellKey> = left_years.intersection(&right_years).cloned().collect();

    let mut common_years: Vec<Cell> = left_filtered
        .column_values(left_year)
        .filter(|cell| common.contains(&cell.key()))
        .cloned()
        .collect();
    common_years.sort_by(|a, b| a.sort_cmp(b));
    common_years.dedup();

    let left_aligned = left_filtered.filter_rows(|row| common.contains(&row[left_year].key()));
    let right_aligned = right_filtered.filter_rows(|row| common.contains(&row[right_year].key()));

    debug!(
        left = left.name(),
        right = right.name(),
        regions = regions.len(),
        common_years = common_years.len(),
        left_rows = left_aligned.len(),
        right_rows = right_aligned.len(),
        "aligned tables"
    );

    Ok(AlignedPair {
        left: left_aligned,
        right: right_aligned,
        common_years,
    })
}

fn year_set(table: &Table, year_idx: usize) -> HashSet<CellKey> {
    table
        .column_values(year_idx)
        .filter(|cell| !cell.is_missing())
        .map(Cell::key)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchemaError;

    fn table(name: &str, rows: &[(&str, i64)]) -> Table {
        Table::from_rows(
            name,
            vec![ENTITY.to_string(), YEAR.to_string()],
            rows.iter()
                .map(|(entity, year)| vec![Cell::text(*entity), Cell::from(*year)])
                .collect(),
        )
    }

    fn regions(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn years(table: &Table) -> HashSet<CellKey> {
        year_set(table, 1)
    }

    #[test]
    fn test_align_common_years() {
        let temperature = table("temperature", &[("Canada", 2000), ("Canada", 2001), ("Brazil", 2002)]);
        let emissions = table(
            "emissions",
            &[("Canada", 2001), ("Brazil", 2002), ("Brazil", 2003), ("Mexico", 2000)],
        );

        let aligned = align(&temperature, &emissions, &regions(&["Canada", "Brazil"])).unwrap();

        assert_eq!(aligned.common_years, vec![Cell::Number(2001.0), Cell::Number(2002.0)]);
        assert_eq!(aligned.left.len(), 2);
        assert_eq!(aligned.right.len(), 2);
        assert_eq!(years(&aligned.left), years(&aligned.right));
    }

    #[test]
    fn test_year_sets_match_even_across_entities() {
        // common years are computed over the whole filtered table, not per entity
        let a = table("a", &[("Canada", 2000), ("Brazil", 2001)]);
        let b = table("b", &[("Brazil", 2000), ("Canada", 2001), ("Canada", 1999)]);

        let aligned = align(&a, &b, &regions(&["Canada", "Brazil"])).unwrap();
        assert_eq!(years(&aligned.left), years(&aligned.right));
        assert_eq!(aligned.right.len(), 2);
    }

    #[test]
    fn test_no_matching_regions_is_empty_not_error() {
        let a = table("a", &[("Canada", 2000)]);
        let b = table("b", &[("Canada", 2000)]);

        let aligned = align(&a, &b, &regions(&["Atlantis"])).unwrap();
        assert!(aligned.is_empty());
        assert!(aligned.common_years.is_empty());
    }

    #[test]
    fn test_inputs_untouched() {
        let a = table("a", &[("Canada", 2000), ("Mexico", 2000)]);
        let before = a.clone();
        let _ = align(&a, &a, &regions(&["Canada"])).unwrap();
        assert_eq!(a, before);
    }

    #[test]
    fn test_missing_year_column() {
        let a = table("a", &[("Canada", 2000)]);
        let b = Table::new("emissions", vec![ENTITY.to_string()]);

        let err = align(&a, &b, &regions(&["Canada"])).unwrap_err();
        assert_eq!(err, SchemaError::missing("emissions", YEAR));
    }
}
