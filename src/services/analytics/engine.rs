use super::types::*;
use std::borrow::Cow;
use std::collections::HashSet;

/// Identity of a non-empty value for distinct counting.
///
/// Numbers and text never compare equal, so `5` and `"5"` are two values.
#[derive(Debug, PartialEq, Eq, Hash)]
enum DistinctValue<'a> {
    Number(u64),
    Text(&'a str),
}

impl<'a> DistinctValue<'a> {
    fn of(cell: &'a Cell) -> Option<Self> {
        match cell {
            Cell::Number(value) if *value == 0.0 => Some(Self::Number(0f64.to_bits())),
            Cell::Number(value) => Some(Self::Number(value.to_bits())),
            Cell::Text(text) => Some(Self::Text(text.as_str())),
            Cell::Empty => None,
        }
    }
}

/// Column classification rule.
///
/// A column is numeric only when it has at least one non-empty value and
/// every one of them is numeric. One stray label among thousands of numbers
/// makes the whole column text.
pub fn classify_column(column_data: &[&Cell]) -> ColumnKind {
    if !column_data.is_empty() && column_data.iter().all(|cell| cell.numeric_value().is_some()) {
        ColumnKind::Number
    } else {
        ColumnKind::Text
    }
}

/// Computes the summary statistics for one decoded sheet.
///
/// Never fails: an empty table yields zero counts and text columns with no
/// extrema. Cells missing from short rows count as empty and cells past the
/// last header are ignored.
pub fn compute_analytics(table: &SpreadsheetTable) -> AnalyticsSummary {
    let total_rows = table.row_count();
    let total_columns = table.column_count();

    let column_stats: Vec<ColumnStat> = table
        .headers
        .iter()
        .enumerate()
        .map(|(idx, name)| analyze_column(table, idx, name))
        .collect();

    let non_empty_cells: usize = column_stats.iter().map(|stat| stat.non_empty_count).sum();
    let empty_cells = total_rows * total_columns - non_empty_cells;

    tracing::debug!(
        "Computed analytics for {} rows x {} columns ({} non-empty cells)",
        total_rows,
        total_columns,
        non_empty_cells
    );

    AnalyticsSummary {
        total_rows,
        total_columns,
        non_empty_cells,
        empty_cells,
        column_stats,
    }
}

fn analyze_column(table: &SpreadsheetTable, idx: usize, name: &str) -> ColumnStat {
    let column_data: Vec<&Cell> = (0..table.row_count())
        .map(|row| table.cell(row, idx))
        .filter(|cell| !cell.is_empty())
        .collect();

    let unique_count = column_data
        .iter()
        .filter_map(|cell| DistinctValue::of(cell))
        .collect::<HashSet<_>>()
        .len();

    let summary = match classify_column(&column_data) {
        ColumnKind::Number => number_summary(&column_data),
        ColumnKind::Text => text_summary(&column_data),
    };

    ColumnStat {
        name: name.to_string(),
        non_empty_count: column_data.len(),
        unique_count,
        summary,
    }
}

// Only called for classified numeric columns, which are never empty.
fn number_summary(column_data: &[&Cell]) -> ColumnSummary {
    let values: Vec<f64> = column_data
        .iter()
        .filter_map(|cell| cell.numeric_value())
        .collect();

    let sum: f64 = values.iter().sum();
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    ColumnSummary::Number {
        average: sum / values.len() as f64,
        sum,
        min,
        max,
    }
}

fn text_summary(column_data: &[&Cell]) -> ColumnSummary {
    let rendered: Vec<Cow<'_, str>> = column_data.iter().map(|cell| cell.render()).collect();

    let min = rendered
        .iter()
        .cloned()
        .reduce(|a, b| if a < b { a } else { b });
    let max = rendered
        .iter()
        .cloned()
        .reduce(|a, b| if a > b { a } else { b });

    ColumnSummary::Text {
        min: min.map(Cow::into_owned),
        max: max.map(Cow::into_owned),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(headers: &[&str], rows: Vec<Vec<Cell>>) -> SpreadsheetTable {
        SpreadsheetTable::new(headers.iter().map(|h| h.to_string()).collect(), rows)
    }

    fn text_row(values: &[&str]) -> Vec<Cell> {
        values.iter().map(|v| Cell::from(*v)).collect()
    }

    fn cities() -> SpreadsheetTable {
        table(
            &["City", "Population"],
            vec![
                text_row(&["NYC", "8000000"]),
                text_row(&["LA", "4000000"]),
                text_row(&["LA", ""]),
            ],
        )
    }

    #[test]
    fn summarizes_city_population_sheet() {
        let summary = compute_analytics(&cities());

        assert_eq!(summary.total_rows, 3);
        assert_eq!(summary.total_columns, 2);
        assert_eq!(summary.non_empty_cells, 5);
        assert_eq!(summary.empty_cells, 1);

        let city = &summary.column_stats[0];
        assert_eq!(city.name, "City");
        assert_eq!(city.kind(), ColumnKind::Text);
        assert_eq!(city.non_empty_count, 3);
        assert_eq!(city.unique_count, 2);
        assert_eq!(
            city.summary,
            ColumnSummary::Text {
                min: Some("LA".to_string()),
                max: Some("NYC".to_string()),
            }
        );

        let population = &summary.column_stats[1];
        assert_eq!(population.kind(), ColumnKind::Number);
        assert_eq!(population.non_empty_count, 2);
        assert_eq!(population.unique_count, 2);
        assert_eq!(
            population.summary,
            ColumnSummary::Number {
                average: 6_000_000.0,
                sum: 12_000_000.0,
                min: 4_000_000.0,
                max: 8_000_000.0,
            }
        );
    }

    #[test]
    fn empty_table_degenerates_to_zero_counts() {
        let summary = compute_analytics(&table(&["A", "B"], vec![]));

        assert_eq!(summary.total_rows, 0);
        assert_eq!(summary.total_columns, 2);
        assert_eq!(summary.non_empty_cells, 0);
        assert_eq!(summary.empty_cells, 0);
        for stat in &summary.column_stats {
            assert_eq!(stat.non_empty_count, 0);
            assert_eq!(stat.unique_count, 0);
            assert_eq!(stat.summary, ColumnSummary::Text { min: None, max: None });
        }
    }

    #[test]
    fn no_headers_yields_no_columns() {
        let summary = compute_analytics(&SpreadsheetTable::default());
        assert_eq!(summary.total_columns, 0);
        assert!(summary.column_stats.is_empty());
    }

    #[test]
    fn all_empty_column_is_text_without_extrema() {
        let summary = compute_analytics(&table(
            &["Notes", "Value"],
            vec![
                vec![Cell::Empty, Cell::Number(1.0)],
                vec![Cell::Empty, Cell::Number(2.0)],
            ],
        ));

        let notes = &summary.column_stats[0];
        assert_eq!(notes.kind(), ColumnKind::Text);
        assert_eq!(notes.summary, ColumnSummary::Text { min: None, max: None });
        assert_eq!(summary.empty_cells, 2);
    }

    #[test]
    fn single_label_flips_numeric_column_to_text() {
        let mut rows: Vec<Vec<Cell>> = (1..=99).map(|n| vec![Cell::Number(n as f64)]).collect();
        let numeric = compute_analytics(&table(&["Score"], rows.clone()));
        assert_eq!(numeric.column_stats[0].kind(), ColumnKind::Number);

        rows.push(vec![Cell::from("n/a")]);
        let mixed = compute_analytics(&table(&["Score"], rows));
        assert_eq!(mixed.column_stats[0].kind(), ColumnKind::Text);
    }

    #[test]
    fn numeric_text_is_trimmed_but_must_be_finite() {
        let padded = compute_analytics(&table(&["N"], vec![text_row(&[" 42 "]), text_row(&["1e3"])]));
        assert_eq!(padded.column_stats[0].kind(), ColumnKind::Number);

        for odd in ["inf", "NaN", "12abc", "   "] {
            let summary = compute_analytics(&table(&["N"], vec![text_row(&["1"]), text_row(&[odd])]));
            assert_eq!(summary.column_stats[0].kind(), ColumnKind::Text, "{odd:?}");
        }
    }

    #[test]
    fn numeric_stats_hold_for_negative_and_fractional_values() {
        let summary = compute_analytics(&table(
            &["Delta"],
            vec![
                vec![Cell::Number(-2.5)],
                vec![Cell::from("0.5")],
                vec![Cell::Number(10.0)],
                vec![Cell::Number(-2.5)],
            ],
        ));

        let stat = &summary.column_stats[0];
        assert_eq!(stat.unique_count, 3);
        match stat.summary {
            ColumnSummary::Number { average, sum, min, max } => {
                assert!((sum - 5.5).abs() < 1e-9);
                assert!((average - sum / stat.non_empty_count as f64).abs() < 1e-9);
                assert_eq!(min, -2.5);
                assert_eq!(max, 10.0);
            }
            ref other => panic!("expected numeric summary, got {other:?}"),
        }
    }

    #[test]
    fn text_extrema_use_ordinal_comparison() {
        let summary = compute_analytics(&table(
            &["Animal"],
            vec![text_row(&["apple"]), text_row(&["Zebra"]), text_row(&["mango"])],
        ));

        assert_eq!(
            summary.column_stats[0].summary,
            ColumnSummary::Text {
                min: Some("Zebra".to_string()),
                max: Some("mango".to_string()),
            }
        );
    }

    #[test]
    fn mixed_column_renders_numbers_for_extrema() {
        let summary = compute_analytics(&table(
            &["Code"],
            vec![vec![Cell::Number(7.0)], vec![Cell::from("B12")], vec![Cell::Number(10.5)]],
        ));

        assert_eq!(
            summary.column_stats[0].summary,
            ColumnSummary::Text {
                min: Some("10.5".to_string()),
                max: Some("B12".to_string()),
            }
        );
    }

    #[test]
    fn distinct_values_respect_cell_type() {
        let summary = compute_analytics(&table(
            &["Id"],
            vec![
                vec![Cell::Number(5.0)],
                vec![Cell::from("5")],
                vec![Cell::Number(0.0)],
                vec![Cell::Number(-0.0)],
                vec![Cell::Number(5.0)],
            ],
        ));

        let stat = &summary.column_stats[0];
        assert_eq!(stat.non_empty_count, 5);
        assert_eq!(stat.unique_count, 3);
        assert_eq!(stat.kind(), ColumnKind::Number);
    }

    #[test]
    fn short_rows_count_missing_cells_as_empty() {
        let summary = compute_analytics(&table(
            &["A", "B", "C"],
            vec![
                vec![Cell::Number(1.0)],
                vec![Cell::Number(2.0), Cell::from("x"), Cell::from("y"), Cell::from("extra")],
            ],
        ));

        assert_eq!(summary.non_empty_cells, 4);
        assert_eq!(summary.empty_cells, 2);
        assert_eq!(summary.column_stats[1].non_empty_count, 1);
        assert_eq!(summary.column_stats.len(), 3);
    }

    #[test]
    fn counts_cover_the_whole_grid() {
        let summary = compute_analytics(&table(
            &["A", "B", "C", "D"],
            vec![
                text_row(&["a", "", "1", ""]),
                text_row(&["", "", "", ""]),
                text_row(&["b", "2", "3", "q"]),
            ],
        ));

        assert_eq!(
            summary.non_empty_cells + summary.empty_cells,
            summary.total_rows * summary.total_columns
        );
        let names: Vec<&str> = summary.column_stats.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["A", "B", "C", "D"]);
        for stat in &summary.column_stats {
            assert!(stat.unique_count <= stat.non_empty_count);
        }
    }

    #[test]
    fn computation_is_repeatable() {
        let input = cities();
        assert_eq!(compute_analytics(&input), compute_analytics(&input));
    }

    #[test]
    fn serializes_to_client_shape() {
        let json = serde_json::to_value(compute_analytics(&cities())).unwrap();

        assert_eq!(json["totalRows"], 3);
        assert_eq!(json["nonEmptyCells"], 5);
        assert_eq!(json["columnStats"][0]["type"], "text");
        assert_eq!(json["columnStats"][0]["nonEmpty"], 3);
        assert_eq!(json["columnStats"][0]["min"], "LA");
        assert!(json["columnStats"][0].get("average").is_none());
        assert_eq!(json["columnStats"][1]["type"], "number");
        assert_eq!(json["columnStats"][1]["unique"], 2);
        assert_eq!(json["columnStats"][1]["average"], 6_000_000.0);
    }

    #[test]
    fn summary_round_trips_through_storage_json() {
        let summary = compute_analytics(&cities());
        let stored = serde_json::to_string(&summary).unwrap();
        let restored: AnalyticsSummary = serde_json::from_str(&stored).unwrap();
        assert_eq!(restored, summary);
    }
}
