use super::types::DecodedWorkbook;
use super::utils::*;
use std::io::Cursor;
use bytes::Bytes;
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use crate::error::AppError;
use crate::services::analytics::{Cell, SpreadsheetTable};

/// Turns uploaded workbook bytes into the header row and data grid of the first sheet.
pub struct WorkbookDecoder;

impl WorkbookDecoder {
    pub fn decode(&self, file_data: Bytes) -> Result<DecodedWorkbook, AppError> {
        let start = std::time::Instant::now();
        tracing::info!("Opening workbook ({}KB)", file_data.len() / 1024);

        let mut workbook = open_workbook_auto_from_rs(Cursor::new(file_data))
            .map_err(|e| {
                tracing::error!("Failed to open Excel file: {}", e);
                AppError::FileProcessingError(format!("Failed to open Excel file: {}", e))
            })?;

        let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
        tracing::info!("Found {} sheets: {:?}", sheet_names.len(), sheet_names);

        let first_sheet = sheet_names.first().ok_or_else(|| {
            AppError::FileProcessingError("Uploaded Excel file contains no worksheets".to_string())
        })?;

        let range = workbook.worksheet_range(first_sheet).map_err(|e| {
            tracing::warn!("Failed to read worksheet {}: {}", first_sheet, e);
            AppError::FileProcessingError(format!("Failed to read worksheet {}: {}", first_sheet, e))
        })?;

        let rows: Vec<&[Data]> = range.rows().collect();
        let table = self.build_table(&rows)?;

        tracing::info!(
            "Decoded sheet {} into {} rows x {} columns in {:?}",
            first_sheet,
            table.row_count(),
            table.column_count(),
            start.elapsed()
        );

        Ok(DecodedWorkbook { sheet_names, table })
    }

    fn build_table(&self, rows: &[&[Data]]) -> Result<SpreadsheetTable, AppError> {
        let (header_row, data_rows) = rows.split_first().ok_or_else(|| {
            AppError::FileProcessingError("Uploaded Excel file is empty or contains no data.".to_string())
        })?;

        let headers: Vec<String> = header_row
            .iter()
            .enumerate()
            .map(|(idx, cell)| header_name(cell, idx))
            .collect();

        let width = headers.len();
        let rows = data_rows
            .iter()
            .map(|row| {
                let mut cells: Vec<Cell> = row.iter().take(width).map(cell_from_data).collect();
                cells.resize(width, Cell::Empty);
                cells
            })
            .collect();

        Ok(SpreadsheetTable::new(headers, rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::analytics::{compute_analytics, ColumnKind};
    use rust_xlsxwriter::Workbook;

    fn workbook_bytes(build: impl FnOnce(&mut Workbook)) -> Bytes {
        let mut workbook = Workbook::new();
        build(&mut workbook);
        Bytes::from(workbook.save_to_buffer().unwrap())
    }

    #[test]
    fn decodes_first_sheet_with_header_row() {
        let data = workbook_bytes(|workbook| {
            let sheet = workbook.add_worksheet().set_name("Cities").unwrap();
            sheet.write_string(0, 0, "City").unwrap();
            sheet.write_string(0, 1, "Population").unwrap();
            sheet.write_string(1, 0, "NYC").unwrap();
            sheet.write_number(1, 1, 8_000_000).unwrap();
            sheet.write_string(2, 0, "LA").unwrap();
            sheet.write_number(2, 1, 4_000_000).unwrap();
            sheet.write_string(3, 0, "LA").unwrap();
            workbook.add_worksheet().set_name("Notes").unwrap();
        });

        let decoded = WorkbookDecoder.decode(data).unwrap();

        assert_eq!(decoded.sheet_names, ["Cities", "Notes"]);
        assert_eq!(decoded.worksheet_count(), 2);
        assert_eq!(decoded.table.headers, ["City", "Population"]);
        assert_eq!(decoded.table.rows.len(), 3);
        assert_eq!(decoded.table.rows[0], vec![Cell::from("NYC"), Cell::Number(8_000_000.0)]);
        assert_eq!(decoded.table.rows[2], vec![Cell::from("LA"), Cell::Empty]);

        let summary = compute_analytics(&decoded.table);
        assert_eq!(summary.non_empty_cells, 5);
        assert_eq!(summary.empty_cells, 1);
        assert_eq!(summary.column_stats[1].kind(), ColumnKind::Number);
    }

    #[test]
    fn pads_short_rows_and_keeps_interior_blank_ones() {
        let data = workbook_bytes(|workbook| {
            let sheet = workbook.add_worksheet();
            sheet.write_string(0, 0, "A").unwrap();
            sheet.write_string(0, 2, "C").unwrap();
            sheet.write_number(1, 0, 1).unwrap();
            sheet.write_boolean(3, 2, true).unwrap();
        });

        let decoded = WorkbookDecoder.decode(data).unwrap();

        assert_eq!(decoded.table.headers, ["A", "Column 2", "C"]);
        assert_eq!(decoded.table.rows.len(), 3);
        assert!(decoded.table.rows.iter().all(|row| row.len() == 3));
        assert!(decoded.table.rows[1].iter().all(Cell::is_empty));
        assert_eq!(decoded.table.rows[2][2], Cell::Text("true".to_string()));

        let summary = compute_analytics(&decoded.table);
        assert_eq!(summary.total_rows, 3);
        assert_eq!(summary.non_empty_cells, 2);
        assert_eq!(summary.empty_cells, 7);
    }

    #[test]
    fn rejects_bytes_that_are_not_a_workbook() {
        let err = WorkbookDecoder
            .decode(Bytes::from_static(b"definitely not a spreadsheet"))
            .unwrap_err();
        assert!(matches!(err, AppError::FileProcessingError(_)));
    }

    #[test]
    fn rejects_sheet_without_rows() {
        let data = workbook_bytes(|workbook| {
            workbook.add_worksheet();
        });

        let err = WorkbookDecoder.decode(data).unwrap_err();
        assert!(matches!(err, AppError::FileProcessingError(_)));
    }
}
