use crate::services::analytics::SpreadsheetTable;

pub const SPREADSHEET_MIMETYPES: [&str; 2] = [
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-excel",
];

pub const SPREADSHEET_EXTENSIONS: [&str; 2] = ["xlsx", "xls"];

/// First sheet of a workbook plus the names of every sheet in it.
#[derive(Debug, Clone)]
pub struct DecodedWorkbook {
    pub sheet_names: Vec<String>,
    pub table: SpreadsheetTable,
}

impl DecodedWorkbook {
    pub fn worksheet_count(&self) -> usize {
        self.sheet_names.len()
    }
}
